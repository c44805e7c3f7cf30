//! 翻訳フォワーダ
//!
//! ブロブの文字起こしディレクトリを走査し、ファイル毎に翻訳を1回呼び出して
//! 同名のファイルとして翻訳ディレクトリに書き出す。
//! 1ファイルの失敗は記録して次のファイルへ進む。

use crate::config::TranslationConfig;
use crate::layout::{ensure_dir, list_files, ArtifactLayout};
use crate::types::{Identity, TranslationOutcome, TranslationReport};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// 機械翻訳サービスの共通トレイト
#[async_trait]
pub trait Translator: Send + Sync {
    /// テキストを翻訳する
    ///
    /// # Returns
    /// 翻訳結果。サービスが訳文を返さなかった場合は `None`。
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<Option<String>>;
}

pub struct TranslationForwarder {
    translator: Arc<dyn Translator>,
    layout: ArtifactLayout,
    config: TranslationConfig,
}

impl TranslationForwarder {
    pub fn new(translator: Arc<dyn Translator>, layout: ArtifactLayout, config: &TranslationConfig) -> Self {
        Self {
            translator,
            layout,
            config: config.clone(),
        }
    }

    /// ブロブの文字起こしを全て翻訳し、全ファイル成功したかどうかを返す
    pub async fn translate(&self, blob: &Identity) -> bool {
        match self.translate_report(blob).await {
            Ok(report) => report.succeeded(),
            Err(e) => {
                log::error!("ブロブ {} の翻訳に失敗: {:#}", blob, e);
                false
            }
        }
    }

    /// ブロブの文字起こしを全て翻訳し、ファイル毎の結果を返す
    ///
    /// # Errors
    ///
    /// 出力先ディレクトリの作成や入力ディレクトリの読み込みに失敗した場合にエラーを返す。
    pub async fn translate_report(&self, blob: &Identity) -> Result<TranslationReport> {
        let source_dir = self.layout.blob_dir(&self.config.source_folder, blob);
        let destination_dir = self.layout.blob_dir(&self.config.destination_folder, blob);
        ensure_dir(&source_dir)
            .with_context(|| format!("翻訳元ディレクトリの作成に失敗: {:?}", source_dir))?;
        ensure_dir(&destination_dir)
            .with_context(|| format!("翻訳先ディレクトリの作成に失敗: {:?}", destination_dir))?;

        let files: Vec<String> = list_files(&source_dir)
            .with_context(|| format!("文字起こしディレクトリの読み込みに失敗: {:?}", source_dir))?
            .iter()
            .filter_map(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();

        let mut report = TranslationReport::default();
        for file in files {
            let result = self
                .translate_file(&source_dir.join(&file), &destination_dir.join(&file))
                .await;
            let outcome = match result {
                Ok(()) => TranslationOutcome {
                    file,
                    translated: true,
                    error: None,
                },
                Err(e) => {
                    log::error!("{} の翻訳に失敗: {:#}", file, e);
                    TranslationOutcome {
                        file,
                        translated: false,
                        error: Some(format!("{:#}", e)),
                    }
                }
            };
            report.outcomes.push(outcome);
        }

        log::info!(
            "ブロブ {} の翻訳完了: {}/{} ファイル成功",
            blob,
            report.outcomes.iter().filter(|o| o.translated).count(),
            report.outcomes.len()
        );
        Ok(report)
    }

    async fn translate_file(&self, source: &Path, destination: &Path) -> Result<()> {
        let text = tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("文字起こしの読み込みに失敗: {:?}", source))?;

        let translated = self
            .translator
            .translate(&text, &self.config.source_language, &self.config.target_language)
            .await?;

        let translated = translated.unwrap_or_else(|| {
            log::warn!("訳文がありません: {:?}", source);
            String::new()
        });

        tokio::fs::write(destination, translated)
            .await
            .with_context(|| format!("翻訳結果の書き込みに失敗: {:?}", destination))?;
        log::debug!("翻訳結果を書き込み: {:?}", destination);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// 入力をそのまま返す翻訳
    struct EchoTranslator;

    #[async_trait]
    impl Translator for EchoTranslator {
        async fn translate(&self, text: &str, _: &str, _: &str) -> Result<Option<String>> {
            Ok(Some(text.to_string()))
        }
    }

    /// 特定の文字列を含む入力で失敗する翻訳
    struct FlakyTranslator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Translator for FlakyTranslator {
        async fn translate(&self, text: &str, source: &str, target: &str) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(source, "ar-SA");
            assert_eq!(target, "en-US");
            if text.contains("fail") {
                anyhow::bail!("503 Service Unavailable");
            }
            if text.contains("empty") {
                return Ok(None);
            }
            Ok(Some(format!("EN: {}", text)))
        }
    }

    fn setup(files: &[(&str, &str)]) -> (TempDir, ArtifactLayout, Identity, TranslationConfig) {
        let temp_dir = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(temp_dir.path());
        let blob = Identity::from_raw("blob1");
        let config = TranslationConfig::default();
        let source = layout.blob_dir(&config.source_folder, &blob);
        fs::create_dir_all(&source).unwrap();
        for (name, text) in files {
            fs::write(source.join(name), text).unwrap();
        }
        (temp_dir, layout, blob, config)
    }

    #[tokio::test]
    async fn test_translation_is_repeatable_with_identity_stub() {
        let (_temp_dir, layout, blob, config) = setup(&[("a.wav.txt", "السلام عليكم")]);
        let forwarder = TranslationForwarder::new(Arc::new(EchoTranslator), layout.clone(), &config);
        let output = layout
            .blob_dir(&config.destination_folder, &blob)
            .join("a.wav.txt");

        assert!(forwarder.translate(&blob).await);
        let first = fs::read(&output).unwrap();
        assert!(forwarder.translate(&blob).await);
        let second = fs::read(&output).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, "السلام عليكم".as_bytes());
    }

    #[tokio::test]
    async fn test_failed_file_does_not_stop_others() {
        let (_temp_dir, layout, blob, config) = setup(&[
            ("a.wav.txt", "first"),
            ("b.wav.txt", "please fail"),
            ("c.wav.txt", "third"),
        ]);
        let translator = Arc::new(FlakyTranslator {
            calls: AtomicUsize::new(0),
        });
        let forwarder = TranslationForwarder::new(translator.clone(), layout.clone(), &config);

        let report = forwarder.translate_report(&blob).await.unwrap();

        assert_eq!(translator.calls.load(Ordering::SeqCst), 3);
        assert!(!report.succeeded());
        assert!(report.outcomes[0].translated);
        assert!(!report.outcomes[1].translated);
        assert!(report.outcomes[2].translated);

        let destination = layout.blob_dir(&config.destination_folder, &blob);
        assert_eq!(fs::read_to_string(destination.join("a.wav.txt")).unwrap(), "EN: first");
        assert_eq!(fs::read_to_string(destination.join("c.wav.txt")).unwrap(), "EN: third");
        assert!(!destination.join("b.wav.txt").exists());

        assert!(!forwarder.translate(&blob).await);
    }

    #[tokio::test]
    async fn test_missing_translation_writes_empty_file() {
        let (_temp_dir, layout, blob, config) = setup(&[("a.wav.txt", "empty result")]);
        let translator = Arc::new(FlakyTranslator {
            calls: AtomicUsize::new(0),
        });
        let forwarder = TranslationForwarder::new(translator, layout.clone(), &config);

        assert!(forwarder.translate(&blob).await);
        let output = layout
            .blob_dir(&config.destination_folder, &blob)
            .join("a.wav.txt");
        assert_eq!(fs::read_to_string(output).unwrap(), "");
    }

    #[tokio::test]
    async fn test_empty_blob_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(temp_dir.path());
        let config = TranslationConfig::default();
        let forwarder = TranslationForwarder::new(Arc::new(EchoTranslator), layout.clone(), &config);
        let blob = Identity::from_raw("new");

        let report = forwarder.translate_report(&blob).await.unwrap();

        assert!(report.outcomes.is_empty());
        assert!(layout.blob_dir(&config.destination_folder, &blob).is_dir());
    }
}
