use crate::config::SpeechConfig;
use crate::layout::{list_files, ArtifactLayout};
use crate::recognizer::RecognitionEngine;
use crate::session::RecognitionSession;
use crate::types::{Identity, SessionReport, SessionState};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// ブロブ単位の文字起こし
///
/// ブロブ配下の音声ファイルを名前順に1つずつ処理し、
/// ファイル毎に1つの文字起こしファイルを書き出す。
/// セッションは並行させず、前のファイルが終端状態になってから次へ進む。
pub struct Transcriber {
    engine: Box<dyn RecognitionEngine>,
    layout: ArtifactLayout,
    source_folder: String,
    transcript_folder: String,
    session_timeout: Duration,
}

impl Transcriber {
    pub fn new(engine: Box<dyn RecognitionEngine>, layout: ArtifactLayout, config: &SpeechConfig) -> Self {
        Self {
            engine,
            layout,
            source_folder: config.source_folder.clone(),
            transcript_folder: config.transcript_folder.clone(),
            session_timeout: Duration::from_secs(config.session_timeout_seconds),
        }
    }

    /// ブロブ配下の全音声ファイルを文字起こし
    ///
    /// 1ファイルの失敗（出力先を作れない等）はそのファイルだけを中断し、
    /// 残りのファイルは処理を続ける。
    ///
    /// # Errors
    ///
    /// ブロブのディレクトリを読めない場合にエラーを返す。
    pub async fn transcribe(&mut self, blob: &Identity) -> Result<Vec<SessionReport>> {
        let source_dir = self.layout.blob_dir(&self.source_folder, blob);
        let transcript_dir = self.layout.blob_dir(&self.transcript_folder, blob);
        let audio_files = list_audio_files(&source_dir)?;

        log::info!(
            "ブロブ {} の文字起こしを開始: {} ファイル ({:?})",
            blob,
            audio_files.len(),
            source_dir
        );

        let mut reports = Vec::with_capacity(audio_files.len());
        for audio_file in audio_files {
            let Some(file_name) = audio_file.file_name().map(|n| n.to_string_lossy().into_owned())
            else {
                continue;
            };
            let transcript_path = transcript_dir.join(ArtifactLayout::transcript_file_name(&file_name));

            let session = match RecognitionSession::create(&audio_file, &transcript_path).await {
                Ok(session) => session,
                Err(e) => {
                    log::error!("{} の文字起こしを中断: {:#}", file_name, e);
                    continue;
                }
            };

            let report = session.run(self.engine.as_mut(), self.session_timeout).await;
            reports.push(report);
        }

        Ok(reports)
    }

    /// 文字起こしを実行し、全ファイルが正常終了したかどうかを返す
    pub async fn transcribe_blob(&mut self, blob: &Identity) -> bool {
        match self.transcribe(blob).await {
            Ok(reports) => reports.iter().all(|r| r.state == SessionState::Completed),
            Err(e) => {
                log::error!("ブロブ {} の文字起こしに失敗: {:#}", blob, e);
                false
            }
        }
    }
}

fn list_audio_files(dir: &Path) -> Result<Vec<PathBuf>> {
    list_files(dir).with_context(|| format!("音声ディレクトリの読み込みに失敗: {:?}", dir))
}
