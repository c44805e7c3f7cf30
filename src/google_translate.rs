use crate::config::{credential_from_env, TranslationConfig};
use crate::translator::Translator;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

const TRANSLATE_BASE_URL: &str = "https://translation.googleapis.com/v3";

/// translateText リクエスト
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslateTextRequest<'a> {
    contents: [&'a str; 1],
    mime_type: &'a str,
    source_language_code: &'a str,
    target_language_code: &'a str,
}

/// translateText レスポンス
#[derive(Debug, Deserialize)]
struct TranslateTextResponse {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
}

/// OAuth2 アクセストークンの取得元
///
/// リクエスト毎に呼び出される。
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// 起動時に読み込んだ固定トークン
///
/// Google のアクセストークンは通常1時間程度で失効するため、
/// 長時間動かすプロセスでは [`TokenFile`] を使うこと。
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// リクエスト毎にファイルから読み直すトークン
///
/// `gcloud auth print-access-token` を定期実行する等、外部でファイルを更新する前提。
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl AccessTokenSource for TokenFile {
    async fn access_token(&self) -> Result<String> {
        let token = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("アクセストークンファイルの読み込みに失敗: {:?}", self.path))?;
        let token = token.trim();
        if token.is_empty() {
            anyhow::bail!("アクセストークンファイルが空です: {:?}", self.path);
        }
        Ok(token.to_string())
    }
}

/// Google Cloud Translation API (v3) による翻訳
///
/// 1テキストにつき1回だけ呼び出す。リトライはしない。
pub struct GoogleTranslator {
    client: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl GoogleTranslator {
    pub fn new(config: &TranslationConfig, tokens: Arc<dyn AccessTokenSource>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Translation API HTTPクライアント作成失敗")?;

        Ok(Self {
            client,
            endpoint: translate_endpoint(&config.project_id, &config.location),
            tokens,
        })
    }

    /// 設定からトークンの取得元を決めて作成
    ///
    /// `access_token_file` があればリクエスト毎にそのファイルを読む。
    /// 無ければ `access_token_env` の環境変数を起動時に1回だけ読む。
    /// この場合トークンは更新されないため、失効（通常1時間程度）後の翻訳は
    /// 認証エラーになる。長時間動かす場合はトークンファイルを使うこと。
    ///
    /// # Errors
    ///
    /// トークンを取得できない場合にエラーを返す（起動時の設定エラー）。
    pub async fn from_config(config: &TranslationConfig) -> Result<Self> {
        let tokens: Arc<dyn AccessTokenSource> = match &config.access_token_file {
            Some(path) => {
                let source = TokenFile::new(path);
                source.access_token().await?;
                Arc::new(source)
            }
            None => Arc::new(StaticToken::new(credential_from_env(&config.access_token_env)?)),
        };
        Self::new(config, tokens)
    }

    async fn request(&self, body: &TranslateTextRequest<'_>) -> Result<reqwest::RequestBuilder> {
        let access_token = self.tokens.access_token().await?;
        Ok(self
            .client
            .post(&self.endpoint)
            .bearer_auth(access_token)
            .json(body))
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn translate(
        &self,
        text: &str,
        source_language: &str,
        target_language: &str,
    ) -> Result<Option<String>> {
        let request = TranslateTextRequest {
            contents: [text],
            mime_type: "text/plain",
            source_language_code: source_language,
            target_language_code: target_language,
        };

        let response = self
            .request(&request)
            .await?
            .send()
            .await
            .context("Translation API リクエスト失敗")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Translation API エラー: {} - {}", status, error_text);
        }

        let body: TranslateTextResponse = response
            .json()
            .await
            .context("Translation API レスポンスパース失敗")?;

        let translated = first_translation(body);
        if let Some(text) = &translated {
            log::debug!("翻訳結果: {}", text);
        }
        Ok(translated)
    }
}

fn translate_endpoint(project_id: &str, location: &str) -> String {
    format!(
        "{}/projects/{}/locations/{}:translateText",
        TRANSLATE_BASE_URL, project_id, location
    )
}

fn first_translation(response: TranslateTextResponse) -> Option<String> {
    response
        .translations
        .into_iter()
        .next()
        .map(|t| t.translated_text)
}
