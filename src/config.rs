use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
}

/// ローカル作業領域の設定
///
/// # デフォルト値
///
/// - `root`: "./artifacts"
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_artifacts_root")]
    pub root: String,
}

/// オブジェクトストレージの種類
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendType {
    /// Azure Blob Storage
    Azure,
    /// ローカルディレクトリ（開発用）
    Local,
    /// プロセス内メモリ（動作確認用）
    Memory,
}

/// オブジェクトストレージ設定
///
/// # デフォルト値
///
/// - `backend`: "azure"
/// - `account`: "fatawastorage"
/// - `access_key_env`: "AZURE_STORAGE_ACCESS_KEY"
/// - `upload_container`: "artifacts"
/// - `containers`: [] (アップロード先以外に参照するコンテナ)
/// - `local_root`: "./object-store"
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackendType,
    #[serde(default = "default_account")]
    pub account: String,
    /// アカウントキーを格納した環境変数名
    #[serde(default = "default_access_key_env")]
    pub access_key_env: String,
    #[serde(default = "default_upload_container")]
    pub upload_container: String,
    #[serde(default)]
    pub containers: Vec<String>,
    #[serde(default = "default_local_root")]
    pub local_root: String,
}

/// 音声認識設定
///
/// Amazon Transcribe Streaming APIに関する設定。
///
/// # デフォルト値
///
/// - `region`: "me-central-1"
/// - `language_code`: "ar-SA" (アラビア語)
/// - `show_speaker_label`: true (話者の区別)
/// - `chunk_samples`: 8000 (約0.5秒 @ 16kHz)
/// - `session_timeout_seconds`: 7200 秒
/// - `source_folder`: "fatawa-audio-wav"
/// - `transcript_folder`: "transcriptions"
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpeechConfig {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_language_code")]
    pub language_code: String,
    #[serde(default = "default_show_speaker_label")]
    pub show_speaker_label: bool,
    #[serde(default = "default_chunk_samples")]
    pub chunk_samples: usize,
    /// セッションがこの時間内に終了しない場合はキャンセル扱いにする
    #[serde(default = "default_session_timeout_seconds")]
    pub session_timeout_seconds: u64,
    #[serde(default = "default_speech_source_folder")]
    pub source_folder: String,
    #[serde(default = "default_transcript_folder")]
    pub transcript_folder: String,
}

/// 機械翻訳設定
///
/// Google Cloud Translation API (v3) に関する設定。
///
/// # デフォルト値
///
/// - `project_id`: "salafifatawa"
/// - `location`: "global"
/// - `source_language`: "ar-SA"
/// - `target_language`: "en-US"
/// - `access_token_env`: "GOOGLE_TRANSLATE_ACCESS_TOKEN"
/// - `access_token_file`: なし (設定するとリクエスト毎に読み直す)
/// - `source_folder`: "transcriptions" (文字起こしの出力先と同じ)
/// - `destination_folder`: "fatwa-translation"
/// - `timeout_seconds`: 30 秒
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranslationConfig {
    #[serde(default = "default_project_id")]
    pub project_id: String,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_source_language")]
    pub source_language: String,
    #[serde(default = "default_target_language")]
    pub target_language: String,
    /// アクセストークンを格納した環境変数名
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,
    /// アクセストークンを書き出したファイル
    ///
    /// 外部で定期的に更新されるトークンを使う場合に設定する。
    /// 設定されていれば `access_token_env` より優先される。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_file: Option<String>,
    #[serde(default = "default_transcript_folder")]
    pub source_folder: String,
    #[serde(default = "default_translation_destination_folder")]
    pub destination_folder: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

// Default functions
fn default_artifacts_root() -> String {
    "./artifacts".to_string()
}

fn default_storage_backend() -> StorageBackendType {
    StorageBackendType::Azure
}

fn default_account() -> String {
    "fatawastorage".to_string()
}

fn default_access_key_env() -> String {
    "AZURE_STORAGE_ACCESS_KEY".to_string()
}

fn default_upload_container() -> String {
    "artifacts".to_string()
}

fn default_local_root() -> String {
    "./object-store".to_string()
}

fn default_region() -> String {
    "me-central-1".to_string()
}

fn default_language_code() -> String {
    "ar-SA".to_string()
}

fn default_show_speaker_label() -> bool {
    true
}

fn default_chunk_samples() -> usize {
    8000 // 約0.5秒分（16kHzの場合）
}

fn default_session_timeout_seconds() -> u64 {
    7200
}

fn default_speech_source_folder() -> String {
    "fatawa-audio-wav".to_string()
}

fn default_transcript_folder() -> String {
    "transcriptions".to_string()
}

fn default_project_id() -> String {
    "salafifatawa".to_string()
}

fn default_location() -> String {
    "global".to_string()
}

fn default_source_language() -> String {
    "ar-SA".to_string()
}

fn default_target_language() -> String {
    "en-US".to_string()
}

fn default_access_token_env() -> String {
    "GOOGLE_TRANSLATE_ACCESS_TOKEN".to_string()
}

fn default_translation_destination_folder() -> String {
    "fatwa-translation".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            artifacts: ArtifactsConfig::default(),
            storage: StorageConfig::default(),
            speech: SpeechConfig::default(),
            translation: TranslationConfig::default(),
        }
    }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            root: default_artifacts_root(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            account: default_account(),
            access_key_env: default_access_key_env(),
            upload_container: default_upload_container(),
            containers: Vec::new(),
            local_root: default_local_root(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            language_code: default_language_code(),
            show_speaker_label: default_show_speaker_label(),
            chunk_samples: default_chunk_samples(),
            session_timeout_seconds: default_session_timeout_seconds(),
            source_folder: default_speech_source_folder(),
            transcript_folder: default_transcript_folder(),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            project_id: default_project_id(),
            location: default_location(),
            source_language: default_source_language(),
            target_language: default_target_language(),
            access_token_env: default_access_token_env(),
            access_token_file: None,
            source_folder: default_transcript_folder(),
            destination_folder: default_translation_destination_folder(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Config {
    /// 設定ファイルから読み込み
    ///
    /// TOML形式の設定ファイルをパースしてConfig構造体を生成する。
    ///
    /// # Errors
    ///
    /// ファイルの読み込みまたはパースに失敗した場合にエラーを返す。
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use fatawa_processor::config::Config;
    /// let config = Config::from_file("config.toml").unwrap();
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("設定ファイルの読み込みに失敗: {:?}", path.as_ref()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "設定ファイルのパースに失敗")?;
        Ok(config)
    }

    /// デフォルト設定をファイルに書き出し
    ///
    /// 既存のファイルは上書きされる。
    pub fn write_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let config = Config::default();
        let content =
            toml::to_string_pretty(&config).with_context(|| "設定のシリアライズに失敗")?;
        fs::write(path.as_ref(), content)
            .with_context(|| format!("設定ファイルの書き込みに失敗: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// 設定ファイルがあれば読み込み、なければデフォルトを使用
    ///
    /// # Errors
    ///
    /// ファイルが存在するがパースに失敗した場合にエラーを返す。
    /// ファイルが存在しない場合はエラーにならず、デフォルト設定を返す。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            log::warn!(
                "設定ファイルが見つかりません。デフォルト設定を使用します: {:?}",
                path.as_ref()
            );
            Ok(Config::default())
        }
    }
}

/// 環境変数から認証情報を読み出す
///
/// 未設定または空の場合は起動時の設定エラーとして扱う。
pub fn credential_from_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Ok(_) => anyhow::bail!("認証情報の環境変数が空です: {}", var),
        Err(e) => Err(e).with_context(|| format!("認証情報の環境変数が未設定: {}", var)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.artifacts.root, "./artifacts");
        assert_eq!(config.storage.backend, StorageBackendType::Azure);
        assert_eq!(config.storage.upload_container, "artifacts");
        assert_eq!(config.speech.language_code, "ar-SA");
        assert_eq!(config.speech.source_folder, "fatawa-audio-wav");
        assert_eq!(config.translation.source_language, "ar-SA");
        assert_eq!(config.translation.target_language, "en-US");
        // 文字起こしの出力がそのまま翻訳の入力になる
        assert_eq!(
            config.translation.source_folder,
            config.speech.transcript_folder
        );
    }

    #[test]
    fn test_write_and_read_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        Config::write_default(path).unwrap();

        let config = Config::from_file(path).unwrap();
        assert_eq!(config.speech.chunk_samples, 8000);
        assert_eq!(config.storage.account, "fatawastorage");
    }

    #[test]
    fn test_custom_config() {
        let toml_content = r#"
[artifacts]
root = "/srv/fatawa/artifacts"

[storage]
backend = "local"
local_root = "/srv/fatawa/store"
upload_container = "uploads"
containers = ["artifacts", "archive"]

[speech]
region = "us-east-1"
session_timeout_seconds = 60
show_speaker_label = false

[translation]
project_id = "test-project"
target_language = "en-GB"
destination_folder = "translations"
access_token_file = "/run/secrets/google-token"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();

        assert_eq!(config.artifacts.root, "/srv/fatawa/artifacts");
        assert_eq!(config.storage.backend, StorageBackendType::Local);
        assert_eq!(config.storage.upload_container, "uploads");
        assert_eq!(config.storage.containers, vec!["artifacts", "archive"]);
        assert_eq!(config.speech.region, "us-east-1");
        assert_eq!(config.speech.session_timeout_seconds, 60);
        assert!(!config.speech.show_speaker_label);
        assert_eq!(config.translation.project_id, "test-project");
        assert_eq!(config.translation.target_language, "en-GB");
        assert_eq!(config.translation.destination_folder, "translations");
        assert_eq!(
            config.translation.access_token_file.as_deref(),
            Some("/run/secrets/google-token")
        );
    }

    #[test]
    fn test_load_or_default_nonexistent() {
        let config = Config::load_or_default("nonexistent_file.toml").unwrap();
        assert_eq!(config.speech.language_code, "ar-SA");
    }

    #[test]
    fn test_partial_config() {
        // 一部の設定のみ記述した場合、残りはデフォルト値が使われる
        let toml_content = r#"
[speech]
chunk_samples = 4000
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();

        assert_eq!(config.speech.chunk_samples, 4000);
        assert_eq!(config.speech.region, "me-central-1");
        assert_eq!(config.storage.backend, StorageBackendType::Azure);
        assert_eq!(config.translation.timeout_seconds, 30);
    }

    #[test]
    fn test_credential_from_env_missing() {
        let result = credential_from_env("FATAWA_PROCESSOR_TEST_UNSET_CREDENTIAL");
        assert!(result.is_err());
    }
}
