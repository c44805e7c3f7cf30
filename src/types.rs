use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// アーティファクトID
///
/// アップロードされたオブジェクトに割り当てる不透明なトークン。
/// オブジェクト名の語幹とローカルのフォルダ名の両方に使う。
/// パス区切り文字やハイフンを含まない。
///
/// # Examples
///
/// ```
/// # use fatawa_processor::types::Identity;
/// let id = Identity::from_raw("3f2a9c0d5b7e4e1f8a6b2c4d9e0f1a2b");
/// assert_eq!(id.as_str().len(), 32);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 保存先
///
/// (コンテナ, 著者, ID) の組。リモートパス `container/author/identity` に解決される。
/// 著者とIDの組が1つの名前空間になる。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StorageLocation {
    pub container: String,
    pub author: String,
    pub identity: Identity,
}

impl StorageLocation {
    pub fn new(container: impl Into<String>, author: impl Into<String>, identity: Identity) -> Self {
        Self {
            container: container.into(),
            author: author.into(),
            identity,
        }
    }

    /// コンテナ内の名前空間プレフィックス (`author/identity`)
    pub fn namespace(&self) -> String {
        format!("{}/{}", self.author, self.identity)
    }

    /// コンテナ内のオブジェクト名 (`author/identity/filename`)
    pub fn object_name(&self, filename: &str) -> String {
        format!("{}/{}", self.namespace(), filename)
    }

    /// コンテナを含むリモートパス (`container/author/identity/filename`)
    ///
    /// `StorageGateway::get` にそのまま渡せる形式。
    pub fn remote_path(&self, filename: &str) -> String {
        format!("{}/{}", self.container, self.object_name(filename))
    }
}

/// 1ファイル分のアップロード結果
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadStatus {
    /// アップロード成功
    Uploaded,
    /// 既に同名オブジェクトが存在したためスキップ
    Skipped { reason: String },
    /// 失敗（ログ出力済み、後続ファイルは継続）
    Failed { reason: String },
}

/// アップロードバッチ内の1ファイルの結果
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    /// アップロード元のローカルパス
    pub local_path: PathBuf,
    /// コンテナ内のオブジェクト名
    pub object_name: String,
    #[serde(flatten)]
    pub status: UploadStatus,
}

impl UploadOutcome {
    pub fn is_uploaded(&self) -> bool {
        matches!(self.status, UploadStatus::Uploaded)
    }
}

/// `StorageGateway::put` の結果
///
/// 途中で失敗したファイルがあってもバッチ全体は継続するため、
/// ファイル毎の結果をまとめて呼び出し元に返す。
#[derive(Clone, Debug, Serialize)]
pub struct UploadReport {
    pub location: StorageLocation,
    pub outcomes: Vec<UploadOutcome>,
}

impl UploadReport {
    /// 全ファイルがアップロードされたかどうか
    pub fn all_uploaded(&self) -> bool {
        self.outcomes.iter().all(UploadOutcome::is_uploaded)
    }

    pub fn uploaded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_uploaded()).count()
    }
}

/// キャンセル理由
///
/// 音声認識サービスが通知するキャンセルの原因。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    /// 音声の終端に到達した（正常終了）
    EndOfStream,
    /// 利用者側からの停止要求
    CancelledByUser,
    /// サービス側のエラー
    Error,
}

/// 音声認識エンジンから届くイベント
#[derive(Clone, Debug, PartialEq)]
pub enum RecognitionEvent {
    SessionStarted,
    /// 確定した認識区間
    Recognized {
        text: String,
        /// 音声先頭からのオフセット（秒）
        offset_seconds: f64,
    },
    /// 音声が認識できなかった区間
    NoMatch { details: String },
    Canceled {
        reason: CancellationReason,
        details: Option<String>,
    },
    SessionStopped,
}

/// 認識セッションの状態
///
/// ```text
/// Created → Listening → {Completed | Canceled | Errored}
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// 設定済み、未開始
    Created,
    /// 連続認識中
    Listening,
    /// 音声終端まで正常に処理した
    Completed,
    /// 停止要求またはタイムアウトで終了
    Canceled,
    /// エラー原因のキャンセルで終了
    Errored,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Canceled | SessionState::Errored
        )
    }
}

/// 1音声ファイル分の認識セッション結果
///
/// # JSON出力例
///
/// ```json
/// {
///   "audio_file": "lesson-01.wav",
///   "transcript_path": "artifacts/transcriptions/3f2a.../lesson-01.wav.txt",
///   "state": "completed",
///   "segments": 42,
///   "no_match_count": 1,
///   "started_at": "2025-01-02T14:30:15+00:00",
///   "finished_at": "2025-01-02T14:41:02+00:00"
/// }
/// ```
#[derive(Clone, Debug, Serialize)]
pub struct SessionReport {
    pub audio_file: String,
    pub transcript_path: PathBuf,
    pub state: SessionState,
    pub segments: usize,
    pub no_match_count: usize,
    pub started_at: String,
    pub finished_at: String,
}

/// 1ファイル分の翻訳結果
#[derive(Clone, Debug, Serialize)]
pub struct TranslationOutcome {
    pub file: String,
    pub translated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// ブロブ単位の翻訳結果
#[derive(Clone, Debug, Default, Serialize)]
pub struct TranslationReport {
    pub outcomes: Vec<TranslationOutcome>,
}

impl TranslationReport {
    pub fn succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.translated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_location_paths() {
        let location = StorageLocation::new("artifacts", "ruhayli", Identity::from_raw("abc123"));
        assert_eq!(location.namespace(), "ruhayli/abc123");
        assert_eq!(location.object_name("abc123.wav"), "ruhayli/abc123/abc123.wav");
        assert_eq!(
            location.remote_path("abc123.wav"),
            "artifacts/ruhayli/abc123/abc123.wav"
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SessionState::Created.is_terminal());
        assert!(!SessionState::Listening.is_terminal());
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Canceled.is_terminal());
        assert!(SessionState::Errored.is_terminal());
    }

    #[test]
    fn test_upload_report_counts() {
        let location = StorageLocation::new("artifacts", "a", Identity::from_raw("id"));
        let report = UploadReport {
            location,
            outcomes: vec![
                UploadOutcome {
                    local_path: PathBuf::from("a.txt"),
                    object_name: "a/id/a.txt".to_string(),
                    status: UploadStatus::Uploaded,
                },
                UploadOutcome {
                    local_path: PathBuf::from("b.txt"),
                    object_name: "a/id/b.txt".to_string(),
                    status: UploadStatus::Skipped {
                        reason: "exists".to_string(),
                    },
                },
            ],
        };
        assert_eq!(report.uploaded_count(), 1);
        assert!(!report.all_uploaded());
    }

    #[test]
    fn test_upload_outcome_json_serialization() {
        let outcome = UploadOutcome {
            local_path: PathBuf::from("sub/b.txt"),
            object_name: "a/id/sub/b.txt".to_string(),
            status: UploadStatus::Failed {
                reason: "timeout".to_string(),
            },
        };

        let json = serde_json::to_string(&outcome).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["status"], "failed");
        assert_eq!(parsed["reason"], "timeout");
        assert_eq!(parsed["object_name"], "a/id/sub/b.txt");
    }
}
