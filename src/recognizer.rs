use crate::types::RecognitionEvent;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

/// 音声認識エンジンの共通トレイト
///
/// エンジンは自身のバックグラウンドタスクからイベントを送る。
/// 受信側はセッション毎に1つだけで、到着順に処理される。
#[async_trait]
pub trait RecognitionEngine: Send {
    /// 音声ファイルの連続認識を開始
    ///
    /// # Returns
    /// 認識イベントの受信チャンネル
    async fn start_continuous_recognition(
        &mut self,
        audio_path: &Path,
    ) -> Result<mpsc::Receiver<RecognitionEvent>>;

    /// 連続認識を停止し、セッションのリソースを解放
    async fn stop_continuous_recognition(&mut self) -> Result<()>;
}
