//! 認識セッション
//!
//! 1つの音声ファイルに対する連続認識を状態機械として扱う。
//!
//! ```text
//! Created ──start──▶ Listening ──SessionStopped / EndOfStream──▶ Completed
//!                        │    ──CancelledByUser / タイムアウト──▶ Canceled
//!                        │    ──Error / チャンネル切断──────────▶ Errored
//!                        └─ Recognized / NoMatch: Listening のまま
//! ```
//!
//! イベントはエンジンのバックグラウンドタスクからチャンネル経由で届き、
//! 駆動ループが到着順に1件ずつ適用する。終端状態を書き込むのはこのループだけ。

use crate::recognizer::RecognitionEngine;
use crate::types::{CancellationReason, RecognitionEvent, SessionReport, SessionState};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// 1音声ファイル分の認識セッション
///
/// ファイル毎に作成し、終端状態に達したら破棄する。再利用しない。
pub struct RecognitionSession {
    audio_path: PathBuf,
    transcript_path: PathBuf,
    segments: Vec<String>,
    no_match_count: usize,
    state: SessionState,
    transcript: File,
}

impl RecognitionSession {
    /// セッションを作成（Created）
    ///
    /// 文字起こしの出力先ディレクトリを用意し、空の文字起こしファイルを作成する。
    ///
    /// # Errors
    ///
    /// ディレクトリまたはファイルの作成に失敗した場合にエラーを返す。
    pub async fn create<P: AsRef<Path>, Q: AsRef<Path>>(
        audio_path: P,
        transcript_path: Q,
    ) -> Result<Self> {
        let transcript_path = transcript_path.as_ref().to_path_buf();
        if let Some(parent) = transcript_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("文字起こしディレクトリの作成に失敗: {:?}", parent))?;
        }
        let transcript = File::create(&transcript_path)
            .await
            .with_context(|| format!("文字起こしファイルの作成に失敗: {:?}", transcript_path))?;

        Ok(Self {
            audio_path: audio_path.as_ref().to_path_buf(),
            transcript_path,
            segments: Vec::new(),
            no_match_count: 0,
            state: SessionState::Created,
            transcript,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 到着順の認識済みテキスト
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn transcript_path(&self) -> &Path {
        &self.transcript_path
    }

    /// イベントを1件適用し、適用後の状態を返す
    ///
    /// 終端状態に達した後のイベントは無視する。
    ///
    /// # Errors
    ///
    /// 認識テキストの追記に失敗した場合にエラーを返す。
    pub async fn apply(&mut self, event: RecognitionEvent) -> Result<SessionState> {
        if self.state.is_terminal() {
            log::debug!("終端状態 {:?} 以降のイベントを無視: {:?}", self.state, event);
            return Ok(self.state);
        }

        match event {
            RecognitionEvent::SessionStarted => {
                log::info!("セッション開始: {:?}", self.audio_path);
            }
            RecognitionEvent::Recognized {
                text,
                offset_seconds,
            } => {
                if text.trim().is_empty() {
                    self.record_no_match("empty recognition result");
                } else {
                    log::debug!("認識: [{:.2}s] {}", offset_seconds, text);
                    self.append_segment(text).await?;
                }
            }
            RecognitionEvent::NoMatch { details } => {
                self.record_no_match(&details);
            }
            RecognitionEvent::SessionStopped => {
                log::info!("セッション停止: {:?}", self.audio_path);
                self.state = SessionState::Completed;
            }
            RecognitionEvent::Canceled { reason, details } => {
                self.state = match reason {
                    CancellationReason::EndOfStream => {
                        log::info!("音声の終端に到達: {:?}", self.audio_path);
                        SessionState::Completed
                    }
                    CancellationReason::CancelledByUser => {
                        log::warn!("音声認識がキャンセルされました: {:?}", self.audio_path);
                        SessionState::Canceled
                    }
                    CancellationReason::Error => {
                        log::error!("音声認識がエラーで中断されました: {:?}", self.audio_path);
                        log::error!("エラー詳細: {}", details.as_deref().unwrap_or("(なし)"));
                        SessionState::Errored
                    }
                };
            }
        }

        Ok(self.state)
    }

    fn record_no_match(&mut self, details: &str) {
        self.no_match_count += 1;
        log::warn!("音声を認識できませんでした: {}", details);
    }

    /// 認識テキストを文字起こしファイルに追記
    ///
    /// 後続のイベントが届かなくても、ここまでの結果はファイルに残る。
    async fn append_segment(&mut self, text: String) -> Result<()> {
        let mut chunk = String::with_capacity(text.len() + 1);
        if !self.segments.is_empty() {
            chunk.push(' ');
        }
        chunk.push_str(&text);

        self.transcript
            .write_all(chunk.as_bytes())
            .await
            .with_context(|| format!("文字起こしファイルへの追記に失敗: {:?}", self.transcript_path))?;
        self.transcript.flush().await?;

        self.segments.push(text);
        Ok(())
    }

    /// セッションを終端状態まで駆動する
    ///
    /// 連続認識を開始し、終端状態になるまでイベントを待つ。
    /// `timeout` 内に終端イベントが来なければキャンセル扱いにする。
    /// 終了時は必ずエンジンを停止する。
    pub async fn run(mut self, engine: &mut dyn RecognitionEngine, timeout: Duration) -> SessionReport {
        let started_at = chrono::Utc::now();

        match engine.start_continuous_recognition(&self.audio_path).await {
            Ok(mut events) => {
                self.state = SessionState::Listening;
                let deadline = tokio::time::Instant::now() + timeout;

                while !self.state.is_terminal() {
                    match tokio::time::timeout_at(deadline, events.recv()).await {
                        Ok(Some(event)) => {
                            if let Err(e) = self.apply(event).await {
                                log::error!("セッション処理エラー: {:#}", e);
                                self.state = SessionState::Errored;
                            }
                        }
                        Ok(None) => {
                            log::error!(
                                "終端イベントを受信する前にイベントチャンネルがクローズ: {:?}",
                                self.audio_path
                            );
                            self.state = SessionState::Errored;
                        }
                        Err(_) => {
                            log::warn!(
                                "セッションがタイムアウトしました ({}秒): {:?}",
                                timeout.as_secs(),
                                self.audio_path
                            );
                            self.state = SessionState::Canceled;
                        }
                    }
                }
            }
            Err(e) => {
                log::error!("連続認識の開始に失敗: {:?}: {:#}", self.audio_path, e);
                self.state = SessionState::Errored;
            }
        }

        if let Err(e) = engine.stop_continuous_recognition().await {
            log::error!("連続認識の停止に失敗: {:#}", e);
        }

        log::info!(
            "セッション終了: {:?} → {:?} ({} 区間)",
            self.audio_path,
            self.state,
            self.segments.len()
        );

        SessionReport {
            audio_file: self
                .audio_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            transcript_path: self.transcript_path,
            state: self.state,
            segments: self.segments.len(),
            no_match_count: self.no_match_count,
            started_at: started_at.to_rfc3339(),
            finished_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
