//! fatawa-processor - ファトワ音声アーカイブ処理
//!
//! アップロードされた音声をオブジェクトストレージに配置し、
//! Amazon Transcribe によるストリーミング認識で文字起こしを行い、
//! 機械翻訳に回すパイプラインを提供します。
//!
//! # 主な機能
//!
//! - **ストレージゲートウェイ**: `container/author/identity/...` への配置・取得・一覧
//! - **認識セッション**: 1音声ファイル毎の連続認識を状態機械で駆動
//! - **文字起こし**: ブロブ内の音声ファイルを順番に処理
//! - **翻訳フォワーダ**: 文字起こしファイルを1件ずつ翻訳
//!
//! # アーキテクチャ
//!
//! ```text
//! [Local file/folder] → [StorageGateway] → [Object Store]
//!
//! [artifacts/<src>/<blob>/*.wav] → [Transcriber] → [RecognitionSession (×N, 逐次)]
//!                                                         ↓
//!                                          [artifacts/<dst>/<blob>/*.wav.txt]
//!                                                         ↓
//!                                               [TranslationForwarder]
//!                                                         ↓
//!                                      [artifacts/<translation>/<blob>/*.wav.txt]
//! ```
//!
//! # 使用例
//!
//! ```no_run
//! use fatawa_processor::config::Config;
//!
//! // 設定ファイルを読み込み
//! let config = Config::load_or_default("config.toml").unwrap();
//!
//! // またはデフォルト設定を生成
//! Config::write_default("config.toml").unwrap();
//! ```

pub mod aws_transcribe;
pub mod config;
pub mod google_translate;
pub mod identity;
pub mod layout;
pub mod recognizer;
pub mod session;
pub mod storage;
pub mod transcriber;
pub mod translator;
pub mod types;
