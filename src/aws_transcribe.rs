use crate::config::SpeechConfig;
use crate::recognizer::RecognitionEngine;
use crate::types::{CancellationReason, RecognitionEvent};
use anyhow::{Context, Result};
use async_stream::stream;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_transcribestreaming::types::error::AudioStreamError;
use aws_sdk_transcribestreaming::types::{
    AudioEvent, AudioStream, LanguageCode, MediaEncoding, TranscriptEvent, TranscriptResultStream,
};
use aws_sdk_transcribestreaming::Client as AwsTranscribeClient;
use aws_smithy_types::Blob;
use std::path::Path;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// デコード済みのモノラルPCM音声
#[derive(Debug, Clone)]
pub struct PcmAudio {
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

/// Amazon Transcribe Streaming API による音声認識エンジン
///
/// WAVファイルをPCMに展開してストリーミング送信し、
/// 確定結果を [`RecognitionEvent`] として通知する。
pub struct AwsTranscribeEngine {
    config: SpeechConfig,
    client: AwsTranscribeClient,
    /// 実行中の認識タスク（停止時に破棄する）
    task_handle: Option<JoinHandle<()>>,
}

impl AwsTranscribeEngine {
    /// 設定されたリージョンでクライアントを作成
    ///
    /// # Errors
    ///
    /// AWS認証情報を解決できない場合にエラーを返す（起動時の設定エラー）。
    /// デフォルトの認証チェーンは遅延評価のため、ここで一度解決しておく。
    pub async fn new(config: SpeechConfig) -> Result<Self> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;
        let provider = sdk_config
            .credentials_provider()
            .context("AWS認証情報プロバイダが設定されていません")?;
        ensure_credentials(&provider).await?;
        let client = AwsTranscribeClient::new(&sdk_config);
        Ok(Self::from_client(config, client))
    }

    pub fn from_client(config: SpeechConfig, client: AwsTranscribeClient) -> Self {
        Self {
            config,
            client,
            task_handle: None,
        }
    }

    fn abort_task(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            if !handle.is_finished() {
                log::debug!("実行中の認識タスクを破棄");
            }
            handle.abort();
        }
    }
}

#[async_trait]
impl RecognitionEngine for AwsTranscribeEngine {
    async fn start_continuous_recognition(
        &mut self,
        audio_path: &Path,
    ) -> Result<mpsc::Receiver<RecognitionEvent>> {
        self.abort_task();

        let path = audio_path.to_path_buf();
        let audio = tokio::task::spawn_blocking(move || read_wav_mono(&path))
            .await
            .context("WAVデコードタスクの実行に失敗")??;

        log::debug!(
            "Amazon Transcribe 送信準備: {:?} ({} サンプル, {} Hz)",
            audio_path,
            audio.samples.len(),
            audio.sample_rate
        );

        let (event_tx, event_rx) = mpsc::channel::<RecognitionEvent>(64);

        let client = self.client.clone();
        let language_code = LanguageCode::from(self.config.language_code.as_str());
        let show_speaker_label = self.config.show_speaker_label;
        let chunk_samples = self.config.chunk_samples.max(1);

        let handle = tokio::spawn(async move {
            let PcmAudio {
                sample_rate,
                samples,
            } = audio;

            let input_stream = stream! {
                for chunk in samples.chunks(chunk_samples) {
                    let blob = Blob::new(pcm_le_bytes(chunk));
                    yield Ok::<AudioStream, AudioStreamError>(
                        AudioStream::AudioEvent(AudioEvent::builder().audio_chunk(blob).build())
                    );
                }
            };

            let _ = event_tx.send(RecognitionEvent::SessionStarted).await;

            let mut resp = match client
                .start_stream_transcription()
                .language_code(language_code)
                .media_sample_rate_hertz(sample_rate as i32)
                .media_encoding(MediaEncoding::Pcm)
                .show_speaker_label(show_speaker_label)
                .audio_stream(input_stream.into())
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    log::error!("Amazon Transcribe API開始失敗: {:?}", e);
                    let _ = event_tx
                        .send(RecognitionEvent::Canceled {
                            reason: CancellationReason::Error,
                            details: Some(format!("{:?}", e)),
                        })
                        .await;
                    return;
                }
            };

            loop {
                match resp.transcript_result_stream.recv().await {
                    Ok(Some(TranscriptResultStream::TranscriptEvent(transcript_event))) => {
                        for event in transcript_events(transcript_event) {
                            if event_tx.send(event).await.is_err() {
                                log::debug!("AwsTranscribeEngine: 受信側がクローズ");
                                return;
                            }
                        }
                    }
                    Ok(Some(other)) => {
                        log::debug!("Amazon Transcribe イベント: {:?}", other);
                    }
                    Ok(None) => {
                        let _ = event_tx.send(RecognitionEvent::SessionStopped).await;
                        break;
                    }
                    Err(e) => {
                        log::error!("Amazon Transcribe ストリームエラー: {:?}", e);
                        let _ = event_tx
                            .send(RecognitionEvent::Canceled {
                                reason: CancellationReason::Error,
                                details: Some(format!("{:?}", e)),
                            })
                            .await;
                        break;
                    }
                }
            }
        });

        self.task_handle = Some(handle);
        Ok(event_rx)
    }

    async fn stop_continuous_recognition(&mut self) -> Result<()> {
        self.abort_task();
        Ok(())
    }
}

impl Drop for AwsTranscribeEngine {
    fn drop(&mut self) {
        self.abort_task();
    }
}

/// 認証情報を1回解決し、取得できることを確認する
async fn ensure_credentials(provider: &impl ProvideCredentials) -> Result<()> {
    provider
        .provide_credentials()
        .await
        .context("AWS認証情報が見つかりません")?;
    log::debug!("AWS認証情報を確認しました");
    Ok(())
}

/// 文字起こしイベントを認識イベントに変換
///
/// 部分結果は捨て、確定結果のみを扱う。
/// 確定結果が空の場合は認識できなかった区間として扱う。
fn transcript_events(event: TranscriptEvent) -> Vec<RecognitionEvent> {
    let mut events = Vec::new();
    let Some(transcript) = event.transcript else {
        return events;
    };

    for result in transcript.results.unwrap_or_default() {
        if result.is_partial {
            continue;
        }
        let text = result
            .alternatives
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|alt| alt.transcript)
            .unwrap_or_default();

        if text.trim().is_empty() {
            events.push(RecognitionEvent::NoMatch {
                details: format!(
                    "empty result {} at {:.2}s",
                    result.result_id.unwrap_or_default(),
                    result.start_time
                ),
            });
        } else {
            events.push(RecognitionEvent::Recognized {
                text,
                offset_seconds: result.start_time,
            });
        }
    }
    events
}

/// WAVファイルを読み込み、16bitモノラルPCMに変換
///
/// 複数チャンネルの場合は平均してダウンミックスする。
pub fn read_wav_mono(path: &Path) -> Result<PcmAudio> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("WAVファイルのオープンに失敗: {:?}", path))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample as i32;
            reader
                .samples::<i32>()
                .map(|s| {
                    s.map(|v| {
                        if bits > 16 {
                            (v >> (bits - 16)) as i16
                        } else {
                            (v << (16 - bits)) as i16
                        }
                    })
                })
                .collect::<std::result::Result<_, _>>()
                .with_context(|| format!("WAVサンプルの読み込みに失敗: {:?}", path))?
        }
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect::<std::result::Result<_, _>>()
            .with_context(|| format!("WAVサンプルの読み込みに失敗: {:?}", path))?,
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / frame.len() as i32) as i16
            })
            .collect()
    };

    Ok(PcmAudio {
        sample_rate: spec.sample_rate,
        samples,
    })
}

/// PCMサンプルをリトルエンディアンのバイト列に変換
fn pcm_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_credential_types::provider::error::CredentialsError;
    use aws_credential_types::provider::future;
    use aws_credential_types::Credentials;
    use aws_sdk_transcribestreaming::types::{Alternative, Result as AwsResult, Transcript};
    use tempfile::TempDir;

    fn write_wav(path: &Path, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    /// 認証情報を持たないプロバイダ
    #[derive(Debug)]
    struct NoCredentials;

    impl ProvideCredentials for NoCredentials {
        fn provide_credentials<'a>(&'a self) -> future::ProvideCredentials<'a>
        where
            Self: 'a,
        {
            future::ProvideCredentials::ready(Err(CredentialsError::not_loaded(
                "no providers in chain provided credentials",
            )))
        }
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_at_startup() {
        let result = ensure_credentials(&NoCredentials).await;
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("AWS認証情報が見つかりません"));
    }

    #[tokio::test]
    async fn test_resolved_credentials_pass() {
        let credentials = Credentials::new("AKIDEXAMPLE", "secret", None, None, "test");
        assert!(ensure_credentials(&credentials).await.is_ok());
    }

    #[test]
    fn test_read_wav_mono() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("mono.wav");
        write_wav(&path, 1, &[1, -2, 300, -400]);

        let audio = read_wav_mono(&path).unwrap();
        assert_eq!(audio.sample_rate, 16000);
        assert_eq!(audio.samples, vec![1, -2, 300, -400]);
    }

    #[test]
    fn test_read_wav_downmixes_stereo() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("stereo.wav");
        write_wav(&path, 2, &[100, 300, -100, -300, 0, 10]);

        let audio = read_wav_mono(&path).unwrap();
        assert_eq!(audio.samples, vec![200, -200, 5]);
    }

    #[test]
    fn test_read_wav_missing_file() {
        assert!(read_wav_mono(Path::new("/nonexistent/audio.wav")).is_err());
    }

    #[test]
    fn test_pcm_le_bytes() {
        assert_eq!(pcm_le_bytes(&[1, -1, 256]), vec![0x01, 0x00, 0xff, 0xff, 0x00, 0x01]);
    }

    #[test]
    fn test_transcript_events_skip_partial_results() {
        let event = TranscriptEvent::builder()
            .transcript(
                Transcript::builder()
                    .results(
                        AwsResult::builder()
                            .is_partial(true)
                            .alternatives(Alternative::builder().transcript("بسم").build())
                            .build(),
                    )
                    .results(
                        AwsResult::builder()
                            .is_partial(false)
                            .start_time(1.5)
                            .alternatives(Alternative::builder().transcript("بسم الله").build())
                            .build(),
                    )
                    .results(
                        AwsResult::builder()
                            .is_partial(false)
                            .result_id("r3")
                            .alternatives(Alternative::builder().transcript("  ").build())
                            .build(),
                    )
                    .build(),
            )
            .build();

        let events = transcript_events(event);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            RecognitionEvent::Recognized {
                text: "بسم الله".to_string(),
                offset_seconds: 1.5,
            }
        );
        assert!(matches!(events[1], RecognitionEvent::NoMatch { .. }));
    }

    #[test]
    fn test_transcript_events_without_transcript() {
        let event = TranscriptEvent::builder().build();
        assert!(transcript_events(event).is_empty());
    }
}
