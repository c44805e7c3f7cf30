use anyhow::{Context, Result};
use env_logger::Env;
use fatawa_processor::aws_transcribe::AwsTranscribeEngine;
use fatawa_processor::config::Config;
use fatawa_processor::google_translate::GoogleTranslator;
use fatawa_processor::layout::ArtifactLayout;
use fatawa_processor::storage::StorageGateway;
use fatawa_processor::transcriber::Transcriber;
use fatawa_processor::translator::TranslationForwarder;
use fatawa_processor::types::Identity;
use std::path::Path;
use std::sync::Arc;

const USAGE: &str = "\
使い方: fatawa-processor [--config <path>] <command> [args]

  --generate-config [path]          デフォルト設定ファイルを生成
  upload <local_path> <author>      ファイル/フォルダをアップロード
  download <container/object> <author>
                                    オブジェクトをダウンロード
  list <container/prefix>           ファイル名を一覧表示
  transcribe <blob>                 ブロブ内の音声を文字起こし
  translate <blob>                  ブロブの文字起こしを翻訳";

#[tokio::main]
async fn main() -> Result<()> {
    // ロガーを初期化
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .filter_module("aws_smithy_runtime", log::LevelFilter::Warn)
        .filter_module("aws_config", log::LevelFilter::Warn)
        .filter_module("hyper", log::LevelFilter::Warn)
        .init();

    // コマンドライン引数をパース
    let mut args: Vec<String> = std::env::args().skip(1).collect();

    // 設定ファイル生成モード
    if args.first().map(String::as_str) == Some("--generate-config") {
        let config_path = args.get(1).map(String::as_str).unwrap_or("config.toml");
        Config::write_default(config_path)?;
        println!("設定ファイルを生成しました: {}", config_path);
        return Ok(());
    }

    let mut config_path = "config.toml".to_string();
    if args.first().map(String::as_str) == Some("--config") {
        if args.len() < 2 {
            anyhow::bail!("--config にはパスが必要です\n\n{}", USAGE);
        }
        config_path = args.remove(1);
        args.remove(0);
    }

    let config = Config::load_or_default(&config_path)?;
    log::debug!("設定: {:?}", config);

    let layout = ArtifactLayout::new(&config.artifacts.root);
    let command: Vec<&str> = args.iter().map(String::as_str).collect();

    match command.as_slice() {
        ["upload", local_path, author] => {
            let gateway = StorageGateway::from_config(&config.storage, layout)?;
            match gateway.put(Path::new(local_path), author).await {
                Ok(report) => println!("{}", serde_json::to_string(&report)?),
                Err(e) => {
                    log::error!("アップロードに失敗: {}", e);
                    println!("false");
                }
            }
        }
        ["download", remote_path, author] => {
            let gateway = StorageGateway::from_config(&config.storage, layout)?;
            match gateway.get(remote_path, author).await {
                Ok(local_file) => println!("{}", serde_json::to_string(&local_file)?),
                Err(_) => println!("false"),
            }
        }
        ["list", path_prefix] => {
            let gateway = StorageGateway::from_config(&config.storage, layout)?;
            let files = gateway.list_or_sentinel(path_prefix).await;
            println!("{}", serde_json::json!({ "files": files }));
        }
        ["transcribe", blob] => {
            let engine = AwsTranscribeEngine::new(config.speech.clone())
                .await
                .context("音声認識エンジンの初期化に失敗")?;
            let mut transcriber = Transcriber::new(Box::new(engine), layout, &config.speech);
            let blob = Identity::from_raw(*blob);
            match transcriber.transcribe(&blob).await {
                Ok(reports) => {
                    for report in reports {
                        println!("{}", serde_json::to_string(&report)?);
                    }
                }
                Err(e) => {
                    log::error!("ブロブ {} の文字起こしに失敗: {:#}", blob, e);
                    println!("false");
                }
            }
        }
        ["translate", blob] => {
            let translator = GoogleTranslator::from_config(&config.translation)
                .await
                .context("翻訳クライアントの初期化に失敗")?;
            let forwarder = TranslationForwarder::new(Arc::new(translator), layout, &config.translation);
            let succeeded = forwarder.translate(&Identity::from_raw(*blob)).await;
            println!("{}", succeeded);
        }
        _ => {
            eprintln!("{}", USAGE);
            anyhow::bail!("不明なコマンドです: {:?}", args);
        }
    }

    Ok(())
}
