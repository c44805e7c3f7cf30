//! ストレージゲートウェイ
//!
//! ローカルのファイル/フォルダをリモートのオブジェクトストレージへ
//! `container/author/identity/...` の名前空間で配置し、取得・一覧を行う。
//!
//! リモート側の失敗は [`StorageError`] のカテゴリに分類して値で返す。
//! フォルダのアップロードは1ファイルの失敗で中断せず、
//! ファイル毎の結果を [`UploadReport`] にまとめて返す。

use crate::config::{credential_from_env, StorageBackendType, StorageConfig};
use crate::identity::{IdGenerator, UuidGenerator};
use crate::layout::{ensure_dir, ArtifactLayout};
use crate::types::{Identity, StorageLocation, UploadOutcome, UploadReport, UploadStatus};
use anyhow::Context;
use futures_util::TryStreamExt;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore, PutMode, PutOptions, PutPayload};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// 一覧取得そのものが失敗したときに返す番兵値
pub const LIST_ERROR_SENTINEL: &str = "An error occurred while listing files in blob.";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object already exists: {0}")]
    AlreadyExists(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("malformed request or response: {0}")]
    Malformed(String),
    #[error("storage service error: {0}")]
    Service(String),
    #[error("local path is neither a file nor a directory: {0:?}")]
    InvalidLocalPath(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<object_store::Error> for StorageError {
    fn from(e: object_store::Error) -> Self {
        use object_store::Error as E;
        let detail = e.to_string();
        match &e {
            E::AlreadyExists { .. } => StorageError::AlreadyExists(detail),
            E::NotFound { .. } => StorageError::NotFound(detail),
            E::Unauthenticated { .. } | E::PermissionDenied { .. } => {
                StorageError::Authentication(detail)
            }
            E::InvalidPath { .. }
            | E::NotSupported { .. }
            | E::Precondition { .. }
            | E::UnknownConfigurationKey { .. } => StorageError::Malformed(detail),
            _ => StorageError::Service(detail),
        }
    }
}

/// オブジェクトストレージへのゲートウェイ
///
/// クライアントは呼び出し毎に状態を持たないため、複数の処理から共有してよい。
pub struct StorageGateway {
    upload_container: String,
    containers: HashMap<String, Arc<dyn ObjectStore>>,
    layout: ArtifactLayout,
    ids: Arc<dyn IdGenerator>,
}

impl StorageGateway {
    /// アップロード先コンテナを1つ持つゲートウェイを作成
    pub fn new(
        upload_container: impl Into<String>,
        store: Arc<dyn ObjectStore>,
        layout: ArtifactLayout,
    ) -> Self {
        let upload_container = upload_container.into();
        let mut containers: HashMap<String, Arc<dyn ObjectStore>> = HashMap::new();
        containers.insert(upload_container.clone(), store);
        Self {
            upload_container,
            containers,
            layout,
            ids: Arc::new(UuidGenerator),
        }
    }

    /// 参照用のコンテナを追加
    pub fn with_container(mut self, name: impl Into<String>, store: Arc<dyn ObjectStore>) -> Self {
        self.containers.insert(name.into(), store);
        self
    }

    /// ID生成器を差し替え
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// 設定からゲートウェイを構築
    ///
    /// # Errors
    ///
    /// 認証情報が無い、またはストアの初期化に失敗した場合にエラーを返す。
    /// 起動時の設定エラーとして扱うこと。
    pub fn from_config(config: &StorageConfig, layout: ArtifactLayout) -> anyhow::Result<Self> {
        let mut names = vec![config.upload_container.clone()];
        for name in &config.containers {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }

        let access_key = match config.backend {
            StorageBackendType::Azure => Some(credential_from_env(&config.access_key_env)?),
            _ => None,
        };

        let mut stores = Vec::with_capacity(names.len());
        for name in &names {
            let store: Arc<dyn ObjectStore> = match config.backend {
                StorageBackendType::Azure => Arc::new(
                    MicrosoftAzureBuilder::new()
                        .with_account(&config.account)
                        .with_access_key(access_key.as_deref().unwrap_or_default())
                        .with_container_name(name)
                        .build()
                        .with_context(|| format!("Azure Blob クライアント作成失敗: {}", name))?,
                ),
                StorageBackendType::Local => {
                    let root = Path::new(&config.local_root).join(name);
                    ensure_dir(&root)
                        .with_context(|| format!("ローカルストアの作成に失敗: {:?}", root))?;
                    Arc::new(
                        LocalFileSystem::new_with_prefix(&root)
                            .with_context(|| format!("ローカルストア初期化失敗: {:?}", root))?,
                    )
                }
                StorageBackendType::Memory => Arc::new(InMemory::new()),
            };
            stores.push((name.clone(), store));
        }

        let mut stores = stores.into_iter();
        let (upload_name, upload_store) = stores
            .next()
            .context("アップロード先コンテナが設定されていません")?;
        let mut gateway = Self::new(upload_name, upload_store, layout);
        for (name, store) in stores {
            gateway = gateway.with_container(name, store);
        }

        log::info!(
            "ストレージゲートウェイ: backend={:?}, コンテナ={:?}",
            config.backend,
            names
        );
        Ok(gateway)
    }

    pub fn upload_container(&self) -> &str {
        &self.upload_container
    }

    fn container(&self, name: &str) -> Result<&Arc<dyn ObjectStore>, StorageError> {
        self.containers
            .get(name)
            .ok_or_else(|| StorageError::NotFound(format!("container {}", name)))
    }

    /// ローカルのファイルまたはフォルダをアップロード
    ///
    /// 新しいIDを割り当て、`author/identity` の名前空間に配置する。
    ///
    /// - ファイル: `author/identity/<identity><拡張子>`
    /// - フォルダ: `author/identity/<相対パス>`（全ファイルで同じIDを使う）
    ///
    /// 1ファイルの失敗はログに出して次のファイルへ進む。
    ///
    /// # Errors
    ///
    /// `author` が単純な相対パスでない場合、
    /// `local_path` がファイルでもディレクトリでもない場合、
    /// またはディレクトリの走査自体に失敗した場合にエラーを返す。
    pub async fn put(&self, local_path: &Path, author: &str) -> Result<UploadReport, StorageError> {
        validate_author(author)?;
        let identity = self.ids.generate();
        let location = StorageLocation::new(self.upload_container.clone(), author, identity);
        let store = self.container(&self.upload_container)?;

        let outcomes = if local_path.is_file() {
            let object_name = location.object_name(&single_file_name(local_path, &location.identity));
            vec![upload_file(store.as_ref(), local_path, object_name).await]
        } else if local_path.is_dir() {
            let files = collect_files(local_path)?;
            let mut outcomes = Vec::with_capacity(files.len());
            for file in files {
                let relative = relative_object_path(local_path, &file);
                let object_name = location.object_name(&relative);
                outcomes.push(upload_file(store.as_ref(), &file, object_name).await);
            }
            log::info!(
                "フォルダをアップロード: {:?} → {} ({}/{} 件成功)",
                local_path,
                location.namespace(),
                outcomes.iter().filter(|o| o.is_uploaded()).count(),
                outcomes.len()
            );
            outcomes
        } else {
            log::error!("アップロード対象が見つかりません: {:?}", local_path);
            return Err(StorageError::InvalidLocalPath(local_path.to_path_buf()));
        };

        Ok(UploadReport { location, outcomes })
    }

    /// オブジェクトを1つダウンロード
    ///
    /// `remote_path` は `container/objectName` 形式。
    /// `<artifacts>/<author>/` に、オブジェクトのベース名で保存する。
    ///
    /// # Errors
    ///
    /// 失敗はログに出したうえで分類済みのエラーとして返す。
    /// `author` が絶対パスや `..` を含む場合は `Malformed` になり、何も書き込まない。
    pub async fn get(&self, remote_path: &str, author: &str) -> Result<PathBuf, StorageError> {
        let result = self.fetch_to_local(remote_path, author).await;
        match &result {
            Ok(local_file) => {
                log::debug!("ダウンロード完了: {} → {:?}", remote_path, local_file);
            }
            Err(StorageError::NotFound(detail)) => {
                log::error!("オブジェクトが見つかりません: {}", remote_path);
                log::error!("エラー詳細: {}", detail);
            }
            Err(e) => {
                log::error!("ダウンロード中にエラーが発生: {}", remote_path);
                log::error!("エラー詳細: {}", e);
            }
        }
        result
    }

    async fn fetch_to_local(&self, remote_path: &str, author: &str) -> Result<PathBuf, StorageError> {
        validate_author(author)?;
        let (container, object_name) = split_remote_path(remote_path)?;
        if object_name.is_empty() {
            return Err(StorageError::Malformed(format!(
                "object name missing: {}",
                remote_path
            )));
        }
        let store = self.container(container)?;
        let location = object_path(object_name)?;

        let bytes = store
            .get(&location)
            .await?
            .bytes()
            .await?;

        let local_dir = self.layout.author_dir(author);
        ensure_dir(&local_dir)?;
        let file_name = location.filename().unwrap_or(object_name);
        let local_file = local_dir.join(file_name);
        tokio::fs::write(&local_file, &bytes).await?;
        Ok(local_file)
    }

    /// プレフィックス配下のオブジェクトのファイル名一覧
    ///
    /// `path_prefix` の先頭セグメントがコンテナ、残りがコンテナ内のプレフィックス。
    /// プレフィックスはパスセグメント単位で照合するため、
    /// `a` が `ab/...` に一致することはない。
    /// 一致が無い場合は空の一覧を返す。
    pub async fn list(&self, path_prefix: &str) -> Result<Vec<String>, StorageError> {
        let (container, prefix) = split_remote_path(path_prefix)?;
        let store = self.container(container)?;

        let prefix = object_path(prefix)?;
        let prefix = if prefix.as_ref().is_empty() {
            None
        } else {
            Some(&prefix)
        };

        let objects: Vec<ObjectMeta> = store.list(prefix).try_collect().await?;
        let names = objects
            .iter()
            .map(|meta| {
                log::info!("オブジェクト: {}, サイズ: {} バイト", meta.location, meta.size);
                meta.location.filename().unwrap_or_default().to_string()
            })
            .collect();
        Ok(names)
    }

    /// 一覧取得の失敗を番兵値で返す版
    ///
    /// 失敗時は [`LIST_ERROR_SENTINEL`] だけを含む一覧を返す。
    /// 一致が無いだけなら空の一覧のまま。
    pub async fn list_or_sentinel(&self, path_prefix: &str) -> Vec<String> {
        match self.list(path_prefix).await {
            Ok(names) => names,
            Err(e) => {
                log::error!("一覧取得中にエラーが発生: {}", path_prefix);
                log::error!("エラー詳細: {}", e);
                vec![LIST_ERROR_SENTINEL.to_string()]
            }
        }
    }
}

/// 1ファイルをアップロードし、結果を返す（失敗はログに出すだけ）
async fn upload_file(store: &dyn ObjectStore, local_path: &Path, object_name: String) -> UploadOutcome {
    let status = match try_upload(store, local_path, &object_name).await {
        Ok(()) => {
            log::info!("アップロード完了: {:?} → {}", local_path, object_name);
            UploadStatus::Uploaded
        }
        Err(StorageError::AlreadyExists(detail)) => {
            log::warn!(
                "オブジェクト {} は既に存在します。スキップ: {:?}",
                object_name,
                local_path
            );
            UploadStatus::Skipped { reason: detail }
        }
        Err(e) => {
            log::error!("アップロード中にエラーが発生: {:?}", local_path);
            log::error!("エラー詳細: {}", e);
            UploadStatus::Failed {
                reason: e.to_string(),
            }
        }
    };

    UploadOutcome {
        local_path: local_path.to_path_buf(),
        object_name,
        status,
    }
}

async fn try_upload(store: &dyn ObjectStore, local_path: &Path, object_name: &str) -> Result<(), StorageError> {
    let data = tokio::fs::read(local_path).await?;
    let opts = PutOptions {
        mode: PutMode::Create,
        ..Default::default()
    };
    store
        .put_opts(&object_path(object_name)?, PutPayload::from(data), opts)
        .await?;
    Ok(())
}

/// オブジェクト名をそのままパスにする
///
/// `ObjectPath::from` は非ASCII文字や `#` をパーセントエンコードするため使わない。
/// 空セグメント、`.`/`..`、制御文字を含む名前は不正な要求として扱う。
fn object_path(name: &str) -> Result<ObjectPath, StorageError> {
    ObjectPath::parse(name)
        .map_err(|e| StorageError::Malformed(format!("invalid object name {:?}: {}", name, e)))
}

/// 著者名はダウンロード先のディレクトリ名にもなるため、通常の相対パス要素だけを許す
fn validate_author(author: &str) -> Result<(), StorageError> {
    let mut components = Path::new(author).components().peekable();
    let valid = components.peek().is_some()
        && components.all(|c| matches!(c, Component::Normal(_)));
    if valid {
        Ok(())
    } else {
        Err(StorageError::Malformed(format!("invalid author: {:?}", author)))
    }
}

/// 単一ファイルのオブジェクト名: ID + 元の拡張子
fn single_file_name(local_path: &Path, identity: &Identity) -> String {
    match local_path.extension() {
        Some(ext) => format!("{}.{}", identity, ext.to_string_lossy()),
        None => identity.to_string(),
    }
}

/// `container/rest` を分割する。`rest` は空でもよい。
fn split_remote_path(path: &str) -> Result<(&str, &str), StorageError> {
    let path = path.trim_start_matches('/');
    let (container, rest) = path.split_once('/').unwrap_or((path, ""));
    if container.is_empty() {
        return Err(StorageError::Malformed(format!(
            "container missing: {:?}",
            path
        )));
    }
    Ok((container, rest))
}

/// ディレクトリ配下の全ファイルを走査順（名前順）に集める
fn collect_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    entries.sort();

    let mut files = Vec::new();
    for path in entries {
        if path.is_dir() {
            files.extend(collect_files(&path)?);
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

/// ルートからの相対パスを `/` 区切りのオブジェクト名にする
fn relative_object_path(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
