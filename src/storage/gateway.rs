use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::{Rng, distr::Alphanumeric};

use crate::foundation::{
    backend::Backend,
    core::{Shape, validate_product_id, validate_session_id},
    error::{CustomizerError, CustomizerResult},
};

pub const ORIGINAL_FILE_NAME: &str = "original.png";
/// Marker some stores keep in otherwise empty folders; never counted as an asset.
pub const EMPTY_FOLDER_PLACEHOLDER: &str = ".emptyFolderPlaceholder";
/// Milliseconds a shaped name may be pushed forward before giving up on a free slot.
const MAX_SHAPED_NAME_BUMPS: i64 = 1_000;

/// One direct child of a listed prefix.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ObjectEntry {
    pub name: String,
    pub last_modified: Option<DateTime<Utc>>,
    /// `true` for a sub-prefix ("folder") rather than an object.
    pub is_prefix: bool,
}

impl ObjectEntry {
    pub fn object(name: impl Into<String>, last_modified: Option<DateTime<Utc>>) -> Self {
        Self {
            name: name.into(),
            last_modified,
            is_prefix: false,
        }
    }

    pub fn prefix(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_modified: None,
            is_prefix: true,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.name == EMPTY_FOLDER_PLACEHOLDER
    }
}

/// Key/value object store with folder-style listing.
///
/// Paths are `/`-separated with no leading slash. Timeouts and retries belong to the
/// implementation; callers surface the first error.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create or overwrite the object at `path`.
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> CustomizerResult<()>;

    /// Create the object only if `path` is free. Returns `false`, writing nothing, when an
    /// object already exists there. Must be atomic with respect to concurrent creators.
    async fn put_new(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> CustomizerResult<bool>;

    /// Direct children of `prefix`. An unknown prefix lists as empty.
    async fn list(&self, prefix: &str) -> CustomizerResult<Vec<ObjectEntry>>;

    /// Fails with [`CustomizerError::NotFound`] if absent.
    async fn get(&self, path: &str) -> CustomizerResult<Vec<u8>>;

    /// Remove objects; missing paths are ignored.
    async fn remove(&self, paths: &[String]) -> CustomizerResult<()>;

    /// Base public URL of an object, without cache busting.
    fn public_url(&self, path: &str) -> String;
}

/// Folder holding every asset of one upload identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FolderKey {
    /// `<sessionId>-<productId>`
    SessionProduct {
        session_id: String,
        product_id: String,
    },
    /// Bare `<sessionId>` for session-only assets.
    Session { session_id: String },
}

impl FolderKey {
    pub fn session_product(
        session_id: impl Into<String>,
        product_id: impl Into<String>,
    ) -> CustomizerResult<Self> {
        let (session_id, product_id) = (session_id.into(), product_id.into());
        validate_session_id(&session_id)?;
        validate_product_id(&product_id)?;
        Ok(Self::SessionProduct {
            session_id,
            product_id,
        })
    }

    pub fn session(session_id: impl Into<String>) -> CustomizerResult<Self> {
        let session_id = session_id.into();
        validate_session_id(&session_id)?;
        Ok(Self::Session { session_id })
    }

    pub fn session_id(&self) -> &str {
        match self {
            Self::SessionProduct { session_id, .. } | Self::Session { session_id } => session_id,
        }
    }
}

impl fmt::Display for FolderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionProduct {
                session_id,
                product_id,
            } => write!(f, "{session_id}-{product_id}"),
            Self::Session { session_id } => f.write_str(session_id),
        }
    }
}

/// Leading session segment of a folder name: everything before the first `-`.
pub fn session_segment(folder_name: &str) -> &str {
    folder_name
        .split_once('-')
        .map_or(folder_name, |(session, _)| session)
}

/// Classification of a file inside a session folder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoredAsset {
    /// `original.png`, overwritten on every upload.
    Original,
    /// `<shape>_<unixMillis>.png`, append-only.
    Shaped { shape: Shape, millis: i64 },
    Other(String),
}

impl StoredAsset {
    pub fn shaped(shape: Shape, at: DateTime<Utc>) -> Self {
        Self::Shaped {
            shape,
            millis: at.timestamp_millis(),
        }
    }

    pub fn parse(name: &str) -> Self {
        if name == ORIGINAL_FILE_NAME {
            return Self::Original;
        }
        let shaped = name
            .strip_suffix(".png")
            .and_then(|stem| stem.rsplit_once('_'))
            .and_then(|(shape, millis)| {
                let shape = shape.parse::<Shape>().ok()?;
                if millis.is_empty() || !millis.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                Some(Self::Shaped {
                    shape,
                    millis: millis.parse().ok()?,
                })
            });
        shaped.unwrap_or_else(|| Self::Other(name.to_string()))
    }

    pub fn file_name(&self) -> String {
        match self {
            Self::Original => ORIGINAL_FILE_NAME.to_string(),
            Self::Shaped { shape, millis } => format!("{shape}_{millis}.png"),
            Self::Other(name) => name.clone(),
        }
    }
}

/// Paths of the assets a fulfillment consumer needs from one folder.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct SessionAssets {
    pub original: Option<String>,
    pub latest_shaped: Option<String>,
}

/// Folder-aware facade over the object store.
#[derive(Clone, Debug)]
pub struct SessionStore {
    backend: Backend<dyn ObjectStore>,
    root: String,
    token_len: usize,
}

impl SessionStore {
    pub fn new(backend: Backend<dyn ObjectStore>, root_prefix: &str, token_len: usize) -> Self {
        Self {
            backend,
            root: root_prefix.trim_matches('/').to_string(),
            token_len: token_len.max(1),
        }
    }

    pub fn ready(store: Arc<dyn ObjectStore>, root_prefix: &str) -> Self {
        Self::new(Backend::ready(store), root_prefix, 8)
    }

    /// Fail fast with [`CustomizerError::BackendUnavailable`] when the store never came up.
    pub fn ensure_available(&self) -> CustomizerResult<()> {
        self.backend.get().map(|_| ())
    }

    fn store(&self) -> CustomizerResult<&Arc<dyn ObjectStore>> {
        self.backend.get()
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn folder_path(&self, folder_name: &str) -> String {
        format!("{}/{folder_name}", self.root)
    }

    pub fn asset_path(&self, folder: &FolderKey, file_name: &str) -> String {
        format!("{}/{folder}/{file_name}", self.root)
    }

    /// Names of every top-level session folder.
    pub async fn list_folders(&self) -> CustomizerResult<Vec<String>> {
        let entries = self.store()?.list(&self.root).await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.is_prefix)
            .map(|e| e.name)
            .collect())
    }

    /// Every object in a folder, placeholder included.
    pub async fn list_folder_entries(&self, folder_name: &str) -> CustomizerResult<Vec<ObjectEntry>> {
        let entries = self.store()?.list(&self.folder_path(folder_name)).await?;
        Ok(entries.into_iter().filter(|e| !e.is_prefix).collect())
    }

    /// Real assets of a folder (placeholder excluded).
    pub async fn list_assets(&self, folder: &FolderKey) -> CustomizerResult<Vec<ObjectEntry>> {
        let entries = self.list_folder_entries(&folder.to_string()).await?;
        Ok(entries.into_iter().filter(|e| !e.is_placeholder()).collect())
    }

    pub async fn folder_has_assets(&self, folder: &FolderKey) -> CustomizerResult<bool> {
        Ok(!self.list_assets(folder).await?.is_empty())
    }

    /// Replace the folder's `original.png` in place. Returns the stored path.
    pub async fn put_original(
        &self,
        folder: &FolderKey,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> CustomizerResult<String> {
        let path = self.asset_path(folder, ORIGINAL_FILE_NAME);
        self.store()?.put(&path, bytes, content_type).await?;
        Ok(path)
    }

    /// Add a new shaped variant. Never overwrites an existing file: when the
    /// `<shape>_<millis>.png` name is taken, the timestamp moves forward a millisecond
    /// until a free name is found.
    pub async fn put_shaped(
        &self,
        folder: &FolderKey,
        shape: Shape,
        bytes: Vec<u8>,
        at: DateTime<Utc>,
    ) -> CustomizerResult<String> {
        let store = self.store()?;
        let first = at.timestamp_millis();
        for millis in first..first.saturating_add(MAX_SHAPED_NAME_BUMPS) {
            let name = StoredAsset::Shaped { shape, millis }.file_name();
            let path = self.asset_path(folder, &name);
            if store.put_new(&path, bytes.clone(), "image/png").await? {
                return Ok(path);
            }
            tracing::debug!(%path, "shaped name taken");
        }
        Err(CustomizerError::storage(format!(
            "no free {shape} file name in folder '{folder}'"
        )))
    }

    pub async fn put_file(
        &self,
        folder: &FolderKey,
        file_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> CustomizerResult<String> {
        let path = self.asset_path(folder, file_name);
        self.store()?.put(&path, bytes, content_type).await?;
        Ok(path)
    }

    pub async fn get(&self, path: &str) -> CustomizerResult<Vec<u8>> {
        self.store()?.get(path).await
    }

    pub async fn fetch_original(&self, folder: &FolderKey) -> CustomizerResult<Vec<u8>> {
        self.get(&self.asset_path(folder, ORIGINAL_FILE_NAME))
            .await
            .map_err(|e| match e {
                CustomizerError::NotFound(_) => {
                    CustomizerError::not_found(format!("no original in folder '{folder}'"))
                }
                other => other,
            })
    }

    /// Current original and newest shaped variant, by timestamp in the file name.
    pub async fn lookup_assets(&self, folder: &FolderKey) -> CustomizerResult<SessionAssets> {
        let mut original = None;
        let mut latest: Option<(i64, String)> = None;
        for entry in self.list_assets(folder).await? {
            match StoredAsset::parse(&entry.name) {
                StoredAsset::Original => original = Some(self.asset_path(folder, &entry.name)),
                StoredAsset::Shaped { millis, .. } => {
                    let newer = latest
                        .as_ref()
                        .is_none_or(|(m, name)| (millis, &entry.name) > (*m, name));
                    if newer {
                        latest = Some((millis, entry.name));
                    }
                }
                StoredAsset::Other(_) => {}
            }
        }

        if original.is_none() && latest.is_none() {
            return Err(CustomizerError::not_found(format!(
                "no assets in folder '{folder}'"
            )));
        }
        Ok(SessionAssets {
            original,
            latest_shaped: latest.map(|(_, name)| self.asset_path(folder, &name)),
        })
    }

    /// Delete every object of a folder, nested prefixes included. Returns the number of
    /// objects removed.
    pub async fn remove_folder(&self, folder_name: &str) -> CustomizerResult<usize> {
        let store = self.store()?;
        let mut paths = Vec::new();
        let mut pending = vec![self.folder_path(folder_name)];
        while let Some(prefix) = pending.pop() {
            for entry in store.list(&prefix).await? {
                let path = format!("{prefix}/{}", entry.name);
                if entry.is_prefix {
                    pending.push(path);
                } else {
                    paths.push(path);
                }
            }
        }
        if !paths.is_empty() {
            store.remove(&paths).await?;
        }
        Ok(paths.len())
    }

    pub async fn remove_paths(&self, paths: &[String]) -> CustomizerResult<()> {
        if paths.is_empty() {
            return Ok(());
        }
        self.store()?.remove(paths).await
    }

    /// Public URL with a `v=<epochMillis>_<token>` cache-busting parameter.
    pub fn public_url(&self, path: &str) -> CustomizerResult<String> {
        let base = self.store()?.public_url(path);
        let token: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(self.token_len)
            .map(char::from)
            .collect();
        let sep = if base.contains('?') { '&' } else { '?' };
        Ok(format!(
            "{base}{sep}v={}_{token}",
            Utc::now().timestamp_millis()
        ))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/storage/gateway.rs"]
mod tests;
