use std::{
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt as _;

use crate::{
    foundation::error::{CustomizerError, CustomizerResult},
    storage::gateway::{ObjectEntry, ObjectStore},
};

/// Filesystem-backed object store: each object path maps to a file under `root`.
///
/// Content types are not persisted; modification times come from file metadata.
#[derive(Clone, Debug)]
pub struct LocalObjectStore {
    root: PathBuf,
    base_url: String,
}

impl LocalObjectStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, base_url: impl Into<String>) -> CustomizerResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            CustomizerError::backend_unavailable(format!(
                "create store root '{}': {e}",
                root.display()
            ))
        })?;
        Ok(Self {
            root,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> CustomizerResult<PathBuf> {
        let rel = Path::new(path.trim_matches('/'));
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(CustomizerError::storage(format!(
                "object path '{path}' escapes the store root"
            )));
        }
        Ok(self.root.join(rel))
    }
}

fn io_err(op: &str, path: &Path, e: std::io::Error) -> CustomizerError {
    CustomizerError::storage(format!("{op} '{}': {e}", path.display()))
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, _content_type: &str) -> CustomizerResult<()> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(CustomizerError::storage("empty object path"));
        }
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err("create dir", parent, e))?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .map_err(|e| io_err("write", &full, e))
    }

    async fn put_new(
        &self,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> CustomizerResult<bool> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(CustomizerError::storage("empty object path"));
        }
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_err("create dir", parent, e))?;
        }
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(io_err("create", &full, e)),
        };
        file.write_all(&bytes)
            .await
            .map_err(|e| io_err("write", &full, e))?;
        file.flush().await.map_err(|e| io_err("write", &full, e))?;
        Ok(true)
    }

    async fn list(&self, prefix: &str) -> CustomizerResult<Vec<ObjectEntry>> {
        let dir = self.resolve(prefix)?;
        let mut rd = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err("list", &dir, e)),
        };

        let mut out = Vec::new();
        while let Some(entry) = rd
            .next_entry()
            .await
            .map_err(|e| io_err("list", &dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry
                .metadata()
                .await
                .map_err(|e| io_err("stat", &entry.path(), e))?;
            if meta.is_dir() {
                out.push(ObjectEntry::prefix(name));
            } else {
                let modified = meta.modified().ok().map(DateTime::<Utc>::from);
                out.push(ObjectEntry::object(name, modified));
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn get(&self, path: &str) -> CustomizerResult<Vec<u8>> {
        let full = self.resolve(path)?;
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(CustomizerError::not_found(format!("object '{path}'")))
            }
            Err(e) => Err(io_err("read", &full, e)),
        }
    }

    async fn remove(&self, paths: &[String]) -> CustomizerResult<()> {
        for p in paths {
            let full = self.resolve(p)?;
            match tokio::fs::remove_file(&full).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(io_err("remove", &full, e)),
            }
            // Drop folders left empty by the removal, innermost first.
            for dir in full.ancestors().skip(1).take_while(|d| *d != self.root) {
                match tokio::fs::remove_dir(dir).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) if e.kind() == ErrorKind::DirectoryNotEmpty => break,
                    Err(e) => {
                        tracing::warn!(dir = %dir.display(), error = %e, "could not drop emptied folder");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_matches('/'))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/storage/local.rs"]
mod tests;
