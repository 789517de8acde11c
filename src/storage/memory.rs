use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    foundation::error::{CustomizerError, CustomizerResult},
    storage::gateway::{ObjectEntry, ObjectStore},
};

#[derive(Clone, Debug)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
    last_modified: DateTime<Utc>,
}

/// Process-local object store. Folders exist implicitly as path prefixes.
#[derive(Debug)]
pub struct MemoryObjectStore {
    base_url: String,
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new("memory://store")
    }
}

impl MemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: Mutex::new(BTreeMap::new()),
        }
    }

    /// Insert with an explicit modification time.
    pub async fn insert_at(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
        last_modified: DateTime<Utc>,
    ) {
        self.objects.lock().await.insert(
            normalize(path),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
                last_modified,
            },
        );
    }

    pub async fn paths(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }

    pub async fn content_type(&self, path: &str) -> Option<String> {
        self.objects
            .lock()
            .await
            .get(&normalize(path))
            .map(|o| o.content_type.clone())
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> CustomizerResult<()> {
        if normalize(path).is_empty() {
            return Err(CustomizerError::storage("empty object path"));
        }
        self.insert_at(path, bytes, content_type, Utc::now()).await;
        Ok(())
    }

    async fn put_new(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> CustomizerResult<bool> {
        let key = normalize(path);
        if key.is_empty() {
            return Err(CustomizerError::storage("empty object path"));
        }
        let mut objects = self.objects.lock().await;
        if objects.contains_key(&key) {
            return Ok(false);
        }
        objects.insert(
            key,
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
                last_modified: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn list(&self, prefix: &str) -> CustomizerResult<Vec<ObjectEntry>> {
        let prefix = normalize(prefix);
        let lead = if prefix.is_empty() {
            String::new()
        } else {
            format!("{prefix}/")
        };

        let objects = self.objects.lock().await;
        let mut folders = BTreeSet::new();
        let mut out = Vec::new();
        for (path, obj) in objects.range(lead.clone()..) {
            let Some(rest) = path.strip_prefix(&lead) else {
                break;
            };
            match rest.split_once('/') {
                Some((folder, _)) => {
                    folders.insert(folder.to_string());
                }
                None => out.push(ObjectEntry::object(rest, Some(obj.last_modified))),
            }
        }
        out.extend(folders.into_iter().map(ObjectEntry::prefix));
        Ok(out)
    }

    async fn get(&self, path: &str) -> CustomizerResult<Vec<u8>> {
        self.objects
            .lock()
            .await
            .get(&normalize(path))
            .map(|o| o.bytes.clone())
            .ok_or_else(|| CustomizerError::not_found(format!("object '{path}'")))
    }

    async fn remove(&self, paths: &[String]) -> CustomizerResult<()> {
        let mut objects = self.objects.lock().await;
        for p in paths {
            objects.remove(&normalize(p));
        }
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, normalize(path))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/storage/memory.rs"]
mod tests;
