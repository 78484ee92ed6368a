//! File-backed item store.
//!
//! Items are stored as JSON documents named by their ID, sharded by the
//! first two characters of the ID:
//! ```text
//! {base_path}/
//! ├── 3f/
//! │   └── 3f2a8c1e-5d4b-4a7e-9c61-0b8e2f4d7a10.json
//! └── ...
//! ```
//! A URL index is rebuilt from disk when the store is opened.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::store::ItemStore;
use super::types::{Item, ItemId};
use crate::{NewsdeskError, Result};

const ITEM_EXTENSION: &str = "json";

/// Item store writing one JSON file per item.
#[derive(Debug)]
pub struct FileItemStore {
    base_path: PathBuf,
    /// URL → item ID for every stored item.
    index: Mutex<HashMap<String, ItemId>>,
}

impl FileItemStore {
    /// Open the store, creating the base directory and loading the URL index.
    pub async fn open(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path).await?;

        let mut index = HashMap::new();
        for item in read_all(&base_path).await? {
            index.entry(item.url).or_insert(item.id);
        }
        info!(
            "Opened item store at {:?} ({} items)",
            base_path,
            index.len()
        );

        Ok(Self {
            base_path,
            index: Mutex::new(index),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Number of stored items.
    pub async fn len(&self) -> usize {
        self.index.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Load one item by ID.
    pub async fn get(&self, id: ItemId) -> Result<Item> {
        let path = self.item_path(&id);
        match fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(NewsdeskError::NotFound(format!("item {id}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Path of the document for an item ID: {base_path}/{shard}/{id}.json
    pub fn item_path(&self, id: &ItemId) -> PathBuf {
        let name = id.to_string();
        let shard = &name[..2];
        self.base_path
            .join(shard)
            .join(format!("{name}.{ITEM_EXTENSION}"))
    }
}

#[async_trait]
impl ItemStore for FileItemStore {
    async fn exists(&self, url: &str) -> Result<bool> {
        Ok(self.index.lock().await.contains_key(url))
    }

    async fn add(&self, item: &Item) -> Result<()> {
        // The index lock is held across the write so check-and-insert is atomic.
        let mut index = self.index.lock().await;
        if index.contains_key(&item.url) {
            return Err(NewsdeskError::DuplicateItem(item.url.clone()));
        }

        let path = self.item_path(&item.id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp_path = path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(item)?;
        fs::write(&tmp_path, &bytes).await?;
        fs::rename(&tmp_path, &path).await?;

        index.insert(item.url.clone(), item.id);
        debug!("Stored item {} ({})", item.id, item.url);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Item>> {
        read_all(&self.base_path).await
    }
}

/// Read every item document under the base path.
///
/// Unreadable documents are logged and skipped.
async fn read_all(base_path: &Path) -> Result<Vec<Item>> {
    let mut items = Vec::new();
    let mut shards = fs::read_dir(base_path).await?;

    while let Some(shard) = shards.next_entry().await? {
        if !shard.file_type().await?.is_dir() {
            continue;
        }
        let mut entries = fs::read_dir(shard.path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ITEM_EXTENSION) {
                continue;
            }
            let parsed = fs::read(&path)
                .await
                .map_err(NewsdeskError::from)
                .and_then(|bytes| serde_json::from_slice::<Item>(&bytes).map_err(Into::into));
            match parsed {
                Ok(item) => items.push(item),
                Err(e) => warn!("Skipping unreadable item document {:?}: {}", path, e),
            }
        }
    }

    items.sort_by(|a, b| a.discovered_at.cmp(&b.discovered_at));
    Ok(items)
}
