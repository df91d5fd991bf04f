//! Local JSON-file backend. Ephemeral on platforms with transient disks;
//! pair with the Gist backend when the list has to survive redeploys.

use crate::models::{Item, ItemStatus, ListFilter};
use crate::store::snapshot::StoreSnapshot;
use crate::store::{StoreResult, TodoStore};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<StoreSnapshot>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading the existing snapshot when present.
    /// A missing or malformed file starts the store fresh rather than
    /// failing the boot.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let data = match std::fs::read_to_string(&path) {
            Ok(text) => match StoreSnapshot::from_json(&text) {
                Ok(snapshot) => {
                    log::info!(
                        "Loaded store from {} ({} items)",
                        path.display(),
                        snapshot.items.len()
                    );
                    snapshot
                }
                Err(e) => {
                    log::warn!("Local load failed, starting fresh: {}", e);
                    StoreSnapshot::default()
                }
            },
            Err(_) => {
                log::info!("Started with empty store at {}", path.display());
                StoreSnapshot::default()
            }
        };

        JsonFileStore {
            path,
            data: Mutex::new(data),
        }
    }

    /// Atomic write: serialize to a `.tmp` sibling, then rename over the
    /// target so a crash mid-write never leaves a half-written file.
    fn persist(&self, json: &str) -> Result<(), String> {
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| format!("Failed to write {}: {}", tmp.display(), e))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| format!("Failed to replace {}: {}", self.path.display(), e))
    }

    /// Serialize under the lock, persist after releasing it.
    fn save(&self) -> Result<(), String> {
        let json = self.data.lock().to_json();
        self.persist(&json)
    }
}

#[async_trait]
impl TodoStore for JsonFileStore {
    async fn create(&self, text: &str, added_by: i64) -> StoreResult<Item> {
        let item = self.data.lock().create(text, added_by, Utc::now());
        self.save()?;
        Ok(item)
    }

    async fn list(&self, filter: &ListFilter) -> StoreResult<Vec<Item>> {
        Ok(self.data.lock().list(filter))
    }

    async fn update_status(&self, id: i64, status: ItemStatus) -> StoreResult<bool> {
        let changed = self.data.lock().update_status(id, status, Utc::now());
        if changed {
            self.save()?;
        }
        Ok(changed)
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let removed = self.data.lock().delete(id);
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    async fn clear(&self) -> StoreResult<usize> {
        let count = self.data.lock().clear();
        if count > 0 {
            self.save()?;
        }
        Ok(count)
    }

    async fn clear_done(&self) -> StoreResult<usize> {
        let count = self.data.lock().clear_done();
        if count > 0 {
            self.save()?;
        }
        Ok(count)
    }

    fn backend_name(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, JsonFileStore) {
        let dir = TempDir::new().expect("temp dir");
        let store = JsonFileStore::open(dir.path().join("data.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let (_dir, store) = temp_store();
        store.create("buy milk", 1).await.expect("create");
        store.create("call plumber #home", 2).await.expect("create");

        let items = store.list(&ListFilter::default()).await.expect("list");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].text, "buy milk");
        assert_eq!(items[1].tags, vec!["home"]);
    }

    #[tokio::test]
    async fn test_survives_reload() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("data.json");

        {
            let store = JsonFileStore::open(&path);
            store.create("persist me", 1).await.expect("create");
        }

        let reloaded = JsonFileStore::open(&path);
        let items = reloaded.list(&ListFilter::default()).await.expect("list");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "persist me");

        // Ids keep counting after a reload
        let item = reloaded.create("another", 1).await.expect("create");
        assert_eq!(item.id, 2);
    }

    #[tokio::test]
    async fn test_malformed_file_starts_fresh() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{definitely not json").expect("write");

        let store = JsonFileStore::open(&path);
        let items = store.list(&ListFilter::default()).await.expect("list");
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_update_status_and_filters() {
        let (_dir, store) = temp_store();
        let a = store.create("a", 1).await.expect("create");
        store.create("b", 1).await.expect("create");

        assert!(store.update_status(a.id, ItemStatus::Done).await.expect("update"));
        assert!(!store.update_status(999, ItemStatus::Done).await.expect("update"));

        let done = store
            .list(&ListFilter::by_status(ItemStatus::Done))
            .await
            .expect("list");
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, a.id);
    }

    #[tokio::test]
    async fn test_clear_and_clear_done() {
        let (_dir, store) = temp_store();
        let a = store.create("a", 1).await.expect("create");
        store.create("b", 1).await.expect("create");
        store.update_status(a.id, ItemStatus::Done).await.expect("update");

        assert_eq!(store.clear_done().await.expect("clear_done"), 1);
        assert_eq!(store.clear().await.expect("clear"), 1);
        assert!(store.list(&ListFilter::default()).await.expect("list").is_empty());
    }
}
