//! GitHub-Gist-persisted backend: the JSON snapshot layered with a private
//! Gist so the list survives redeploys on hosts with ephemeral disks.
//!
//! Boot order: Gist (token + id) -> create a new Gist (token, no id) ->
//! local file -> empty. Saves write the local file best-effort and PATCH
//! the Gist.

use crate::config::Config;
use crate::http::shared_client;
use crate::models::{Item, ItemStatus, ListFilter};
use crate::store::snapshot::StoreSnapshot;
use crate::store::{StoreError, StoreResult, TodoStore};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

const GIST_API: &str = "https://api.github.com/gists";
const GIST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct GistFile {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GistDetail {
    id: String,
    #[serde(default)]
    files: HashMap<String, GistFile>,
}

pub struct GistStore {
    data: Mutex<StoreSnapshot>,
    data_path: PathBuf,
    token: String,
    gist_id: Mutex<Option<String>>,
    filename: String,
    description: String,
}

impl GistStore {
    /// Load the store, following the boot order documented above.
    pub async fn load(config: &Config) -> StoreResult<Self> {
        let token = config
            .github_token
            .clone()
            .ok_or_else(|| StoreError::new("GITHUB_TOKEN must be set for the gist backend"))?;

        let store = GistStore {
            data: Mutex::new(StoreSnapshot::default()),
            data_path: PathBuf::from(&config.data_path),
            token,
            gist_id: Mutex::new(config.gist_id.clone()),
            filename: config.gist_filename.clone(),
            description: config.gist_description.clone(),
        };

        // 1) Load from the Gist if an id is configured
        let configured_id = store.gist_id.lock().clone();
        if let Some(ref id) = configured_id {
            match store.gist_get(id).await {
                Ok(Some(content)) => match StoreSnapshot::from_json(&content) {
                    Ok(snapshot) => {
                        log::info!("Loaded store from Gist {} ({} items)", id, snapshot.items.len());
                        *store.data.lock() = snapshot;
                        return Ok(store);
                    }
                    Err(e) => log::warn!("Gist content unusable, will try local file: {}", e),
                },
                Ok(None) => log::warn!("Gist {} not found, will try local file", id),
                Err(e) => log::warn!("Gist load failed, will try local file: {}", e),
            }
        }

        // 2) No id configured: create a new private Gist on first boot
        if configured_id.is_none() {
            let initial = store.data.lock().to_json();
            match store.gist_create(&initial).await {
                Ok(id) => {
                    log::warn!("Created new Gist {}. Set GIST_ID to persist across deploys.", id);
                    *store.gist_id.lock() = Some(id);
                }
                Err(e) => log::warn!("Gist create failed, will try local file: {}", e),
            }
        }

        // 3) Local file (ephemeral)
        match std::fs::read_to_string(&store.data_path) {
            Ok(text) => match StoreSnapshot::from_json(&text) {
                Ok(snapshot) => {
                    log::info!(
                        "Loaded store from local file ({} items)",
                        snapshot.items.len()
                    );
                    *store.data.lock() = snapshot;
                }
                Err(e) => log::warn!("Local load failed, starting fresh: {}", e),
            },
            // 4) Empty
            Err(_) => log::info!("Started with empty store"),
        }

        Ok(store)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("User-Agent", "listhub-backend")
            .timeout(GIST_TIMEOUT)
    }

    async fn gist_get(&self, gist_id: &str) -> Result<Option<String>, String> {
        let url = format!("{}/{}", GIST_API, gist_id);
        let response = self
            .request(shared_client().get(&url))
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(format!("Gist API error ({}): {}", status, body));
        }

        let detail: GistDetail =
            serde_json::from_str(&body).map_err(|e| format!("Failed to parse response: {}", e))?;
        Ok(detail.files.get(&self.filename).and_then(|f| f.content.clone()))
    }

    async fn gist_create(&self, content: &str) -> Result<String, String> {
        let payload = serde_json::json!({
            "description": self.description,
            "public": false,
            "files": { &self.filename: { "content": content } }
        });

        let response = self
            .request(shared_client().post(GIST_API))
            .json(&payload)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(format!("Gist API error ({}): {}", status, body));
        }

        let detail: GistDetail =
            serde_json::from_str(&body).map_err(|e| format!("Failed to parse response: {}", e))?;
        Ok(detail.id)
    }

    async fn gist_update(&self, gist_id: &str, content: &str) -> Result<(), String> {
        let url = format!("{}/{}", GIST_API, gist_id);
        let payload = serde_json::json!({
            "files": { &self.filename: { "content": content } }
        });

        let response = self
            .request(shared_client().patch(&url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Gist API error ({}): {}", status, body));
        }
        Ok(())
    }

    /// Persist the snapshot: local file best-effort, Gist failure surfaced
    /// to the caller.
    async fn save(&self) -> StoreResult<()> {
        let json = self.data.lock().to_json();

        let tmp = self.data_path.with_extension("tmp");
        let local = std::fs::write(&tmp, &json)
            .and_then(|_| std::fs::rename(&tmp, &self.data_path));
        if let Err(e) = local {
            log::warn!("Local save failed: {}", e);
        }

        let gist_id = self.gist_id.lock().clone();
        match gist_id {
            Some(id) => self.gist_update(&id, &json).await.map_err(StoreError::from),
            None => {
                log::warn!("No Gist id available, snapshot kept locally only");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl TodoStore for GistStore {
    async fn create(&self, text: &str, added_by: i64) -> StoreResult<Item> {
        let item = self.data.lock().create(text, added_by, Utc::now());
        self.save().await?;
        Ok(item)
    }

    async fn list(&self, filter: &ListFilter) -> StoreResult<Vec<Item>> {
        Ok(self.data.lock().list(filter))
    }

    async fn update_status(&self, id: i64, status: ItemStatus) -> StoreResult<bool> {
        let changed = self.data.lock().update_status(id, status, Utc::now());
        if changed {
            self.save().await?;
        }
        Ok(changed)
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let removed = self.data.lock().delete(id);
        if removed {
            self.save().await?;
        }
        Ok(removed)
    }

    async fn clear(&self) -> StoreResult<usize> {
        let count = self.data.lock().clear();
        if count > 0 {
            self.save().await?;
        }
        Ok(count)
    }

    async fn clear_done(&self) -> StoreResult<usize> {
        let count = self.data.lock().clear_done();
        if count > 0 {
            self.save().await?;
        }
        Ok(count)
    }

    fn backend_name(&self) -> &'static str {
        "gist"
    }
}
