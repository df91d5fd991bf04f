//! Upstash Redis backend over the REST interface.
//!
//! Key layout (prefix `todo:`):
//!   - `todo:next_id`              INCR counter for item ids
//!   - `todo:item:{id}`            item serialized as JSON
//!   - `todo:idx:recent`           sorted set, score = updated-at epoch secs
//!   - `todo:idx:status:{status}`  set of ids per status
//!   - `todo:idx:tag:{tag}`       set of ids per tag
//!
//! Every mutation sends the item write and all of its index updates as one
//! `/multi-exec` transaction, so a crash between commands cannot leave the
//! indexes disagreeing with the primary record. Reads batch item fetches
//! through `/pipeline`.

use crate::http::shared_client;
use crate::models::{Item, ItemStatus, ListFilter};
use crate::store::{StoreError, StoreResult, TodoStore};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::time::Duration;

const REDIS_TIMEOUT: Duration = Duration::from_secs(10);

const ALL_STATUSES: [ItemStatus; 3] = [ItemStatus::Todo, ItemStatus::Doing, ItemStatus::Done];

fn key_next_id() -> String {
    "todo:next_id".to_string()
}

fn key_item(id: i64) -> String {
    format!("todo:item:{}", id)
}

fn key_recent() -> String {
    "todo:idx:recent".to_string()
}

fn key_status(status: ItemStatus) -> String {
    format!("todo:idx:status:{}", status.as_str())
}

fn key_tag(tag: &str) -> String {
    format!("todo:idx:tag:{}", tag)
}

fn item_json(item: &Item) -> String {
    serde_json::to_string(item).unwrap_or_else(|_| "{}".to_string())
}

/// Commands that write a freshly created item and all of its index entries.
fn create_commands(item: &Item) -> Vec<Vec<String>> {
    let id = item.id.to_string();
    let score = item.updated_at().timestamp().to_string();

    let mut commands = vec![
        vec!["SET".to_string(), key_item(item.id), item_json(item)],
        vec!["ZADD".to_string(), key_recent(), score, id.clone()],
        vec!["SADD".to_string(), key_status(item.status), id.clone()],
    ];
    for tag in &item.tags {
        commands.push(vec!["SADD".to_string(), key_tag(tag), id.clone()]);
    }
    commands
}

/// Commands that persist a status change on `item` (already carrying the
/// new status and a bumped update time).
fn status_change_commands(item: &Item, old_status: ItemStatus) -> Vec<Vec<String>> {
    let id = item.id.to_string();
    let score = item.updated_at().timestamp().to_string();

    let mut commands = vec![vec!["SET".to_string(), key_item(item.id), item_json(item)]];
    if old_status != item.status {
        commands.push(vec!["SREM".to_string(), key_status(old_status), id.clone()]);
        commands.push(vec!["SADD".to_string(), key_status(item.status), id.clone()]);
    }
    commands.push(vec!["ZADD".to_string(), key_recent(), score, id]);
    commands
}

/// Commands that remove an item and every index entry pointing at it.
fn delete_commands(item: &Item) -> Vec<Vec<String>> {
    let id = item.id.to_string();
    let mut commands = vec![
        vec!["DEL".to_string(), key_item(item.id)],
        vec!["SREM".to_string(), key_status(item.status), id.clone()],
        vec!["ZREM".to_string(), key_recent(), id.clone()],
    ];
    for tag in &item.tags {
        commands.push(vec!["SREM".to_string(), key_tag(tag), id.clone()]);
    }
    commands
}

/// Parse an id list out of a ZRANGE/SMEMBERS result. Upstash returns set
/// members as strings; anything unparsable is skipped.
fn parse_id_list(result: &Value) -> Vec<i64> {
    result
        .as_array()
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_str().and_then(|s| s.parse().ok()))
                .collect()
        })
        .unwrap_or_default()
}

pub struct RedisStore {
    base_url: String,
    token: String,
}

impl RedisStore {
    pub fn new(base_url: &str, token: &str) -> Self {
        RedisStore {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    async fn post(&self, path: &str, body: &Value) -> StoreResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = shared_client()
            .post(&url)
            .bearer_auth(&self.token)
            .timeout(REDIS_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(|e| StoreError::new(format!("Redis request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(StoreError::with_status(
                format!("Redis REST error: {}", body),
                status.as_u16(),
            ));
        }

        serde_json::from_str(&body)
            .map_err(|e| StoreError::new(format!("Failed to parse Redis response: {}", e)))
    }

    /// Run a single command, returning its `result` field.
    async fn command(&self, command: Vec<String>) -> StoreResult<Value> {
        let body = serde_json::to_value(&command)
            .map_err(|e| StoreError::new(format!("Failed to encode command: {}", e)))?;
        let reply = self.post("", &body).await?;

        if let Some(error) = reply.get("error").and_then(|e| e.as_str()) {
            return Err(StoreError::new(format!("Redis error: {}", error)));
        }
        Ok(reply.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Run a batch of reads through `/pipeline`; results come back in order.
    async fn pipeline(&self, commands: &[Vec<String>]) -> StoreResult<Vec<Value>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::to_value(commands)
            .map_err(|e| StoreError::new(format!("Failed to encode pipeline: {}", e)))?;
        let reply = self.post("/pipeline", &body).await?;

        let entries = reply
            .as_array()
            .ok_or_else(|| StoreError::new("Unexpected pipeline response shape"))?;

        let mut results = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(error) = entry.get("error").and_then(|e| e.as_str()) {
                return Err(StoreError::new(format!("Redis error: {}", error)));
            }
            results.push(entry.get("result").cloned().unwrap_or(Value::Null));
        }
        Ok(results)
    }

    /// Run a batch of writes atomically through `/multi-exec`.
    async fn transaction(&self, commands: &[Vec<String>]) -> StoreResult<()> {
        if commands.is_empty() {
            return Ok(());
        }
        let body = serde_json::to_value(commands)
            .map_err(|e| StoreError::new(format!("Failed to encode transaction: {}", e)))?;
        let reply = self.post("/multi-exec", &body).await?;

        if let Some(error) = reply.get("error").and_then(|e| e.as_str()) {
            return Err(StoreError::new(format!("Redis transaction error: {}", error)));
        }
        Ok(())
    }

    async fn load_item(&self, id: i64) -> StoreResult<Option<Item>> {
        let result = self
            .command(vec!["GET".to_string(), key_item(id)])
            .await?;
        match result.as_str() {
            Some(json) => serde_json::from_str(json)
                .map(Some)
                .map_err(|e| StoreError::new(format!("Malformed stored item {}: {}", id, e))),
            None => Ok(None),
        }
    }

    /// Fetch items by id in the given order. Ids whose records are missing
    /// or unparsable are skipped; the indexes are treated as advisory.
    async fn fetch_items(&self, ids: &[i64]) -> StoreResult<Vec<Item>> {
        let gets: Vec<Vec<String>> = ids
            .iter()
            .map(|id| vec!["GET".to_string(), key_item(*id)])
            .collect();
        let results = self.pipeline(&gets).await?;

        let items = results
            .iter()
            .filter_map(|r| r.as_str())
            .filter_map(|json| match serde_json::from_str::<Item>(json) {
                Ok(item) => Some(item),
                Err(e) => {
                    log::warn!("Skipping malformed stored item: {}", e);
                    None
                }
            })
            .collect();
        Ok(items)
    }

    async fn ids_for_filter(&self, filter: &ListFilter) -> StoreResult<Vec<i64>> {
        let command = match (&filter.status, &filter.tag) {
            (Some(status), Some(tag)) => vec![
                "SINTER".to_string(),
                key_status(*status),
                key_tag(tag),
            ],
            (Some(status), None) => vec!["SMEMBERS".to_string(), key_status(*status)],
            (None, Some(tag)) => vec!["SMEMBERS".to_string(), key_tag(tag)],
            (None, None) => vec![
                "ZRANGE".to_string(),
                key_recent(),
                "0".to_string(),
                "-1".to_string(),
                "REV".to_string(),
            ],
        };
        Ok(parse_id_list(&self.command(command).await?))
    }
}

#[async_trait]
impl TodoStore for RedisStore {
    async fn create(&self, text: &str, added_by: i64) -> StoreResult<Item> {
        let id = self
            .command(vec!["INCR".to_string(), key_next_id()])
            .await?
            .as_i64()
            .ok_or_else(|| StoreError::new("INCR returned a non-integer id"))?;

        let item = Item::new(id, text, added_by, Utc::now());
        self.transaction(&create_commands(&item)).await?;
        Ok(item)
    }

    async fn list(&self, filter: &ListFilter) -> StoreResult<Vec<Item>> {
        let ids = self.ids_for_filter(filter).await?;
        let mut items = self.fetch_items(&ids).await?;

        // The recency index already comes back newest-first; set-based
        // filters need the sort applied client-side.
        if !filter.is_empty() {
            items.sort_by_key(|item| std::cmp::Reverse(item.updated_at()));
        }
        Ok(items)
    }

    async fn update_status(&self, id: i64, status: ItemStatus) -> StoreResult<bool> {
        let mut item = match self.load_item(id).await? {
            Some(item) => item,
            None => return Ok(false),
        };

        let old_status = item.status;
        item.status = status;
        item.touch(Utc::now());

        self.transaction(&status_change_commands(&item, old_status))
            .await?;
        Ok(true)
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let item = match self.load_item(id).await? {
            Some(item) => item,
            None => return Ok(false),
        };

        self.transaction(&delete_commands(&item)).await?;
        Ok(true)
    }

    async fn clear(&self) -> StoreResult<usize> {
        let ids = self.ids_for_filter(&ListFilter::default()).await?;
        let items = self.fetch_items(&ids).await?;

        let mut commands: Vec<Vec<String>> = ids
            .iter()
            .map(|id| vec!["DEL".to_string(), key_item(*id)])
            .collect();
        commands.push(vec!["DEL".to_string(), key_recent()]);
        for status in ALL_STATUSES {
            commands.push(vec!["DEL".to_string(), key_status(status)]);
        }
        let mut tags: Vec<String> = items.iter().flat_map(|i| i.tags.clone()).collect();
        tags.sort();
        tags.dedup();
        for tag in tags {
            commands.push(vec!["DEL".to_string(), key_tag(&tag)]);
        }

        self.transaction(&commands).await?;
        Ok(ids.len())
    }

    async fn clear_done(&self) -> StoreResult<usize> {
        let ids = self
            .ids_for_filter(&ListFilter::by_status(ItemStatus::Done))
            .await?;
        let items = self.fetch_items(&ids).await?;

        let commands: Vec<Vec<String>> = items.iter().flat_map(delete_commands).collect();
        self.transaction(&commands).await?;
        Ok(items.len())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_item() -> Item {
        let now = Utc.with_ymd_and_hms(2026, 8, 7, 12, 0, 0).unwrap();
        Item::new(5, "buy milk #groceries #errands", 42, now)
    }

    #[test]
    fn test_keys() {
        assert_eq!(key_item(5), "todo:item:5");
        assert_eq!(key_status(ItemStatus::Done), "todo:idx:status:done");
        assert_eq!(key_tag("groceries"), "todo:idx:tag:groceries");
    }

    #[test]
    fn test_create_commands_cover_all_indexes() {
        let item = sample_item();
        let commands = create_commands(&item);

        assert_eq!(commands[0][0], "SET");
        assert_eq!(commands[0][1], "todo:item:5");
        let score = item.updated_at().timestamp().to_string();
        assert_eq!(commands[1], vec!["ZADD", "todo:idx:recent", score.as_str(), "5"]);
        assert_eq!(commands[2], vec!["SADD", "todo:idx:status:todo", "5"]);
        assert_eq!(commands[3], vec!["SADD", "todo:idx:tag:groceries", "5"]);
        assert_eq!(commands[4], vec!["SADD", "todo:idx:tag:errands", "5"]);
    }

    #[test]
    fn test_status_change_moves_set_membership() {
        let mut item = sample_item();
        item.status = ItemStatus::Done;
        let commands = status_change_commands(&item, ItemStatus::Todo);

        assert_eq!(commands[1], vec!["SREM", "todo:idx:status:todo", "5"]);
        assert_eq!(commands[2], vec!["SADD", "todo:idx:status:done", "5"]);

        // Same-status update rewrites the record and recency score only
        let commands = status_change_commands(&item, ItemStatus::Done);
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0][0], "SET");
        assert_eq!(commands[1][0], "ZADD");
    }

    #[test]
    fn test_delete_commands_unindex_everything() {
        let item = sample_item();
        let commands = delete_commands(&item);

        assert_eq!(commands[0], vec!["DEL", "todo:item:5"]);
        assert_eq!(commands[1], vec!["SREM", "todo:idx:status:todo", "5"]);
        assert_eq!(commands[2], vec!["ZREM", "todo:idx:recent", "5"]);
        assert!(commands.contains(&vec![
            "SREM".to_string(),
            "todo:idx:tag:groceries".to_string(),
            "5".to_string()
        ]));
    }

    #[test]
    fn test_parse_id_list() {
        let value = serde_json::json!(["3", "1", "junk", "2"]);
        assert_eq!(parse_id_list(&value), vec![3, 1, 2]);
        assert!(parse_id_list(&Value::Null).is_empty());
    }
}
