//! In-memory snapshot shared by the JSON-file and Gist backends.
//!
//! Both backends hold the whole list in memory and persist the serialized
//! snapshot after every mutation, so the mutation logic lives here once.

use crate::models::{Item, ItemStatus, ListFilter};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Serialized store shape: `{ "next_id": int, "items": [...] }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub next_id: i64,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        StoreSnapshot {
            next_id: 1,
            items: Vec::new(),
        }
    }
}

impl StoreSnapshot {
    pub fn create(&mut self, text: &str, added_by: i64, now: DateTime<Utc>) -> Item {
        let id = self.next_id;
        self.next_id += 1;
        let item = Item::new(id, text, added_by, now);
        self.items.push(item.clone());
        item
    }

    /// Insertion-order listing, optionally filtered.
    pub fn list(&self, filter: &ListFilter) -> Vec<Item> {
        self.items
            .iter()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect()
    }

    pub fn update_status(&mut self, id: i64, status: ItemStatus, now: DateTime<Utc>) -> bool {
        match self.items.iter_mut().find(|item| item.id == id) {
            Some(item) => {
                item.status = status;
                item.touch(now);
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, id: i64) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        self.items.len() < before
    }

    pub fn clear(&mut self) -> usize {
        let count = self.items.len();
        self.items.clear();
        count
    }

    pub fn clear_done(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(|item| item.status != ItemStatus::Done);
        before - self.items.len()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn from_json(text: &str) -> Result<Self, String> {
        serde_json::from_str(text).map_err(|e| format!("Malformed store JSON: {}", e))
    }
}
