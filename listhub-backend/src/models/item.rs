use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Pre-compiled regex for `#hashtag` tokens in item text
static TAG_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"#([A-Za-z0-9_]+)").unwrap());

/// Pre-compiled regex for `due:YYYY-MM-DD` tokens in item text
static DUE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"due:(\d{4}-\d{2}-\d{2})").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    #[default]
    Todo,
    Doing,
    Done,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Todo => "todo",
            ItemStatus::Doing => "doing",
            ItemStatus::Done => "done",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "todo" => Some(ItemStatus::Todo),
            "doing" => Some(ItemStatus::Doing),
            "done" => Some(ItemStatus::Done),
            _ => None,
        }
    }

    /// Marker shown in front of the item in list replies
    pub fn marker(&self) -> &'static str {
        match self {
            ItemStatus::Todo => "⬜",
            ItemStatus::Doing => "🔄",
            ItemStatus::Done => "✅",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry on the shared to-do list.
///
/// `updated_at_utc` is absent in payloads written by earlier drafts; readers
/// should go through [`Item::updated_at`], which falls back to the creation
/// time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub text: String,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<DateTime<Utc>>,
    pub created_at_utc: DateTime<Utc>,
    #[serde(default)]
    pub updated_at_utc: Option<DateTime<Utc>>,
    pub added_by: i64,
}

impl Item {
    /// Build a new item from one line of user text. Tags and the optional
    /// due date are extracted from the text; the text itself is stored
    /// verbatim.
    pub fn new(id: i64, text: &str, added_by: i64, now: DateTime<Utc>) -> Self {
        Item {
            id,
            text: text.to_string(),
            status: ItemStatus::Todo,
            tags: extract_tags(text),
            due: extract_due(text),
            created_at_utc: now,
            updated_at_utc: Some(now),
            added_by,
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at_utc.unwrap_or(self.created_at_utc)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at_utc = Some(now);
    }
}

/// Filter for list queries. Empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilter {
    pub status: Option<ItemStatus>,
    pub tag: Option<String>,
}

impl ListFilter {
    pub fn by_status(status: ItemStatus) -> Self {
        ListFilter {
            status: Some(status),
            tag: None,
        }
    }

    pub fn by_tag(tag: &str) -> Self {
        ListFilter {
            status: None,
            tag: Some(tag.to_lowercase()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.tag.is_none()
    }

    pub fn matches(&self, item: &Item) -> bool {
        if let Some(status) = self.status {
            if item.status != status {
                return false;
            }
        }
        if let Some(ref tag) = self.tag {
            if !item.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        true
    }
}

/// Extract `#hashtag` tokens from item text, lowercased and deduplicated
/// in order of first appearance.
pub fn extract_tags(text: &str) -> Vec<String> {
    let mut tags = Vec::new();
    for cap in TAG_PATTERN.captures_iter(text) {
        let tag = cap[1].to_lowercase();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// Extract the first `due:YYYY-MM-DD` token as a UTC midnight timestamp.
pub fn extract_due(text: &str) -> Option<DateTime<Utc>> {
    let cap = DUE_PATTERN.captures(text)?;
    let date = NaiveDate::parse_from_str(&cap[1], "%Y-%m-%d").ok()?;
    let naive = date.and_hms_opt(0, 0, 0)?;
    Some(DateTime::from_naive_utc_and_offset(naive, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_tags() {
        assert_eq!(extract_tags("buy milk"), Vec::<String>::new());
        assert_eq!(extract_tags("buy milk #groceries"), vec!["groceries"]);
        assert_eq!(
            extract_tags("#Home fix the door #home #urgent"),
            vec!["home", "urgent"]
        );
    }

    #[test]
    fn test_extract_due() {
        assert!(extract_due("buy milk").is_none());
        let due = extract_due("pay rent due:2026-09-01").expect("due date");
        assert_eq!(due.to_rfc3339(), "2026-09-01T00:00:00+00:00");
        // Malformed dates are ignored rather than rejected
        assert!(extract_due("pay rent due:2026-13-99").is_none());
    }

    #[test]
    fn test_filter_matches() {
        let now = Utc::now();
        let item = Item::new(1, "call plumber #home", 42, now);

        assert!(ListFilter::default().matches(&item));
        assert!(ListFilter::by_tag("home").matches(&item));
        assert!(ListFilter::by_tag("HOME").matches(&item));
        assert!(!ListFilter::by_tag("work").matches(&item));
        assert!(ListFilter::by_status(ItemStatus::Todo).matches(&item));
        assert!(!ListFilter::by_status(ItemStatus::Done).matches(&item));
    }

    #[test]
    fn test_legacy_payload_defaults() {
        // Payloads from earlier drafts carry only {id, text, created_at_utc, added_by}
        let json = r#"{"id":3,"text":"water plants","created_at_utc":"2026-08-01T10:00:00Z","added_by":7}"#;
        let item: Item = serde_json::from_str(json).expect("legacy item");
        assert_eq!(item.status, ItemStatus::Todo);
        assert!(item.tags.is_empty());
        assert!(item.due.is_none());
        assert_eq!(item.updated_at(), item.created_at_utc);
    }
}
