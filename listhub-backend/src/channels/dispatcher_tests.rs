//! Integration tests for the command dispatcher over a real file-backed
//! store in a temp directory.
//!
//! These cover the dispatcher's externally observable behavior: item counts
//! after multi-line adds, position shifting after deletes, done markers,
//! cleanup semantics, and the allow-list guarantee that unauthorized
//! senders never mutate the store.

use crate::channels::dispatcher::{CLEANUP_CALLBACK, CommandDispatcher};
use crate::channels::{DispatchResult, NormalizedMessage};
use crate::models::{ItemStatus, ListFilter};
use crate::store::{JsonFileStore, TodoStore};
use chrono::FixedOffset;
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

const ALLOWED_USER: i64 = 1317349810;
const OTHER_ALLOWED_USER: i64 = 816672824;
const STRANGER: i64 = 555;

/// Test harness wiring a dispatcher to a JSON-file store in a temp dir.
struct TestHarness {
    dispatcher: CommandDispatcher,
    store: Arc<JsonFileStore>,
    _dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let store = Arc::new(JsonFileStore::open(dir.path().join("data.json")));
        let allowed: HashSet<i64> = [ALLOWED_USER, OTHER_ALLOWED_USER].into_iter().collect();
        let dispatcher = CommandDispatcher::new(
            store.clone(),
            allowed,
            FixedOffset::east_opt(0).unwrap(),
        );
        TestHarness {
            dispatcher,
            store,
            _dir: dir,
        }
    }

    async fn send(&self, text: &str) -> DispatchResult {
        self.send_as(ALLOWED_USER, text).await
    }

    async fn send_as(&self, user_id: i64, text: &str) -> DispatchResult {
        self.dispatcher
            .dispatch(NormalizedMessage {
                chat_id: 1,
                user_id,
                user_name: "Test".to_string(),
                text: text.to_string(),
            })
            .await
    }

    /// Item texts straight from the store, bypassing the dispatcher.
    async fn texts(&self) -> Vec<String> {
        self.store
            .list(&ListFilter::default())
            .await
            .expect("list")
            .into_iter()
            .map(|item| item.text)
            .collect()
    }
}

#[tokio::test]
async fn test_multiline_message_creates_one_item_per_line() {
    let harness = TestHarness::new();
    let result = harness.send("buy milk\n\ncall plumber\nfix door").await;

    assert_eq!(result.reply, "✅ Added 3 items.");
    assert_eq!(
        harness.texts().await,
        vec!["buy milk", "call plumber", "fix door"]
    );
}

#[tokio::test]
async fn test_delete_shifts_subsequent_positions() {
    let harness = TestHarness::new();
    harness.send("a\nb\nc").await;

    let result = harness.send("/del 2").await;
    assert_eq!(result.reply, "🗑 Deleted: b");
    assert_eq!(harness.texts().await, vec!["a", "c"]);

    // "c" moved from position 3 to position 2
    let result = harness.send("/del 2").await;
    assert_eq!(result.reply, "🗑 Deleted: c");
    assert_eq!(harness.texts().await, vec!["a"]);
}

#[tokio::test]
async fn test_done_marker_and_clean_preserve_order() {
    let harness = TestHarness::new();
    harness.send("a\nb\nc\nd").await;
    harness.send("/done 2").await;
    harness.send("/done 4").await;

    let listing = harness.send("?").await;
    assert!(listing.reply.contains("✅ #2 b"));
    assert!(listing.reply.contains("⬜ #1 a"));
    assert!(listing.reply.contains("4 item(s), 2 done."));
    assert!(listing.offer_cleanup);

    let result = harness.send("/clean").await;
    assert_eq!(result.reply, "🧹 Cleaned 2 done item(s).");
    assert_eq!(harness.texts().await, vec!["a", "c"]);
}

#[tokio::test]
async fn test_undo_returns_item_to_todo() {
    let harness = TestHarness::new();
    harness.send("a").await;
    harness.send("/done 1").await;
    harness.send("/undo 1").await;

    let items = harness.store.list(&ListFilter::default()).await.expect("list");
    assert_eq!(items[0].status, ItemStatus::Todo);

    let listing = harness.send("?").await;
    assert!(!listing.offer_cleanup);
}

#[tokio::test]
async fn test_unauthorized_sender_never_mutates_the_store() {
    let harness = TestHarness::new();
    harness.send("keep me").await;

    let result = harness.send_as(STRANGER, "sneaky item").await;
    assert_eq!(result.reply, format!("This bot is private. Your ID: {}", STRANGER));

    harness.send_as(STRANGER, "/clear").await;
    harness.send_as(STRANGER, "/del 1").await;
    let callback = harness
        .dispatcher
        .dispatch_callback(STRANGER, CLEANUP_CALLBACK)
        .await;
    assert!(callback.reply.contains("private"));

    assert_eq!(harness.texts().await, vec!["keep me"]);
}

#[tokio::test]
async fn test_both_allowed_users_share_the_list() {
    let harness = TestHarness::new();
    harness.send_as(ALLOWED_USER, "mine").await;
    harness.send_as(OTHER_ALLOWED_USER, "yours").await;

    assert_eq!(harness.texts().await, vec!["mine", "yours"]);

    let items = harness.store.list(&ListFilter::default()).await.expect("list");
    assert_eq!(items[0].added_by, ALLOWED_USER);
    assert_eq!(items[1].added_by, OTHER_ALLOWED_USER);
}

#[tokio::test]
async fn test_malformed_positions_get_usage_hints() {
    let harness = TestHarness::new();
    harness.send("a").await;

    let result = harness.send("/del abc").await;
    assert!(result.reply.starts_with("Usage: /del"));
    let result = harness.send("/done").await;
    assert!(result.reply.starts_with("Usage: /done"));
    let result = harness.send("/del 7").await;
    assert_eq!(result.reply, "No item at position 7.");

    assert_eq!(harness.texts().await, vec!["a"]);
}

#[tokio::test]
async fn test_tag_and_status_filters() {
    let harness = TestHarness::new();
    harness.send("buy milk #home\nemail boss #work\nfix door #home").await;
    harness.send("/done 2").await;

    let listing = harness.send("? #home").await;
    assert!(listing.reply.contains("buy milk"));
    assert!(listing.reply.contains("fix door"));
    assert!(!listing.reply.contains("email boss"));

    let listing = harness.send("/list done").await;
    assert!(listing.reply.contains("email boss"));
    assert!(listing.reply.contains("1 item(s), 1 done."));

    let listing = harness.send("/list todo").await;
    assert!(!listing.reply.contains("email boss"));
}

#[tokio::test]
async fn test_clear_reports_count() {
    let harness = TestHarness::new();
    harness.send("a\nb").await;

    let result = harness.send("/clear").await;
    assert_eq!(result.reply, "Cleared 2 item(s).");
    assert!(harness.texts().await.is_empty());

    let listing = harness.send("?").await;
    assert_eq!(listing.reply, "No items yet.");
}

#[tokio::test]
async fn test_cleanup_callback_removes_done_items_only() {
    let harness = TestHarness::new();
    harness.send("a\nb\nc").await;
    harness.send("/done 1").await;

    let result = harness
        .dispatcher
        .dispatch_callback(ALLOWED_USER, CLEANUP_CALLBACK)
        .await;
    assert_eq!(result.reply, "🧹 Cleaned 1 done item(s).");
    assert_eq!(harness.texts().await, vec!["b", "c"]);

    let result = harness
        .dispatcher
        .dispatch_callback(ALLOWED_USER, "bogus")
        .await;
    assert_eq!(result.reply, "Unknown action.");
}

#[tokio::test]
async fn test_due_date_shows_in_listing() {
    let harness = TestHarness::new();
    harness.send("pay rent due:2026-09-01").await;

    let listing = harness.send("?").await;
    assert!(listing.reply.contains("(due 2026-09-01)"));
}
