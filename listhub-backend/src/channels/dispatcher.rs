//! Flat command dispatcher.
//!
//! One incoming message classifies to exactly one list operation by literal
//! prefix match; there is no conversation state. The store is injected so
//! handlers never touch process-wide state.

use crate::channels::{DispatchResult, NormalizedMessage};
use crate::models::{Item, ItemStatus, ListFilter};
use crate::store::{StoreResult, TodoStore};
use chrono::FixedOffset;
use std::collections::HashSet;
use std::sync::Arc;

/// Callback data carried by the one cleanup button on list replies
pub const CLEANUP_CALLBACK: &str = "clean_done";

const GENERIC_FAILURE: &str = "Storage error, please try again later.";

const START_REPLY: &str = "Hi! Any text message adds items to the shared list, one per line.\n\
Commands: ? or /list, /list #tag, /list done, /del <n>, /done <n>, /undo <n>, /clean, /clear";

const USAGE_DEL: &str = "Usage: /del <number> (see positions with ?)";
const USAGE_DONE: &str = "Usage: /done <number> (see positions with ?)";
const USAGE_UNDO: &str = "Usage: /undo <number> (see positions with ?)";
const USAGE_LIST: &str = "Usage: ? | /list | /list #tag | /list todo|doing|done";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Start,
    List(ListFilter),
    Delete(usize),
    MarkDone(usize),
    MarkTodo(usize),
    ClearAll,
    ClearDone,
    Add(Vec<String>),
    Usage(&'static str),
}

fn parse_position(rest: &str, usage: &'static str) -> Result<usize, &'static str> {
    match rest.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(usage),
    }
}

fn parse_list_filter(rest: &str) -> Command {
    let token = match rest.split_whitespace().next() {
        Some(token) => token,
        None => return Command::List(ListFilter::default()),
    };

    if let Some(tag) = token.strip_prefix('#') {
        if !tag.is_empty() {
            return Command::List(ListFilter::by_tag(tag));
        }
    }
    if let Some(status) = ItemStatus::from_str(token) {
        return Command::List(ListFilter::by_status(status));
    }
    Command::Usage(USAGE_LIST)
}

/// Classify one message. Anything that is not a recognized command becomes
/// one new item per non-empty line.
fn parse_command(text: &str) -> Command {
    let trimmed = text.trim();
    let (first, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((first, rest)) => (first, rest.trim()),
        None => (trimmed, ""),
    };

    // Telegram appends @BotName to commands issued in group chats
    let lowered = first.to_lowercase();
    let head = lowered.split('@').next().unwrap_or("");

    match head {
        "/start" => Command::Start,
        "?" | "/list" => parse_list_filter(rest),
        "/del" => match parse_position(rest, USAGE_DEL) {
            Ok(n) => Command::Delete(n),
            Err(usage) => Command::Usage(usage),
        },
        "/done" => match parse_position(rest, USAGE_DONE) {
            Ok(n) => Command::MarkDone(n),
            Err(usage) => Command::Usage(usage),
        },
        "/undo" => match parse_position(rest, USAGE_UNDO) {
            Ok(n) => Command::MarkTodo(n),
            Err(usage) => Command::Usage(usage),
        },
        "/clear" => Command::ClearAll,
        "/clean" => Command::ClearDone,
        _ => Command::Add(
            trimmed
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        ),
    }
}

/// Dispatcher routes classified commands to the injected store and turns
/// outcomes into user-facing replies.
pub struct CommandDispatcher {
    store: Arc<dyn TodoStore>,
    allowed_user_ids: HashSet<i64>,
    display_offset: FixedOffset,
}

impl CommandDispatcher {
    pub fn new(
        store: Arc<dyn TodoStore>,
        allowed_user_ids: HashSet<i64>,
        display_offset: FixedOffset,
    ) -> Self {
        CommandDispatcher {
            store,
            allowed_user_ids,
            display_offset,
        }
    }

    pub fn is_allowed(&self, user_id: i64) -> bool {
        self.allowed_user_ids.contains(&user_id)
    }

    fn rejection(user_id: i64) -> DispatchResult {
        DispatchResult::text(format!("This bot is private. Your ID: {}", user_id))
    }

    /// Dispatch one normalized message. Store errors are logged here and
    /// turned into one generic failure reply; nothing propagates.
    pub async fn dispatch(&self, message: NormalizedMessage) -> DispatchResult {
        if !self.is_allowed(message.user_id) {
            log::info!(
                "Rejected message from unauthorized user {} ({})",
                message.user_id,
                message.user_name
            );
            return Self::rejection(message.user_id);
        }

        let result = match parse_command(&message.text) {
            Command::Start => Ok(DispatchResult::text(START_REPLY)),
            Command::List(filter) => self.handle_list(&filter).await,
            Command::Delete(position) => self.handle_delete(position).await,
            Command::MarkDone(position) => self.handle_mark(position, ItemStatus::Done).await,
            Command::MarkTodo(position) => self.handle_mark(position, ItemStatus::Todo).await,
            Command::ClearAll => self.handle_clear().await,
            Command::ClearDone => self.handle_clear_done().await,
            Command::Add(lines) => self.handle_add(&lines, message.user_id).await,
            Command::Usage(hint) => Ok(DispatchResult::text(hint)),
        };

        result.unwrap_or_else(|e| {
            log::error!("Store operation failed: {}", e);
            DispatchResult::text(GENERIC_FAILURE)
        })
    }

    /// Handle the cleanup button. Same allow-list rules as messages.
    pub async fn dispatch_callback(&self, user_id: i64, data: &str) -> DispatchResult {
        if !self.is_allowed(user_id) {
            return Self::rejection(user_id);
        }
        if data != CLEANUP_CALLBACK {
            return DispatchResult::text("Unknown action.");
        }
        self.handle_clear_done().await.unwrap_or_else(|e| {
            log::error!("Store operation failed: {}", e);
            DispatchResult::text(GENERIC_FAILURE)
        })
    }

    /// Resolve a 1-based position against the unfiltered listing, the same
    /// ordering the user last saw from `?`.
    async fn item_at_position(&self, position: usize) -> StoreResult<Option<Item>> {
        let items = self.store.list(&ListFilter::default()).await?;
        Ok(items.into_iter().nth(position - 1))
    }

    async fn handle_add(&self, lines: &[String], user_id: i64) -> StoreResult<DispatchResult> {
        if lines.is_empty() {
            return Ok(DispatchResult::text(START_REPLY));
        }
        for line in lines {
            self.store.create(line, user_id).await?;
        }
        let reply = if lines.len() == 1 {
            "✅ Added 1 item.".to_string()
        } else {
            format!("✅ Added {} items.", lines.len())
        };
        Ok(DispatchResult::text(reply))
    }

    async fn handle_list(&self, filter: &ListFilter) -> StoreResult<DispatchResult> {
        let items = self.store.list(filter).await?;
        if items.is_empty() {
            let reply = if filter.is_empty() {
                "No items yet."
            } else {
                "No matching items."
            };
            return Ok(DispatchResult::text(reply));
        }

        let done_count = items
            .iter()
            .filter(|item| item.status == ItemStatus::Done)
            .count();

        let mut lines: Vec<String> = items
            .iter()
            .enumerate()
            .map(|(idx, item)| self.format_item(idx + 1, item))
            .collect();
        lines.push(format!("{} item(s), {} done.", items.len(), done_count));

        let reply = lines.join("\n");
        if done_count > 0 {
            Ok(DispatchResult::with_cleanup(reply))
        } else {
            Ok(DispatchResult::text(reply))
        }
    }

    async fn handle_delete(&self, position: usize) -> StoreResult<DispatchResult> {
        match self.item_at_position(position).await? {
            Some(item) => {
                self.store.delete(item.id).await?;
                Ok(DispatchResult::text(format!("🗑 Deleted: {}", item.text)))
            }
            None => Ok(DispatchResult::text(format!(
                "No item at position {}.",
                position
            ))),
        }
    }

    async fn handle_mark(&self, position: usize, status: ItemStatus) -> StoreResult<DispatchResult> {
        match self.item_at_position(position).await? {
            Some(item) => {
                self.store.update_status(item.id, status).await?;
                let reply = match status {
                    ItemStatus::Done => format!("✅ Done: {}", item.text),
                    _ => format!("↩️ Back to todo: {}", item.text),
                };
                Ok(DispatchResult::text(reply))
            }
            None => Ok(DispatchResult::text(format!(
                "No item at position {}.",
                position
            ))),
        }
    }

    async fn handle_clear(&self) -> StoreResult<DispatchResult> {
        let count = self.store.clear().await?;
        Ok(DispatchResult::text(format!("Cleared {} item(s).", count)))
    }

    async fn handle_clear_done(&self) -> StoreResult<DispatchResult> {
        let count = self.store.clear_done().await?;
        Ok(DispatchResult::text(format!(
            "🧹 Cleaned {} done item(s).",
            count
        )))
    }

    fn format_item(&self, position: usize, item: &Item) -> String {
        let created = item
            .created_at_utc
            .with_timezone(&self.display_offset)
            .format("%Y-%m-%d %H:%M");

        let mut line = format!(
            "{}. {} #{} {}",
            position,
            item.status.marker(),
            item.id,
            item.text
        );
        if let Some(due) = item.due {
            line.push_str(&format!(" (due {})", due.format("%Y-%m-%d")));
        }
        line.push_str(&format!(" — {} by {}", created, item.added_by));
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_commands() {
        assert_eq!(parse_command("?"), Command::List(ListFilter::default()));
        assert_eq!(parse_command("/list"), Command::List(ListFilter::default()));
        assert_eq!(
            parse_command("/list@ListHubBot"),
            Command::List(ListFilter::default())
        );
        assert_eq!(
            parse_command("? #home"),
            Command::List(ListFilter::by_tag("home"))
        );
        assert_eq!(
            parse_command("/list done"),
            Command::List(ListFilter::by_status(ItemStatus::Done))
        );
        assert_eq!(parse_command("/list nonsense"), Command::Usage(USAGE_LIST));
    }

    #[test]
    fn test_parse_position_commands() {
        assert_eq!(parse_command("/del 3"), Command::Delete(3));
        assert_eq!(parse_command("/done 1"), Command::MarkDone(1));
        assert_eq!(parse_command("/undo 2"), Command::MarkTodo(2));

        // Malformed arguments become usage hints, not items
        assert_eq!(parse_command("/del abc"), Command::Usage(USAGE_DEL));
        assert_eq!(parse_command("/del"), Command::Usage(USAGE_DEL));
        assert_eq!(parse_command("/del 0"), Command::Usage(USAGE_DEL));
        assert_eq!(parse_command("/done"), Command::Usage(USAGE_DONE));
    }

    #[test]
    fn test_parse_bulk_commands() {
        assert_eq!(parse_command("/clear"), Command::ClearAll);
        assert_eq!(parse_command("/clean"), Command::ClearDone);
        assert_eq!(parse_command("/start"), Command::Start);
    }

    #[test]
    fn test_anything_else_adds_items() {
        assert_eq!(
            parse_command("buy milk"),
            Command::Add(vec!["buy milk".to_string()])
        );
        assert_eq!(
            parse_command("buy milk\n\ncall plumber  \nfix door"),
            Command::Add(vec![
                "buy milk".to_string(),
                "call plumber".to_string(),
                "fix door".to_string()
            ])
        );
    }
}
