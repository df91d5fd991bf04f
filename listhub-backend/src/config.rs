use crate::store::StoreBackend;
use chrono::FixedOffset;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::env;

/// Telegram bot tokens look like `123456789:AbCdEf...`
static BOT_TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+:[A-Za-z0-9_-]+$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Polling,
    Webhook,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Polling => "polling",
            TransportMode::Webhook => "webhook",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "polling" | "poll" => Some(TransportMode::Polling),
            "webhook" => Some(TransportMode::Webhook),
            _ => None,
        }
    }
}

/// Read an env var, stripping whitespace and stray quotes (tokens pasted
/// into dashboards tend to arrive quoted). Empty values count as unset.
fn env_trimmed(name: &str) -> Option<String> {
    let value = env::var(name).ok()?;
    let value = value.trim().trim_matches('"').trim_matches('\'').trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[derive(Clone)]
pub struct Config {
    pub bot_token: String,
    pub port: u16,
    pub transport: TransportMode,
    pub store_backend: StoreBackend,
    pub allowed_user_ids: HashSet<i64>,
    pub data_path: String,
    pub github_token: Option<String>,
    pub gist_id: Option<String>,
    pub gist_filename: String,
    pub gist_description: String,
    pub redis_rest_url: Option<String>,
    pub redis_rest_token: Option<String>,
    pub webhook_secret_path: Option<String>,
    pub webhook_base_url: Option<String>,
    pub display_offset_minutes: i32,
}

impl Config {
    pub fn from_env() -> Self {
        let bot_token = env_trimmed("BOT_TOKEN").expect("BOT_TOKEN must be set");
        if !BOT_TOKEN_PATTERN.is_match(&bot_token) {
            panic!("BOT_TOKEN is missing or malformed");
        }

        let allowed_user_ids: HashSet<i64> = env_trimmed("ALLOWED_USER_IDS")
            .expect("ALLOWED_USER_IDS must be set")
            .split(',')
            .filter_map(|part| part.trim().parse().ok())
            .collect();
        if allowed_user_ids.is_empty() {
            panic!("ALLOWED_USER_IDS must contain at least one numeric user id");
        }

        let transport = env_trimmed("TRANSPORT")
            .map(|s| TransportMode::from_str(&s).expect("TRANSPORT must be 'polling' or 'webhook'"))
            .unwrap_or(TransportMode::Polling);

        let store_backend = env_trimmed("STORE_BACKEND")
            .map(|s| StoreBackend::from_str(&s).expect("STORE_BACKEND must be 'json', 'gist' or 'redis'"))
            .unwrap_or(StoreBackend::Json);

        let webhook_secret_path = env_trimmed("WEBHOOK_SECRET_PATH");
        if transport == TransportMode::Webhook && webhook_secret_path.is_none() {
            panic!("WEBHOOK_SECRET_PATH must be set when TRANSPORT=webhook");
        }

        Self {
            bot_token,
            port: env_trimmed("PORT")
                .map(|s| s.parse().expect("PORT must be a valid number"))
                .unwrap_or(8080),
            transport,
            store_backend,
            allowed_user_ids,
            data_path: env_trimmed("DATA_PATH").unwrap_or_else(|| "data.json".to_string()),
            github_token: env_trimmed("GITHUB_TOKEN"),
            gist_id: env_trimmed("GIST_ID"),
            gist_filename: env_trimmed("GIST_FILENAME")
                .unwrap_or_else(|| "todo_store.json".to_string()),
            gist_description: env_trimmed("GIST_DESCRIPTION")
                .unwrap_or_else(|| "ListHub bot data".to_string()),
            redis_rest_url: env_trimmed("UPSTASH_REDIS_REST_URL"),
            redis_rest_token: env_trimmed("UPSTASH_REDIS_REST_TOKEN"),
            webhook_secret_path,
            webhook_base_url: env_trimmed("WEBHOOK_BASE_URL"),
            display_offset_minutes: env_trimmed("DISPLAY_UTC_OFFSET_MINUTES")
                .map(|s| s.parse().expect("DISPLAY_UTC_OFFSET_MINUTES must be a number"))
                .unwrap_or(0),
        }
    }

    /// Fixed offset used when rendering stored UTC timestamps to the user.
    pub fn display_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.display_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
    }
}
