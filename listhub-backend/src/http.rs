use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

/// Global shared HTTP client singleton.
///
/// Reuses one connection pool for the Telegram, GitHub Gist and Upstash
/// REST APIs. `Client::clone()` is just an `Arc` increment.
///
/// The default timeout leaves headroom for Telegram long-polling, which
/// holds `getUpdates` open for up to 50 seconds server-side. Callers that
/// need a tighter bound override per-request via `.timeout()`.
static SHARED_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .pool_max_idle_per_host(5)
        .pool_idle_timeout(Duration::from_secs(90))
        .timeout(Duration::from_secs(75))
        .build()
        .expect("Failed to create shared HTTP client")
});

/// Returns a reference to the global shared HTTP client.
pub fn shared_client() -> &'static Client {
    &SHARED_CLIENT
}
