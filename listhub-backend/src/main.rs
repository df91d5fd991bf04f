use actix_web::{App, HttpServer, middleware::Logger, web};
use dotenv::dotenv;
use std::sync::Arc;
use tokio::sync::oneshot;

mod channels;
mod config;
mod controllers;
mod http;
mod models;
mod store;

use channels::dispatcher::CommandDispatcher;
use channels::telegram::{self, TelegramClient};
use config::{Config, TransportMode};
use store::TodoStore;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn TodoStore>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub telegram: Arc<TelegramClient>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let port = config.port;

    let store = store::create_store(&config)
        .await
        .expect("Failed to initialize store");

    let dispatcher = Arc::new(CommandDispatcher::new(
        store.clone(),
        config.allowed_user_ids.clone(),
        config.display_offset(),
    ));
    let telegram = Arc::new(TelegramClient::new(config.bot_token.clone()));

    // Dropping the sender when main exits ends the poll loop
    let _poll_shutdown: Option<oneshot::Sender<()>> = match config.transport {
        TransportMode::Polling => {
            let (shutdown_tx, shutdown_rx) = oneshot::channel();
            let poll_client = telegram.clone();
            let poll_dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                telegram::run_polling(poll_client, poll_dispatcher, shutdown_rx).await;
            });
            Some(shutdown_tx)
        }
        TransportMode::Webhook => {
            // Secret presence is validated in Config::from_env
            let secret = config.webhook_secret_path.clone().unwrap_or_default();
            match config.webhook_base_url.as_deref() {
                Some(base) => {
                    let url = format!("{}/webhook/{}", base.trim_end_matches('/'), secret);
                    match telegram.set_webhook(&url).await {
                        Ok(()) => log::info!("Registered Telegram webhook"),
                        Err(e) => log::error!("Failed to register webhook: {}", e),
                    }
                }
                None => log::warn!("WEBHOOK_BASE_URL not set; register the webhook manually"),
            }
            None
        }
    };

    log::info!(
        "Starting ListHub server on port {} ({} transport, {} store)",
        port,
        config.transport.as_str(),
        config.store_backend
    );

    let app_config = config.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(AppState {
                config: app_config.clone(),
                store: store.clone(),
                dispatcher: dispatcher.clone(),
                telegram: telegram.clone(),
            }))
            .wrap(Logger::default())
            .configure(controllers::health::config)
            .configure(controllers::webhook::config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
