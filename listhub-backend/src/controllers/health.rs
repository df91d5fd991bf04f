use actix_web::{HttpResponse, Responder, web};

use crate::AppState;
use crate::store::TodoStore;

/// Version from Cargo.toml, available at compile time
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/health").route(web::get().to(health_check)));
}

async fn health_check(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": VERSION,
        "store": state.store.backend_name(),
        "transport": state.config.transport.as_str()
    }))
}
