use actix_web::{HttpResponse, Responder, web};

use crate::AppState;
use crate::channels::telegram::{self, Update};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/webhook/{secret}").route(web::post().to(receive_update)));
}

/// Telegram webhook receiver. The secret path segment is the only
/// credential; a mismatch (or no configured secret) is a plain 404.
/// The JSON extractor enforces `Content-Type: application/json`.
async fn receive_update(
    state: web::Data<AppState>,
    path: web::Path<String>,
    update: web::Json<Update>,
) -> impl Responder {
    let expected = match state.config.webhook_secret_path.as_deref() {
        Some(secret) => secret,
        None => return HttpResponse::NotFound().finish(),
    };
    if path.into_inner() != expected {
        return HttpResponse::NotFound().finish();
    }

    telegram::handle_update(update.into_inner(), &state.dispatcher, &state.telegram).await;
    HttpResponse::Ok().json(serde_json::json!({ "ok": true }))
}
