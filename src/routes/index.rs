use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(index))
}

/// Health check and endpoint listing
async fn index() -> Json<Value> {
    Json(json!({
        "name": "Tech & AI Daily API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "active",
        "endpoints": {
            "GET /articles": "Get all articles (?category=, ?search=)",
            "GET /articles?id={id}": "Get single article",
            "GET /articles?slug={slug}": "Get single article by slug",
            "POST /articles": "Create article",
            "PUT /articles": "Update article",
            "DELETE /articles?id={id}": "Delete article",
            "GET /authors": "Get all authors",
            "POST /auth?action=login": "Log in",
            "POST /auth?action=logout": "Log out",
            "GET /auth?action=verify": "Check session",
            "POST /upload": "Upload image",
        }
    }))
}
