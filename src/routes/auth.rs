use axum::routing::any;
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/auth", any(handlers::dispatch))
}
