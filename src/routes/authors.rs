use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::authors::list_authors;
use crate::db::models::Author;
use crate::error::AppResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/authors", get(list))
}

async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<Author>>> {
    let conn = state.db.get()?;
    Ok(Json(list_authors(&conn)?))
}
