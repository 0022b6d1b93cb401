use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use crate::articles::{ArticleDraft, ArticleFilter, ArticleId, ArticlePatch, Category};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentAdmin, JsonBody};
use crate::routes::method_not_allowed;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/articles",
        get(list_or_get)
            .post(create)
            .put(update)
            .delete(remove)
            .fallback(method_not_allowed),
    )
}

#[derive(Debug, Default, Deserialize)]
pub struct ArticlesQuery {
    pub id: Option<String>,
    pub slug: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
}

impl ArticlesQuery {
    /// "All" and blank mean no category filter.
    fn filter(&self) -> AppResult<ArticleFilter> {
        let category = match self.category.as_deref().map(str::trim) {
            None | Some("") | Some("All") => None,
            Some(raw) => Some(raw.parse::<Category>()?),
        };
        // The term is matched verbatim, surrounding spaces included
        let search = self.search.clone().filter(|s| !s.is_empty());
        Ok(ArticleFilter { category, search })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// GET /articles: one article by `id` or `slug`, otherwise the filtered list
async fn list_or_get(
    State(state): State<AppState>,
    Query(query): Query<ArticlesQuery>,
) -> AppResult<Response> {
    if let Some(id) = non_blank(query.id.as_deref()) {
        let article = state.articles.get(&ArticleId::new(id)).await?;
        return Ok(Json(article).into_response());
    }
    if let Some(slug) = non_blank(query.slug.as_deref()) {
        let article = state.articles.get_by_slug(slug).await?;
        return Ok(Json(article).into_response());
    }

    let articles = state.articles.list(&query.filter()?).await?;
    Ok(Json(articles).into_response())
}

/// POST /articles
async fn create(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    JsonBody(draft): JsonBody<ArticleDraft>,
) -> AppResult<impl IntoResponse> {
    let article = draft.validate(Utc::now())?;
    let created = state.articles.create(article).await?;
    tracing::debug!(admin = %admin.username, article_id = %created.id, "Create via API");
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /articles: body carries `id` plus any subset of fields
async fn update(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    JsonBody(body): JsonBody<Value>,
) -> AppResult<impl IntoResponse> {
    let id = body
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ArticleId::new)
        .ok_or_else(|| AppError::Validation("Missing article ID".into()))?;

    let patch: ArticlePatch =
        serde_json::from_value(body).map_err(|e| AppError::Validation(e.to_string()))?;
    let updated = state.articles.update(&id, patch.validate()?).await?;
    tracing::debug!(admin = %admin.username, article_id = %id, "Update via API");
    Ok(Json(updated))
}

/// DELETE /articles?id=
async fn remove(
    State(state): State<AppState>,
    CurrentAdmin(admin): CurrentAdmin,
    Query(query): Query<ArticlesQuery>,
) -> AppResult<impl IntoResponse> {
    let id = non_blank(query.id.as_deref())
        .map(ArticleId::new)
        .ok_or_else(|| AppError::Validation("Missing article ID".into()))?;

    state.articles.delete(&id).await?;
    tracing::debug!(admin = %admin.username, article_id = %id, "Delete via API");
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Article deleted",
    })))
}
