//! Email reference endpoints

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};

use super::{Page, PageQuery};
use crate::error::ApiResult;
use crate::models::MessageReference;
use crate::AppState;

/// GET /job-tracker/emails
///
/// Stored references, newest first.
pub async fn list_emails(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Page<MessageReference>>> {
    let (limit, offset) = query.resolve(&state.pagination)?;
    let (items, total) = state.applications.list_emails(limit, offset).await?;
    Ok(Json(Page { total, items }))
}

pub fn email_routes() -> Router<AppState> {
    Router::new().route("/emails", get(list_emails))
}
