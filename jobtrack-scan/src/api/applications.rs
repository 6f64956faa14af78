//! Application endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::{Page, PageQuery};
use crate::db::applications::{ApplicationFilter, ApplicationSort, ApplicationStats};
use crate::error::ApiResult;
use crate::models::{Application, ApplicationDetail, ApplicationStatus, ApplicationUpdate, NewApplication};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListApplicationsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub status: Option<ApplicationStatus>,
    pub search: Option<String>,
    pub sort: Option<ApplicationSort>,
}

/// GET /job-tracker/applications
pub async fn list_applications(
    State(state): State<AppState>,
    Query(query): Query<ListApplicationsQuery>,
) -> ApiResult<Json<Page<Application>>> {
    let page = PageQuery {
        limit: query.limit,
        offset: query.offset,
    };
    let (limit, offset) = page.resolve(&state.pagination)?;
    let filter = ApplicationFilter {
        status: query.status,
        search: query.search,
        sort: query.sort.unwrap_or_default(),
        limit,
        offset,
    };

    let (items, total) = state.applications.list(&filter).await?;
    Ok(Json(Page { total, items }))
}

/// POST /job-tracker/applications
pub async fn create_application(
    State(state): State<AppState>,
    Json(new): Json<NewApplication>,
) -> ApiResult<(StatusCode, Json<Application>)> {
    let app = state.applications.create(&new).await?;
    Ok((StatusCode::CREATED, Json(app)))
}

/// GET /job-tracker/applications/stats
pub async fn application_stats(State(state): State<AppState>) -> ApiResult<Json<ApplicationStats>> {
    Ok(Json(state.applications.stats().await?))
}

/// GET /job-tracker/applications/:id
pub async fn get_application(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApplicationDetail>> {
    Ok(Json(state.applications.get(id).await?))
}

/// PATCH /job-tracker/applications/:id
pub async fn update_application(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<ApplicationUpdate>,
) -> ApiResult<Json<Application>> {
    Ok(Json(state.applications.update(id, &update).await?))
}

/// DELETE /job-tracker/applications/:id
pub async fn delete_application(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<StatusCode> {
    state.applications.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /job-tracker/applications/:id/emails/:email_id
pub async fn assign_email(
    State(state): State<AppState>,
    Path((id, email_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Application>> {
    Ok(Json(state.applications.assign_email(id, email_id).await?))
}

/// DELETE /job-tracker/applications/:id/emails/:email_id
pub async fn unassign_email(
    State(state): State<AppState>,
    Path((id, email_id)): Path<(i64, i64)>,
) -> ApiResult<Json<Application>> {
    Ok(Json(state.applications.unassign_email(id, email_id).await?))
}

pub fn application_routes() -> Router<AppState> {
    Router::new()
        .route("/applications", get(list_applications).post(create_application))
        .route("/applications/stats", get(application_stats))
        .route(
            "/applications/:id",
            get(get_application)
                .patch(update_application)
                .delete(delete_application),
        )
        .route(
            "/applications/:id/emails/:email_id",
            post(assign_email).delete(unassign_email),
        )
}
