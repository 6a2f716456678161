//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use studydesk_core::backup::Backup;
use studydesk_core::domain::{ClassFields, ItemDraft, ItemKind, ItemPatch};
use studydesk_core::error::DataError;
use studydesk_core::ports::UserProfile;

use crate::session::UserData;
use crate::sharing;
use crate::web::state::AppState;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        create_item_handler,
        patch_item_handler,
        delete_item_handler,
        toggle_task_handler,
        export_backup_handler,
        import_backup_handler,
        clear_data_handler,
        import_schedule_handler,
        shared_note_handler,
        shared_schedule_handler,
    ),
    components(
        schemas(CreatedResponse, ToggleResponse, ImportReport, ClearReport, ErrorBody)
    ),
    tags(
        (name = "StudyDesk API", description = "API endpoints for the student planner's data service.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The response payload sent after successfully creating a record.
#[derive(Serialize, ToSchema)]
pub struct CreatedResponse {
    id: Uuid,
}

/// The outcome of toggling a task: the new flag plus the (possibly
/// advanced) study streak.
#[derive(Serialize, ToSchema)]
pub struct ToggleResponse {
    completed: bool,
    streak: u32,
    last_study_date: Option<NaiveDate>,
}

#[derive(Serialize, ToSchema)]
pub struct ImportReport {
    imported: usize,
}

#[derive(Serialize, ToSchema)]
pub struct ClearReport {
    removed: usize,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    error: String,
}

type HandlerError = (StatusCode, Json<ErrorBody>);

/// Maps a data-layer failure onto an HTTP status plus a JSON error body.
fn reject(err: DataError) -> HandlerError {
    let status = match &err {
        DataError::Validation(_) => StatusCode::BAD_REQUEST,
        DataError::NotFound(_) => StatusCode::NOT_FOUND,
        DataError::Unauthorized => StatusCode::UNAUTHORIZED,
        DataError::RetryExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        DataError::Batch { .. } | DataError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("request failed: {err}");
    }
    (status, Json(ErrorBody { error: err.to_string() }))
}

fn bad_request(message: impl Into<String>) -> HandlerError {
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error: message.into() }))
}

/// Resolves a `{kind}` path segment against the collection names.
fn parse_kind(raw: &str) -> Result<ItemKind, HandlerError> {
    ItemKind::ALL
        .into_iter()
        .find(|kind| kind.collection() == raw)
        .ok_or_else(|| bad_request(format!("'{raw}' is not a known collection")))
}

fn user_data(state: &AppState, profile: &UserProfile) -> UserData {
    UserData::new(state.store.clone(), profile.id)
}

//=========================================================================================
// Authenticated Handlers
//=========================================================================================

/// Create a record of any kind under the signed-in user.
#[utoipa::path(
    post,
    path = "/items",
    request_body(content_type = "application/json", description = "A draft tagged with its kind, e.g. {\"kind\": \"task\", \"fields\": {...}}."),
    responses(
        (status = 201, description = "Record created", body = CreatedResponse),
        (status = 400, description = "Validation failed", body = ErrorBody),
        (status = 401, description = "Missing or invalid credentials")
    )
)]
pub async fn create_item_handler(
    State(state): State<Arc<AppState>>,
    Extension(profile): Extension<UserProfile>,
    Json(draft): Json<ItemDraft>,
) -> Result<impl IntoResponse, HandlerError> {
    let id = user_data(&state, &profile).add(draft).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

/// Apply a partial update to an owned record.
#[utoipa::path(
    patch,
    path = "/items/{kind}/{id}",
    request_body(content_type = "application/json", description = "An object holding only the fields to change."),
    responses(
        (status = 204, description = "Record updated"),
        (status = 400, description = "Unknown collection or malformed patch", body = ErrorBody),
        (status = 404, description = "No such record under this user", body = ErrorBody)
    ),
    params(
        ("kind" = String, Path, description = "The collection name, e.g. 'tasks'."),
        ("id" = Uuid, Path, description = "The record id.")
    )
)]
pub async fn patch_item_handler(
    State(state): State<Arc<AppState>>,
    Extension(profile): Extension<UserProfile>,
    Path((kind, id)): Path<(String, Uuid)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, HandlerError> {
    let kind = parse_kind(&kind)?;
    let patch = ItemPatch::from_value(kind, body).map_err(reject)?;
    user_data(&state, &profile).update(id, patch).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delete an owned record. Deleting a record that is already gone succeeds.
#[utoipa::path(
    delete,
    path = "/items/{kind}/{id}",
    responses(
        (status = 204, description = "Record deleted (or already absent)"),
        (status = 400, description = "Unknown collection", body = ErrorBody)
    ),
    params(
        ("kind" = String, Path, description = "The collection name, e.g. 'tasks'."),
        ("id" = Uuid, Path, description = "The record id.")
    )
)]
pub async fn delete_item_handler(
    State(state): State<Arc<AppState>>,
    Extension(profile): Extension<UserProfile>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<impl IntoResponse, HandlerError> {
    let kind = parse_kind(&kind)?;
    user_data(&state, &profile).remove(kind, id).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Flip a task's completed flag, advancing the study streak on completion.
#[utoipa::path(
    post,
    path = "/tasks/{id}/toggle",
    responses(
        (status = 200, description = "Task toggled", body = ToggleResponse),
        (status = 404, description = "No such task under this user", body = ErrorBody)
    ),
    params(
        ("id" = Uuid, Path, description = "The task id.")
    )
)]
pub async fn toggle_task_handler(
    State(state): State<Arc<AppState>>,
    Extension(profile): Extension<UserProfile>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let (completed, streak) = user_data(&state, &profile)
        .toggle_task(id)
        .await
        .map_err(reject)?;
    Ok(Json(ToggleResponse {
        completed,
        streak: streak.streak,
        last_study_date: streak.last_study_date,
    }))
}

/// Export every collection as one backup document.
#[utoipa::path(
    get,
    path = "/backup",
    responses(
        (status = 200, description = "A backup document with one array per collection"),
        (status = 401, description = "Missing or invalid credentials")
    )
)]
pub async fn export_backup_handler(
    State(state): State<Arc<AppState>>,
    Extension(profile): Extension<UserProfile>,
) -> Result<impl IntoResponse, HandlerError> {
    let backup = user_data(&state, &profile).export_backup().await.map_err(reject)?;
    Ok(Json(backup))
}

/// Import a backup document, re-creating every record under the signed-in
/// user.
#[utoipa::path(
    post,
    path = "/backup",
    request_body(content_type = "application/json", description = "A backup document as produced by GET /backup."),
    responses(
        (status = 200, description = "All records imported", body = ImportReport),
        (status = 400, description = "A record failed validation; nothing was written", body = ErrorBody),
        (status = 500, description = "A chunk failed partway; earlier chunks remain", body = ErrorBody)
    )
)]
pub async fn import_backup_handler(
    State(state): State<Arc<AppState>>,
    Extension(profile): Extension<UserProfile>,
    Json(backup): Json<Backup>,
) -> Result<impl IntoResponse, HandlerError> {
    let imported = user_data(&state, &profile).import_all(&backup).await.map_err(reject)?;
    Ok(Json(ImportReport { imported }))
}

/// Delete every record of every kind owned by the signed-in user and reset
/// the streak.
#[utoipa::path(
    delete,
    path = "/data",
    responses(
        (status = 200, description = "All data cleared", body = ClearReport),
        (status = 401, description = "Missing or invalid credentials")
    )
)]
pub async fn clear_data_handler(
    State(state): State<Arc<AppState>>,
    Extension(profile): Extension<UserProfile>,
) -> Result<impl IntoResponse, HandlerError> {
    let removed = user_data(&state, &profile).clear_all().await.map_err(reject)?;
    Ok(Json(ClearReport { removed }))
}

/// Copy a shared class schedule into the signed-in user's own account.
#[utoipa::path(
    post,
    path = "/schedule/import",
    request_body(content_type = "application/json", description = "An array of class sessions, as returned by the schedule share endpoint."),
    responses(
        (status = 200, description = "Schedule imported", body = ImportReport),
        (status = 400, description = "A session failed validation; nothing was written", body = ErrorBody)
    )
)]
pub async fn import_schedule_handler(
    State(state): State<Arc<AppState>>,
    Extension(profile): Extension<UserProfile>,
    Json(sessions): Json<Vec<ClassFields>>,
) -> Result<impl IntoResponse, HandlerError> {
    let data = user_data(&state, &profile);
    let imported = sharing::import_schedule(&data, sessions).await.map_err(reject)?;
    Ok(Json(ImportReport { imported }))
}

//=========================================================================================
// Public (Unauthenticated) Handlers
//=========================================================================================

/// Fetch a note through its share link. Private and missing notes are both
/// 404.
#[utoipa::path(
    get,
    path = "/share/notes/{note_id}",
    responses(
        (status = 200, description = "The note's shareable content"),
        (status = 404, description = "No shared note under this id", body = ErrorBody)
    ),
    params(
        ("note_id" = Uuid, Path, description = "The note id from the share link.")
    )
)]
pub async fn shared_note_handler(
    State(state): State<Arc<AppState>>,
    Path(note_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let note = sharing::public_note(state.store.as_ref(), note_id)
        .await
        .map_err(reject)?;
    Ok(Json(note))
}

/// Fetch a user's weekly class schedule through its share link.
#[utoipa::path(
    get,
    path = "/share/schedules/{user_id}",
    responses(
        (status = 200, description = "The user's class sessions, ids and timestamps stripped")
    ),
    params(
        ("user_id" = Uuid, Path, description = "The sharing user's id.")
    )
)]
pub async fn shared_schedule_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let schedule = sharing::public_schedule(state.store.as_ref(), user_id)
        .await
        .map_err(reject)?;
    Ok(Json(schedule))
}
