//! Handlers for redirect rule management: CRUD, bulk edits, import/export
//! and the resolve preview.

use std::collections::BTreeMap;
use std::net::IpAddr;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::CONTENT_DISPOSITION;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use waypost_core::bulk::{plan_bulk_update, RedirectChanges};
use waypost_core::chain::validate_for_save;
use waypost_core::error::CoreError;
use waypost_core::redirect::{Redirect, RedirectInput};
use waypost_core::resolution::{Decision, InboundRequest};
use waypost_core::transfer::{check_size, detect_format, export_records, parse_import, plan_import};
use waypost_core::types::DbId;
use waypost_db::repositories::RedirectRepo;

use crate::error::{AppError, AppResult};
use crate::query::PaginationParams;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// A saved rule plus any advisory geo warnings.
#[derive(Debug, Serialize)]
pub struct SavedRedirect {
    #[serde(flatten)]
    pub redirect: Redirect,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RedirectPage {
    pub items: Vec<Redirect>,
    pub total: i64,
}

/// Body of `DELETE /redirects`: either explicit ids or `all: true`.
#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub ids: Option<Vec<DbId>>,
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteResult {
    pub deleted: u64,
}

#[derive(Debug, Deserialize)]
pub struct BulkUpdateRequest {
    pub ids: Vec<DbId>,
    pub changes: RedirectChanges,
}

#[derive(Debug, Serialize)]
pub struct ImportResult {
    pub count: usize,
    pub items: Vec<Redirect>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveParams {
    pub url: String,
    pub ip: Option<String>,
}

// ---------------------------------------------------------------------------
// CRUD
// ---------------------------------------------------------------------------

/// Build, check and store one rule.
async fn save_checked(state: &AppState, input: RedirectInput) -> AppResult<SavedRedirect> {
    let settings = state.config.redirects.settings();
    let candidate = Redirect::build(input, &settings);
    let existing = RedirectRepo::list_all(&state.pool).await?;
    let conflicts = validate_for_save(&candidate, &existing, &settings.home_url)?;

    let redirect = RedirectRepo::save(&state.pool, &candidate).await?;
    let warnings: Vec<String> = conflicts.iter().map(|c| c.message()).collect();
    if !warnings.is_empty() {
        tracing::warn!(redirect_id = redirect.id, ?warnings, "Overlapping geo rules");
    }
    Ok(SavedRedirect { redirect, warnings })
}

/// POST /api/v1/redirects
pub async fn create_redirect(
    State(state): State<AppState>,
    Json(mut input): Json<RedirectInput>,
) -> AppResult<(StatusCode, Json<DataResponse<SavedRedirect>>)> {
    input.id = 0;
    let saved = save_checked(&state, input).await?;
    tracing::info!(redirect_id = saved.redirect.id, source = %saved.redirect.source, "Redirect created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: saved })))
}

/// PUT /api/v1/redirects/{id}
pub async fn update_redirect(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(mut input): Json<RedirectInput>,
) -> AppResult<Json<DataResponse<SavedRedirect>>> {
    RedirectRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "redirect",
            id,
        })?;

    input.id = id;
    let saved = save_checked(&state, input).await?;
    tracing::info!(redirect_id = id, "Redirect updated");
    Ok(Json(DataResponse { data: saved }))
}

/// GET /api/v1/redirects/{id}
pub async fn get_redirect(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Redirect>>> {
    let redirect = RedirectRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "redirect",
            id,
        })?;
    Ok(Json(DataResponse { data: redirect }))
}

/// GET /api/v1/redirects
pub async fn list_redirects(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<DataResponse<RedirectPage>>> {
    let items = RedirectRepo::list(&state.pool, params.limit, params.offset).await?;
    let total = RedirectRepo::count(&state.pool).await?;
    Ok(Json(DataResponse {
        data: RedirectPage { items, total },
    }))
}

/// DELETE /api/v1/redirects
pub async fn delete_redirects(
    State(state): State<AppState>,
    Json(body): Json<DeleteRequest>,
) -> AppResult<Json<DataResponse<DeleteResult>>> {
    let deleted = match (body.all, body.ids.as_deref()) {
        (true, _) => RedirectRepo::delete(&state.pool, None).await?,
        (false, Some(ids)) => RedirectRepo::delete(&state.pool, Some(ids)).await?,
        (false, None) => {
            return Err(AppError::BadRequest(
                "Either 'ids' or 'all: true' is required".into(),
            ))
        }
    };
    tracing::info!(deleted, all = body.all, "Redirects deleted");
    Ok(Json(DataResponse {
        data: DeleteResult { deleted },
    }))
}

// ---------------------------------------------------------------------------
// Bulk
// ---------------------------------------------------------------------------

/// POST /api/v1/redirects/bulk
///
/// Applies the same changes to every listed rule. Either every rule is
/// updated or none is.
pub async fn bulk_update(
    State(state): State<AppState>,
    Json(body): Json<BulkUpdateRequest>,
) -> AppResult<Json<DataResponse<BTreeMap<DbId, Redirect>>>> {
    let settings = state.config.redirects.settings();
    let existing = RedirectRepo::list_all(&state.pool).await?;
    let planned = plan_bulk_update(&body.ids, &body.changes, &existing, &settings)?;

    let saved = RedirectRepo::bulk_upsert(&state.pool, &planned).await?;
    tracing::info!(count = saved.len(), "Bulk redirect update applied");

    Ok(Json(DataResponse {
        data: saved.into_iter().map(|r| (r.id, r)).collect(),
    }))
}

// ---------------------------------------------------------------------------
// Import / export
// ---------------------------------------------------------------------------

/// POST /api/v1/redirects/import
///
/// Multipart upload with a single `file` field (CSV or JSON). The file is
/// imported whole or not at all.
pub async fn import_redirects(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<ImportResult>>)> {
    let max_bytes = state.config.redirects.import_max_bytes;

    let mut upload = None;
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let format = detect_format(field.content_type(), field.file_name())?;

        let mut data = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?
        {
            check_size(data.len() + chunk.len(), max_bytes)?;
            data.extend_from_slice(&chunk);
        }
        upload = Some((format, data));
        break;
    }

    let (format, data) =
        upload.ok_or_else(|| AppError::BadRequest("Missing 'file' field".into()))?;

    let inputs = parse_import(format, &data)?;
    let existing = RedirectRepo::list_all(&state.pool).await?;
    let planned = plan_import(inputs, &existing, &state.config.redirects.settings())?;

    let items = RedirectRepo::bulk_upsert(&state.pool, &planned).await?;
    tracing::info!(count = items.len(), ?format, "Redirects imported");

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: ImportResult {
                count: items.len(),
                items,
            },
        }),
    ))
}

/// GET /api/v1/redirects/export
///
/// Returns a bare JSON array so the file can be fed straight back to import.
pub async fn export_redirects(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let redirects = RedirectRepo::list_all(&state.pool).await?;
    let body = serde_json::to_vec(&export_records(&redirects))
        .map_err(|e| AppError::InternalError(format!("Failed to encode export: {e}")))?;

    Ok((
        [
            (axum::http::header::CONTENT_TYPE, "application/json"),
            (CONTENT_DISPOSITION, "attachment; filename=\"redirects.json\""),
        ],
        body,
    ))
}

// ---------------------------------------------------------------------------
// Resolve preview
// ---------------------------------------------------------------------------

/// GET /api/v1/redirects/resolve?url=&ip=
///
/// What the delivery layer would do for `url`, without redirecting.
pub async fn resolve_preview(
    State(state): State<AppState>,
    Query(params): Query<ResolveParams>,
) -> AppResult<Json<DataResponse<Decision>>> {
    let client_ip = params
        .ip
        .as_deref()
        .map(str::parse::<IpAddr>)
        .transpose()
        .map_err(|e| AppError::BadRequest(format!("Invalid ip: {e}")))?;

    let decision = state
        .engine()
        .resolve(&InboundRequest::new(params.url, client_ip))
        .await;
    Ok(Json(DataResponse { data: decision }))
}
