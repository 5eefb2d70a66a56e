use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use sqlx::types::Json as SqlJson;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use uuid::Uuid;

use crate::auth::{principal_middleware, AuthKeys, Principal};
use crate::config::SIGNED_URL_TTL;
use crate::context::CoreContext;
use crate::error::{LongformError, Result};
use crate::logging::{access_log_middleware, request_id_middleware};
use crate::models::job::{JobStatus, LongformJob, VoiceSettings};
use crate::models::requests::CreateJobRequest;
use crate::models::responses::{CreateJobResponse, HealthResponse, JobResponse, SegmentSummary};
use crate::segmenter::plan_segments;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ctx: CoreContext,
    pub auth: AuthKeys,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route("/api/longform/jobs", post(create_job))
        .route("/api/longform/jobs/:id", get(get_job))
        .route("/api/longform/jobs/:id/segments", get(list_segments))
        .route("/internal/longform/jobs/:id", get(internal_get_job))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            principal_middleware,
        ));

    Router::new()
        .merge(protected)
        .route("/api/health", get(health))
        .layer(middleware::from_fn(access_log_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TimeoutLayer::new(state.ctx.config.request_timeout))
        .layer(cors)
        .with_state(state)
}

/// Unknown and malformed ids are indistinguishable to the caller.
fn parse_job_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| LongformError::NotFound(format!("job {}", raw)))
}

// HTTP Handlers

/// Create a longform job: validate, plan segments, persist job + segments
/// atomically.
async fn create_job(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<CreateJobResponse>)> {
    req.validate()?;

    let settings = VoiceSettings::from_value(&req.voice_cfg);
    let planned = plan_segments(
        &req.script_text,
        req.segment_seconds,
        req.max_segment_seconds,
        &settings.locale,
    )?;

    let now = Utc::now();
    let job = LongformJob {
        id: Uuid::new_v4(),
        user_id: principal.acting_user_id().to_string(),
        status: JobStatus::Queued,
        face_artifact_id: req.face_artifact_id,
        aspect_ratio: req.aspect_ratio,
        segment_seconds: req.segment_seconds,
        max_segment_seconds: req.max_segment_seconds,
        voice_cfg: SqlJson(object_or_empty(req.voice_cfg)),
        voice_gender_mode: req.voice_gender_mode,
        voice_gender: req.voice_gender,
        script_text: req.script_text,
        total_segments: planned.len() as u32,
        completed_segments: 0,
        final_storage_path: None,
        error_code: None,
        error_message: None,
        tags: SqlJson(object_or_empty(req.tags)),
        // Workers call collaborator services with this job-scoped bearer,
        // never the end-user's session token
        auth_token: format!("svc-{}", Uuid::new_v4()),
        created_at: now,
        updated_at: now,
    };

    state.ctx.store.create_job(&job, &planned).await?;

    tracing::info!(
        job_id = %job.id,
        user_id = %job.user_id,
        total_segments = job.total_segments,
        "created longform job"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateJobResponse { job_id: job.id }),
    ))
}

fn object_or_empty(value: serde_json::Value) -> serde_json::Value {
    if value.is_object() {
        value
    } else {
        serde_json::json!({})
    }
}

/// Job header with a freshly minted signed URL once succeeded.
async fn get_job(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>> {
    let job_id = parse_job_id(&id)?;
    let job = state.ctx.store.get_job(job_id).await?;
    if !principal.owns(&job.user_id) {
        return Err(LongformError::Forbidden);
    }

    let final_video_url = match (&job.status, &job.final_storage_path) {
        (JobStatus::Succeeded, Some(path)) => {
            Some(state.ctx.blobs.sign(path, SIGNED_URL_TTL).await?)
        }
        _ => None,
    };

    Ok(Json(JobResponse::from_job(&job, final_video_url)))
}

/// Ordered segment summaries; signed URLs are re-minted per read because
/// the stored ones may have expired.
async fn list_segments(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SegmentSummary>>> {
    let job_id = parse_job_id(&id)?;
    let job = state.ctx.store.get_job(job_id).await?;
    if !principal.owns(&job.user_id) {
        return Err(LongformError::Forbidden);
    }

    let segments = state.ctx.store.list_segments_ordered(job_id).await?;
    let mut summaries = Vec::with_capacity(segments.len());
    for segment in &segments {
        let url = match &segment.segment_storage_path {
            Some(path) => Some(state.ctx.blobs.sign(path, SIGNED_URL_TTL).await?),
            None => None,
        };
        summaries.push(SegmentSummary::from_segment(segment, url));
    }

    Ok(Json(summaries))
}

#[derive(Debug, Serialize)]
struct InternalJobResponse {
    #[serde(flatten)]
    job: JobResponse,
    segment_status_counts: std::collections::HashMap<String, u32>,
    locked_segments: u32,
}

/// Worker introspection for sibling services; requires the service
/// principal, and the actor header scopes the access like a user read.
async fn internal_get_job(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> Result<Json<InternalJobResponse>> {
    if !principal.is_service() {
        return Err(LongformError::Forbidden);
    }
    let job_id = parse_job_id(&id)?;
    let job = state.ctx.store.get_job(job_id).await?;
    if !principal.owns(&job.user_id) {
        return Err(LongformError::Forbidden);
    }

    let counts = state.ctx.store.count_by_status(job_id).await?;
    let segments = state.ctx.store.list_segments_ordered(job_id).await?;
    let locked = segments.iter().filter(|s| s.locked_by.is_some()).count() as u32;

    Ok(Json(InternalJobResponse {
        job: JobResponse::from_job(&job, None),
        segment_status_counts: counts
            .into_iter()
            .map(|(status, count)| (status.as_str().to_string(), count))
            .collect(),
        locked_segments: locked,
    }))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_job_id_malformed_is_not_found() {
        let err = parse_job_id("not-a-uuid").unwrap_err();
        assert!(matches!(err, LongformError::NotFound(_)));
    }

    #[test]
    fn test_parse_job_id_valid() {
        let id = Uuid::new_v4();
        assert_eq!(parse_job_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_object_or_empty_replaces_null() {
        assert_eq!(object_or_empty(serde_json::Value::Null), serde_json::json!({}));
        let obj = serde_json::json!({ "a": 1 });
        assert_eq!(object_or_empty(obj.clone()), obj);
    }
}
