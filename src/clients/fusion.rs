use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::clients::{decode_error_response, PollOutcome, UpstreamThrottle};
use crate::error::{LongformError, Result};
use crate::models::job::AspectRatio;

#[derive(Debug, Clone, Serialize)]
pub struct FusionSubmitRequest {
    pub face_artifact_id: String,
    /// Authoritative reference; the signed URL is a fallback for providers
    /// that cannot read from the blob store directly.
    pub audio_storage_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    pub aspect_ratio: AspectRatio,
    pub idempotency_key: String,
    pub consent: serde_json::Value,
    #[serde(skip)]
    pub actor_user_id: String,
    pub job_id: Uuid,
    pub segment_index: u32,
}

/// Terminal result of a lip-sync fusion job.
#[derive(Debug, Clone)]
pub struct FusionArtifact {
    pub video_url: String,
    pub video_storage_path: String,
    pub provider_job_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FusionSubmission {
    pub fusion_job_id: String,
    pub provider_job_id: Option<String>,
}

/// Client seam for the per-segment lip-sync provider. Same shape as the TTS
/// client; the fusion stage can run far longer, so callers budget its poll
/// loop separately.
#[async_trait]
pub trait FusionApi: Send + Sync {
    async fn submit(&self, req: &FusionSubmitRequest, auth_token: &str) -> Result<FusionSubmission>;
    async fn poll(
        &self,
        fusion_job_id: &str,
        actor_user_id: &str,
        auth_token: &str,
    ) -> Result<PollOutcome<FusionArtifact>>;
}

#[derive(Debug, Deserialize)]
struct FusionSubmitResponse {
    fusion_job_id: String,
    provider_job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FusionPollBody {
    status: String,
    video_url: Option<String>,
    video_storage_path: Option<String>,
    provider_job_id: Option<String>,
    error_code: Option<String>,
    error_message: Option<String>,
}

pub struct HttpFusionClient {
    http: reqwest::Client,
    base_url: String,
    throttle: Arc<UpstreamThrottle>,
    request_timeout: Duration,
}

impl HttpFusionClient {
    pub fn new(
        base_url: String,
        throttle: Arc<UpstreamThrottle>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            throttle,
            request_timeout,
        }
    }
}

#[async_trait]
impl FusionApi for HttpFusionClient {
    async fn submit(
        &self,
        req: &FusionSubmitRequest,
        auth_token: &str,
    ) -> Result<FusionSubmission> {
        self.throttle.acquire().await;

        let response = self
            .http
            .post(format!("{}/jobs", self.base_url))
            .timeout(self.request_timeout)
            .bearer_auth(auth_token)
            .header("X-Actor-User-Id", &req.actor_user_id)
            .json(req)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(decode_error_response(response, &self.throttle).await);
        }

        let body: FusionSubmitResponse = response.json().await?;
        Ok(FusionSubmission {
            fusion_job_id: body.fusion_job_id,
            provider_job_id: body.provider_job_id,
        })
    }

    async fn poll(
        &self,
        fusion_job_id: &str,
        actor_user_id: &str,
        auth_token: &str,
    ) -> Result<PollOutcome<FusionArtifact>> {
        self.throttle.acquire().await;

        let response = self
            .http
            .get(format!("{}/jobs/{}", self.base_url, fusion_job_id))
            .timeout(self.request_timeout)
            .bearer_auth(auth_token)
            .header("X-Actor-User-Id", actor_user_id)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(decode_error_response(response, &self.throttle).await);
        }

        let body: FusionPollBody = response.json().await?;
        match body.status.as_str() {
            "succeeded" => {
                let video_url = body.video_url.ok_or_else(|| LongformError::UpstreamFatal {
                    code: "malformed_response".to_string(),
                    message: "Fusion succeeded without video_url".to_string(),
                })?;
                let video_storage_path =
                    body.video_storage_path
                        .ok_or_else(|| LongformError::UpstreamFatal {
                            code: "malformed_response".to_string(),
                            message: "Fusion succeeded without video_storage_path".to_string(),
                        })?;
                Ok(PollOutcome::Succeeded(FusionArtifact {
                    video_url,
                    video_storage_path,
                    provider_job_id: body.provider_job_id,
                }))
            }
            "failed" => Ok(PollOutcome::Failed {
                code: body
                    .error_code
                    .unwrap_or_else(|| "fusion_failed".to_string()),
                message: body
                    .error_message
                    .unwrap_or_else(|| "Lip-sync fusion failed".to_string()),
            }),
            _ => Ok(PollOutcome::Pending),
        }
    }
}
