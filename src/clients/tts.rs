use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::clients::{decode_error_response, PollOutcome, UpstreamThrottle};
use crate::error::{LongformError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct TtsSubmitRequest {
    pub text: String,
    pub voice_cfg: serde_json::Value,
    pub idempotency_key: String,
    #[serde(skip)]
    pub actor_user_id: String,
    pub job_id: Uuid,
}

/// Terminal result of an audio synthesis job. The signed URL is short-lived;
/// `audio_storage_path` is the authoritative reference.
#[derive(Debug, Clone)]
pub struct TtsArtifact {
    pub audio_url: String,
    pub audio_storage_path: String,
    pub audio_artifact_id: Option<String>,
    pub duration_sec: Option<f64>,
}

/// Client seam for the TTS synthesis service. Submission is idempotent per
/// segment: callers pass a deterministic key and the upstream returns the
/// same `tts_job_id` for a repeated submission.
#[async_trait]
pub trait TtsApi: Send + Sync {
    async fn submit(&self, req: &TtsSubmitRequest, auth_token: &str) -> Result<String>;
    async fn poll(
        &self,
        tts_job_id: &str,
        actor_user_id: &str,
        auth_token: &str,
    ) -> Result<PollOutcome<TtsArtifact>>;
}

#[derive(Debug, Deserialize)]
struct TtsSubmitResponse {
    tts_job_id: String,
}

#[derive(Debug, Deserialize)]
struct TtsPollBody {
    status: String,
    audio_url: Option<String>,
    audio_storage_path: Option<String>,
    audio_artifact_id: Option<String>,
    duration_sec: Option<f64>,
    error_code: Option<String>,
    error_message: Option<String>,
}

pub struct HttpTtsClient {
    http: reqwest::Client,
    base_url: String,
    throttle: Arc<UpstreamThrottle>,
    request_timeout: Duration,
}

impl HttpTtsClient {
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
impl TtsApi for HttpTtsClient {
    async fn submit(&self, req: &TtsSubmitRequest, auth_token: &str) -> Result<String> {
        self.throttle.acquire().await;

        let response = self
            .http
            .post(format!("{}/tts", self.base_url))
            .timeout(self.request_timeout)
            .bearer_auth(auth_token)
            .header("X-Actor-User-Id", &req.actor_user_id)
            .json(req)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(decode_error_response(response, &self.throttle).await);
        }

        let body: TtsSubmitResponse = response.json().await?;
        Ok(body.tts_job_id)
    }

    async fn poll(
        &self,
        tts_job_id: &str,
        actor_user_id: &str,
        auth_token: &str,
    ) -> Result<PollOutcome<TtsArtifact>> {
        self.throttle.acquire().await;

        let response = self
            .http
            .get(format!("{}/tts/{}", self.base_url, tts_job_id))
            .timeout(self.request_timeout)
            .bearer_auth(auth_token)
            .header("X-Actor-User-Id", actor_user_id)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(decode_error_response(response, &self.throttle).await);
        }

        let body: TtsPollBody = response.json().await?;
        match body.status.as_str() {
            "succeeded" => {
                let audio_url = body.audio_url.ok_or_else(|| LongformError::UpstreamFatal {
                    code: "malformed_response".to_string(),
                    message: "TTS succeeded without audio_url".to_string(),
                })?;
                let audio_storage_path =
                    body.audio_storage_path
                        .ok_or_else(|| LongformError::UpstreamFatal {
                            code: "malformed_response".to_string(),
                            message: "TTS succeeded without audio_storage_path".to_string(),
                        })?;
                Ok(PollOutcome::Succeeded(TtsArtifact {
                    audio_url,
                    audio_storage_path,
                    audio_artifact_id: body.audio_artifact_id,
                    duration_sec: body.duration_sec,
                }))
            }
            "failed" => Ok(PollOutcome::Failed {
                code: body.error_code.unwrap_or_else(|| "tts_failed".to_string()),
                message: body
                    .error_message
                    .unwrap_or_else(|| "TTS synthesis failed".to_string()),
            }),
            _ => Ok(PollOutcome::Pending),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_request_serializes_without_actor() {
        let req = TtsSubmitRequest {
            text: "Hello".to_string(),
            voice_cfg: serde_json::json!({ "locale": "en-US" }),
            idempotency_key: "abc".to_string(),
            actor_user_id: "user-1".to_string(),
            job_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&req).unwrap();
        // The actor travels in a header, not the body
        assert!(json.get("actor_user_id").is_none());
        assert_eq!(json["idempotency_key"], "abc");
        assert_eq!(json["text"], "Hello");
    }

    #[test]
    fn test_poll_body_parses_minimal_pending() {
        let body: TtsPollBody =
            serde_json::from_str(r#"{"status": "running"}"#).unwrap();
        assert_eq!(body.status, "running");
        assert!(body.audio_url.is_none());
    }

    #[test]
    fn test_poll_body_parses_success() {
        let body: TtsPollBody = serde_json::from_str(
            r#"{
                "status": "succeeded",
                "audio_url": "https://blobs/signed/a.mp3",
                "audio_storage_path": "tts/j/a.mp3",
                "audio_artifact_id": "art-1",
                "duration_sec": 9.5
            }"#,
        )
        .unwrap();
        assert_eq!(body.status, "succeeded");
        assert_eq!(body.duration_sec, Some(9.5));
    }
}
