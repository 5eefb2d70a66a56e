use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two upstream phases of the per-segment pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Audio,
    Video,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Audio => "audio",
            Stage::Video => "video",
        }
    }
}

/// Segment lifecycle: queued → audio_running → video_running → succeeded,
/// any → failed. Transitions are strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SegmentStatus {
    Queued,
    AudioRunning,
    VideoRunning,
    Succeeded,
    Failed,
}

impl SegmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentStatus::Queued => "queued",
            SegmentStatus::AudioRunning => "audio_running",
            SegmentStatus::VideoRunning => "video_running",
            SegmentStatus::Succeeded => "succeeded",
            SegmentStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SegmentStatus::Succeeded | SegmentStatus::Failed)
    }

    /// The stage a worker must drive when holding a segment in this state.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            SegmentStatus::Queued | SegmentStatus::AudioRunning => Some(Stage::Audio),
            SegmentStatus::VideoRunning => Some(Stage::Video),
            _ => None,
        }
    }

    /// Forward-only transition check. Failure is reachable from any
    /// non-terminal state.
    pub fn can_transition_to(&self, next: SegmentStatus) -> bool {
        use SegmentStatus::*;
        match (self, next) {
            (Queued, AudioRunning) => true,
            (AudioRunning, VideoRunning) => true,
            (VideoRunning, Succeeded) => true,
            (Queued | AudioRunning | VideoRunning, Failed) => true,
            // Re-entrant writes within a running state (e.g. recording a
            // submitted upstream job id) keep the same status
            (AudioRunning, AudioRunning) | (VideoRunning, VideoRunning) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LongformSegment {
    pub id: Uuid,
    pub job_id: Uuid,
    pub segment_index: u32,
    pub status: SegmentStatus,
    pub text_chunk: String,
    /// Planning estimate; the TTS stage's true duration may differ and is
    /// recorded in `actual_duration_sec` when reported.
    pub duration_sec: u32,
    pub actual_duration_sec: Option<f64>,
    pub tts_job_id: Option<String>,
    pub audio_url: Option<String>,
    /// Stable object path for the synthesized audio; survives signed-URL
    /// expiry so a reclaiming worker can still feed the fusion stage.
    pub audio_storage_path: Option<String>,
    pub audio_artifact_id: Option<String>,
    pub fusion_job_id: Option<String>,
    pub provider_job_id: Option<String>,
    pub segment_video_url: Option<String>,
    pub segment_storage_path: Option<String>,
    pub idempotency_key_audio: Option<String>,
    pub idempotency_key_video: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
