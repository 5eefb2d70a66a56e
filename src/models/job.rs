use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

/// Job lifecycle: queued → running → stitching → succeeded, any → failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Stitching,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Stitching => "stitching",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    /// Terminal jobs never regress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    #[sqlx(rename = "16:9")]
    Wide,
    #[serde(rename = "9:16")]
    #[sqlx(rename = "9:16")]
    Tall,
    #[serde(rename = "1:1")]
    #[sqlx(rename = "1:1")]
    Square,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Wide => "16:9",
            AspectRatio::Tall => "9:16",
            AspectRatio::Square => "1:1",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum VoiceGenderMode {
    Auto,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum VoiceGender {
    Male,
    Female,
}

/// Strongly-typed view over the opaque `voice_cfg` mapping. The raw JSON is
/// stored untouched so unknown keys survive round-trips; this view covers
/// only the fields the engine itself reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSettings {
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default = "default_output_format")]
    pub output_format: String,
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_output_format() -> String {
    "mp3".to_string()
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            voice: None,
            output_format: default_output_format(),
        }
    }
}

impl VoiceSettings {
    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LongformJob {
    pub id: Uuid,
    pub user_id: String,
    pub status: JobStatus,
    pub face_artifact_id: String,
    pub aspect_ratio: AspectRatio,
    pub segment_seconds: u32,
    pub max_segment_seconds: u32,
    pub voice_cfg: Json<serde_json::Value>,
    pub voice_gender_mode: VoiceGenderMode,
    pub voice_gender: Option<VoiceGender>,
    pub script_text: String,
    pub total_segments: u32,
    pub completed_segments: u32,
    pub final_storage_path: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub tags: Json<serde_json::Value>,
    /// Service-scoped bearer used by workers on behalf of this job. Never
    /// the end-user's session token.
    pub auth_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
