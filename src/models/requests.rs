use serde::Deserialize;

use crate::config::{MAX_SCRIPT_LENGTH, SEGMENT_SECONDS_MAX, SEGMENT_SECONDS_MIN};
use crate::error::{LongformError, Result};
use crate::models::job::{AspectRatio, VoiceGender, VoiceGenderMode};

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub face_artifact_id: String,
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub voice_cfg: serde_json::Value,
    #[serde(default = "default_segment_seconds")]
    pub segment_seconds: u32,
    #[serde(default = "default_max_segment_seconds")]
    pub max_segment_seconds: u32,
    #[serde(default = "default_voice_gender_mode")]
    pub voice_gender_mode: VoiceGenderMode,
    #[serde(default)]
    pub voice_gender: Option<VoiceGender>,
    pub script_text: String,
    #[serde(default)]
    pub tags: serde_json::Value,
}

fn default_segment_seconds() -> u32 {
    30
}

fn default_max_segment_seconds() -> u32 {
    45
}

fn default_voice_gender_mode() -> VoiceGenderMode {
    VoiceGenderMode::Auto
}

impl CreateJobRequest {
    /// Field-level validation; the first violated field is reported with a
    /// 422 and its message.
    pub fn validate(&self) -> Result<()> {
        if self.face_artifact_id.trim().is_empty() {
            return Err(LongformError::validation(
                "face_artifact_id",
                "must not be empty",
            ));
        }
        if self.script_text.trim().is_empty() {
            return Err(LongformError::validation(
                "script_text",
                "must not be empty",
            ));
        }
        if self.script_text.len() > MAX_SCRIPT_LENGTH {
            return Err(LongformError::validation(
                "script_text",
                format!("must not exceed {} characters", MAX_SCRIPT_LENGTH),
            ));
        }
        if !(SEGMENT_SECONDS_MIN..=SEGMENT_SECONDS_MAX).contains(&self.segment_seconds) {
            return Err(LongformError::validation(
                "segment_seconds",
                format!(
                    "must be in {}..={}",
                    SEGMENT_SECONDS_MIN, SEGMENT_SECONDS_MAX
                ),
            ));
        }
        if !(SEGMENT_SECONDS_MIN..=SEGMENT_SECONDS_MAX).contains(&self.max_segment_seconds) {
            return Err(LongformError::validation(
                "max_segment_seconds",
                format!(
                    "must be in {}..={}",
                    SEGMENT_SECONDS_MIN, SEGMENT_SECONDS_MAX
                ),
            ));
        }
        if self.max_segment_seconds < self.segment_seconds {
            return Err(LongformError::validation(
                "max_segment_seconds",
                "must be >= segment_seconds",
            ));
        }
        if self.voice_gender_mode == VoiceGenderMode::Manual && self.voice_gender.is_none() {
            return Err(LongformError::validation(
                "voice_gender",
                "required when voice_gender_mode is manual",
            ));
        }
        if !self.voice_cfg.is_object() && !self.voice_cfg.is_null() {
            return Err(LongformError::validation(
                "voice_cfg",
                "must be a JSON object",
            ));
        }
        if !self.tags.is_object() && !self.tags.is_null() {
            return Err(LongformError::validation("tags", "must be a JSON object"));
        }
        Ok(())
    }
}
