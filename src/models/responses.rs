use serde::Serialize;
use uuid::Uuid;

use crate::models::job::{JobStatus, LongformJob};
use crate::models::segment::{LongformSegment, SegmentStatus};

#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub job_id: Uuid,
}

/// Job-read body. `error_code`/`error_message` are always-present keys
/// (null until the job fails), matching the read contract.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub total_segments: u32,
    pub completed_segments: u32,
    pub final_video_url: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl JobResponse {
    /// `final_video_url` is minted by the caller; it is a short-TTL signed
    /// URL and never persisted.
    pub fn from_job(job: &LongformJob, final_video_url: Option<String>) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            total_segments: job.total_segments,
            completed_segments: job.completed_segments,
            final_video_url,
            error_code: job.error_code.clone(),
            error_message: job.error_message.clone(),
        }
    }
}

/// Segment summary. Unlike the job body, the error keys here are optional
/// in the contract (`error_code?`) and are omitted when absent.
#[derive(Debug, Serialize)]
pub struct SegmentSummary {
    pub segment_index: u32,
    pub status: SegmentStatus,
    pub segment_video_url: Option<String>,
    pub duration_sec: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl SegmentSummary {
    pub fn from_segment(segment: &LongformSegment, segment_video_url: Option<String>) -> Self {
        Self {
            segment_index: segment.segment_index,
            status: segment.status,
            segment_video_url,
            duration_sec: segment.duration_sec,
            error_code: segment.error_code.clone(),
            error_message: segment.error_message.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
