pub mod job;
pub mod requests;
pub mod responses;
pub mod segment;

pub use job::{AspectRatio, JobStatus, LongformJob, VoiceGender, VoiceGenderMode, VoiceSettings};
pub use requests::CreateJobRequest;
pub use responses::{CreateJobResponse, HealthResponse, JobResponse, SegmentSummary};
pub use segment::{LongformSegment, SegmentStatus, Stage};
