use std::env;
use std::time::Duration;

/// Maximum allowed script length for create requests (in characters)
///
/// Requests exceeding this limit are rejected with a validation error.
pub const MAX_SCRIPT_LENGTH: usize = 100_000;

/// Allowed bounds for segment_seconds / max_segment_seconds
pub const SEGMENT_SECONDS_MIN: u32 = 5;
pub const SEGMENT_SECONDS_MAX: u32 = 120;

/// Format string parts for blob store object paths
pub const BLOB_PATH_PREFIX: &str = "longform";
pub const FINAL_OBJECT_NAME: &str = "final.mp4";

/// Default TTL for signed URLs minted on API reads
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(15 * 60);

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

/// Process-wide configuration, loaded once at startup from the environment
/// and carried inside `CoreContext`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Database connection string (default: local sqlite file)
    pub database_url: String,
    /// Base URL of the TTS synthesis service
    pub tts_base_url: String,
    /// Base URL of the lip-sync fusion service
    pub fusion_base_url: String,
    /// Base URL of the blob store service
    pub blob_base_url: String,
    /// Shared secret for service-to-service calls
    pub service_secret: String,
    /// HS256 secret for end-user bearer tokens
    pub jwt_secret: String,
    /// HTTP listen port
    pub port: u16,
    /// Identifier recorded in `locked_by`; unique per worker process
    pub worker_id: String,
    /// Concurrency budget for audio-stage segments in this process
    pub audio_concurrency: usize,
    /// Concurrency budget for video-stage segments in this process
    pub video_concurrency: usize,
    /// Max inflight segments per job, for cross-job fairness
    pub per_job_inflight_cap: usize,
    /// Segment lock TTL; stale locks are reclaimable after this
    pub lock_ttl: Duration,
    /// Wall-clock budget for a single TTS poll loop
    pub tts_poll_budget: Duration,
    /// Wall-clock budget for a single fusion poll loop
    pub fusion_poll_budget: Duration,
    /// Steady-state requests/second allowed against each upstream
    pub upstream_rate_per_second: u32,
    pub upstream_burst_size: u32,
    /// Per-request deadline for upstream HTTP calls
    pub upstream_request_timeout: Duration,
    /// Interval of the self-healing job sweep
    pub sweep_interval: Duration,
    /// Per-request timeout on the HTTP API
    pub request_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let worker_id = env::var("LONGFORM_WORKER_ID")
            .unwrap_or_else(|_| format!("worker-{}", uuid::Uuid::new_v4()));

        Self {
            database_url: env::var("LONGFORM_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://longform.db?mode=rwc".to_string()),
            tts_base_url: env::var("TTS_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8001".to_string()),
            fusion_base_url: env::var("FUSION_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8002".to_string()),
            blob_base_url: env::var("BLOB_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8003".to_string()),
            service_secret: env::var("SERVICE_SECRET").unwrap_or_default(),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_default(),
            port: env_u32("PORT", 3000) as u16,
            worker_id,
            audio_concurrency: env_usize("LONGFORM_AUDIO_CONCURRENCY", 4),
            video_concurrency: env_usize("LONGFORM_VIDEO_CONCURRENCY", 2),
            per_job_inflight_cap: env_usize("LONGFORM_PER_JOB_INFLIGHT", 2),
            lock_ttl: Duration::from_secs(env_u64("LONGFORM_LOCK_TTL_SECONDS", 600)),
            tts_poll_budget: Duration::from_secs(env_u64("TTS_POLL_BUDGET_SECONDS", 300)),
            fusion_poll_budget: Duration::from_secs(env_u64("FUSION_POLL_BUDGET_SECONDS", 1200)),
            upstream_rate_per_second: env_u32("UPSTREAM_RATE_PER_SECOND", 5),
            upstream_burst_size: env_u32("UPSTREAM_BURST_SIZE", 10),
            upstream_request_timeout: Duration::from_secs(env_u64(
                "UPSTREAM_REQUEST_TIMEOUT_SECONDS",
                30,
            )),
            sweep_interval: Duration::from_secs(env_u64("LONGFORM_SWEEP_INTERVAL_SECONDS", 60)),
            request_timeout: Duration::from_secs(env_u64("REQUEST_TIMEOUT_SECONDS", 60)),
        }
    }
}

/// Stable object path for the stitched final video. Segment videos keep the
/// storage path the fusion provider reports; only the final artifact's
/// location is owned by this engine.
pub fn final_object_path(job_id: &str) -> String {
    format!("{}/{}/{}", BLOB_PATH_PREFIX, job_id, FINAL_OBJECT_NAME)
}
