/// Schema bootstrap, applied idempotently at startup. Migrations proper are
/// owned by the deployment; this keeps fresh databases and tests usable
/// without external tooling.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "PRAGMA foreign_keys = ON",
    "CREATE TABLE IF NOT EXISTS longform_jobs (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'queued',
        face_artifact_id TEXT NOT NULL,
        aspect_ratio TEXT NOT NULL,
        segment_seconds INTEGER NOT NULL,
        max_segment_seconds INTEGER NOT NULL,
        voice_cfg TEXT NOT NULL DEFAULT '{}',
        voice_gender_mode TEXT NOT NULL DEFAULT 'auto',
        voice_gender TEXT,
        script_text TEXT NOT NULL,
        total_segments INTEGER NOT NULL DEFAULT 0,
        completed_segments INTEGER NOT NULL DEFAULT 0,
        final_storage_path TEXT,
        error_code TEXT,
        error_message TEXT,
        tags TEXT NOT NULL DEFAULT '{}',
        auth_token TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS longform_segments (
        id TEXT PRIMARY KEY,
        job_id TEXT NOT NULL REFERENCES longform_jobs(id) ON DELETE CASCADE,
        segment_index INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'queued',
        text_chunk TEXT NOT NULL,
        duration_sec INTEGER NOT NULL,
        actual_duration_sec REAL,
        tts_job_id TEXT,
        audio_url TEXT,
        audio_storage_path TEXT,
        audio_artifact_id TEXT,
        fusion_job_id TEXT,
        provider_job_id TEXT,
        segment_video_url TEXT,
        segment_storage_path TEXT,
        idempotency_key_audio TEXT,
        idempotency_key_video TEXT,
        locked_at TEXT,
        locked_by TEXT,
        error_code TEXT,
        error_message TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE(job_id, segment_index)
    )",
    "CREATE INDEX IF NOT EXISTS idx_segments_claim
        ON longform_segments(status, locked_at)",
    "CREATE INDEX IF NOT EXISTS idx_segments_job
        ON longform_segments(job_id, segment_index)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_unfinished
        ON longform_jobs(status, created_at)",
];
