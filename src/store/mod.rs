mod schema;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::QueryBuilder;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{LongformError, Result};
use crate::models::job::{JobStatus, LongformJob};
use crate::models::segment::{LongformSegment, SegmentStatus, Stage};
use crate::segmenter::PlannedSegment;

/// Durable storage for jobs and segments. The sole mutable state shared
/// across worker processes; every cross-worker mutation goes through the
/// conditional updates here.
#[derive(Clone)]
pub struct SegmentStore {
    pool: SqlitePool,
}

/// Conditional mutation applied by `update_segment`. Optional fields are
/// written only when set; `status` is always written and must be a legal
/// forward transition from the expected status.
#[derive(Debug, Default)]
pub struct SegmentPatch {
    pub status: Option<SegmentStatus>,
    pub tts_job_id: Option<String>,
    pub audio_url: Option<String>,
    pub audio_storage_path: Option<String>,
    pub audio_artifact_id: Option<String>,
    pub actual_duration_sec: Option<f64>,
    pub fusion_job_id: Option<String>,
    pub provider_job_id: Option<String>,
    pub segment_video_url: Option<String>,
    pub segment_storage_path: Option<String>,
    pub idempotency_key_audio: Option<String>,
    pub idempotency_key_video: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub refresh_lock: bool,
    pub clear_lock: bool,
}

impl SegmentPatch {
    pub fn transition(status: SegmentStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn failed(code: &str, message: &str) -> Self {
        Self {
            status: Some(SegmentStatus::Failed),
            error_code: Some(code.to_string()),
            error_message: Some(message.to_string()),
            clear_lock: true,
            ..Default::default()
        }
    }
}

const SEGMENT_COLUMNS: &str = "id, job_id, segment_index, status, text_chunk, duration_sec, \
     actual_duration_sec, tts_job_id, audio_url, audio_storage_path, audio_artifact_id, \
     fusion_job_id, provider_job_id, segment_video_url, segment_storage_path, \
     idempotency_key_audio, idempotency_key_video, locked_at, locked_by, error_code, \
     error_message, created_at, updated_at";

const JOB_COLUMNS: &str = "id, user_id, status, face_artifact_id, aspect_ratio, segment_seconds, \
     max_segment_seconds, voice_cfg, voice_gender_mode, voice_gender, script_text, \
     total_segments, completed_segments, final_storage_path, error_code, error_message, tags, \
     auth_token, created_at, updated_at";

impl SegmentStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    /// Single-connection in-memory store; used by tests and local runs
    /// without a configured database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    async fn bootstrap(&self) -> Result<()> {
        for statement in schema::SCHEMA_STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert a job and all its segments in one transaction. A duplicate id
    /// or `(job_id, segment_index)` maps to `Conflict`.
    pub async fn create_job(&self, job: &LongformJob, planned: &[PlannedSegment]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let insert_job = sqlx::query(
            "INSERT INTO longform_jobs (id, user_id, status, face_artifact_id, aspect_ratio, \
             segment_seconds, max_segment_seconds, voice_cfg, voice_gender_mode, voice_gender, \
             script_text, total_segments, completed_segments, final_storage_path, error_code, \
             error_message, tags, auth_token, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(job.id)
        .bind(&job.user_id)
        .bind(job.status)
        .bind(&job.face_artifact_id)
        .bind(job.aspect_ratio)
        .bind(job.segment_seconds)
        .bind(job.max_segment_seconds)
        .bind(&job.voice_cfg)
        .bind(job.voice_gender_mode)
        .bind(job.voice_gender)
        .bind(&job.script_text)
        .bind(job.total_segments)
        .bind(job.completed_segments)
        .bind(&job.final_storage_path)
        .bind(&job.error_code)
        .bind(&job.error_message)
        .bind(&job.tags)
        .bind(&job.auth_token)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(err) = insert_job {
            return Err(map_conflict(err, "job id"));
        }

        for (index, segment) in planned.iter().enumerate() {
            let inserted = sqlx::query(
                "INSERT INTO longform_segments (id, job_id, segment_index, status, text_chunk, \
                 duration_sec, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4())
            .bind(job.id)
            .bind(index as u32)
            .bind(SegmentStatus::Queued)
            .bind(&segment.text_chunk)
            .bind(segment.duration_sec)
            .bind(job.created_at)
            .bind(job.created_at)
            .execute(&mut *tx)
            .await;

            if let Err(err) = inserted {
                return Err(map_conflict(err, "segment_index"));
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Claim one workable segment for `worker_id`, atomically setting the
    /// lock and (for fresh claims) advancing queued → audio_running.
    ///
    /// Workable rows are queued segments, released segments (lock cleared by
    /// a clean shutdown), and in-flight segments whose lock aged past
    /// `lock_ttl`. The single conditional UPDATE guarantees at most one
    /// claimant per row; jobs in `excluded_jobs` are skipped for fairness.
    pub async fn claim_next_segment(
        &self,
        worker_id: &str,
        stage: Stage,
        now: DateTime<Utc>,
        lock_ttl: Duration,
        excluded_jobs: &[Uuid],
    ) -> Result<Option<LongformSegment>> {
        let stale_before = now
            - chrono::Duration::from_std(lock_ttl)
                .map_err(|e| LongformError::Config(e.to_string()))?;

        let mut qb: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "UPDATE longform_segments SET locked_by = ",
        );
        qb.push_bind(worker_id)
            .push(", locked_at = ")
            .push_bind(now)
            .push(", status = CASE status WHEN 'queued' THEN 'audio_running' ELSE status END")
            .push(", updated_at = ")
            .push_bind(now)
            .push(" WHERE id = (SELECT s.id FROM longform_segments s WHERE ");

        match stage {
            Stage::Audio => {
                qb.push("((s.status = 'queued' AND s.locked_by IS NULL)")
                    .push(" OR (s.status IN ('queued', 'audio_running') AND (s.locked_by IS NULL OR s.locked_at < ")
                    .push_bind(stale_before)
                    .push(")))");
            }
            Stage::Video => {
                qb.push("(s.status = 'video_running' AND (s.locked_by IS NULL OR s.locked_at < ")
                    .push_bind(stale_before)
                    .push("))");
            }
        }

        // Segments of finished jobs are not workable even if still queued
        // (a sibling failure ends the job before its queue drains)
        qb.push(
            " AND s.job_id IN (SELECT j.id FROM longform_jobs j \
             WHERE j.status NOT IN ('succeeded', 'failed'))",
        );

        if !excluded_jobs.is_empty() {
            qb.push(" AND s.job_id NOT IN (");
            let mut separated = qb.separated(", ");
            for job_id in excluded_jobs {
                separated.push_bind(*job_id);
            }
            qb.push(")");
        }

        qb.push(" ORDER BY s.created_at ASC, s.segment_index ASC LIMIT 1) RETURNING ")
            .push(SEGMENT_COLUMNS);

        let claimed = qb
            .build_query_as::<LongformSegment>()
            .fetch_optional(&self.pool)
            .await?;

        Ok(claimed)
    }

    /// Conditional update keyed on the expected status. Returns `Stale` if
    /// the row is no longer in `expected`, preserving single-writer
    /// discipline for workers that lost their lock.
    pub async fn update_segment(
        &self,
        segment_id: Uuid,
        expected: SegmentStatus,
        patch: SegmentPatch,
    ) -> Result<LongformSegment> {
        let next = patch.status.unwrap_or(expected);
        if !expected.can_transition_to(next) {
            return Err(LongformError::Stale {
                segment_id: segment_id.to_string(),
                expected: expected.as_str().to_string(),
            });
        }

        let now = Utc::now();
        let updated = sqlx::query_as::<_, LongformSegment>(&format!(
            "UPDATE longform_segments SET \
               status = ?, \
               tts_job_id = COALESCE(?, tts_job_id), \
               audio_url = COALESCE(?, audio_url), \
               audio_storage_path = COALESCE(?, audio_storage_path), \
               audio_artifact_id = COALESCE(?, audio_artifact_id), \
               actual_duration_sec = COALESCE(?, actual_duration_sec), \
               fusion_job_id = COALESCE(?, fusion_job_id), \
               provider_job_id = COALESCE(?, provider_job_id), \
               segment_video_url = COALESCE(?, segment_video_url), \
               segment_storage_path = COALESCE(?, segment_storage_path), \
               idempotency_key_audio = COALESCE(?, idempotency_key_audio), \
               idempotency_key_video = COALESCE(?, idempotency_key_video), \
               error_code = COALESCE(?, error_code), \
               error_message = COALESCE(?, error_message), \
               locked_at = CASE WHEN ? THEN NULL WHEN ? THEN ? ELSE locked_at END, \
               locked_by = CASE WHEN ? THEN NULL ELSE locked_by END, \
               updated_at = ? \
             WHERE id = ? AND status = ? RETURNING {}",
            SEGMENT_COLUMNS
        ))
        .bind(next)
        .bind(&patch.tts_job_id)
        .bind(&patch.audio_url)
        .bind(&patch.audio_storage_path)
        .bind(&patch.audio_artifact_id)
        .bind(patch.actual_duration_sec)
        .bind(&patch.fusion_job_id)
        .bind(&patch.provider_job_id)
        .bind(&patch.segment_video_url)
        .bind(&patch.segment_storage_path)
        .bind(&patch.idempotency_key_audio)
        .bind(&patch.idempotency_key_video)
        .bind(&patch.error_code)
        .bind(&patch.error_message)
        .bind(patch.clear_lock)
        .bind(patch.refresh_lock)
        .bind(now)
        .bind(patch.clear_lock)
        .bind(now)
        .bind(segment_id)
        .bind(expected)
        .fetch_optional(&self.pool)
        .await?;

        updated.ok_or_else(|| LongformError::Stale {
            segment_id: segment_id.to_string(),
            expected: expected.as_str().to_string(),
        })
    }

    /// Clear the lock without changing status, for clean worker shutdown.
    pub async fn release_segment(&self, segment_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE longform_segments SET locked_by = NULL, locked_at = NULL, updated_at = ? \
             WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(segment_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_segment(&self, segment_id: Uuid) -> Result<LongformSegment> {
        sqlx::query_as::<_, LongformSegment>(&format!(
            "SELECT {} FROM longform_segments WHERE id = ?",
            SEGMENT_COLUMNS
        ))
        .bind(segment_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| LongformError::NotFound(format!("segment {}", segment_id)))
    }

    pub async fn count_by_status(&self, job_id: Uuid) -> Result<HashMap<SegmentStatus, u32>> {
        let rows: Vec<(SegmentStatus, u32)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM longform_segments WHERE job_id = ? GROUP BY status",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn list_segments_ordered(&self, job_id: Uuid) -> Result<Vec<LongformSegment>> {
        let segments = sqlx::query_as::<_, LongformSegment>(&format!(
            "SELECT {} FROM longform_segments WHERE job_id = ? ORDER BY segment_index ASC",
            SEGMENT_COLUMNS
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(segments)
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<LongformJob> {
        sqlx::query_as::<_, LongformJob>(&format!(
            "SELECT {} FROM longform_jobs WHERE id = ?",
            JOB_COLUMNS
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| LongformError::NotFound(format!("job {}", job_id)))
    }

    /// Move a queued job to running and refresh the completed-segment
    /// count. Terminal states are never regressed.
    pub async fn mark_job_running(&self, job_id: Uuid, completed: u32) -> Result<()> {
        sqlx::query(
            "UPDATE longform_jobs SET status = 'running', completed_segments = ?, updated_at = ? \
             WHERE id = ? AND status IN ('queued', 'running')",
        )
        .bind(completed)
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Atomically transition a job into stitching. Returns true only for
    /// the caller that won the transition, so exactly one stitch task runs.
    pub async fn mark_job_stitching(&self, job_id: Uuid, completed: u32) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE longform_jobs SET status = 'stitching', completed_segments = ?, updated_at = ? \
             WHERE id = ? AND status IN ('queued', 'running')",
        )
        .bind(completed)
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record the stitched artifact and finish the job. Only valid from
    /// stitching.
    pub async fn finish_job_succeeded(&self, job_id: Uuid, final_path: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE longform_jobs SET status = 'succeeded', final_storage_path = ?, updated_at = ? \
             WHERE id = ? AND status = 'stitching'",
        )
        .bind(final_path)
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(LongformError::Stale {
                segment_id: job_id.to_string(),
                expected: JobStatus::Stitching.as_str().to_string(),
            });
        }
        Ok(())
    }

    /// Terminal failure; never regresses an already-terminal job.
    pub async fn fail_job(&self, job_id: Uuid, code: &str, message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE longform_jobs SET status = 'failed', error_code = ?, error_message = ?, \
             updated_at = ? WHERE id = ? AND status NOT IN ('succeeded', 'failed')",
        )
        .bind(code)
        .bind(message)
        .bind(Utc::now())
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Non-terminal jobs, oldest first; drives the self-healing sweep.
    pub async fn list_unfinished_jobs(&self, limit: u32) -> Result<Vec<LongformJob>> {
        let jobs = sqlx::query_as::<_, LongformJob>(&format!(
            "SELECT {} FROM longform_jobs WHERE status NOT IN ('succeeded', 'failed') \
             ORDER BY created_at ASC LIMIT ?",
            JOB_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    /// Segment counts per status across all jobs, for the dispatcher's
    /// periodic depth log.
    pub async fn queue_depths(&self) -> Result<HashMap<SegmentStatus, u32>> {
        let rows: Vec<(SegmentStatus, u32)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM longform_segments GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }
}

fn map_conflict(err: sqlx::Error, what: &str) -> LongformError {
    let unique = err
        .as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false);
    if unique {
        LongformError::Conflict(format!("duplicate {}", what))
    } else {
        LongformError::Db(err)
    }
}
