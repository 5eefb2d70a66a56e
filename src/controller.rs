use chrono::Utc;
use uuid::Uuid;

use crate::context::CoreContext;
use crate::error::Result;
use crate::models::job::{JobStatus, LongformJob};
use crate::models::segment::SegmentStatus;
use crate::stitcher;

/// Move a freshly-claimed job's header out of `queued`. Called by workers
/// on their first touch; harmless if the job is already running.
pub async fn note_job_started(ctx: &CoreContext, job: &LongformJob) -> Result<()> {
    if job.status == JobStatus::Queued {
        ctx.store
            .mark_job_running(job.id, job.completed_segments)
            .await?;
    }
    Ok(())
}

/// Re-derive the job header from segment state. Invoked after every
/// terminal segment write and by the periodic sweep; both paths are safe to
/// race because every transition below is conditional.
pub async fn reconcile(ctx: &CoreContext, job_id: Uuid) -> Result<()> {
    let job = ctx.store.get_job(job_id).await?;
    if job.status.is_terminal() {
        return Ok(());
    }

    let counts = ctx.store.count_by_status(job_id).await?;
    let succeeded = counts.get(&SegmentStatus::Succeeded).copied().unwrap_or(0);
    let failed = counts.get(&SegmentStatus::Failed).copied().unwrap_or(0);

    if failed > 0 {
        let (code, message) = first_failure(ctx, job_id).await?;
        tracing::warn!(job_id = %job_id, error_code = %code, "job failed");
        ctx.store.fail_job(job_id, &code, &message).await?;
        return Ok(());
    }

    if job.total_segments > 0 && succeeded == job.total_segments {
        if job.status != JobStatus::Stitching {
            // Exactly one reconciler wins this transition and owns the stitch
            if ctx.store.mark_job_stitching(job_id, succeeded).await? {
                tracing::info!(job_id = %job_id, "all segments succeeded, stitching");
                stitch_and_finalize(ctx.clone(), job_id).await;
            }
        }
        return Ok(());
    }

    ctx.store.mark_job_running(job_id, succeeded).await?;
    Ok(())
}

/// Run the stitcher and record its outcome on the job.
async fn stitch_and_finalize(ctx: CoreContext, job_id: Uuid) {
    match stitcher::stitch_job(&ctx, job_id).await {
        Ok(final_path) => {
            if let Err(err) = ctx.store.finish_job_succeeded(job_id, &final_path).await {
                // A concurrent stitcher finished first; the artifact write
                // was idempotent so nothing is lost
                tracing::debug!(job_id = %job_id, "stitch finalize lost race: {}", err);
            } else {
                tracing::info!(job_id = %job_id, final_path = %final_path, "job succeeded");
            }
        }
        Err(err) => {
            tracing::error!(job_id = %job_id, "stitch failed: {}", err);
            if let Err(db_err) = ctx
                .store
                .fail_job(job_id, err.error_code(), &err.user_message())
                .await
            {
                tracing::error!(job_id = %job_id, "failed to record stitch failure: {}", db_err);
            }
        }
    }
}

/// Most recent failed segment's error, bubbled up to the job header.
async fn first_failure(ctx: &CoreContext, job_id: Uuid) -> Result<(String, String)> {
    let segments = ctx.store.list_segments_ordered(job_id).await?;
    let failed = segments
        .iter()
        .find(|s| s.status == SegmentStatus::Failed);
    Ok(match failed {
        Some(segment) => (
            segment
                .error_code
                .clone()
                .unwrap_or_else(|| "upstream_failed".to_string()),
            segment
                .error_message
                .clone()
                .unwrap_or_else(|| "A segment failed".to_string()),
        ),
        None => (
            "upstream_failed".to_string(),
            "A segment failed".to_string(),
        ),
    })
}

/// Periodic self-healing: re-reconcile every unfinished job and re-run
/// stitches that stalled (the final write is overwrite-or-skip, so a
/// re-run cannot corrupt the artifact).
pub async fn run_sweep(ctx: CoreContext, mut shutdown: tokio::sync::watch::Receiver<bool>) {
    let interval = ctx.config.sweep_interval;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => return,
        }
        if *shutdown.borrow() {
            return;
        }

        let jobs = match ctx.store.list_unfinished_jobs(100).await {
            Ok(jobs) => jobs,
            Err(err) => {
                tracing::error!("sweep: listing unfinished jobs failed: {}", err);
                continue;
            }
        };

        for job in jobs {
            let stalled_stitch = job.status == JobStatus::Stitching
                && Utc::now() - job.updated_at
                    > chrono::Duration::from_std(ctx.config.lock_ttl)
                        .unwrap_or_else(|_| chrono::Duration::seconds(600));

            if stalled_stitch {
                tracing::warn!(job_id = %job.id, "sweep: re-running stalled stitch");
                stitch_and_finalize(ctx.clone(), job.id).await;
            } else if let Err(err) = reconcile(&ctx, job.id).await {
                tracing::error!(job_id = %job.id, "sweep: reconcile failed: {}", err);
            }
        }
    }
}
