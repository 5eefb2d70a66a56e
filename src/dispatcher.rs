use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use uuid::Uuid;

use crate::clients::with_jitter;
use crate::context::CoreContext;
use crate::models::segment::Stage;
use crate::worker::SegmentWorker;

const IDLE_SLEEP: Duration = Duration::from_millis(1000);
const DEPTH_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Long-lived claim loops for this worker process. Audio and video stages
/// run under independent concurrency budgets so a pile-up at the slower
/// fusion upstream cannot starve audio synthesis, and vice versa. Per-job
/// inflight caps keep one large job from monopolizing the pool.
pub async fn run(ctx: CoreContext, shutdown: watch::Receiver<bool>) {
    // job_id → segments inflight in this process, for fairness exclusions
    let inflight: Arc<DashMap<Uuid, usize>> = Arc::new(DashMap::new());
    // segment_id → job_id for every claim this process currently holds
    let active: Arc<DashMap<Uuid, Uuid>> = Arc::new(DashMap::new());

    let audio = tokio::spawn(stage_loop(
        ctx.clone(),
        Stage::Audio,
        ctx.config.audio_concurrency,
        inflight.clone(),
        active.clone(),
        shutdown.clone(),
    ));
    let video = tokio::spawn(stage_loop(
        ctx.clone(),
        Stage::Video,
        ctx.config.video_concurrency,
        inflight.clone(),
        active.clone(),
        shutdown.clone(),
    ));
    let depth = tokio::spawn(depth_log_loop(ctx.clone(), shutdown.clone()));

    let _ = futures::future::join3(audio, video, depth).await;

    // Clean stop: put still-claimed rows back so the next process does not
    // have to wait out the lock TTL. Upstream idempotency keys make any
    // overlap harmless.
    for entry in active.iter() {
        if let Err(err) = ctx.store.release_segment(*entry.key()).await {
            tracing::warn!(segment_id = %entry.key(), "shutdown release failed: {}", err);
        }
    }
    tracing::info!("dispatcher stopped");
}

async fn stage_loop(
    ctx: CoreContext,
    stage: Stage,
    budget: usize,
    inflight: Arc<DashMap<Uuid, usize>>,
    active: Arc<DashMap<Uuid, Uuid>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let semaphore = Arc::new(Semaphore::new(budget.max(1)));
    loop {
        if *shutdown.borrow() {
            return;
        }

        let permit = tokio::select! {
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
            _ = shutdown.changed() => return,
        };

        let excluded: Vec<Uuid> = inflight
            .iter()
            .filter(|entry| *entry.value() >= ctx.config.per_job_inflight_cap)
            .map(|entry| *entry.key())
            .collect();

        let claimed = ctx
            .store
            .claim_next_segment(
                &ctx.config.worker_id,
                stage,
                Utc::now(),
                ctx.config.lock_ttl,
                &excluded,
            )
            .await;

        match claimed {
            Ok(Some(segment)) => {
                tracing::debug!(
                    job_id = %segment.job_id,
                    segment_index = segment.segment_index,
                    stage = stage.as_str(),
                    "claimed segment"
                );
                *inflight.entry(segment.job_id).or_insert(0) += 1;
                active.insert(segment.id, segment.job_id);

                let worker = SegmentWorker::new(ctx.clone());
                let inflight = inflight.clone();
                let active = active.clone();
                tokio::spawn(async move {
                    let segment_id = segment.id;
                    let job_id = segment.job_id;
                    if let Err(err) = worker.process(segment).await {
                        // Stale means another worker took over; anything
                        // else is an infrastructure fault and the lock TTL
                        // will surface the row again
                        tracing::warn!(
                            job_id = %job_id,
                            segment_id = %segment_id,
                            "worker aborted: {}",
                            err
                        );
                    }
                    active.remove(&segment_id);
                    let empty = {
                        match inflight.get_mut(&job_id) {
                            Some(mut count) => {
                                *count = count.saturating_sub(1);
                                *count == 0
                            }
                            None => false,
                        }
                    };
                    if empty {
                        inflight.remove_if(&job_id, |_, count| *count == 0);
                    }
                    drop(permit);
                });
            }
            Ok(None) => {
                drop(permit);
                tokio::select! {
                    _ = tokio::time::sleep(with_jitter(IDLE_SLEEP)) => {}
                    _ = shutdown.changed() => return,
                }
            }
            Err(err) => {
                tracing::error!(stage = stage.as_str(), "claim failed: {}", err);
                drop(permit);
                tokio::select! {
                    _ = tokio::time::sleep(with_jitter(IDLE_SLEEP * 5)) => {}
                    _ = shutdown.changed() => return,
                }
            }
        }
    }
}

/// Periodic queue-depth visibility; the nearest equivalent of a stats
/// endpoint without carrying a metrics system.
async fn depth_log_loop(ctx: CoreContext, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(DEPTH_LOG_INTERVAL) => {}
            _ = shutdown.changed() => return,
        }
        if *shutdown.borrow() {
            return;
        }
        match ctx.store.queue_depths().await {
            Ok(depths) => {
                let count = |status| depths.get(&status).copied().unwrap_or(0);
                tracing::info!(
                    queued = count(crate::models::segment::SegmentStatus::Queued),
                    audio_running = count(crate::models::segment::SegmentStatus::AudioRunning),
                    video_running = count(crate::models::segment::SegmentStatus::VideoRunning),
                    succeeded = count(crate::models::segment::SegmentStatus::Succeeded),
                    failed = count(crate::models::segment::SegmentStatus::Failed),
                    "segment queue depths"
                );
            }
            Err(err) => tracing::warn!("queue depth scan failed: {}", err),
        }
    }
}
