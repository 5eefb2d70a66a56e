use crate::clients::fusion::FusionSubmitRequest;
use crate::clients::tts::TtsSubmitRequest;
use crate::clients::{await_terminal, idempotency_key, retry_delay};
use crate::context::CoreContext;
use crate::controller;
use crate::error::{LongformError, Result};
use crate::models::job::LongformJob;
use crate::models::segment::{LongformSegment, SegmentStatus, Stage};
use crate::store::SegmentPatch;

/// Transient-attempt budgets per stage. Validation and policy failures are
/// never retried.
const TTS_MAX_ATTEMPTS: u32 = 3;
const FUSION_MAX_ATTEMPTS: u32 = 2;

/// Drives one claimed segment through the two-stage pipeline. The claim's
/// row lock plus expected-status conditional updates keep this the only
/// writer; any lost race surfaces as `Stale` and aborts the attempt.
pub struct SegmentWorker {
    ctx: CoreContext,
}

impl SegmentWorker {
    pub fn new(ctx: CoreContext) -> Self {
        Self { ctx }
    }

    /// Run the claimed segment as far as it will go. Terminal outcomes
    /// (success or categorized failure) are recorded on the row and the job
    /// is reconciled; only coordination errors (`Stale`, storage failures)
    /// bubble to the dispatcher.
    pub async fn process(&self, segment: LongformSegment) -> Result<()> {
        let job = self.ctx.store.get_job(segment.job_id).await?;

        // A sibling segment may already have failed the whole job; working
        // on would waste upstream quota. Put the row back untouched.
        if job.status.is_terminal() {
            self.ctx.store.release_segment(segment.id).await?;
            return Ok(());
        }

        controller::note_job_started(&self.ctx, &job).await?;

        let mut segment = segment;
        if segment.status == SegmentStatus::AudioRunning {
            segment = match self.audio_stage(&job, segment).await? {
                Some(advanced) => advanced,
                None => return Ok(()), // recorded terminal failure
            };
        }

        if segment.status == SegmentStatus::VideoRunning {
            self.video_stage(&job, segment).await?;
        }

        Ok(())
    }

    /// Audio stage: submit-or-resume TTS, poll to terminal, advance to
    /// video_running. Returns None if the segment was failed terminally.
    async fn audio_stage(
        &self,
        job: &LongformJob,
        mut segment: LongformSegment,
    ) -> Result<Option<LongformSegment>> {
        let mut attempt = 0u32;
        loop {
            match self.audio_attempt(job, &mut segment).await {
                Ok(advanced) => return Ok(Some(advanced)),
                Err(err) if err.is_retryable() && attempt + 1 < TTS_MAX_ATTEMPTS => {
                    attempt += 1;
                    tracing::warn!(
                        job_id = %job.id,
                        segment_index = segment.segment_index,
                        stage = "audio",
                        attempt,
                        "transient TTS failure, backing off: {}",
                        err
                    );
                    tokio::time::sleep(retry_delay(attempt)).await;
                }
                Err(err @ LongformError::Stale { .. }) => return Err(err),
                Err(err @ LongformError::Db(_)) => return Err(err),
                Err(err) => {
                    self.record_failure(job, &segment, SegmentStatus::AudioRunning, &err)
                        .await?;
                    return Ok(None);
                }
            }
        }
    }

    async fn audio_attempt(
        &self,
        job: &LongformJob,
        segment: &mut LongformSegment,
    ) -> Result<LongformSegment> {
        // Resume-don't-resubmit: a stored id means the upstream job exists,
        // no matter which worker created it
        let tts_job_id = match &segment.tts_job_id {
            Some(id) => id.clone(),
            None => {
                let key = idempotency_key(job.id, segment.segment_index, Stage::Audio);
                let request = TtsSubmitRequest {
                    text: segment.text_chunk.clone(),
                    voice_cfg: self.voice_cfg_for(job),
                    idempotency_key: key.clone(),
                    actor_user_id: job.user_id.clone(),
                    job_id: job.id,
                };
                let id = self.ctx.tts.submit(&request, &job.auth_token).await?;
                tracing::info!(
                    job_id = %job.id,
                    segment_index = segment.segment_index,
                    stage = "audio",
                    tts_job_id = %id,
                    "submitted TTS job"
                );
                let patch = SegmentPatch {
                    tts_job_id: Some(id.clone()),
                    idempotency_key_audio: Some(key),
                    refresh_lock: true,
                    ..Default::default()
                };
                *segment = self
                    .ctx
                    .store
                    .update_segment(segment.id, SegmentStatus::AudioRunning, patch)
                    .await?;
                id
            }
        };

        let artifact = await_terminal(self.ctx.config.tts_poll_budget, || {
            self.ctx
                .tts
                .poll(&tts_job_id, &job.user_id, &job.auth_token)
        })
        .await?;

        let patch = SegmentPatch {
            status: Some(SegmentStatus::VideoRunning),
            audio_url: Some(artifact.audio_url),
            audio_storage_path: Some(artifact.audio_storage_path),
            audio_artifact_id: artifact.audio_artifact_id,
            actual_duration_sec: artifact.duration_sec,
            refresh_lock: true,
            ..Default::default()
        };
        self.ctx
            .store
            .update_segment(segment.id, SegmentStatus::AudioRunning, patch)
            .await
    }

    async fn video_stage(&self, job: &LongformJob, mut segment: LongformSegment) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            match self.video_attempt(job, &mut segment).await {
                Ok(()) => {
                    controller::reconcile(&self.ctx, job.id).await?;
                    return Ok(());
                }
                Err(err) if err.is_retryable() && attempt + 1 < FUSION_MAX_ATTEMPTS => {
                    attempt += 1;
                    tracing::warn!(
                        job_id = %job.id,
                        segment_index = segment.segment_index,
                        stage = "video",
                        attempt,
                        "transient fusion failure, backing off: {}",
                        err
                    );
                    tokio::time::sleep(retry_delay(attempt)).await;
                }
                Err(err @ LongformError::Stale { .. }) => return Err(err),
                Err(err @ LongformError::Db(_)) => return Err(err),
                Err(err) => {
                    self.record_failure(job, &segment, SegmentStatus::VideoRunning, &err)
                        .await?;
                    return Ok(());
                }
            }
        }
    }

    async fn video_attempt(
        &self,
        job: &LongformJob,
        segment: &mut LongformSegment,
    ) -> Result<()> {
        let audio_storage_path =
            segment
                .audio_storage_path
                .clone()
                .ok_or_else(|| LongformError::UpstreamFatal {
                    code: "missing_audio".to_string(),
                    message: "video stage reached without an audio artifact".to_string(),
                })?;

        let fusion_job_id = match &segment.fusion_job_id {
            Some(id) => id.clone(),
            None => {
                let key = idempotency_key(job.id, segment.segment_index, Stage::Video);
                let request = FusionSubmitRequest {
                    face_artifact_id: job.face_artifact_id.clone(),
                    audio_storage_path,
                    audio_url: segment.audio_url.clone(),
                    aspect_ratio: job.aspect_ratio,
                    idempotency_key: key.clone(),
                    consent: serde_json::json!({ "face_usage": true }),
                    actor_user_id: job.user_id.clone(),
                    job_id: job.id,
                    segment_index: segment.segment_index,
                };
                let submission = self.ctx.fusion.submit(&request, &job.auth_token).await?;
                tracing::info!(
                    job_id = %job.id,
                    segment_index = segment.segment_index,
                    stage = "video",
                    fusion_job_id = %submission.fusion_job_id,
                    "submitted fusion job"
                );
                let patch = SegmentPatch {
                    fusion_job_id: Some(submission.fusion_job_id.clone()),
                    provider_job_id: submission.provider_job_id,
                    idempotency_key_video: Some(key),
                    refresh_lock: true,
                    ..Default::default()
                };
                *segment = self
                    .ctx
                    .store
                    .update_segment(segment.id, SegmentStatus::VideoRunning, patch)
                    .await?;
                submission.fusion_job_id
            }
        };

        let artifact = await_terminal(self.ctx.config.fusion_poll_budget, || {
            self.ctx
                .fusion
                .poll(&fusion_job_id, &job.user_id, &job.auth_token)
        })
        .await?;

        let patch = SegmentPatch {
            status: Some(SegmentStatus::Succeeded),
            segment_video_url: Some(artifact.video_url),
            segment_storage_path: Some(artifact.video_storage_path),
            provider_job_id: artifact.provider_job_id,
            clear_lock: true,
            ..Default::default()
        };
        self.ctx
            .store
            .update_segment(segment.id, SegmentStatus::VideoRunning, patch)
            .await?;

        tracing::info!(
            job_id = %job.id,
            segment_index = segment.segment_index,
            "segment succeeded"
        );
        Ok(())
    }

    /// Write a terminal segment failure and let the controller decide the
    /// job-level consequence.
    async fn record_failure(
        &self,
        job: &LongformJob,
        segment: &LongformSegment,
        expected: SegmentStatus,
        err: &LongformError,
    ) -> Result<()> {
        tracing::warn!(
            job_id = %job.id,
            segment_index = segment.segment_index,
            error_code = err.error_code(),
            "segment failed terminally: {}",
            err
        );
        self.ctx
            .store
            .update_segment(
                segment.id,
                expected,
                SegmentPatch::failed(err.error_code(), &err.user_message()),
            )
            .await?;
        controller::reconcile(&self.ctx, job.id).await
    }

    /// Voice configuration forwarded to TTS, with the manual gender choice
    /// folded in so the upstream needs no knowledge of our job schema.
    fn voice_cfg_for(&self, job: &LongformJob) -> serde_json::Value {
        let mut cfg = job.voice_cfg.0.clone();
        if let Some(gender) = job.voice_gender {
            if let Some(map) = cfg.as_object_mut() {
                map.insert(
                    "gender".to_string(),
                    serde_json::Value::String(
                        match gender {
                            crate::models::job::VoiceGender::Male => "male",
                            crate::models::job::VoiceGender::Female => "female",
                        }
                        .to_string(),
                    ),
                );
            }
        }
        cfg
    }
}
