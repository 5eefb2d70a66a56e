#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use longform_server::blobstore::BlobStore;
use longform_server::clients::fusion::{
    FusionApi, FusionArtifact, FusionSubmission, FusionSubmitRequest,
};
use longform_server::clients::tts::{TtsApi, TtsArtifact, TtsSubmitRequest};
use longform_server::clients::PollOutcome;
use longform_server::config::AppConfig;
use longform_server::context::CoreContext;
use longform_server::error::{LongformError, Result};
use longform_server::models::job::{
    AspectRatio, JobStatus, LongformJob, VoiceGenderMode,
};
use longform_server::segmenter::plan_segments;
use longform_server::stitcher::VideoConcat;
use longform_server::store::SegmentStore;

/// In-memory blob store backed by a shared map. `sign` mints URLs pointing
/// at the test blob server so the stitcher's HTTP download path is
/// exercised for real.
pub struct MemoryBlobStore {
    pub objects: Arc<DashMap<String, Bytes>>,
    pub base_url: String,
}

impl MemoryBlobStore {
    pub fn new(objects: Arc<DashMap<String, Bytes>>, base_url: String) -> Self {
        Self { objects, base_url }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, bytes: Bytes) -> Result<()> {
        self.objects.insert(path.to_string(), bytes);
        Ok(())
    }

    async fn sign(&self, path: &str, _ttl: Duration) -> Result<String> {
        Ok(format!("{}/o/{}", self.base_url, path))
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.objects.contains_key(path))
    }
}

/// Serve the shared blob map over HTTP on an ephemeral port.
pub async fn spawn_blob_server(objects: Arc<DashMap<String, Bytes>>) -> String {
    use axum::extract::{Path as AxumPath, State};
    use axum::http::StatusCode;
    use axum::routing::get;

    async fn fetch(
        State(objects): State<Arc<DashMap<String, Bytes>>>,
        AxumPath(path): AxumPath<String>,
    ) -> std::result::Result<Vec<u8>, StatusCode> {
        objects
            .get(&path)
            .map(|entry| entry.value().to_vec())
            .ok_or(StatusCode::NOT_FOUND)
    }

    let app = axum::Router::new()
        .route("/o/*path", get(fetch))
        .with_state(objects);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Byte-level concatenator; stands in for ffmpeg so the round-trip
/// property (final == segments in order) is checkable bit-for-bit.
pub struct ByteConcat;

#[async_trait]
impl VideoConcat for ByteConcat {
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let mut combined = Vec::new();
        for input in inputs {
            combined.extend(tokio::fs::read(input).await?);
        }
        tokio::fs::write(output, combined).await?;
        Ok(())
    }
}

/// Counting TTS mock. Submissions deduplicate on the idempotency key the
/// way the upstream contract requires; `submit_calls` counts actual POSTs.
pub struct MockTts {
    pub submit_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
    by_key: DashMap<String, String>,
    /// Polls that report a transient error before the first success
    pub transient_polls: AtomicUsize,
    /// Fail terminally when the submitted text contains this marker
    pub fail_on_text: Option<String>,
}

impl MockTts {
    pub fn new() -> Self {
        Self {
            submit_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            by_key: DashMap::new(),
            transient_polls: AtomicUsize::new(0),
            fail_on_text: None,
        }
    }

    pub fn with_transient_polls(self, count: usize) -> Self {
        self.transient_polls.store(count, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl TtsApi for MockTts {
    async fn submit(&self, req: &TtsSubmitRequest, _auth_token: &str) -> Result<String> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = &self.fail_on_text {
            if req.text.contains(marker) {
                return Err(LongformError::UpstreamFatal {
                    code: "tts_rejected".to_string(),
                    message: "synthetic submit failure".to_string(),
                });
            }
        }
        let id = self
            .by_key
            .entry(req.idempotency_key.clone())
            .or_insert_with(|| format!("tts-{}", Uuid::new_v4()))
            .clone();
        Ok(id)
    }

    async fn poll(
        &self,
        tts_job_id: &str,
        _actor_user_id: &str,
        _auth_token: &str,
    ) -> Result<PollOutcome<TtsArtifact>> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.transient_polls.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_polls.store(remaining - 1, Ordering::SeqCst);
            return Err(LongformError::Transient("synthetic 503".to_string()));
        }
        Ok(PollOutcome::Succeeded(TtsArtifact {
            audio_url: format!("https://blobs.test/signed/{}.mp3", tts_job_id),
            audio_storage_path: format!("tts/{}.mp3", tts_job_id),
            audio_artifact_id: Some(format!("art-{}", tts_job_id)),
            duration_sec: Some(5.0),
        }))
    }
}

/// Counting fusion mock. On success it materializes the segment video bytes
/// into the shared blob map so the stitcher can fetch them.
pub struct MockFusion {
    pub submit_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
    by_key: DashMap<String, String>,
    jobs: DashMap<String, (Uuid, u32)>,
    objects: Arc<DashMap<String, Bytes>>,
    /// Refuse this segment index with a policy error
    pub policy_refuse_index: Option<u32>,
}

impl MockFusion {
    pub fn new(objects: Arc<DashMap<String, Bytes>>) -> Self {
        Self {
            submit_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
            by_key: DashMap::new(),
            jobs: DashMap::new(),
            objects,
            policy_refuse_index: None,
        }
    }

    pub fn segment_bytes(job_id: Uuid, index: u32) -> Bytes {
        Bytes::from(format!("video[{}:{}]", job_id, index))
    }
}

#[async_trait]
impl FusionApi for MockFusion {
    async fn submit(
        &self,
        req: &FusionSubmitRequest,
        _auth_token: &str,
    ) -> Result<FusionSubmission> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let id = self
            .by_key
            .entry(req.idempotency_key.clone())
            .or_insert_with(|| format!("fus-{}", Uuid::new_v4()))
            .clone();
        self.jobs.insert(id.clone(), (req.job_id, req.segment_index));
        Ok(FusionSubmission {
            fusion_job_id: id,
            provider_job_id: Some("prov-1".to_string()),
        })
    }

    async fn poll(
        &self,
        fusion_job_id: &str,
        _actor_user_id: &str,
        _auth_token: &str,
    ) -> Result<PollOutcome<FusionArtifact>> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let (job_id, index) = *self
            .jobs
            .get(fusion_job_id)
            .expect("poll for unknown fusion job")
            .value();

        if self.policy_refuse_index == Some(index) {
            return Ok(PollOutcome::Failed {
                code: "policy_refused".to_string(),
                message: "Face consent not granted".to_string(),
            });
        }

        let storage_path = format!("fusion/{}/{}.mp4", job_id, index);
        self.objects
            .insert(storage_path.clone(), Self::segment_bytes(job_id, index));
        Ok(PollOutcome::Succeeded(FusionArtifact {
            video_url: format!("https://blobs.test/signed/{}", storage_path),
            video_storage_path: storage_path,
            provider_job_id: Some("prov-1".to_string()),
        }))
    }
}

pub struct TestHarness {
    pub ctx: CoreContext,
    pub objects: Arc<DashMap<String, Bytes>>,
    pub tts: Arc<MockTts>,
    pub fusion: Arc<MockFusion>,
}

/// Wire an in-memory store, mock upstreams, the byte concatenator and a
/// live blob server into a context.
pub async fn harness_with(tts: MockTts, make_fusion: impl FnOnce(&Arc<DashMap<String, Bytes>>) -> MockFusion) -> TestHarness {
    let objects: Arc<DashMap<String, Bytes>> = Arc::new(DashMap::new());
    let blob_base = spawn_blob_server(objects.clone()).await;

    let store = SegmentStore::in_memory().await.unwrap();
    let tts = Arc::new(tts);
    let fusion = Arc::new(make_fusion(&objects));

    let mut config = AppConfig::from_env();
    config.tts_poll_budget = Duration::from_secs(30);
    config.fusion_poll_budget = Duration::from_secs(30);
    config.lock_ttl = Duration::from_secs(600);
    config.per_job_inflight_cap = 2;

    let ctx = CoreContext {
        config,
        store,
        tts: tts.clone(),
        fusion: fusion.clone(),
        blobs: Arc::new(MemoryBlobStore::new(objects.clone(), blob_base)),
        concat: Arc::new(ByteConcat),
    };

    TestHarness {
        ctx,
        objects,
        tts,
        fusion,
    }
}

pub async fn harness() -> TestHarness {
    harness_with(MockTts::new(), |objects| MockFusion::new(objects.clone())).await
}

/// Insert a job + planned segments directly, bypassing HTTP.
pub async fn seed_job(
    ctx: &CoreContext,
    script: &str,
    segment_seconds: u32,
    max_segment_seconds: u32,
) -> LongformJob {
    let planned = plan_segments(script, segment_seconds, max_segment_seconds, "en-US").unwrap();
    let now = Utc::now();
    let job = LongformJob {
        id: Uuid::new_v4(),
        user_id: "user-1".to_string(),
        status: JobStatus::Queued,
        face_artifact_id: Uuid::new_v4().to_string(),
        aspect_ratio: AspectRatio::Tall,
        segment_seconds,
        max_segment_seconds,
        voice_cfg: sqlx::types::Json(serde_json::json!({ "locale": "en-US" })),
        voice_gender_mode: VoiceGenderMode::Auto,
        voice_gender: None,
        script_text: script.to_string(),
        total_segments: planned.len() as u32,
        completed_segments: 0,
        final_storage_path: None,
        error_code: None,
        error_message: None,
        tags: sqlx::types::Json(serde_json::json!({})),
        auth_token: format!("svc-{}", Uuid::new_v4()),
        created_at: now,
        updated_at: now,
    };
    ctx.store.create_job(&job, &planned).await.unwrap();
    job
}

/// Claim-and-process until no audio-stage work is left, like a
/// single-process dispatcher would.
pub async fn drive_until_idle(ctx: &CoreContext, worker_id: &str) {
    use longform_server::models::segment::Stage;
    use longform_server::worker::SegmentWorker;

    loop {
        let claimed = ctx
            .store
            .claim_next_segment(
                worker_id,
                Stage::Audio,
                Utc::now(),
                ctx.config.lock_ttl,
                &[],
            )
            .await
            .unwrap();
        match claimed {
            Some(segment) => {
                let worker = SegmentWorker::new(ctx.clone());
                // Stale aborts are expected under reclaim races
                let _ = worker.process(segment).await;
            }
            None => return,
        }
    }
}
