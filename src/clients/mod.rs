pub mod fusion;
pub mod tts;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Jitter, Quota, RateLimiter};
use rand::Rng;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{LongformError, Result};
use crate::models::segment::Stage;

/// Type alias for the in-process direct rate limiter
pub type UpstreamLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Deterministic idempotency key for an upstream submission. The upstream
/// deduplicates on it, so a reclaimant that lost the stored job id re-submits
/// harmlessly.
pub fn idempotency_key(job_id: Uuid, segment_index: u32, stage: Stage) -> String {
    let seed = format!("{}:{}:{}", job_id, segment_index, stage.as_str());
    format!("{:x}", md5::compute(seed.as_bytes()))
}

/// Apply ±20% jitter to a delay.
pub fn with_jitter(delay: Duration) -> Duration {
    let millis = delay.as_millis() as f64;
    let factor = rand::thread_rng().gen_range(0.8..=1.2);
    Duration::from_millis((millis * factor) as u64)
}

/// Poll backoff: 1s doubling, capped at 15s, jittered.
pub fn poll_delay(attempt: u32) -> Duration {
    let base = Duration::from_secs(1) * 2u32.saturating_pow(attempt.min(4));
    with_jitter(base.min(Duration::from_secs(15)))
}

/// Worker retry backoff: 2^attempt seconds, capped at 60s, jittered.
pub fn retry_delay(attempt: u32) -> Duration {
    let base = Duration::from_secs(2u64.saturating_pow(attempt.min(6)));
    with_jitter(base.min(Duration::from_secs(60)))
}

/// Shared pause propagated across the worker pool when an upstream answers
/// 429. Combined with the steady-state token bucket this keeps every worker
/// in the process off a struggling upstream at once.
#[derive(Default)]
pub struct CooldownGate {
    until: Mutex<Option<Instant>>,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep until any active cooldown has elapsed.
    pub async fn wait(&self) {
        let deadline = { *self.until.lock().await };
        if let Some(deadline) = deadline {
            let now = Instant::now();
            if deadline > now {
                tokio::time::sleep_until(deadline).await;
            }
        }
    }

    /// Extend the cooldown; shorter requests never shrink a longer pause.
    pub async fn pause_for(&self, duration: Duration) {
        let mut until = self.until.lock().await;
        let candidate = Instant::now() + duration;
        match *until {
            Some(existing) if existing >= candidate => {}
            _ => *until = Some(candidate),
        }
    }
}

/// Per-upstream throttle: steady-state token bucket plus 429 cooldown.
pub struct UpstreamThrottle {
    limiter: UpstreamLimiter,
    cooldown: CooldownGate,
}

impl UpstreamThrottle {
    pub fn new(per_second: u32, burst: u32) -> Arc<Self> {
        let quota = Quota::per_second(NonZeroU32::new(per_second.max(1)).unwrap())
            .allow_burst(NonZeroU32::new(burst.max(1)).unwrap());
        Arc::new(Self {
            limiter: RateLimiter::direct(quota),
            cooldown: CooldownGate::new(),
        })
    }

    /// Gate an outgoing call on the bucket and any active cooldown.
    pub async fn acquire(&self) {
        self.cooldown.wait().await;
        self.limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
            .await;
    }

    pub async fn back_off(&self, duration: Duration) {
        self.cooldown.pause_for(duration).await;
    }
}

/// One observation of an upstream job.
#[derive(Debug, Clone)]
pub enum PollOutcome<T> {
    Pending,
    Succeeded(T),
    Failed { code: String, message: String },
}

/// Categorize a terminal failure reported in an upstream poll body (as
/// opposed to an HTTP-level error, which `categorize_upstream_error`
/// handles).
pub fn terminal_failure(code: &str, message: &str) -> LongformError {
    if code.starts_with("policy") || code.starts_with("consent") || code.starts_with("content") {
        LongformError::Policy {
            code: code.to_string(),
            message: message.to_string(),
        }
    } else {
        LongformError::UpstreamFatal {
            code: code.to_string(),
            message: message.to_string(),
        }
    }
}

/// Drive a poll closure until the upstream job is terminal or the
/// wall-clock budget runs out. Transient poll errors (network blips, 5xx)
/// do not abort the loop; the budget bounds them.
pub async fn await_terminal<T, F, Fut>(budget: Duration, mut poll: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<PollOutcome<T>>>,
{
    let started = Instant::now();
    let mut attempt = 0u32;
    loop {
        match poll().await {
            Ok(PollOutcome::Succeeded(value)) => return Ok(value),
            Ok(PollOutcome::Failed { code, message }) => {
                return Err(terminal_failure(&code, &message))
            }
            Ok(PollOutcome::Pending) => {}
            Err(err) if err.is_retryable() => {
                tracing::debug!("poll attempt {} transient error: {}", attempt, err);
            }
            Err(err) => return Err(err),
        }
        if started.elapsed() >= budget {
            return Err(LongformError::Transient(format!(
                "poll budget of {:?} exhausted",
                budget
            )));
        }
        tokio::time::sleep(poll_delay(attempt)).await;
        attempt = attempt.saturating_add(1);
    }
}

#[derive(Debug, serde::Deserialize)]
struct UpstreamErrorBody {
    error_code: Option<String>,
    error_message: Option<String>,
}

/// Decode a non-success upstream HTTP response into the error taxonomy,
/// feeding any Retry-After pause into the shared throttle. Both upstream
/// clients funnel their error paths through here.
pub(crate) async fn decode_error_response(
    response: reqwest::Response,
    throttle: &UpstreamThrottle,
) -> LongformError {
    let status = response.status();
    let retry_after = parse_retry_after(response.headers());
    let body: UpstreamErrorBody = response.json().await.unwrap_or(UpstreamErrorBody {
        error_code: None,
        error_message: None,
    });
    let (err, pause) = categorize_upstream_error(
        status,
        body.error_code.as_deref(),
        body.error_message.as_deref(),
        retry_after,
    );
    if let Some(pause) = pause {
        throttle.back_off(pause).await;
    }
    err
}

/// Map an upstream HTTP response status plus optional error payload to the
/// crate error taxonomy. Policy refusals are detected by status (422/451)
/// or by a policy/consent-prefixed error code.
fn categorize_upstream_error(
    status: reqwest::StatusCode,
    error_code: Option<&str>,
    error_message: Option<&str>,
    retry_after: Option<Duration>,
) -> (LongformError, Option<Duration>) {
    let code = error_code.unwrap_or("upstream_error").to_string();
    let message = error_message
        .unwrap_or("Upstream request failed")
        .to_string();

    if status.as_u16() == 429 {
        let pause = retry_after.unwrap_or(Duration::from_secs(5));
        return (
            LongformError::Transient(format!("rate limited: {}", message)),
            Some(pause),
        );
    }
    if status.is_server_error() {
        return (
            LongformError::Transient(format!("{}: {}", status.as_u16(), message)),
            None,
        );
    }
    let policy_like = matches!(status.as_u16(), 422 | 451)
        || code.starts_with("policy")
        || code.starts_with("consent")
        || code.starts_with("content");
    if policy_like {
        (LongformError::Policy { code, message }, None)
    } else {
        (LongformError::UpstreamFatal { code, message }, None)
    }
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}
