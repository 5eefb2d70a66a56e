use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;

#[derive(Debug)]
pub enum LongformError {
    // Request validation errors (422)
    Validation { field: String, message: String },
    EmptyScript,
    ChunkOverflow { token_len: usize, cap_sec: u32 },

    // Auth errors
    Unauthorized,
    Forbidden,

    // Resource errors
    NotFound(String),
    Conflict(String),

    // Worker coordination errors (never surfaced over HTTP)
    Stale { segment_id: String, expected: String },

    // Upstream errors, categorized at the client boundary
    Transient(String),
    Policy { code: String, message: String },
    UpstreamFatal { code: String, message: String },

    // Stitch phase errors, terminal at job level
    StitchFailed(String),

    // Infrastructure errors
    Db(sqlx::Error),
    Io(std::io::Error),
    Http(reqwest::Error),
    Json(serde_json::Error),
    TaskJoin(String),
    Config(String),
}

impl LongformError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        LongformError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Whether a worker may retry the failed attempt within its budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LongformError::Transient(_))
    }

    /// Stable machine-readable code, persisted on failed segments/jobs and
    /// surfaced in API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            LongformError::Validation { .. } => "validation",
            LongformError::EmptyScript => "empty_script",
            LongformError::ChunkOverflow { .. } => "chunk_overflow",
            LongformError::Unauthorized => "unauthorized",
            LongformError::Forbidden => "forbidden",
            LongformError::NotFound(_) => "not_found",
            LongformError::Conflict(_) => "conflict",
            LongformError::Stale { .. } => "stale",
            LongformError::Transient(_) => "transient",
            LongformError::Policy { .. } => "policy_refused",
            LongformError::UpstreamFatal { .. } => "upstream_failed",
            LongformError::StitchFailed(_) => "stitch_failed",
            LongformError::Db(_) => "database",
            LongformError::Io(_) => "io",
            LongformError::Http(_) => "http",
            LongformError::Json(_) => "serialization",
            LongformError::TaskJoin(_) => "task_join",
            LongformError::Config(_) => "config",
        }
    }

    /// Message safe to persist on the job row and show to the end user.
    /// Upstream credentials, scratch paths and raw process output stay out.
    pub fn user_message(&self) -> String {
        match self {
            LongformError::Policy { message, .. } => message.clone(),
            LongformError::UpstreamFatal { message, .. } => message.clone(),
            LongformError::StitchFailed(_) => "Final video assembly failed".to_string(),
            LongformError::Transient(_) => "Upstream service unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for LongformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LongformError::Validation { field, message } => {
                write!(f, "Invalid field '{}': {}", field, message)
            }
            LongformError::EmptyScript => write!(f, "Script text is empty after normalization"),
            LongformError::ChunkOverflow { token_len, cap_sec } => write!(
                f,
                "Indivisible token of {} chars exceeds the {}s segment cap",
                token_len, cap_sec
            ),
            LongformError::Unauthorized => write!(f, "Missing or invalid credentials"),
            LongformError::Forbidden => write!(f, "Not the owner of this resource"),
            LongformError::NotFound(what) => write!(f, "Not found: {}", what),
            LongformError::Conflict(what) => write!(f, "Conflict: {}", what),
            LongformError::Stale {
                segment_id,
                expected,
            } => write!(
                f,
                "Conditional update lost: segment {} no longer '{}'",
                segment_id, expected
            ),
            LongformError::Transient(msg) => write!(f, "Transient upstream error: {}", msg),
            LongformError::Policy { code, message } => {
                write!(f, "Upstream policy refusal [{}]: {}", code, message)
            }
            LongformError::UpstreamFatal { code, message } => {
                write!(f, "Upstream terminal failure [{}]: {}", code, message)
            }
            LongformError::StitchFailed(msg) => write!(f, "Stitch failed: {}", msg),
            LongformError::Db(e) => write!(f, "Database error: {}", e),
            LongformError::Io(e) => write!(f, "I/O error: {}", e),
            LongformError::Http(e) => write!(f, "HTTP error: {}", e),
            LongformError::Json(e) => write!(f, "Serialization error: {}", e),
            LongformError::TaskJoin(msg) => write!(f, "Task execution error: {}", msg),
            LongformError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for LongformError {}

// Conversions
impl From<sqlx::Error> for LongformError {
    fn from(err: sqlx::Error) -> Self {
        LongformError::Db(err)
    }
}

impl From<std::io::Error> for LongformError {
    fn from(err: std::io::Error) -> Self {
        LongformError::Io(err)
    }
}

impl From<reqwest::Error> for LongformError {
    fn from(err: reqwest::Error) -> Self {
        // Deadline elapsed and connect-level failures are retryable
        if err.is_timeout() || err.is_connect() {
            LongformError::Transient(err.to_string())
        } else {
            LongformError::Http(err)
        }
    }
}

impl From<serde_json::Error> for LongformError {
    fn from(err: serde_json::Error) -> Self {
        LongformError::Json(err)
    }
}

impl From<tokio::task::JoinError> for LongformError {
    fn from(err: tokio::task::JoinError) -> Self {
        LongformError::TaskJoin(err.to_string())
    }
}

// Axum integration
impl IntoResponse for LongformError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            LongformError::Validation { field, message } => {
                let mut details = serde_json::Map::new();
                details.insert(
                    field.clone(),
                    serde_json::Value::String(message.clone()),
                );
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    serde_json::json!({
                        "status": "error",
                        "error": self.to_string(),
                        "details": details
                    }),
                )
            }
            LongformError::EmptyScript | LongformError::ChunkOverflow { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::json!({
                    "status": "error",
                    "error": self.to_string(),
                    "details": { "script_text": self.to_string() }
                }),
            ),
            LongformError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "status": "error", "error": self.to_string() }),
            ),
            LongformError::Forbidden => (
                StatusCode::FORBIDDEN,
                serde_json::json!({ "status": "error", "error": self.to_string() }),
            ),
            LongformError::NotFound(_) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({ "status": "error", "error": self.to_string() }),
            ),
            LongformError::Conflict(_) => (
                StatusCode::CONFLICT,
                serde_json::json!({ "status": "error", "error": self.to_string() }),
            ),
            _ => {
                tracing::error!("Internal error: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "status": "error", "error": "Internal server error" }),
                )
            }
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, LongformError>;
