use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use uuid::Uuid;

/// Request ID wrapper for correlating log lines across the system
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Generate (or propagate) a unique request ID per request
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get("X-Request-ID")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(req).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("X-Request-ID", header_value);
    }

    response
}

/// Log every HTTP request to the access log
pub async fn access_log_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(|q| q.to_string());

    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let client_ip = extract_client_ip(&req);

    // Never log the bearer itself; a truncated hash is enough to correlate
    let bearer_hash = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|value| {
            let token = value.strip_prefix("Bearer ").unwrap_or(value);
            format!("{:x}", md5::compute(token.as_bytes()))
                .chars()
                .take(8)
                .collect::<String>()
        });

    let response = next.run(req).await;

    let status = response.status();
    let duration = start.elapsed();

    tracing::info!(
        target: "access_log",
        request_id = %request_id,
        client_ip = %client_ip,
        method = %method,
        path = %path,
        query = ?query,
        status = status.as_u16(),
        duration_ms = duration.as_millis() as u64,
        bearer_hash = ?bearer_hash,
        "HTTP request completed"
    );

    let slow_threshold_ms = std::env::var("LOG_SLOW_REQUEST_THRESHOLD_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(5000);

    if duration.as_millis() as u64 > slow_threshold_ms {
        tracing::warn!(
            request_id = %request_id,
            path = %path,
            duration_ms = duration.as_millis() as u64,
            threshold_ms = slow_threshold_ms,
            "Slow request detected"
        );
    }

    response
}

/// Extract client IP, checking proxy headers first
fn extract_client_ip(req: &Request) -> String {
    if let Some(forwarded) = req.headers().get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                return first_ip.trim().to_string();
            }
        }
    }

    if let Some(real_ip) = req.headers().get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return ip_str.to_string();
        }
    }

    "unknown".to_string()
}
