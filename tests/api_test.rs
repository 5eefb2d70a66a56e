mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::harness;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::Serialize;
use serde_json::Value;
use tower::ServiceExt;

use longform_server::auth::AuthKeys;
use longform_server::server::{create_router, AppState};

const JWT_SECRET: &str = "test-jwt-secret";
const SERVICE_SECRET: &str = "test-service-secret";

#[derive(Serialize)]
struct Claims {
    sub: String,
    exp: usize,
}

fn user_token(sub: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        exp: 4_102_444_800, // 2100-01-01
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

async fn test_app() -> axum::Router {
    let h = harness().await;
    let auth = AuthKeys {
        service_secret: SERVICE_SECRET.to_string(),
        jwt_secret: JWT_SECRET.to_string(),
    };
    create_router(AppState { ctx: h.ctx, auth })
}

fn create_body() -> Value {
    serde_json::json!({
        "face_artifact_id": "0c0f7f3e-9a51-4a43-9a3e-1c9a3b7f8d21",
        "aspect_ratio": "9:16",
        "voice_cfg": { "locale": "en-US", "output_format": "mp3" },
        "segment_seconds": 10,
        "max_segment_seconds": 12,
        "voice_gender_mode": "auto",
        "script_text": "Hello world. This is a longform test script.",
        "tags": { "source": "test" }
    })
}

fn post_job(token: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/longform/jobs")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_requires_no_auth() {
    let app = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_create_job_returns_201_with_job_id() {
    let app = test_app().await;
    let response = app
        .oneshot(post_job(&user_token("user-1"), &create_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert!(body["job_id"].as_str().is_some());
}

#[tokio::test]
async fn test_create_then_read_job() {
    let app = test_app().await;
    let token = user_token("user-1");

    let created = app
        .clone()
        .oneshot(post_job(&token, &create_body()))
        .await
        .unwrap();
    let job_id = json_body(created).await["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/longform/jobs/{}", job_id))
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["job_id"], job_id.as_str());
    assert_eq!(body["status"], "queued");
    assert!(body["total_segments"].as_u64().unwrap() >= 1);
    assert_eq!(body["completed_segments"], 0);
    assert_eq!(body["final_video_url"], Value::Null);

    // The error keys are part of the body even before any failure
    let object = body.as_object().unwrap();
    assert!(object.contains_key("error_code"));
    assert!(object.contains_key("error_message"));
    assert_eq!(body["error_code"], Value::Null);
    assert_eq!(body["error_message"], Value::Null);
}

#[tokio::test]
async fn test_create_job_without_bearer_is_401() {
    let app = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/longform/jobs")
                .header("content-type", "application/json")
                .body(Body::from(create_body().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_job_validation_failure_is_422_with_details() {
    let app = test_app().await;
    let mut body = create_body();
    body["segment_seconds"] = serde_json::json!(3);
    let response = app
        .oneshot(post_job(&user_token("user-1"), &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert!(body["details"]["segment_seconds"].as_str().is_some());
}

#[tokio::test]
async fn test_create_job_empty_script_is_422() {
    let app = test_app().await;
    let mut body = create_body();
    body["script_text"] = serde_json::json!("   ");
    let response = app
        .oneshot(post_job(&user_token("user-1"), &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_manual_gender_without_gender_is_422() {
    let app = test_app().await;
    let mut body = create_body();
    body["voice_gender_mode"] = serde_json::json!("manual");
    let response = app
        .oneshot(post_job(&user_token("user-1"), &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert!(body["details"]["voice_gender"].as_str().is_some());
}

#[tokio::test]
async fn test_read_someone_elses_job_is_403() {
    let app = test_app().await;
    let created = app
        .clone()
        .oneshot(post_job(&user_token("user-1"), &create_body()))
        .await
        .unwrap();
    let job_id = json_body(created).await["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/longform/jobs/{}", job_id))
                .header("authorization", format!("Bearer {}", user_token("user-2")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let app = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/longform/jobs/7f3d3a1e-3b9e-43a7-8a71-2f4b9f6f2a10")
                .header("authorization", format!("Bearer {}", user_token("user-1")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_job_id_is_404() {
    let app = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/longform/jobs/definitely-not-a-uuid")
                .header("authorization", format!("Bearer {}", user_token("user-1")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_segment_list_is_ordered_and_shaped() {
    let app = test_app().await;
    let token = user_token("user-1");
    let mut body = create_body();
    body["script_text"] = serde_json::json!(
        "First sentence for the first segment of this script, it keeps going and going for a while. \
         Second sentence also runs fairly long so the packer starts another chunk right away. \
         Third sentence closes out the script with yet more words to speak aloud."
    );
    body["segment_seconds"] = serde_json::json!(5);
    body["max_segment_seconds"] = serde_json::json!(8);

    let created = app.clone().oneshot(post_job(&token, &body)).await.unwrap();
    let job_id = json_body(created).await["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/longform/jobs/{}/segments", job_id))
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let segments = body.as_array().unwrap();
    assert!(segments.len() >= 2);
    for (index, segment) in segments.iter().enumerate() {
        assert_eq!(segment["segment_index"].as_u64().unwrap(), index as u64);
        assert_eq!(segment["status"], "queued");
        assert!(segment["duration_sec"].as_u64().unwrap() >= 1);
        assert_eq!(segment["segment_video_url"], Value::Null);
    }
}

#[tokio::test]
async fn test_service_principal_reads_on_behalf_of_actor() {
    let app = test_app().await;
    let created = app
        .clone()
        .oneshot(post_job(&user_token("user-1"), &create_body()))
        .await
        .unwrap();
    let job_id = json_body(created).await["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    // Right actor: allowed
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/longform/jobs/{}", job_id))
                .header("authorization", format!("Bearer {}", SERVICE_SECRET))
                .header("x-actor-user-id", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Wrong actor: forbidden
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/longform/jobs/{}", job_id))
                .header("authorization", format!("Bearer {}", SERVICE_SECRET))
                .header("x-actor-user-id", "user-9")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_internal_route_rejects_user_principals() {
    let app = test_app().await;
    let created = app
        .clone()
        .oneshot(post_job(&user_token("user-1"), &create_body()))
        .await
        .unwrap();
    let job_id = json_body(created).await["job_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/internal/longform/jobs/{}", job_id))
                .header("authorization", format!("Bearer {}", user_token("user-1")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/internal/longform/jobs/{}", job_id))
                .header("authorization", format!("Bearer {}", SERVICE_SECRET))
                .header("x-actor-user-id", "user-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["segment_status_counts"]["queued"].as_u64().unwrap() >= 1);
    assert_eq!(body["locked_segments"], 0);
}

#[tokio::test]
async fn test_identical_payloads_create_distinct_jobs() {
    let app = test_app().await;
    let token = user_token("user-1");
    let first = json_body(
        app.clone()
            .oneshot(post_job(&token, &create_body()))
            .await
            .unwrap(),
    )
    .await;
    let second = json_body(app.oneshot(post_job(&token, &create_body())).await.unwrap()).await;
    assert_ne!(first["job_id"], second["job_id"]);
}
