mod auth;
mod blobstore;
mod clients;
mod config;
mod context;
mod controller;
mod dispatcher;
mod error;
mod logging;
mod models;
mod segmenter;
mod server;
mod stitcher;
mod store;
mod worker;

use std::env;
use std::sync::Arc;

use auth::AuthKeys;
use blobstore::HttpBlobStore;
use clients::fusion::HttpFusionClient;
use clients::tts::HttpTtsClient;
use clients::UpstreamThrottle;
use config::AppConfig;
use context::CoreContext;
use server::{create_router, AppState};
use stitcher::FfmpegConcat;
use store::SegmentStore;

#[tokio::main]
async fn main() -> error::Result<()> {
    // Load .env file if it exists (silently ignore if it doesn't)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = env::args().collect();
    if args.contains(&"--version".to_string()) || args.contains(&"-v".to_string()) {
        println!("Longform Server v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let log_config = logging::LogConfig::from_env();
    // The guards flush the log files on drop; keep them for the process
    // lifetime
    let _log_guards = match logging::init_logging(&log_config) {
        Ok(guards) => Some(guards),
        Err(err) => {
            eprintln!("Failed to initialize logging: {}", err);
            None
        }
    };

    let mut app_config = AppConfig::from_env();
    if let Some(port) = args
        .iter()
        .position(|arg| arg == "--port")
        .and_then(|pos| args.get(pos + 1))
        .and_then(|p| p.parse::<u16>().ok())
    {
        app_config.port = port;
    }
    let dispatch_enabled = !args.contains(&"--no-dispatch".to_string());

    tracing::info!(
        worker_id = %app_config.worker_id,
        database_url = %app_config.database_url,
        "starting longform composition engine"
    );

    let store = SegmentStore::connect(&app_config.database_url).await?;

    let tts_throttle = UpstreamThrottle::new(
        app_config.upstream_rate_per_second,
        app_config.upstream_burst_size,
    );
    let fusion_throttle = UpstreamThrottle::new(
        app_config.upstream_rate_per_second,
        app_config.upstream_burst_size,
    );

    let ctx = CoreContext {
        store,
        tts: Arc::new(HttpTtsClient::new(
            app_config.tts_base_url.clone(),
            tts_throttle,
            app_config.upstream_request_timeout,
        )),
        fusion: Arc::new(HttpFusionClient::new(
            app_config.fusion_base_url.clone(),
            fusion_throttle,
            app_config.upstream_request_timeout,
        )),
        blobs: Arc::new(HttpBlobStore::new(
            app_config.blob_base_url.clone(),
            app_config.service_secret.clone(),
        )),
        concat: Arc::new(FfmpegConcat),
        config: app_config.clone(),
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let dispatcher_handle = if dispatch_enabled {
        Some(tokio::spawn(dispatcher::run(
            ctx.clone(),
            shutdown_rx.clone(),
        )))
    } else {
        tracing::info!("dispatch disabled, serving API only");
        None
    };
    let sweep_handle = tokio::spawn(controller::run_sweep(ctx.clone(), shutdown_rx.clone()));

    let auth = AuthKeys {
        service_secret: app_config.service_secret.clone(),
        jwt_secret: app_config.jwt_secret.clone(),
    };
    let state = AppState { ctx, auth };
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", app_config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "HTTP API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    // Stop claim loops and release held segments before exiting
    let _ = shutdown_tx.send(true);
    if let Some(handle) = dispatcher_handle {
        let _ = handle.await;
    }
    sweep_handle.abort();

    Ok(())
}
