//! # Server Configuration
//!
//! Router setup, shared state and the HTTP server lifecycle for the dialer.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::dialer::Dialer;
use crate::handlers;
use crate::telemetry;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub dialer: Arc<Dialer>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/test", get(handlers::liveness))
        .route("/token", get(handlers::token::issue_token))
        .route("/voice", post(handlers::voice::voice))
        .route("/twiml/connect", get(handlers::voice::connect))
        .route("/call-status", post(handlers::webhooks::dial_result))
        .route(
            "/call-status/{call_sid}",
            get(handlers::calls::get_call_status),
        )
        .route("/call-events", post(handlers::webhooks::call_events))
        .route(
            "/recording-status",
            post(handlers::webhooks::recording_status),
        )
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(telemetry::trace_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Starts the server and serves until Ctrl-C or SIGTERM, then stops all call monitors
pub async fn run_server(
    config: AppConfig,
    dialer: Arc<Dialer>,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let state = AppState {
        config: Arc::new(config),
        dialer: dialer.clone(),
    };
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    dialer.shutdown().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::liveness,
        crate::handlers::token::issue_token,
        crate::handlers::voice::voice,
        crate::handlers::voice::connect,
        crate::handlers::webhooks::dial_result,
        crate::handlers::webhooks::call_events,
        crate::handlers::webhooks::recording_status,
        crate::handlers::calls::get_call_status,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::CallStatus,
            crate::models::DialResultForm,
            crate::models::CallEventForm,
            crate::models::RecordingStatusForm,
            crate::token_issuer::IssuedToken,
            crate::handlers::voice::VoiceForm,
            crate::handlers::calls::CallStatusResponse,
            crate::monitor::MonitorSnapshot,
            crate::error::ApiError,
            crate::error::UpstreamError,
        )
    ),
    info(
        title = "Dialer API",
        description = "Voice call broker: client tokens, call documents and call status relay",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
