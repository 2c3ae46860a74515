use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use switchboard_mcp_runtime::{
    Collaborators, InMemoryLivenessStore, ProtocolDispatcher, SessionRegistry, ToolCatalog,
};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod config;
mod error;
mod middleware;
mod presence;
mod routes;
mod state;

use auth::StaticKeyAuthProvider;
use config::{ConfigError, ServerConfig};
use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Switchboard",
        version = "0.1.0",
        description = "JSON-RPC tool-calling server for autonomous agents, over a push stream or plain request/response."
    ),
    paths(
        routes::health::health_check,
        routes::rpc::handle_rpc,
        routes::rpc::end_session,
        routes::push_stream::connect,
        routes::push_stream::submit,
    ),
    components(schemas(
        HealthResponse,
        switchboard_core::error::ApiError,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(
                utoipa::openapi::security::Http::new(
                    utoipa::openapi::security::HttpAuthScheme::Bearer,
                ),
            ),
        );
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Sessions currently registered, across both transports
    pub sessions: usize,
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "switchboard_api=debug,switchboard_mcp_runtime=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    if let Err(err) = run().await {
        tracing::error!(error = %err, "Switchboard failed to start");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let config = ServerConfig::from_env()?;
    let auth = StaticKeyAuthProvider::load(&config.keys_file)?;
    tracing::info!(
        keys_file = %config.keys_file.display(),
        credentials = auth.len(),
        "Loaded credential table"
    );

    let registry = Arc::new(SessionRegistry::new(
        Arc::new(InMemoryLivenessStore::new()),
        config.registry_config(),
    ));
    let dispatcher = Arc::new(ProtocolDispatcher::new(
        Arc::new(ToolCatalog::standard()),
        Collaborators::in_memory(),
    ));
    let app_state = AppState::new(registry, dispatcher, Arc::new(auth), config);

    let reaper = spawn_reaper(&app_state);
    tokio::spawn(cancel_on_signal(app_state.shutdown.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], app_state.config.port));
    let shutdown = app_state.shutdown.clone();
    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;
    tracing::info!("Switchboard listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await
    .map_err(StartupError::Serve)?;

    let _ = reaper.await;
    tracing::info!("Switchboard stopped");
    Ok(())
}

fn build_router(app_state: AppState) -> Router {
    let cors_layer = middleware::cors::build_cors_layer(&app_state.config.cors_origins);

    // Per-endpoint rate limiting on the JSON-RPC ingress routes
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(middleware::rate_limit::limited(
            routes::rpc::router(),
            middleware::rate_limit::rpc_layer(),
        ))
        .merge(routes::push_stream::stream_router())
        .merge(middleware::rate_limit::limited(
            routes::push_stream::submit_router(),
            middleware::rate_limit::submit_layer(),
        ))
        .layer(axum::middleware::from_fn(middleware::security_headers::apply))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state)
}

/// Periodically evict idle request/response sessions until shutdown.
fn spawn_reaper(app_state: &AppState) -> JoinHandle<()> {
    let registry = app_state.registry.clone();
    let shutdown = app_state.shutdown.clone();
    let period = app_state.config.reap_interval;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reaped = registry.reap_idle().await;
                    if reaped > 0 {
                        tracing::debug!(reaped, remaining = registry.len(), "Reaper pass finished");
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    })
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = shutdown.cancelled() => return,
    }
    tracing::info!("Shutdown signal received, draining connections");
    shutdown.cancel();
}
