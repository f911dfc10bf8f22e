//! NavalQA API Gateway
//!
//! The HTTP entry point for the question answering pipeline.
//! Handles:
//! - Question answering and chat history
//! - Rate limiting
//! - Request routing
//! - Observability (logging, metrics, tracing)

mod handlers;
mod middleware;
mod session;

use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use navalqa_common::{
    composer::create_composer,
    config::{AppConfig, ObservabilityConfig},
    history::InMemoryHistory,
    knowledge::create_knowledge_source,
    metrics,
    pipeline::ReqwestProbe,
    Collaborators, Orchestrator, Politeness,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<Orchestrator>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    init_tracing(&config.observability);
    info!("Starting NavalQA API Gateway v{}", navalqa_common::VERSION);

    // Initialize metrics
    init_metrics(&config.observability)?;

    let state = build_state(config.clone())?;
    let app = create_router(state)?;

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.shutdown_timeout()))
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// JSON or pretty logs, filtered by the configured level or directive
fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json_logging {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().pretty().with_target(true)).init();
    }
}

/// Describe metrics and start the Prometheus exporter unless disabled
fn init_metrics(config: &ObservabilityConfig) -> anyhow::Result<()> {
    metrics::register_metrics();

    if config.metrics_port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            metrics::LATENCY_BUCKETS,
        )?
        .install()?;

    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

/// Construct every collaborator once and inject them into the pipeline
fn build_state(config: Arc<AppConfig>) -> navalqa_common::Result<AppState> {
    let politeness = Arc::new(Politeness::new(config.knowledge.politeness()));

    let knowledge = create_knowledge_source(&config.knowledge, politeness.clone())?;
    let composer = create_composer(&config.composer)?;
    let probe = Arc::new(ReqwestProbe::new(&config.knowledge.user_agent)?);

    info!(
        knowledge = knowledge.name(),
        composer = composer.model_name(),
        politeness_ms = config.knowledge.politeness_ms,
        "Pipeline collaborators ready"
    );

    let collaborators = Collaborators {
        knowledge,
        composer,
        probe,
        history: Arc::new(InMemoryHistory::from_config(&config.history)),
        politeness,
    };

    Ok(AppState {
        pipeline: Arc::new(Orchestrator::new(collaborators, &config)),
        config,
    })
}

/// Create the main application router
fn create_router(state: AppState) -> navalqa_common::Result<Router> {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API routes
    let api_routes = Router::new()
        .route("/ask", post(handlers::ask::ask))
        .route("/chat_history", get(handlers::history::chat_history))
        .route("/clear_chat", post(handlers::history::clear_chat))
        .route("/citation", get(handlers::citation::citation));

    let mut app = Router::new()
        .route("/health", get(handlers::health::health))
        .nest("/api", api_routes);

    let rate_limit = &state.config.rate_limit;
    if rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(rate_limit.requests_per_second, rate_limit.burst)?;
        app = app.layer(axum::middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit::rate_limit_middleware,
        ));
    }

    // Compose the app
    Ok(app
        .layer(axum::middleware::from_fn(middleware::metrics::track_metrics))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(state.config.request_timeout()))
                .layer(cors)
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state))
}

/// Graceful shutdown signal handler. In-flight requests get `drain` to finish.
async fn shutdown_signal(drain: std::time::Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }

    tokio::spawn(async move {
        tokio::time::sleep(drain).await;
        tracing::warn!(drain_secs = drain.as_secs(), "Shutdown timeout elapsed, exiting");
        std::process::exit(1);
    });
}
