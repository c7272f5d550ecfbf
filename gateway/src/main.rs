use std::net::SocketAddr;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod dispatch;
mod effectors;
mod error;
mod extract;
mod ha;
mod registry;
mod routes;
mod state;

use config::GatewayConfig;
use dispatch::Dispatcher;
use effectors::ntp::NtpEffector;
use ha::cache::StateCache;
use ha::HomeAssistant;
use registry::ToolRegistry;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Haven Gateway",
        version = "0.1.0",
        description = "Tool-invocation gateway: a typed tool registry over NTP, ping, and Home Assistant effectors."
    ),
    paths(
        routes::health::health_check,
        routes::tools::list_tools,
        routes::tools::call_tool,
        routes::generate::generate,
    ),
    components(schemas(
        routes::health::HealthResponse,
        routes::generate::GenerateRequest,
        routes::generate::GenerateResponse,
        haven_core::tool::ToolDescriptor,
        haven_core::tool::ToolCallRequest,
        haven_core::tool::ToolResult,
        haven_core::error::ErrorKind,
    ))
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    let config = GatewayConfig::from_env();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&config.log_level)
                .unwrap_or_else(|_| "haven_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Services, leaves first: cache, synchronizer, effectors, dispatcher.
    let cache = StateCache::connect(&config.redis, config.ha.cache_ttl_secs).await;
    let ha = HomeAssistant::new(config.ha.clone(), cache.clone());
    let event_stream = ha.spawn_event_stream();

    let ntp = NtpEffector::new(&config.ntp);
    let dispatcher = Dispatcher::new(ToolRegistry::new(), ntp, ha.clone());

    let app_state = state::AppState {
        dispatcher,
        ha,
        cache,
    };

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::tools::router())
        .merge(routes::generate::router())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("Haven gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind server port");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(event_stream))
        .await
        .expect("server terminated unexpectedly");
}

/// Ordered shutdown: stop the WebSocket reader first, then let the HTTP
/// server drain in-flight requests.
async fn shutdown_signal(event_stream: Option<tokio::task::JoinHandle<()>>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
    if let Some(task) = event_stream {
        task.abort();
    }
}
