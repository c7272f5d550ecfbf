use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, Method};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod chat;
mod config;
mod error;
mod extract;
mod feedback;
mod interaction;
mod llm;
mod protocol;
mod routes;
mod routing;
mod state;
mod toolserver;
mod transcribe;

use chat::ChatService;
use config::OrchestratorConfig;
use feedback::DurableStore;
use interaction::InteractionStore;
use llm::LlmClient;
use toolserver::ToolServerClient;
use transcribe::Transcriber;

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    let config = OrchestratorConfig::from_env();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&config.log_level)
                .unwrap_or_else(|_| "haven_orchestrator=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    // Services, leaves first: stores, clients, then the chat service.
    let interactions = InteractionStore::connect(&config.redis).await;
    let durable = DurableStore::connect(&config.mysql).await;

    let tool_server = ToolServerClient::new(&config.tool_server_url);
    let llm = LlmClient::new(&config.llm.url, &config.llm.model);
    let transcriber = Transcriber::new(&config.whisper);

    let chat = Arc::new(ChatService::new(
        tool_server.clone(),
        llm.clone(),
        interactions.clone(),
    ));
    chat.initialize().await;

    let app_state = state::AppState {
        chat,
        interactions,
        durable,
        transcriber,
        tool_server,
        llm,
    };

    let app = Router::new()
        .merge(routes::info::router())
        .merge(routes::health::router())
        .merge(routes::chat::router())
        .merge(routes::feedback::router())
        .merge(routes::transcribe::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer(&config.cors_origins)),
        )
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.client_port));
    tracing::info!("Haven orchestrator listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind client port");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .expect("server terminated unexpectedly");
}

/// CORS for the web UI: configured origins, the usual methods and headers.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("authorization"),
            HeaderName::from_static("content-type"),
        ])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}
