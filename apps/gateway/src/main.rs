use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roomcast_common::id::{prefix, prefixed_ulid};
use roomcast_gateway::broker::{MemoryBroker, PubSubBroker, RedisBroker};
use roomcast_gateway::config::Config;
use roomcast_gateway::rooms::RoomManager;
use roomcast_gateway::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing — env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;
    let node_id = prefixed_ulid(prefix::NODE);

    let broker: Arc<dyn PubSubBroker> = match config.redis_url.as_deref() {
        Some(url) => Arc::new(
            RedisBroker::connect(url)
                .await
                .expect("failed to connect to redis"),
        ),
        None => {
            tracing::warn!("REDIS_URL not set; rooms fan out within this process only");
            Arc::new(MemoryBroker::new())
        }
    };

    tracing::info!(
        %node_id,
        redis = config.redis_url.is_some(),
        cors_allow_any = config.cors_allow_any,
        "roomcast-gateway configured"
    );

    let rooms = Arc::new(RoomManager::new(broker));
    let cors_allow_any = config.cors_allow_any;
    let state = AppState::new(rooms.clone(), config);

    let mut app = roomcast_gateway::routes::router()
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors_allow_any {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, %node_id, "roomcast-gateway listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    rooms.shutdown().await;
    tracing::info!(%node_id, "roomcast-gateway stopped");
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(?err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
