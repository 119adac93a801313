use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use vastra_api::config::AppConfig;
use vastra_api::events::outbox::{self, OutboxWorkerConfig};

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    if config.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = vastra_api::config::load_config().context("loading configuration")?;
    init_tracing(&config);

    let db = Arc::new(
        vastra_api::db::connect(&config)
            .await
            .context("connecting to the database")?,
    );

    let state =
        vastra_api::build_state(db.clone(), config.clone(), None).context("wiring services")?;

    let fanout = vastra_api::build_fanout(&state);
    outbox::start_worker(
        db,
        fanout,
        OutboxWorkerConfig {
            poll_interval: Duration::from_millis(config.outbox_poll_interval_ms),
            batch_size: config.outbox_batch_size,
            max_attempts: config.outbox_max_attempts,
        },
    );

    let app = vastra_api::app_router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(Duration::from_secs(30)))
            .layer(CorsLayer::permissive())
            .layer(CompressionLayer::new()),
    );

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(addr = %addr, environment = %config.environment, "vastra-api listening");

    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
