use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use universal_exchange_backend::config::AppConfig;
use universal_exchange_backend::events::{redis, EventBus};
use universal_exchange_backend::services::matching::MatchingEngine;
use universal_exchange_backend::services::settlement::SettlementProcessor;
use universal_exchange_backend::store::{seed_demo_balances, MemoryStore, PgStore, Store};
use universal_exchange_backend::{app, metrics, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "universal_exchange_backend={},tower_http=info",
                    config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Starting Universal Exchange Backend v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Initialize metrics exporter
    let metrics_handle = metrics::init_metrics();

    // Initialize store: Postgres when configured, in-memory otherwise
    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url).await?;
            tracing::info!("Database connected, migrations applied");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    // Seed demo balances on an empty balance table
    if seed_demo_balances(store.as_ref()).await? {
        tracing::info!("Demo balances seeded");
    }

    // Initialize event bus, optionally mirrored to Redis
    let bus = Arc::new(EventBus::default());
    match &config.redis_url {
        Some(url) => redis::try_spawn_mirror(&bus, url).await,
        None => tracing::warn!("REDIS_URL not set, event mirror disabled"),
    }

    // Initialize matching engine
    let engine = Arc::new(MatchingEngine::new(store.clone(), bus.clone()));
    tracing::info!("Matching engine initialized");

    // Start settlement processor worker
    SettlementProcessor::new(store.clone(), bus.clone()).spawn();

    // Build application state and router
    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        bus,
        engine,
        metrics: Some(metrics_handle),
    });
    let app = app(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
