use anyhow::Context;
use levsim::{api, config::Config, db::init_db, KlineMarketData, MarketDataProvider, Repository};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("configuration error")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .context("failed to initialize database")?;
    let repo = Arc::new(Repository::new(pool));

    let market: Arc<dyn MarketDataProvider> = Arc::new(
        KlineMarketData::new(
            config.market_data_url.clone(),
            config.market_symbols.clone(),
            config.candle_interval.clone(),
            config.candle_count,
            config.market_history_start_ms,
        )
        .context("invalid market data settings")?,
    );

    let app = api::create_router(api::AppState::new(repo, config, market));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
