use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use serpent_arena_server::config::{ServerConfig, SimConfig};
use serpent_arena_server::economy::accounts::{GuestIdentityProvider, MemoryAccountStore};
#[cfg(feature = "http_price")]
use serpent_arena_server::economy::price::HttpPriceFeed;
use serpent_arena_server::economy::price::{FixedPriceFeed, PriceCache, PriceFeed};
use serpent_arena_server::economy::wager::WagerService;
use serpent_arena_server::economy::wallet::LedgerWallet;
use serpent_arena_server::game::game_loop::GameLoop;
use serpent_arena_server::game::kill_log::TracingKillLog;
use serpent_arena_server::metrics::{self, Metrics};
use serpent_arena_server::net::game_session::GameSession;
use serpent_arena_server::net::transport::TcpTransport;

fn price_feed(config: &ServerConfig) -> Arc<dyn PriceFeed> {
    #[cfg(feature = "http_price")]
    {
        if let Some(url) = &config.price_feed_url {
            info!("Using HTTP price feed at {}", url);
            return Arc::new(HttpPriceFeed::new(url.clone()));
        }
    }
    #[cfg(not(feature = "http_price"))]
    {
        if config.price_feed_url.is_some() {
            tracing::warn!("PRICE_FEED_URL is set but the http_price feature is disabled, using a fixed quote");
        }
    }
    info!("Using fixed price of {} USD per unit", config.price_usd_per_unit);
    Arc::new(FixedPriceFeed(config.price_usd_per_unit))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Serpent Arena Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    if let Err(e) = config.validate() {
        anyhow::bail!("Invalid server configuration: {}", e);
    }
    let sim = SimConfig::load_or_default();
    if let Err(e) = sim.validate() {
        anyhow::bail!("Invalid simulation configuration: {}", e);
    }
    info!(
        "Configuration loaded: {}:{}, arena radius {}, {} Hz tick / {} Hz broadcast",
        config.bind_address, config.port, sim.arena_radius, sim.tick_rate, sim.broadcast_rate
    );

    let metrics = Arc::new(Metrics::new());
    let metrics_addr = SocketAddr::new(config.bind_address, config.metrics_port);
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_addr).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Development collaborators: in-memory ledger and account store
    let ledger = Arc::new(LedgerWallet::new());
    let accounts = Arc::new(MemoryAccountStore::new());
    let prices = Arc::new(PriceCache::new(
        price_feed(&config),
        Duration::from_secs(sim.price_ttl_secs),
    ));
    let wager = Arc::new(WagerService::new(
        ledger.clone(),
        accounts,
        prices,
        sim.allowed_bets_usd_cents.clone(),
        sim.wager_chunk_usd_cents,
    ));
    let identity = Arc::new(GuestIdentityProvider::new(config.starting_balance).with_ledger(ledger));

    let max_messages_per_second = sim.max_messages_per_second;
    let game_loop = GameLoop::new(sim, Arc::new(TracingKillLog));
    let (session, handle) = GameSession::new(game_loop, wager, metrics.clone(), config.price_usd_per_unit);
    let lane = session.start();

    let transport = TcpTransport::new(handle, identity, metrics, max_messages_per_second);
    let addr = SocketAddr::new(config.bind_address, config.port);

    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = transport.run(addr) => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    lane.abort();
    info!("Server stopped");
    Ok(())
}
