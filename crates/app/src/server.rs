use crate::config::StartConfig;
use hashmark_engine::Engine;
use hashmark_ledger::{InMemoryLedger, LedgerPort};
use hashmark_rpc::RpcState;
use hashmark_state::StateStore;
use hashmark_types::SystemClock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber
pub fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Start the hashmark daemon
pub async fn start_server(config: &StartConfig) -> anyhow::Result<()> {
    tracing::info!("starting hashmark");
    tracing::info!("  state dir: {} (persist: {})", config.state_dir, config.persist_enabled());
    tracing::info!("  funding interval: {}ms", config.funding_interval_ms);
    tracing::info!("  liquidation sweep: {}ms", config.liquidation_sweep_interval_ms);
    tracing::info!("  max leverage: {}x", config.max_leverage);
    if config.admin_key.is_none() {
        tracing::warn!("  no admin key configured; admin routes answer 503");
    }

    let store = StateStore::new(&config.state_dir, config.persist_enabled())?;
    let mut engine = Engine::new(config.engine_config(), Arc::new(SystemClock));

    // Restore whatever the last run left behind; fresh files mean a
    // fresh engine.
    engine.restore_snapshot(store.load_snapshot());
    tracing::info!("  restored {} pending ledger effects", engine.outbox_pending());

    // The ledger adapter is pluggable; the in-memory port keeps local
    // runs deterministic.
    let ledger: Arc<dyn LedgerPort> = Arc::new(InMemoryLedger::new());
    let engine = Arc::new(RwLock::new(engine));
    let state = RpcState::new(
        engine.clone(),
        ledger,
        Arc::new(store),
        config.admin_key.clone(),
    );

    spawn_tickers(state.clone(), config);

    let app = hashmark_rpc::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    tracing::info!("listening on {}", config.http_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Final snapshot on the way out
    let mut engine = state.engine.write().await;
    state.commit(&mut engine);
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

/// Background cadences: funding settlement, the liquidation sweep with
/// dispute expiry, and outbox redelivery. Each pass walks markets in
/// ascending id order inside one writer acquisition.
fn spawn_tickers(state: RpcState, config: &StartConfig) {
    let funding_interval = Duration::from_millis(config.funding_interval_ms.max(1) as u64);
    let sweep_interval = Duration::from_millis(config.liquidation_sweep_interval_ms.max(1) as u64);

    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(funding_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick fires immediately
            loop {
                ticker.tick().await;
                let mut engine = state.engine.write().await;
                engine.settle_funding();
                state.commit(&mut engine);
            }
        });
    }

    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let mut engine = state.engine.write().await;
                engine.expire_disputes();
                engine.sweep_liquidations();
                state.commit(&mut engine);
            }
        });
    }

    // Outbox retries fire even when no requests arrive
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let mut engine = state.engine.write().await;
            if engine.outbox_pending() > 0 {
                engine.dispatch_outbox(state.ledger.as_ref());
            }
        }
    });
}
