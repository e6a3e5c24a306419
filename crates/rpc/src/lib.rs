mod error;
mod handlers;
mod metrics;
mod middleware;
mod types;

pub use error::*;
pub use metrics::*;
pub use middleware::*;
pub use types::*;

use axum::{
    Router,
    routing::{delete, get, post},
};
use hashmark_engine::{Engine, EngineConfig, EngineError};
use hashmark_ledger::LedgerPort;
use hashmark_state::StateStore;
use hashmark_types::to_hbar;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// RPC server state.
///
/// The engine sits behind one writer lock: every mutating request
/// serializes through it, which is the engine's single-writer contract.
/// Acquisition is bounded by `request_timeout`; missing the deadline
/// fails the request with `TIMEOUT` and no partial effects.
#[derive(Clone)]
pub struct RpcState {
    pub engine: Arc<RwLock<Engine>>,
    pub ledger: Arc<dyn LedgerPort>,
    pub store: Arc<StateStore>,
    pub metrics: Arc<Metrics>,
    pub admin_key: Option<String>,
    pub request_timeout: Duration,
    liquidations_seen: Arc<AtomicUsize>,
}

impl RpcState {
    pub fn new(
        engine: Arc<RwLock<Engine>>,
        ledger: Arc<dyn LedgerPort>,
        store: Arc<StateStore>,
        admin_key: Option<String>,
    ) -> Self {
        Self {
            engine,
            ledger,
            store,
            metrics: Arc::new(Metrics::default()),
            admin_key,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            liquidations_seen: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Acquire the writer before the deadline or fail with TIMEOUT.
    pub async fn write_engine(&self) -> Result<RwLockWriteGuard<'_, Engine>, RpcError> {
        tokio::time::timeout(self.request_timeout, self.engine.write())
            .await
            .map_err(|_| RpcError::Engine(EngineError::Timeout))
    }

    pub async fn read_engine(&self) -> Result<RwLockReadGuard<'_, Engine>, RpcError> {
        tokio::time::timeout(self.request_timeout, self.engine.read())
            .await
            .map_err(|_| RpcError::Engine(EngineError::Timeout))
    }

    /// Post-transaction bookkeeping: snapshot the committed state, push
    /// pending ledger effects, refresh state gauges.
    pub fn commit(&self, engine: &mut Engine) {
        if let Err(e) = self.store.save_snapshot(&engine.to_snapshot()) {
            tracing::error!("state snapshot failed: {e}");
        }
        engine.dispatch_outbox(self.ledger.as_ref());

        let log = engine.liquidation_log();
        let seen = self.liquidations_seen.swap(log.len(), Ordering::SeqCst);
        for entry in log.iter().skip(seen) {
            let tier = format!("{}", entry.tier as u8);
            self.metrics
                .liquidations
                .with_label_values(&[tier.as_str()])
                .inc();
        }

        self.metrics
            .insurance_balance
            .set(to_hbar(engine.insurance_fund().balance));
        self.metrics.outbox_pending.set(engine.outbox_pending() as f64);
    }

    /// Throwaway state for unit tests: in-memory ledger, no persistence.
    pub fn for_tests(admin_key: Option<String>) -> Self {
        let engine = Engine::new(
            EngineConfig::default(),
            Arc::new(hashmark_types::SystemClock),
        );
        let store = StateStore::new(std::env::temp_dir().join("hashmark-rpc-tests"), false)
            .expect("temp store");
        Self::new(
            Arc::new(RwLock::new(engine)),
            Arc::new(hashmark_ledger::InMemoryLedger::new()),
            Arc::new(store),
            admin_key,
        )
    }
}

/// Build the HTTP surface.
pub fn router(state: RpcState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/markets", post(handlers::create_market).get(handlers::list_markets))
        .route("/markets/{id}", get(handlers::get_market))
        .route("/markets/{id}/transition", post(handlers::transition_market))
        .route("/markets/{id}/book", get(handlers::book_depth))
        .route("/markets/{id}/bets", post(handlers::place_bet))
        .route("/markets/{id}/orders", post(handlers::place_order))
        .route("/orders/{id}", delete(handlers::cancel_order))
        .route("/derivatives/positions", post(handlers::open_position).get(handlers::list_positions))
        .route("/derivatives/positions/{id}/close", post(handlers::close_position))
        .route("/derivatives/liquidations", get(handlers::list_liquidations))
        .route("/accounts/{id}", get(handlers::get_account))
        .route("/accounts/{id}/deposit", post(handlers::deposit))
        .route("/accounts/{id}/withdraw", post(handlers::withdraw))
        .route("/insurance", get(handlers::get_insurance))
        .route("/insurance/deposit", post(handlers::insurance_deposit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
