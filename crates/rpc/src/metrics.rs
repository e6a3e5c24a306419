use prometheus::{
    CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector for the RPC server.
///
/// Everything registers against an instance-local registry so several
/// servers (and tests) can coexist in one process.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    // Trading metrics
    pub orders_placed: CounterVec,
    pub orders_cancelled: CounterVec,
    pub bets_placed: CounterVec,
    pub fills: CounterVec,

    // Derivatives metrics
    pub positions_opened: CounterVec,
    pub positions_closed: CounterVec,
    pub liquidations: CounterVec,

    // State metrics
    pub insurance_balance: Gauge,
    pub outbox_pending: Gauge,

    // Performance metrics
    pub request_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str, labels: &[&str]| -> Result<CounterVec, prometheus::Error> {
            let vec = CounterVec::new(Opts::new(name, help), labels)?;
            registry.register(Box::new(vec.clone()))?;
            Ok(vec)
        };

        let orders_placed = counter(
            "hashmark_orders_placed_total",
            "Total number of orders placed",
            &["side"],
        )?;
        let orders_cancelled = counter(
            "hashmark_orders_cancelled_total",
            "Total number of orders cancelled",
            &[],
        )?;
        let bets_placed = counter(
            "hashmark_bets_placed_total",
            "Total number of LMSR bets placed",
            &[],
        )?;
        let fills = counter(
            "hashmark_fills_total",
            "Total number of order-book fills",
            &[],
        )?;
        let positions_opened = counter(
            "hashmark_positions_opened_total",
            "Total number of perpetual positions opened",
            &["side"],
        )?;
        let positions_closed = counter(
            "hashmark_positions_closed_total",
            "Total number of perpetual positions closed",
            &[],
        )?;
        let liquidations = counter(
            "hashmark_liquidations_total",
            "Total number of liquidation events",
            &["tier"],
        )?;

        let insurance_balance = Gauge::new(
            "hashmark_insurance_balance_hbar",
            "Insurance fund balance in HBAR",
        )?;
        registry.register(Box::new(insurance_balance.clone()))?;

        let outbox_pending = Gauge::new(
            "hashmark_outbox_pending",
            "Ledger effects awaiting dispatch",
        )?;
        registry.register(Box::new(outbox_pending.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "hashmark_request_duration_seconds",
                "Request duration in seconds",
            ),
            &["endpoint"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            orders_placed,
            orders_cancelled,
            bets_placed,
            fills,
            positions_opened,
            positions_closed,
            liquidations,
            insurance_balance,
            outbox_pending,
            request_duration,
        })
    }

    /// Export metrics in Prometheus format
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder.encode_to_string(&metric_families)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_collectors_can_coexist() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.orders_placed.with_label_values(&["BID"]).inc();
        assert_eq!(second.orders_placed.with_label_values(&["BID"]).get(), 0.0);
    }

    #[test]
    fn test_export_contains_registered_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.orders_placed.with_label_values(&["BID"]).inc();
        metrics.insurance_balance.set(42.0);

        let exported = metrics.export().unwrap();
        assert!(exported.contains("hashmark_orders_placed_total"));
        assert!(exported.contains("hashmark_insurance_balance_hbar"));
    }
}
