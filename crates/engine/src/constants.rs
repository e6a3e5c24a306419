use hashmark_types::{TINYBARS_PER_HBAR, Tinybars};

/// Positions larger than this are liquidated in slices
pub const PARTIAL_LIQUIDATION_THRESHOLD: Tinybars = 100 * TINYBARS_PER_HBAR;

/// Slice taken per liquidation pass on large positions
pub const PARTIAL_LIQUIDATION_FRACTION: f64 = 0.2;

/// Smallest ADL slice of a candidate position
pub const ADL_MIN_SLICE_FRACTION: f64 = 0.01;

/// Positions at or below this size are closed outright (1e-4 HBAR)
pub const POSITION_DUST: Tinybars = TINYBARS_PER_HBAR / 10_000;

/// Funding rate clamp per settlement interval
pub const MAX_FUNDING_RATE: f64 = 0.01;

pub const DEFAULT_MAX_LEVERAGE: u32 = 10;

pub const DEFAULT_FUNDING_INTERVAL_MS: i64 = 60 * 60 * 1000;

pub const DEFAULT_DISPUTE_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

/// Σ price(o) must stay within this of 1 after every LMSR trade
pub const PRICE_SUM_TOLERANCE: f64 = 1e-9;

/// Ceiling on repeated cascade passes per sweep of one (market, outcome)
pub const MAX_CASCADE_PASSES: usize = 16;

/// Maintenance margin step per unit of leverage
const MAINTENANCE_MARGIN_STEP: f64 = 0.01;
const MAINTENANCE_MARGIN_CAP: f64 = 0.5;

/// Maintenance margin ratio by leverage bucket.
///
/// One percent per unit of leverage, capped at 50%: monotone-increasing,
/// and maintenance(50 HBAR, 5x) = 2.5 HBAR.
pub fn maintenance_margin_ratio(leverage: u32) -> f64 {
    (leverage as f64 * MAINTENANCE_MARGIN_STEP).min(MAINTENANCE_MARGIN_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maintenance_ratio_monotone() {
        let mut last = 0.0;
        for leverage in 1..=100 {
            let ratio = maintenance_margin_ratio(leverage);
            assert!(ratio >= last);
            last = ratio;
        }
        assert_eq!(maintenance_margin_ratio(5), 0.05);
        assert_eq!(maintenance_margin_ratio(100), 0.5);
    }
}
