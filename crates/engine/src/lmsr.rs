//! Logarithmic Market Scoring Rule pricing.
//!
//! Cost function C(q) = b * ln(sum_k exp(q_k / b)), computed in
//! log-sum-exp form so large q/b never overflows. Prices are the softmax
//! of q/b and sum to one by construction.

use crate::EngineError;
use hashmark_state::CurveState;

/// Hard ceiling on stake relative to the liquidity parameter; beyond it
/// the closed-form delta loses precision.
pub const MAX_STAKE_TO_LIQUIDITY_RATIO: f64 = 700.0;

#[inline]
fn log_sum_exp(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let m = values.clone().fold(f64::NEG_INFINITY, f64::max);
    if m == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    m + values.map(|v| (v - m).exp()).sum::<f64>().ln()
}

/// ln(exp(t) - 1) for t > 0, stable for all magnitudes of t.
#[inline]
fn ln_expm1_pos(t: f64) -> f64 {
    debug_assert!(t.is_finite() && t > 0.0);
    t + (1.0 - (-t).exp()).ln()
}

fn validate(curve: &CurveState) -> Result<(), EngineError> {
    if !(curve.b.is_finite() && curve.b > 0.0) {
        return Err(EngineError::validation("liquidity parameter b must be positive and finite"));
    }
    if curve.shares.iter().any(|q| !q.is_finite()) {
        return Err(EngineError::validation("curve share quantities must be finite"));
    }
    Ok(())
}

/// C(q) in HBAR.
pub fn cost(curve: &CurveState) -> f64 {
    curve.b * log_sum_exp(curve.shares.iter().map(|q| q / curve.b))
}

/// Softmax prices per outcome; each in (0, 1), summing to 1.
pub fn prices(curve: &CurveState) -> Vec<f64> {
    let m = curve
        .shares
        .iter()
        .map(|q| q / curve.b)
        .fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = curve.shares.iter().map(|q| (q / curve.b - m).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Price of a single outcome.
pub fn price_of(curve: &CurveState, outcome: u16) -> f64 {
    prices(curve)[outcome as usize]
}

/// Cost in HBAR of buying `delta_shares` of `outcome`: C(q') - C(q).
/// A zero delta is a no-op quote at zero cost.
pub fn quote_cost(curve: &CurveState, outcome: u16, delta_shares: f64) -> Result<f64, EngineError> {
    validate(curve)?;
    if !delta_shares.is_finite() || delta_shares < 0.0 {
        return Err(EngineError::validation("share delta must be finite and non-negative"));
    }
    if delta_shares == 0.0 {
        return Ok(0.0);
    }

    let before = cost(curve);
    let mut after = curve.clone();
    after.shares[outcome as usize] += delta_shares;
    Ok(cost(&after) - before)
}

/// Closed-form number of shares a stake of `stake_hbar` buys on `outcome`.
///
/// Solves C(q') - C(q) = s in the log domain:
///   t     = s/b + ln(sum_k exp(q_k/b))
///   not_o = ln(sum_{k != o} exp(q_k/b))
///   delta = b * (ln(exp(t) - exp(not_o)) - q_o/b)
pub fn shares_for_stake(
    curve: &CurveState,
    outcome: u16,
    stake_hbar: f64,
) -> Result<f64, EngineError> {
    validate(curve)?;
    if !(stake_hbar.is_finite() && stake_hbar > 0.0) {
        return Err(EngineError::validation("stake must be positive"));
    }
    if stake_hbar / curve.b > MAX_STAKE_TO_LIQUIDITY_RATIO {
        return Err(EngineError::InsufficientLiquidity);
    }

    let o = outcome as usize;
    let b = curve.b;
    let a_o = curve.shares[o] / b;
    let lse_all = log_sum_exp(curve.shares.iter().map(|q| q / b));
    let t = stake_hbar / b + lse_all;

    // Two outcomes reduce to ln(expm1); the general case subtracts the
    // rest of the pool in the log domain.
    let not_o = log_sum_exp(
        curve
            .shares
            .iter()
            .enumerate()
            .filter(|(k, _)| *k != o)
            .map(|(_, q)| q / b)
            .collect::<Vec<_>>()
            .into_iter(),
    );

    // exp(t) > exp(lse_all) >= exp(not_o) for positive stakes
    let gap = t - not_o;
    if !(gap > 0.0) {
        return Err(EngineError::validation("stake too small to price"));
    }
    let delta = b * (not_o + ln_expm1_pos(gap) - a_o);

    if !delta.is_finite() || delta <= 0.0 {
        return Err(EngineError::Internal(format!(
            "share delta not finite: {delta}"
        )));
    }
    Ok(delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_outcome_curve() -> CurveState {
        CurveState {
            b: 100.0,
            shares: vec![0.0, 0.0],
        }
    }

    #[test]
    fn test_quote_matches_closed_form() {
        let curve = two_outcome_curve();
        // C(50, 0) - C(0, 0) = 100 * ln((e^0.5 + 1) / 2)
        let cost = quote_cost(&curve, 0, 50.0).unwrap();
        assert!((cost - 28.0934).abs() < 1e-3, "cost = {cost}");
    }

    #[test]
    fn test_prices_after_buy() {
        let mut curve = two_outcome_curve();
        curve.shares[0] += 50.0;
        let p = prices(&curve);
        assert!((p[0] - 0.6225).abs() < 1e-4);
        assert!((p[1] - 0.3775).abs() < 1e-4);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_marginal_cost_increases() {
        let mut curve = two_outcome_curve();
        let first = quote_cost(&curve, 0, 50.0).unwrap();
        curve.shares[0] += 50.0;
        let second = quote_cost(&curve, 0, 50.0).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_zero_delta_quotes_zero() {
        let curve = two_outcome_curve();
        assert_eq!(quote_cost(&curve, 0, 0.0).unwrap(), 0.0);
    }

    #[test]
    fn test_stake_round_trips_through_quote() {
        let curve = two_outcome_curve();
        let shares = shares_for_stake(&curve, 0, 28.0934).unwrap();
        assert!((shares - 50.0).abs() < 1e-2, "shares = {shares}");

        let cost = quote_cost(&curve, 0, shares).unwrap();
        assert!((cost - 28.0934).abs() < 1e-9);
    }

    #[test]
    fn test_no_overflow_for_large_quantities() {
        let curve = CurveState {
            b: 10.0,
            shares: vec![20_000.0, 0.0],
        };
        let p = prices(&curve);
        assert!(p[0] > 0.999999);
        assert!(p.iter().all(|v| v.is_finite()));
        let cost = quote_cost(&curve, 1, 10.0).unwrap();
        assert!(cost.is_finite());
    }

    #[test]
    fn test_three_outcome_prices_sum_to_one() {
        let curve = CurveState {
            b: 50.0,
            shares: vec![10.0, 25.0, 3.0],
        };
        let sum: f64 = prices(&curve).iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);

        let shares = shares_for_stake(&curve, 2, 5.0).unwrap();
        let cost = quote_cost(&curve, 2, shares).unwrap();
        assert!((cost - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_excessive_stake_rejected() {
        let curve = two_outcome_curve();
        assert!(shares_for_stake(&curve, 0, 100_000.0).is_err());
    }
}
