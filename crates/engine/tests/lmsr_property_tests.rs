/// Property-based checks on the scoring-rule curve: prices stay a
/// distribution, costs match the closed form, and the margin ledger
/// conserves tinybars under random trade sequences.
use hashmark_engine::{CreateMarketInput, Engine, EngineConfig, lmsr};
use hashmark_state::CurveState;
use hashmark_types::{
    AccountId, LiquidityRegime, ManualClock, TINYBARS_PER_HBAR, Tinybars, to_tinybars,
};
use proptest::prelude::*;
use std::sync::Arc;

proptest! {
    #[test]
    fn prices_always_form_a_distribution(
        b in 10.0f64..10_000.0,
        shares in prop::collection::vec(0.0f64..50_000.0, 2..6),
    ) {
        let curve = CurveState { b, shares };
        let prices = lmsr::prices(&curve);

        let sum: f64 = prices.iter().sum();
        prop_assert!((sum - 1.0).abs() < 1e-9, "sum = {sum}");
        for price in prices {
            prop_assert!(price > 0.0 && price < 1.0);
        }
    }

    #[test]
    fn stake_and_quote_agree(
        b in 50.0f64..5_000.0,
        q0 in 0.0f64..1_000.0,
        q1 in 0.0f64..1_000.0,
        stake in 0.1f64..500.0,
        outcome in 0u16..2,
    ) {
        let curve = CurveState { b, shares: vec![q0, q1] };
        let shares = lmsr::shares_for_stake(&curve, outcome, stake).unwrap();
        prop_assert!(shares > 0.0);

        // Buying the computed shares must cost exactly the stake
        let cost = lmsr::quote_cost(&curve, outcome, shares).unwrap();
        prop_assert!((cost - stake).abs() < 1e-6, "cost {cost} != stake {stake}");
    }

    #[test]
    fn marginal_cost_is_monotone(
        b in 50.0f64..5_000.0,
        delta in 1.0f64..200.0,
        steps in 2usize..8,
    ) {
        let mut curve = CurveState { b, shares: vec![0.0, 0.0] };
        let mut last_cost = 0.0;
        for step in 0..steps {
            let cost = lmsr::quote_cost(&curve, 0, delta).unwrap();
            if step > 0 {
                prop_assert!(cost > last_cost);
            }
            last_cost = cost;
            curve.shares[0] += delta;
        }
    }

    #[test]
    fn engine_conserves_tinybars_under_random_bets(
        funding in 50i128..500,
        stakes in prop::collection::vec((1i128..40, 0u16..2), 1..12),
    ) {
        let clock = Arc::new(ManualClock::new(1_000));
        let mut engine = Engine::new(EngineConfig::default(), clock);
        let creator = AccountId::from("0.0.1001");
        let bettor = AccountId::from("0.0.2001");

        let funding: Tinybars = funding * TINYBARS_PER_HBAR;
        engine.deposit(&creator, funding).unwrap();
        engine.deposit(&bettor, 10_000 * TINYBARS_PER_HBAR).unwrap();
        let expected = funding + 10_000 * TINYBARS_PER_HBAR;

        let market = engine
            .create_market(
                CreateMarketInput {
                    question: "Random walk".to_string(),
                    creator: creator.clone(),
                    close_at_ms: 10_000_000,
                    outcomes: vec!["YES".to_string(), "NO".to_string()],
                    regime: LiquidityRegime::LowLiquidity,
                    initial_funding: funding,
                    initial_odds: None,
                    escrow_account: None,
                },
                Vec::new(),
            )
            .unwrap();

        for (stake_hbar, outcome) in stakes {
            let stake = stake_hbar * TINYBARS_PER_HBAR;
            let receipt = engine
                .buy_shares(market.id, outcome, bettor.clone(), stake, 100)
                .unwrap();
            prop_assert!(receipt.shares > 0.0);
            prop_assert!(receipt.post_trade_price > 0.0 && receipt.post_trade_price < 1.0);
            prop_assert_eq!(engine.conserved_total(), expected);
        }
    }
}

#[test]
fn test_stake_conversion_is_exact_at_tinybar_scale() {
    // The rounding helper and the ledger agree on the smallest unit
    assert_eq!(to_tinybars(0.00000001).unwrap(), 1);
    assert_eq!(to_tinybars(28.0934).unwrap(), 2_809_340_000);
}
