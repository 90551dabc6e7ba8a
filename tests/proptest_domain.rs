//! Property-Based Tests — Domain Layer Invariants
//!
//! Uses `proptest` to verify that pricing, state updates, expansion and
//! TWAP accrual keep their mathematical invariants across random inputs.

use proptest::prelude::*;

use lmsr_engine::domain::expansion;
use lmsr_engine::domain::fees::FeeSchedule;
use lmsr_engine::domain::fixed_point::{WAD, Wad};
use lmsr_engine::domain::initializer::{self, MarketParams, OutcomeLimits};
use lmsr_engine::domain::market::MarketState;
use lmsr_engine::domain::quote;
use lmsr_engine::domain::state_update;
use lmsr_engine::domain::trade::{Amount, Side, TradeSide};
use lmsr_engine::domain::twap::{TwapState, average_price};

const TOKEN: Amount = 1_000_000;

/// Market over `priors` (arbitrary positive weights), liability 1000 tokens.
fn market(priors: &[u32], reserve: u32) -> MarketState {
    let outcomes = priors
        .iter()
        .enumerate()
        .map(|(i, p)| (i as u64 + 1, Wad::from_int(i64::from(*p))))
        .collect();
    let params = MarketParams {
        market_id: 1,
        liability: 1_000 * TOKEN,
        target_outcomes: priors.len().max(2) + 1,
        expanding: reserve > 0,
        reserve: Wad::from_int(i64::from(reserve)),
        outcomes,
    };
    initializer::initialize(
        &params,
        &OutcomeLimits::default(),
        Wad::from_raw(1_000_000),
        |_| true,
    )
    .unwrap()
}

fn price_sum(m: &MarketState) -> i128 {
    let listed: i128 = (0..m.outcome_count()).map(|s| m.price(s).unwrap().raw()).sum();
    listed + m.reserve_price().unwrap().raw()
}

fn side_strategy() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Direct), Just(Side::Lay)]
}

// ── Initialization ──────────────────────────────────────────

proptest! {
    /// Normalized priors and reserve sum to exactly one.
    #[test]
    fn normalized_priors_sum_to_one(
        priors in prop::collection::vec(1u32..10_000, 2..12),
        reserve in 0u32..5_000,
    ) {
        let weights: Vec<Wad> = priors.iter().map(|p| Wad::from_int(i64::from(*p))).collect();
        let (masses, reserve) = initializer::normalize_priors(
            &weights,
            Wad::from_int(i64::from(reserve)),
            Wad::from_raw(1_000_000),
        ).unwrap();
        let total: i128 = masses.iter().map(|m| m.raw()).sum::<i128>() + reserve.raw();
        prop_assert_eq!(total, WAD);
        prop_assert!(masses.iter().all(|m| m.is_positive()));
    }
}

// ── Pricing ─────────────────────────────────────────────────

proptest! {
    /// Buying more tokens always costs more.
    #[test]
    fn buy_cost_monotonic_in_size(
        priors in prop::collection::vec(1u32..100, 2..8),
        tokens in 1u128..500,
        extra in 1u128..500,
        side in side_strategy(),
    ) {
        let m = market(&priors, 0);
        let fees = FeeSchedule::zero();
        let small = quote::quote_buy_exact_tokens(&m, 1, side, tokens * TOKEN, &fees).unwrap();
        let large = quote::quote_buy_exact_tokens(&m, 1, side, (tokens + extra) * TOKEN, &fees).unwrap();
        prop_assert!(large.pre_fee > small.pre_fee);
    }

    /// The cost curve is strictly convex: the average cost per token rises
    /// with the size of the trade.
    #[test]
    fn buy_cost_convex(
        priors in prop::collection::vec(1u32..100, 2..8),
        tokens in 10u128..400,
        side in side_strategy(),
    ) {
        let m = market(&priors, 0);
        let fees = FeeSchedule::zero();
        let single = quote::quote_buy_exact_tokens(&m, 2, side, tokens * TOKEN, &fees).unwrap();
        let double = quote::quote_buy_exact_tokens(&m, 2, side, 2 * tokens * TOKEN, &fees).unwrap();
        // cost(2t) / 2t > cost(t) / t
        prop_assert!(
            double.pre_fee > 2 * single.pre_fee,
            "{} vs 2 x {}", double.pre_fee, single.pre_fee
        );
    }

    /// A token never costs more than one unit of quote currency, nor less
    /// than its current price.
    #[test]
    fn buy_cost_bounded_by_price_and_par(
        priors in prop::collection::vec(1u32..100, 2..8),
        tokens in 1u128..1_000,
    ) {
        let m = market(&priors, 0);
        let amount = tokens * TOKEN;
        let q = quote::quote_buy_exact_tokens(&m, 1, Side::Direct, amount, &FeeSchedule::zero()).unwrap();
        let floor = m.price(0).unwrap().scale_amount(amount as i128, lmsr_engine::domain::Rounding::Down).unwrap();
        prop_assert!(q.pre_fee as i128 >= floor);
        prop_assert!(q.pre_fee <= amount);
    }

    /// Spending the cost of `t` tokens buys back (about) `t` tokens.
    #[test]
    fn spend_inverts_cost(
        priors in prop::collection::vec(1u32..100, 2..6),
        tokens in 1u128..300,
        side in side_strategy(),
    ) {
        let m = market(&priors, 0);
        let fees = FeeSchedule::zero();
        let amount = tokens * TOKEN;
        let cost = quote::quote_buy_exact_tokens(&m, 1, side, amount, &fees).unwrap();
        let back = quote::quote_buy_exact_spend(&m, 1, side, cost.pre_fee, &fees).unwrap();
        // Rounding the cost up buys at most one unit's worth of extra tokens.
        prop_assert!(back.tokens <= amount + 1_000, "{} > {}", back.tokens, amount);
        prop_assert!(back.tokens + 4 >= amount, "{} << {}", back.tokens, amount);
    }
}

// ── State updates ───────────────────────────────────────────

proptest! {
    /// Prices of listed outcomes plus the reserve always sum to one.
    #[test]
    fn prices_sum_to_one_after_trades(
        priors in prop::collection::vec(1u32..100, 2..8),
        reserve in 0u32..50,
        trades in prop::collection::vec((0usize..8, side_strategy(), 1u128..200), 1..20),
    ) {
        let mut m = market(&priors, reserve);
        for (slot, side, tokens) in trades {
            let slot = slot % m.outcome_count();
            state_update::update(&mut m, slot, side, TradeSide::Buy, tokens * TOKEN).unwrap();
        }
        let n = m.outcome_count() as i128 + 1;
        prop_assert!((price_sum(&m) - WAD).abs() <= n, "sum {}", price_sum(&m));
    }

    /// With no fee, buying then selling the same tokens never profits.
    #[test]
    fn round_trip_has_no_arbitrage(
        priors in prop::collection::vec(1u32..100, 2..8),
        tokens in 1u128..500,
        side in side_strategy(),
    ) {
        let mut m = market(&priors, 0);
        let fees = FeeSchedule::zero();
        let amount = tokens * TOKEN;
        let buy = quote::quote_buy_exact_tokens(&m, 1, side, amount, &fees).unwrap();
        state_update::update(&mut m, buy.slot, side, TradeSide::Buy, amount).unwrap();
        let sell = quote::quote_sell_exact_tokens(&m, 1, side, amount, &fees).unwrap();
        prop_assert!(sell.pre_fee <= buy.pre_fee);
    }

    /// Round-trip loss with a fee is at least the fee charged on the buy.
    #[test]
    fn round_trip_pays_the_fee(
        priors in prop::collection::vec(1u32..100, 2..6),
        tokens in 1u128..500,
        fee_bps in 1u32..500,
    ) {
        let mut m = market(&priors, 0);
        let fees = FeeSchedule::new(fee_bps).unwrap();
        let amount = tokens * TOKEN;
        let buy = quote::quote_buy_exact_tokens(&m, 1, Side::Direct, amount, &fees).unwrap();
        state_update::update(&mut m, buy.slot, Side::Direct, TradeSide::Buy, amount).unwrap();
        let sell = quote::quote_sell_exact_tokens(&m, 1, Side::Direct, amount, &fees).unwrap();
        prop_assert!(buy.total - sell.total >= buy.fee + sell.fee);
    }

    /// Backing and then laying the same outcome buys a complete set: prices
    /// return to where they were and the bill is `t` plus the fee on `t`.
    #[test]
    fn direct_then_lay_costs_par_plus_fee(
        priors in prop::collection::vec(1u32..100, 2..6),
        tokens in 1u128..500,
    ) {
        let mut m = market(&priors, 0);
        let fees = FeeSchedule::new(100).unwrap();
        let amount = tokens * TOKEN;
        let before = m.price(0).unwrap();

        let direct = quote::quote_buy_exact_tokens(&m, 1, Side::Direct, amount, &fees).unwrap();
        state_update::update(&mut m, 0, Side::Direct, TradeSide::Buy, amount).unwrap();
        let lay = quote::quote_buy_exact_tokens(&m, 1, Side::Lay, amount, &fees).unwrap();
        state_update::update(&mut m, 0, Side::Lay, TradeSide::Buy, amount).unwrap();

        let after = m.price(0).unwrap();
        prop_assert!((after.raw() - before.raw()).abs() <= 1_000, "{} vs {}", after, before);

        let pre_fee = direct.pre_fee + lay.pre_fee;
        prop_assert!(pre_fee + 1 >= amount && pre_fee <= amount + 2, "{} vs {}", pre_fee, amount);
        let fee = direct.fee + lay.fee;
        let expected = amount.div_ceil(100);
        prop_assert!(fee + 2 >= expected && fee <= expected + 2, "{} vs {}", fee, expected);
    }

    /// Selling direct tokens strictly lowers the outcome's price; selling
    /// lay tokens strictly raises it.
    #[test]
    fn sell_moves_price_against_the_sold_side(
        priors in prop::collection::vec(1u32..100, 2..8),
        slot in 0usize..8,
        tokens in 1u128..500,
        side in side_strategy(),
    ) {
        let mut m = market(&priors, 0);
        let slot = slot % m.outcome_count();
        let position = slot as u64 + 1;
        let before = m.price(slot).unwrap();

        let q = quote::quote_sell_exact_tokens(&m, position, side, tokens * TOKEN, &FeeSchedule::zero()).unwrap();
        prop_assert!(q.pre_fee > 0);
        state_update::update(&mut m, slot, side, TradeSide::Sell, tokens * TOKEN).unwrap();

        let after = m.price(slot).unwrap();
        match side {
            Side::Direct => prop_assert!(after < before, "{} !< {}", after, before),
            Side::Lay => prop_assert!(after > before, "{} !> {}", after, before),
        }
    }

    /// A direct buy raises the traded price and lowers every other one.
    #[test]
    fn direct_buy_moves_prices_apart(
        priors in prop::collection::vec(1u32..100, 2..8),
        slot in 0usize..8,
        tokens in 1u128..500,
    ) {
        let mut m = market(&priors, 0);
        let slot = slot % m.outcome_count();
        let before: Vec<Wad> = (0..m.outcome_count()).map(|s| m.price(s).unwrap()).collect();
        state_update::update(&mut m, slot, Side::Direct, TradeSide::Buy, tokens * TOKEN).unwrap();
        for (s, old) in before.iter().enumerate() {
            let new = m.price(s).unwrap();
            if s == slot {
                prop_assert!(new > *old);
            } else {
                prop_assert!(new <= *old);
            }
        }
    }
}

// ── Expansion ───────────────────────────────────────────────

proptest! {
    /// Listing from the reserve leaves every existing price untouched.
    #[test]
    fn expansion_preserves_existing_prices(
        priors in prop::collection::vec(1u32..100, 1..6),
        reserve in 1u32..100,
        fraction in 1_000_000i128..=WAD,
        trades in prop::collection::vec((0usize..6, 1u128..100), 0..5),
    ) {
        let mut m = market(&priors, reserve);
        for (slot, tokens) in trades {
            let slot = slot % m.outcome_count();
            state_update::update(&mut m, slot, Side::Direct, TradeSide::Buy, tokens * TOKEN).unwrap();
        }
        let before: Vec<Wad> = (0..m.outcome_count()).map(|s| m.price(s).unwrap()).collect();
        let total = m.total_mass();
        let reserve_before = m.reserve_mass();

        let listed = expansion::expand_reserve(&mut m, 999, Wad::from_raw(fraction), |_| true).unwrap();

        for (s, old) in before.iter().enumerate() {
            prop_assert_eq!(m.price(s).unwrap(), *old);
        }
        prop_assert_eq!(m.total_mass(), total);
        prop_assert_eq!(
            listed.mass.checked_add(listed.reserve_after).unwrap(),
            reserve_before
        );
    }
}

// ── TWAP ────────────────────────────────────────────────────

proptest! {
    /// The time-weighted average of a price stays within [0, 1] and
    /// between the extreme prices the slot actually had.
    #[test]
    fn twap_average_bounded_by_observed_prices(
        priors in prop::collection::vec(1u32..100, 2..6),
        steps in prop::collection::vec((1u64..3_600, side_strategy(), 1u128..200), 1..10),
    ) {
        let mut m = market(&priors, 0);
        let mut twap = TwapState::started_at(0);
        let first = twap.observe(&m, 0, 0).unwrap();
        let mut low = m.price(0).unwrap();
        let mut high = low;
        let mut now = 0;
        for (elapsed, side, tokens) in steps {
            now += elapsed;
            twap.update_before_price_change(&m, 0, now).unwrap();
            state_update::update(&mut m, 0, side, TradeSide::Buy, tokens * TOKEN).unwrap();
            twap.update_after_price_change(0);
            let price = m.price(0).unwrap();
            low = low.min(price);
            high = high.max(price);
        }
        let last = twap.observe(&m, 0, now + 1).unwrap();
        let average = average_price(&first, &last).unwrap();
        prop_assert!(average >= Wad::ZERO && average <= Wad::ONE);
        prop_assert!(average.raw() + 1_000 >= low.raw());
        prop_assert!(average.raw() <= high.raw() + 1_000);
    }
}

// ── Fixed point ─────────────────────────────────────────────

proptest! {
    /// `ln(exp(x))` recovers `x` to within a few ulps.
    #[test]
    fn ln_inverts_exp(x in -20_000_000_000_000_000_000i128..20_000_000_000_000_000_000i128) {
        let y = Wad::from_raw(x).exp().unwrap();
        prop_assume!(y.raw() > 1_000_000_000);
        let back = y.ln().unwrap();
        // One ulp of `y` is worth `1 / y` after the logarithm.
        let tolerance = 1_000 + WAD / y.raw() + x.abs() / 1_000_000_000_000_000;
        prop_assert!((back.raw() - x).abs() <= tolerance, "{} vs {}", back.raw(), x);
    }
}
