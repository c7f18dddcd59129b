// 5.0 pricing.rs: price impact. every trade moves a two sided balance (token A vs token B pool
// value for swaps, long vs short open interest for positions). the cost of an imbalance is the
// area under an exponent curve, so the impact of a trade is the change in that area.
// 5.1 is the curve itself, 5.2 the swap and position specific wrappers with their pool caps,
// 5.3 turns position impact into an execution price.

use crate::config::ImpactParams;
use crate::fixed::{self, MathError, SignedU256};
use crate::market::{self, Market};
use crate::oracle::PriceProps;
use crate::store::DataStore;
use crate::types::{Side, TokenId};
use primitive_types::U256;

/// Half the area under the impact curve up to `diff`. an unset factor contributes nothing.
pub fn impact_term(diff: U256, factor: U256, exponent: U256) -> Result<U256, MathError> {
    if factor.is_zero() {
        return Ok(U256::zero());
    }
    let curved = fixed::apply_exponent_factor(diff, exponent)?;
    Ok(fixed::apply_factor(curved, factor)? / 2)
}

// 5.1: impact of moving (a, b) to (next_a, next_b). positive means the trade improved balance.
pub fn price_impact_usd(
    initial_a: U256,
    initial_b: U256,
    next_a: U256,
    next_b: U256,
    params: &ImpactParams,
) -> Result<SignedU256, MathError> {
    if params.is_disabled() {
        return Ok(SignedU256::zero());
    }
    let initial_diff = SignedU256::diff(initial_a, initial_b).abs();
    let next_diff = SignedU256::diff(next_a, next_b).abs();
    let same_side = (initial_a <= initial_b) == (next_a <= next_b);

    if same_side {
        let improves = next_diff < initial_diff;
        let factor = if improves {
            params.positive_factor
        } else {
            params.negative_factor
        };
        let before = impact_term(initial_diff, factor, params.exponent)?;
        let after = impact_term(next_diff, factor, params.exponent)?;
        let magnitude = SignedU256::diff(before, after).abs();
        return Ok(SignedU256::from_parts(!improves, magnitude));
    }

    // crossover: the old imbalance is paid back at the positive rate, the new one charged at
    // the negative rate
    let repaid = impact_term(initial_diff, params.positive_factor, params.exponent)?;
    let charged = impact_term(next_diff, params.negative_factor, params.exponent)?;
    Ok(SignedU256::diff(repaid, charged))
}

// 5.2: swaps. a swap of `usd_in` of token_in for token_out shifts +usd_in onto the input pool
// and -usd_in off the output pool.
pub fn swap_impact_usd(
    store: &DataStore,
    market: &Market,
    token_in: TokenId,
    price_in: &PriceProps,
    price_out: &PriceProps,
    usd_in: U256,
    usd_out: U256,
) -> Result<SignedU256, MathError> {
    let token_out = if token_in == market.long_token {
        market.short_token
    } else {
        market.long_token
    };
    let pool_in = fixed::mul(store.pool_amount(market.id, token_in), price_in.mid()?)?;
    let pool_out = fixed::mul(store.pool_amount(market.id, token_out), price_out.mid()?)?;
    let next_in = fixed::add(pool_in, usd_in)?;
    let next_out = pool_out.saturating_sub(usd_out);
    price_impact_usd(pool_in, pool_out, next_in, next_out, &market.params.swap_impact)
}

/// Converts swap impact to a token amount of `token`. positive impact is paid out of the
/// token's swap impact pool and capped at what the pool holds; negative impact is owed to it.
pub fn swap_impact_amount_with_cap(
    store: &DataStore,
    market: &Market,
    token: TokenId,
    price: &PriceProps,
    impact_usd: SignedU256,
) -> Result<SignedU256, MathError> {
    if impact_usd.is_positive() {
        let amount = fixed::usd_to_token_amount(impact_usd.abs(), price.max)?;
        let available = store.swap_impact_pool_amount(market.id, token);
        Ok(SignedU256::positive(amount.min(available)))
    } else {
        let amount = fixed::usd_to_token_amount(impact_usd.abs(), price.min)?;
        Ok(SignedU256::negative(amount))
    }
}

/// Position impact of changing open interest on `side` by `size_delta_usd`.
pub fn position_impact_usd(
    store: &DataStore,
    market: &Market,
    side: Side,
    size_delta_usd: SignedU256,
) -> Result<SignedU256, MathError> {
    let long_oi = market::open_interest_for_side(store, market, Side::Long)?;
    let short_oi = market::open_interest_for_side(store, market, Side::Short)?;
    let (next_long, next_short) = match side {
        Side::Long => (size_delta_usd.apply_to(long_oi)?, short_oi),
        Side::Short => (long_oi, size_delta_usd.apply_to(short_oi)?),
    };
    price_impact_usd(long_oi, short_oi, next_long, next_short, &market.params.position_impact)
}

/// Positive position impact can be no larger than the position impact pool is worth.
pub fn cap_position_impact_usd(
    store: &DataStore,
    market: &Market,
    index_price: &PriceProps,
    impact_usd: SignedU256,
) -> Result<SignedU256, MathError> {
    if !impact_usd.is_positive() {
        return Ok(impact_usd);
    }
    let max = fixed::mul(store.position_impact_pool_amount(market.id), index_price.max)?;
    Ok(SignedU256::positive(impact_usd.abs().min(max)))
}

/// Index tokens moved into (negative impact) or out of (positive) the position impact pool.
pub fn position_impact_amount(impact_usd: SignedU256, index_price: &PriceProps) -> Result<SignedU256, MathError> {
    if impact_usd.is_positive() {
        Ok(SignedU256::positive(fixed::usd_to_token_amount(impact_usd.abs(), index_price.max)?))
    } else {
        Ok(SignedU256::negative(fixed::usd_to_token_amount(impact_usd.abs(), index_price.min)?))
    }
}

// 5.3: execution price. increasing a long or decreasing a short buys the index token, so it
// starts from the max price; the other two sell at the min price.
pub fn is_buy(side: Side, is_increase: bool) -> bool {
    side.is_long() == is_increase
}

pub fn execution_price(
    index_price: &PriceProps,
    size_delta_usd: U256,
    impact_usd: SignedU256,
    side: Side,
    is_increase: bool,
) -> Result<U256, MathError> {
    let buying = is_buy(side, is_increase);
    let base = index_price.pick(buying);
    if size_delta_usd.is_zero() || impact_usd.is_zero() {
        return Ok(base);
    }
    let adjustment = fixed::mul_div(base, impact_usd.abs(), size_delta_usd)?;
    // positive impact moves the price in the trader's favour
    if impact_usd.is_positive() == buying {
        fixed::sub(base, adjustment)
    } else {
        fixed::add(base, adjustment)
    }
}

/// Buyers accept prices at or below `acceptable`, sellers at or above.
pub fn is_acceptable_price(price: U256, acceptable: U256, side: Side, is_increase: bool) -> bool {
    if is_buy(side, is_increase) {
        price <= acceptable
    } else {
        price >= acceptable
    }
}
