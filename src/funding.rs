// 8.0 funding.rs: borrowing and funding. both are settled lazily: the market keeps cumulative
// per-size values that only grow, and a position pays the difference to its snapshot when it is
// next touched.
// 8.1 borrowing: traders pay the pool for the liquidity their open interest reserves.
// 8.2 funding: the heavier side pays the lighter side, in the payers' collateral tokens.

use crate::fixed::{self, MathError, SignedU256};
use crate::market::{self, Market, MarketPrices};
use crate::position::Position;
use crate::store::DataStore;
use crate::types::{Side, TokenId};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

// 8.1: cumulative factor grows by duration * factor * reserved / pool
pub fn next_cumulative_borrowing_factor(
    store: &DataStore,
    market: &Market,
    prices: &MarketPrices,
    side: Side,
    duration_secs: u64,
) -> Result<U256, MathError> {
    let current = store.cumulative_borrowing_factor(market.id, side);
    let factor = market.params.borrowing_factor(side.is_long());
    if duration_secs == 0 || factor.is_zero() {
        return Ok(current);
    }
    let pool_usd = market::pool_usd(store, market, prices, side, false)?;
    if pool_usd.is_zero() {
        return Ok(current);
    }
    let reserved_usd = market::reserved_usd(store, market, prices, side)?;
    let rate = fixed::mul(factor, U256::from(duration_secs))?;
    let increment = fixed::mul_div(rate, reserved_usd, pool_usd)?;
    fixed::add(current, increment)
}

/// Borrowing fee owed since the position's snapshot, in collateral token units.
pub fn borrowing_fee_amount(
    position: &Position,
    cumulative_factor: U256,
    collateral_price_min: U256,
) -> Result<U256, MathError> {
    let delta = cumulative_factor.saturating_sub(position.borrowing_factor);
    let fee_usd = fixed::apply_factor(position.size_in_usd, delta)?;
    fixed::usd_to_token_amount(fee_usd, collateral_price_min)
}

// 8.2: one funding period

/// Change to one funding accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingAccumulatorDelta {
    pub collateral_token: TokenId,
    pub side: Side,
    pub delta: SignedU256,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingUpdate {
    pub paying_side: Option<Side>,
    pub funding_usd: U256,
    pub deltas: Vec<FundingAccumulatorDelta>,
}

pub fn next_funding_update(
    store: &DataStore,
    market: &Market,
    prices: &MarketPrices,
    duration_secs: u64,
) -> Result<FundingUpdate, MathError> {
    let factor = market.params.funding_factor;
    let long_oi = market::open_interest_for_side(store, market, Side::Long)?;
    let short_oi = market::open_interest_for_side(store, market, Side::Short)?;
    if duration_secs == 0 || factor.is_zero() || long_oi.is_zero() || short_oi.is_zero() || long_oi == short_oi {
        return Ok(FundingUpdate::default());
    }

    let (payer, larger_oi, diff) = if long_oi > short_oi {
        (Side::Long, long_oi, long_oi - short_oi)
    } else {
        (Side::Short, short_oi, short_oi - long_oi)
    };
    let total_oi = fixed::add(long_oi, short_oi)?;
    let rate = fixed::mul(factor, U256::from(duration_secs))?;
    let funding_usd = fixed::mul_div(fixed::apply_factor(larger_oi, rate)?, diff, total_oi)?;

    let receiver = payer.opposite();
    let mut deltas = Vec::new();
    for token in market.backing_tokens() {
        let payer_oi = store.open_interest(market.id, token, payer);
        if payer_oi.is_zero() {
            continue;
        }
        let usd = fixed::mul_div(funding_usd, payer_oi, larger_oi)?;
        let price = if token == market.long_token {
            prices.long
        } else {
            prices.short
        };
        let amount = fixed::usd_to_token_amount(usd, price.max)?;
        if amount.is_zero() {
            continue;
        }
        // payers round up and receivers down, so credits never exceed what is charged
        deltas.push(FundingAccumulatorDelta {
            collateral_token: token,
            side: payer,
            delta: SignedU256::positive(fixed::mul_div_up(amount, fixed::precision(), payer_oi)?),
        });
        // the credit is spread over receivers holding the same token; with none it is dropped
        let receiver_oi = store.open_interest(market.id, token, receiver);
        if !receiver_oi.is_zero() {
            deltas.push(FundingAccumulatorDelta {
                collateral_token: token,
                side: receiver,
                delta: SignedU256::negative(fixed::mul_div(amount, fixed::precision(), receiver_oi)?),
            });
        }
    }

    Ok(FundingUpdate {
        paying_side: Some(payer),
        funding_usd,
        deltas,
    })
}

/// What a position owes or is owed in funding since its snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionFundingFees {
    pub funding_fee_amount: U256,
    pub claimable_long_token_amount: U256,
    pub claimable_short_token_amount: U256,
    pub latest_long_token_funding_amount_per_size: SignedU256,
    pub latest_short_token_funding_amount_per_size: SignedU256,
}

pub fn position_funding_fees(
    store: &DataStore,
    market: &Market,
    position: &Position,
) -> Result<PositionFundingFees, MathError> {
    let side = position.side();
    let latest_long = store.funding_amount_per_size(market.id, market.long_token, side);
    let latest_short = store.funding_amount_per_size(market.id, market.short_token, side);

    let mut fees = PositionFundingFees {
        latest_long_token_funding_amount_per_size: latest_long,
        latest_short_token_funding_amount_per_size: latest_short,
        ..PositionFundingFees::default()
    };

    for (token_is_long, latest) in [(true, latest_long), (false, latest_short)] {
        let token = if token_is_long {
            market.long_token
        } else {
            market.short_token
        };
        let delta = latest.checked_sub(position.funding_snapshot(token_is_long))?;
        let amount = fixed::apply_factor(position.size_in_usd, delta.abs())?;
        if delta.is_positive() {
            // owed in the other token is not charged
            if token == position.key.collateral_token {
                fees.funding_fee_amount = fixed::add(fees.funding_fee_amount, amount)?;
            }
        } else if delta.is_negative() {
            if token_is_long {
                fees.claimable_long_token_amount = fixed::add(fees.claimable_long_token_amount, amount)?;
            } else {
                fees.claimable_short_token_amount = fixed::add(fees.claimable_short_token_amount, amount)?;
            }
        }
        if market.long_token == market.short_token {
            break;
        }
    }
    Ok(fees)
}
