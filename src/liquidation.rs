//! Liquidation conditions.
//!
//! A position is liquidatable once the collateral left after marking it to market and paying
//! the cost of closing it falls below either the market's absolute minimum or the minimum
//! fraction of its size (the inverse of max leverage).

use crate::config::MarketParams;
use crate::fixed::{self, MathError, SignedU256};
use crate::oracle::PriceProps;
use crate::position::Position;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionHealth {
    /// collateral * price.min + pnl - close costs
    pub remaining_collateral_usd: SignedU256,
    /// the larger of the two thresholds
    pub min_collateral_usd: U256,
    pub is_liquidatable: bool,
}

/// `close_cost_amount` is what closing the position would charge, in collateral token units.
pub fn position_health(
    position: &Position,
    params: &MarketParams,
    index_price: &PriceProps,
    collateral_price: &PriceProps,
    close_cost_amount: U256,
) -> Result<PositionHealth, MathError> {
    let collateral_usd = fixed::mul(position.collateral_amount, collateral_price.min)?;
    let cost_usd = fixed::mul(close_cost_amount, collateral_price.min)?;
    let remaining = SignedU256::positive(collateral_usd)
        .checked_add(position.mark_pnl(index_price)?)?
        .checked_sub(SignedU256::positive(cost_usd))?;

    let min_for_size = fixed::apply_factor(position.size_in_usd, params.min_collateral_factor)?;
    let min_collateral_usd = params.min_collateral_usd.max(min_for_size);
    let is_liquidatable = remaining < SignedU256::positive(params.min_collateral_usd)
        || remaining < SignedU256::positive(min_for_size);

    Ok(PositionHealth {
        remaining_collateral_usd: remaining,
        min_collateral_usd,
        is_liquidatable,
    })
}
