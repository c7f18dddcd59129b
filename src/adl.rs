// 14.0: auto-deleveraging. when one side's pnl grows too large against its backing pool the
// keeper enables ADL for that side and closes profitable positions until the ratio falls.
// candidates are ranked by pnl / collateral: the most profitable relative to what they put
// at risk go first.

use crate::fixed::{self, MathError, SignedU256};
use crate::market::{Market, MarketPrices};
use crate::position::{Position, PositionKey};
use crate::types::Side;
use primitive_types::U256;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdlCandidate {
    pub key: PositionKey,
    pub pnl_usd: SignedU256,
    pub score: U256, // float pnl / collateral usd, higher = deleveraged first
}

impl PartialOrd for AdlCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AdlCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // descending score, then key for a stable order
        other.score.cmp(&self.score).then(self.key.cmp(&other.key))
    }
}

/// Profitable positions on `side` of `market`, highest priority first, at most `limit`.
pub fn rank_adl_candidates<'a, I>(
    positions: I,
    market: &Market,
    prices: &MarketPrices,
    side: Side,
    limit: usize,
) -> Result<Vec<AdlCandidate>, MathError>
where
    I: IntoIterator<Item = &'a Position>,
{
    let mut candidates = Vec::new();
    for position in positions {
        if position.key.market != market.id || position.side() != side || position.is_empty() {
            continue;
        }
        let pnl_usd = position.mark_pnl(&prices.index)?;
        if !pnl_usd.is_positive() {
            continue;
        }
        let collateral_price = if position.key.collateral_token == market.long_token {
            prices.long
        } else {
            prices.short
        };
        let collateral_usd = fixed::mul(position.collateral_amount, collateral_price.min)?;
        let score = if collateral_usd.is_zero() {
            U256::MAX
        } else {
            fixed::mul_div(pnl_usd.abs(), fixed::precision(), collateral_usd)?
        };
        candidates.push(AdlCandidate {
            key: position.key,
            pnl_usd,
            score,
        });
    }
    candidates.sort();
    candidates.truncate(limit);
    Ok(candidates)
}
