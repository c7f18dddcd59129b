// 10.0 position.rs: an open position. one per (account, market, collateral token, side).
// size is tracked twice: in USD at entry and in index tokens, so pnl = tokens * price - usd
// for longs and the reverse for shorts. fee snapshots record where the cumulative borrowing
// factor and the funding accumulators stood at the last touch.
// 10.1 has the pnl and size delta helpers used by decrease and liquidation.

use crate::fixed::{self, MathError, SignedU256};
use crate::oracle::PriceProps;
use crate::types::{AccountId, MarketId, Side, Timestamp, TokenId};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionKey {
    pub account: AccountId,
    pub market: MarketId,
    pub collateral_token: TokenId,
    pub side: Side,
}

impl PositionKey {
    pub fn new(account: AccountId, market: MarketId, collateral_token: TokenId, side: Side) -> Self {
        Self {
            account,
            market,
            collateral_token,
            side,
        }
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.account, self.market, self.collateral_token, self.side
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub key: PositionKey,
    pub size_in_usd: U256,
    pub size_in_tokens: U256,
    pub collateral_amount: U256,
    pub borrowing_factor: U256,
    pub long_token_funding_amount_per_size: SignedU256,
    pub short_token_funding_amount_per_size: SignedU256,
    pub increased_at: Timestamp,
    pub decreased_at: Timestamp,
}

impl Position {
    pub fn new(key: PositionKey, timestamp: Timestamp) -> Self {
        Self {
            key,
            size_in_usd: U256::zero(),
            size_in_tokens: U256::zero(),
            collateral_amount: U256::zero(),
            borrowing_factor: U256::zero(),
            long_token_funding_amount_per_size: SignedU256::zero(),
            short_token_funding_amount_per_size: SignedU256::zero(),
            increased_at: timestamp,
            decreased_at: timestamp,
        }
    }

    pub fn side(&self) -> Side {
        self.key.side
    }

    pub fn is_long(&self) -> bool {
        self.key.side.is_long()
    }

    pub fn is_empty(&self) -> bool {
        self.size_in_usd.is_zero()
    }

    // 10.1: pnl of the whole position if it were closed at `price`
    pub fn total_pnl(&self, price: U256) -> Result<SignedU256, MathError> {
        let value = fixed::mul(self.size_in_tokens, price)?;
        Ok(if self.is_long() {
            SignedU256::diff(value, self.size_in_usd)
        } else {
            SignedU256::diff(self.size_in_usd, value)
        })
    }

    /// Mark-to-market pnl at the price a close would get: min for longs, max for shorts.
    pub fn mark_pnl(&self, index_price: &PriceProps) -> Result<SignedU256, MathError> {
        self.total_pnl(index_price.pick(!self.is_long()))
    }

    /// Index tokens released by closing `size_delta_usd`. a full close releases all of them.
    pub fn size_delta_in_tokens(&self, size_delta_usd: U256) -> Result<U256, MathError> {
        if size_delta_usd >= self.size_in_usd {
            return Ok(self.size_in_tokens);
        }
        fixed::mul_div(self.size_in_tokens, size_delta_usd, self.size_in_usd)
    }

    /// Share of the total pnl realized by releasing `size_delta_in_tokens`.
    pub fn realized_pnl(&self, price: U256, size_delta_in_tokens: U256) -> Result<SignedU256, MathError> {
        if self.size_in_tokens.is_zero() {
            return Ok(SignedU256::zero());
        }
        self.total_pnl(price)?.mul_div(size_delta_in_tokens, self.size_in_tokens)
    }

    pub fn funding_snapshot(&self, token_is_long: bool) -> SignedU256 {
        if token_is_long {
            self.long_token_funding_amount_per_size
        } else {
            self.short_token_funding_amount_per_size
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::{expand_decimals, float, token_price};

    fn long_position() -> Position {
        let key = PositionKey::new(AccountId(1), MarketId(1), TokenId(1), Side::Long);
        let mut position = Position::new(key, Timestamp::from_millis(0));
        // $50k at $5000 = 10 ETH
        position.size_in_usd = float(50_000);
        position.size_in_tokens = expand_decimals(10, 18);
        position.collateral_amount = expand_decimals(10, 18);
        position
    }

    #[test]
    fn long_pnl_doubles_with_price() {
        let position = long_position();
        let pnl = position.total_pnl(token_price(10_000, 18)).unwrap();
        assert_eq!(pnl, SignedU256::positive(float(50_000)));
        let loss = position.total_pnl(token_price(4_000, 18)).unwrap();
        assert_eq!(loss, SignedU256::negative(float(10_000)));
    }

    #[test]
    fn short_pnl_is_mirrored() {
        let mut position = long_position();
        position.key.side = Side::Short;
        let pnl = position.total_pnl(token_price(4_000, 18)).unwrap();
        assert_eq!(pnl, SignedU256::positive(float(10_000)));
    }

    #[test]
    fn partial_close_realizes_share() {
        let position = long_position();
        let tokens = position.size_delta_in_tokens(float(12_500)).unwrap();
        assert_eq!(tokens, expand_decimals(25, 17));
        let realized = position.realized_pnl(token_price(6_000, 18), tokens).unwrap();
        assert_eq!(realized, SignedU256::positive(float(2_500)));
        assert_eq!(position.size_delta_in_tokens(float(60_000)).unwrap(), position.size_in_tokens);
    }

    #[test]
    fn mark_pnl_uses_close_side_price() {
        let position = long_position();
        let price = PriceProps::new(token_price(4_990, 18), token_price(5_010, 18));
        assert_eq!(position.mark_pnl(&price).unwrap(), SignedU256::negative(float(100)));
    }

    #[test]
    fn key_display() {
        let key = PositionKey::new(AccountId(3), MarketId(1), TokenId(2), Side::Short);
        assert_eq!(key.to_string(), "account#3/market#1/token#2/short");
    }
}
