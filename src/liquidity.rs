// 15.0 liquidity.rs: market tokens. LPs deposit backing tokens and receive market tokens
// priced off the pool value; burning them redeems a pro rata share of both pools.
// 15.1 deposit/withdrawal requests. 15.2 the pricing math.

use crate::fixed::{self, MathError};
use crate::market::{self, Market, MarketPrices};
use crate::store::DataStore;
use crate::types::{AccountId, MarketId, Side};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

pub const MARKET_TOKEN_DECIMALS: usize = 18;

// 15.1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositParams {
    pub market: MarketId,
    pub receiver: AccountId,
    pub long_token_amount: U256,
    pub short_token_amount: U256,
    pub min_market_tokens: U256,
}

impl DepositParams {
    pub fn new(market: MarketId, receiver: AccountId, long_token_amount: U256, short_token_amount: U256) -> Self {
        Self {
            market,
            receiver,
            long_token_amount,
            short_token_amount,
            min_market_tokens: U256::zero(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalParams {
    pub market: MarketId,
    pub receiver: AccountId,
    pub market_token_amount: U256,
    pub min_long_token_amount: U256,
    pub min_short_token_amount: U256,
}

impl WithdrawalParams {
    pub fn new(market: MarketId, receiver: AccountId, market_token_amount: U256) -> Self {
        Self {
            market,
            receiver,
            market_token_amount,
            min_long_token_amount: U256::zero(),
            min_short_token_amount: U256::zero(),
        }
    }
}

// 15.2: an empty market mints one token (18 decimals) per USD
pub fn usd_to_market_token_amount(usd: U256, pool_value: U256, supply: U256) -> Result<U256, MathError> {
    if supply.is_zero() || pool_value.is_zero() {
        let scale = U256::exp10(fixed::FLOAT_DECIMALS - MARKET_TOKEN_DECIMALS);
        return fixed::div(usd, scale);
    }
    fixed::mul_div(usd, supply, pool_value)
}

pub fn market_token_amount_to_usd(amount: U256, pool_value: U256, supply: U256) -> Result<U256, MathError> {
    if supply.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    fixed::mul_div(amount, pool_value, supply)
}

/// Long and short token amounts redeemed by `market_token_amount`, split by each pool's
/// share of the combined pool usd and paid out at the max price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WithdrawalAmounts {
    pub usd: U256,
    pub long_token_amount: U256,
    pub short_token_amount: U256,
}

pub fn withdrawal_amounts(
    store: &DataStore,
    market: &Market,
    prices: &MarketPrices,
    market_token_amount: U256,
) -> Result<WithdrawalAmounts, MathError> {
    let pool_value = market::pool_value(store, market, prices, false)?;
    let supply = store.market_token_supply(market.id);
    let usd = market_token_amount_to_usd(market_token_amount, pool_value, supply)?;

    let long_pool = market::net_pool_usd(store, market, prices, Side::Long, false)?;
    let short_pool = market::net_pool_usd(store, market, prices, Side::Short, false)?;
    let total = fixed::add(long_pool, short_pool)?;
    if total.is_zero() {
        return Ok(WithdrawalAmounts::default());
    }
    let long_usd = fixed::mul_div(usd, long_pool, total)?;
    let short_usd = fixed::sub(usd, long_usd)?;
    Ok(WithdrawalAmounts {
        usd,
        long_token_amount: fixed::usd_to_token_amount(long_usd, prices.long.max)?,
        short_token_amount: fixed::usd_to_token_amount(short_usd, prices.short.max)?,
    })
}
