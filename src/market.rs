// 4.0 market.rs: market identity and the market state accessor. a market pairs an index token
// with a long backing token and a short backing token. its aggregate state (pools, impact pools,
// open interest, collateral sums, cumulative factors, adl flags) lives in the DataStore under
// MarketKeys, and the accessors in 4.1 are the only code that builds those keys.
// 4.2 derives pool value, pnl and reserve figures from that state.

use crate::config::MarketParams;
use crate::fixed::{self, MathError, SignedU256};
use crate::keys::MarketKey;
use crate::oracle::{OraclePrices, PriceProps};
use crate::store::DataStore;
use crate::types::{AccountId, MarketId, Side, TokenId};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub index_token: TokenId,
    pub long_token: TokenId,
    pub short_token: TokenId,
    pub params: MarketParams,
}

impl Market {
    pub fn new(
        id: MarketId,
        index_token: TokenId,
        long_token: TokenId,
        short_token: TokenId,
        params: MarketParams,
    ) -> Self {
        Self {
            id,
            index_token,
            long_token,
            short_token,
            params,
        }
    }

    /// Token backing positions on `side`: longs are paid from the long token pool.
    pub fn backing_token(&self, side: Side) -> TokenId {
        match side {
            Side::Long => self.long_token,
            Side::Short => self.short_token,
        }
    }

    pub fn is_backing_token(&self, token: TokenId) -> bool {
        token == self.long_token || token == self.short_token
    }

    pub fn validate_collateral_token(&self, token: TokenId) -> Result<(), MarketError> {
        if self.is_backing_token(token) {
            Ok(())
        } else {
            Err(MarketError::InvalidCollateralToken {
                market: self.id,
                token,
            })
        }
    }

    /// The other backing token, used as the output of a swap through this market.
    pub fn opposite_token(&self, token: TokenId) -> Result<TokenId, MarketError> {
        if token == self.long_token {
            Ok(self.short_token)
        } else if token == self.short_token {
            Ok(self.long_token)
        } else {
            Err(MarketError::InvalidSwapToken {
                market: self.id,
                token,
            })
        }
    }

    /// Distinct backing tokens (one entry when long and short token are the same).
    pub fn backing_tokens(&self) -> Vec<TokenId> {
        if self.long_token == self.short_token {
            vec![self.long_token]
        } else {
            vec![self.long_token, self.short_token]
        }
    }
}

/// Prices of a market's three tokens for one settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketPrices {
    pub index: PriceProps,
    pub long: PriceProps,
    pub short: PriceProps,
}

impl MarketPrices {
    pub fn from_oracle(market: &Market, oracle: &OraclePrices) -> Result<Self, MarketError> {
        let get = |token: TokenId| oracle.get(token).ok_or(MarketError::MissingPrice(token));
        Ok(Self {
            index: get(market.index_token)?,
            long: get(market.long_token)?,
            short: get(market.short_token)?,
        })
    }

    pub fn backing(&self, side: Side) -> PriceProps {
        match side {
            Side::Long => self.long,
            Side::Short => self.short,
        }
    }

    pub fn for_token(&self, market: &Market, token: TokenId) -> Result<PriceProps, MarketError> {
        if token == market.long_token {
            Ok(self.long)
        } else if token == market.short_token {
            Ok(self.short)
        } else if token == market.index_token {
            Ok(self.index)
        } else {
            Err(MarketError::MissingPrice(token))
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MarketError {
    #[error("{token} is not a collateral token of {market}")]
    InvalidCollateralToken { market: MarketId, token: TokenId },

    #[error("{token} cannot be swapped through {market}")]
    InvalidSwapToken { market: MarketId, token: TokenId },

    #[error("no oracle price for {0}")]
    MissingPrice(TokenId),

    #[error("insufficient reserve: reserved {reserved} exceeds max {max}")]
    InsufficientReserve { reserved: U256, max: U256 },

    #[error("math error: {0}")]
    Math(#[from] MathError),
}

// 4.1: the accessor. one getter and one checked mutator per piece of market state.
impl DataStore {
    pub fn pool_amount(&self, market: MarketId, token: TokenId) -> U256 {
        self.get_uint(&MarketKey::PoolAmount { market, token })
    }

    pub fn apply_delta_to_pool_amount(
        &mut self,
        market: MarketId,
        token: TokenId,
        delta: SignedU256,
    ) -> Result<U256, MathError> {
        self.apply_delta_to_uint(MarketKey::PoolAmount { market, token }, delta)
    }

    pub fn swap_impact_pool_amount(&self, market: MarketId, token: TokenId) -> U256 {
        self.get_uint(&MarketKey::SwapImpactPoolAmount { market, token })
    }

    pub fn apply_delta_to_swap_impact_pool_amount(
        &mut self,
        market: MarketId,
        token: TokenId,
        delta: SignedU256,
    ) -> Result<U256, MathError> {
        self.apply_delta_to_uint(MarketKey::SwapImpactPoolAmount { market, token }, delta)
    }

    pub fn position_impact_pool_amount(&self, market: MarketId) -> U256 {
        self.get_uint(&MarketKey::PositionImpactPoolAmount { market })
    }

    pub fn apply_delta_to_position_impact_pool_amount(
        &mut self,
        market: MarketId,
        delta: SignedU256,
    ) -> Result<U256, MathError> {
        self.apply_delta_to_uint(MarketKey::PositionImpactPoolAmount { market }, delta)
    }

    pub fn open_interest(&self, market: MarketId, collateral_token: TokenId, side: Side) -> U256 {
        self.get_uint(&MarketKey::OpenInterest { market, collateral_token, side })
    }

    pub fn apply_delta_to_open_interest(
        &mut self,
        market: MarketId,
        collateral_token: TokenId,
        side: Side,
        delta: SignedU256,
    ) -> Result<U256, MathError> {
        self.apply_delta_to_uint(MarketKey::OpenInterest { market, collateral_token, side }, delta)
    }

    pub fn open_interest_in_tokens(&self, market: MarketId, collateral_token: TokenId, side: Side) -> U256 {
        self.get_uint(&MarketKey::OpenInterestInTokens { market, collateral_token, side })
    }

    pub fn apply_delta_to_open_interest_in_tokens(
        &mut self,
        market: MarketId,
        collateral_token: TokenId,
        side: Side,
        delta: SignedU256,
    ) -> Result<U256, MathError> {
        self.apply_delta_to_uint(
            MarketKey::OpenInterestInTokens { market, collateral_token, side },
            delta,
        )
    }

    pub fn collateral_sum(&self, market: MarketId, collateral_token: TokenId, side: Side) -> U256 {
        self.get_uint(&MarketKey::CollateralSum { market, collateral_token, side })
    }

    pub fn apply_delta_to_collateral_sum(
        &mut self,
        market: MarketId,
        collateral_token: TokenId,
        side: Side,
        delta: SignedU256,
    ) -> Result<U256, MathError> {
        self.apply_delta_to_uint(MarketKey::CollateralSum { market, collateral_token, side }, delta)
    }

    pub fn cumulative_borrowing_factor(&self, market: MarketId, side: Side) -> U256 {
        self.get_uint(&MarketKey::CumulativeBorrowingFactor { market, side })
    }

    pub fn set_cumulative_borrowing_factor(&mut self, market: MarketId, side: Side, value: U256) {
        self.set_uint(MarketKey::CumulativeBorrowingFactor { market, side }, value);
    }

    /// Seconds timestamp of the last borrowing accrual.
    pub fn borrowing_updated_at(&self, market: MarketId) -> u64 {
        self.get_uint(&MarketKey::CumulativeBorrowingFactorUpdatedAt { market }).low_u64()
    }

    pub fn set_borrowing_updated_at(&mut self, market: MarketId, secs: u64) {
        self.set_uint(MarketKey::CumulativeBorrowingFactorUpdatedAt { market }, U256::from(secs));
    }

    pub fn funding_updated_at(&self, market: MarketId) -> u64 {
        self.get_uint(&MarketKey::FundingUpdatedAt { market }).low_u64()
    }

    pub fn set_funding_updated_at(&mut self, market: MarketId, secs: u64) {
        self.set_uint(MarketKey::FundingUpdatedAt { market }, U256::from(secs));
    }

    pub fn funding_amount_per_size(&self, market: MarketId, collateral_token: TokenId, side: Side) -> SignedU256 {
        self.get_int(&MarketKey::FundingAmountPerSize { market, collateral_token, side })
    }

    pub fn set_funding_amount_per_size(
        &mut self,
        market: MarketId,
        collateral_token: TokenId,
        side: Side,
        value: SignedU256,
    ) {
        self.set_int(MarketKey::FundingAmountPerSize { market, collateral_token, side }, value);
    }

    pub fn is_adl_enabled(&self, market: MarketId, side: Side) -> bool {
        self.get_bool(&MarketKey::AdlEnabled { market, side })
    }

    pub fn set_adl_enabled(&mut self, market: MarketId, side: Side, enabled: bool) {
        self.set_bool(MarketKey::AdlEnabled { market, side }, enabled);
    }

    pub fn max_pnl_factor(&self, market: MarketId, side: Side) -> U256 {
        self.get_uint(&MarketKey::MaxPnlFactor { market, side })
    }

    pub fn set_max_pnl_factor(&mut self, market: MarketId, side: Side, value: U256) {
        self.set_uint(MarketKey::MaxPnlFactor { market, side }, value);
    }

    pub fn reserve_factor(&self, market: MarketId, side: Side) -> U256 {
        self.get_uint(&MarketKey::ReserveFactor { market, side })
    }

    pub fn set_reserve_factor(&mut self, market: MarketId, side: Side, value: U256) {
        self.set_uint(MarketKey::ReserveFactor { market, side }, value);
    }

    pub fn token_balance(&self, market: MarketId, token: TokenId) -> U256 {
        self.get_uint(&MarketKey::TokenBalance { market, token })
    }

    pub fn apply_delta_to_token_balance(
        &mut self,
        market: MarketId,
        token: TokenId,
        delta: SignedU256,
    ) -> Result<U256, MathError> {
        self.apply_delta_to_uint(MarketKey::TokenBalance { market, token }, delta)
    }

    pub fn market_token_supply(&self, market: MarketId) -> U256 {
        self.get_uint(&MarketKey::MarketTokenSupply { market })
    }

    pub fn market_token_balance(&self, market: MarketId, account: AccountId) -> U256 {
        self.get_uint(&MarketKey::MarketTokenBalance { market, account })
    }

    pub fn mint_market_tokens(&mut self, market: MarketId, account: AccountId, amount: U256) -> Result<(), MathError> {
        self.increment_uint(MarketKey::MarketTokenSupply { market }, amount)?;
        self.increment_uint(MarketKey::MarketTokenBalance { market, account }, amount)?;
        Ok(())
    }

    pub fn burn_market_tokens(&mut self, market: MarketId, account: AccountId, amount: U256) -> Result<(), MathError> {
        self.decrement_uint(MarketKey::MarketTokenBalance { market, account }, amount)?;
        self.decrement_uint(MarketKey::MarketTokenSupply { market }, amount)?;
        Ok(())
    }

    pub fn claimable_funding_amount(&self, market: MarketId, token: TokenId, account: AccountId) -> U256 {
        self.get_uint(&MarketKey::ClaimableFundingAmount { market, token, account })
    }

    /// Credits `account` and grows the market's outstanding funding liability with it.
    pub fn increment_claimable_funding_amount(
        &mut self,
        market: MarketId,
        token: TokenId,
        account: AccountId,
        amount: U256,
    ) -> Result<U256, MathError> {
        self.increment_uint(MarketKey::ClaimableFundingPool { market, token }, amount)?;
        self.increment_uint(MarketKey::ClaimableFundingAmount { market, token, account }, amount)
    }

    /// Zeroes the claimable balance, releases it from the outstanding total and returns it.
    pub fn take_claimable_funding_amount(
        &mut self,
        market: MarketId,
        token: TokenId,
        account: AccountId,
    ) -> Result<U256, MathError> {
        let key = MarketKey::ClaimableFundingAmount { market, token, account };
        let amount = self.get_uint(&key);
        self.decrement_uint(MarketKey::ClaimableFundingPool { market, token }, amount)?;
        self.set_uint(key, U256::zero());
        Ok(amount)
    }

    /// Funding credited to receivers and not yet claimed. a liability of the pool.
    pub fn claimable_funding_pool(&self, market: MarketId, token: TokenId) -> U256 {
        self.get_uint(&MarketKey::ClaimableFundingPool { market, token })
    }

    pub fn affiliate_reward(&self, market: MarketId, token: TokenId, account: AccountId) -> U256 {
        self.get_uint(&MarketKey::AffiliateReward { market, token, account })
    }

    pub fn affiliate_reward_pool(&self, market: MarketId, token: TokenId) -> U256 {
        self.get_uint(&MarketKey::AffiliateRewardPool { market, token })
    }

    pub fn increment_affiliate_reward(
        &mut self,
        market: MarketId,
        token: TokenId,
        affiliate: AccountId,
        amount: U256,
    ) -> Result<U256, MathError> {
        self.increment_uint(MarketKey::AffiliateRewardPool { market, token }, amount)?;
        self.increment_uint(MarketKey::AffiliateReward { market, token, account: affiliate }, amount)
    }

    /// Zeroes the affiliate's reward and releases it from the reward pool.
    pub fn take_affiliate_reward(
        &mut self,
        market: MarketId,
        token: TokenId,
        affiliate: AccountId,
    ) -> Result<U256, MathError> {
        let key = MarketKey::AffiliateReward { market, token, account: affiliate };
        let amount = self.get_uint(&key);
        self.set_uint(key, U256::zero());
        self.decrement_uint(MarketKey::AffiliateRewardPool { market, token }, amount)?;
        Ok(amount)
    }
}

// 4.2: aggregates over collateral tokens and derived market figures.

pub fn open_interest_for_side(store: &DataStore, market: &Market, side: Side) -> Result<U256, MathError> {
    market
        .backing_tokens()
        .into_iter()
        .try_fold(U256::zero(), |acc, token| fixed::add(acc, store.open_interest(market.id, token, side)))
}

pub fn open_interest_in_tokens_for_side(store: &DataStore, market: &Market, side: Side) -> Result<U256, MathError> {
    market.backing_tokens().into_iter().try_fold(U256::zero(), |acc, token| {
        fixed::add(acc, store.open_interest_in_tokens(market.id, token, side))
    })
}

/// USD value of the pool backing `side`.
pub fn pool_usd(
    store: &DataStore,
    market: &Market,
    prices: &MarketPrices,
    side: Side,
    maximize: bool,
) -> Result<U256, MathError> {
    let token = market.backing_token(side);
    fixed::mul(store.pool_amount(market.id, token), prices.backing(side).pick(maximize))
}

/// Pool USD on `side` less the funding it owes receivers in the same token.
pub fn net_pool_usd(
    store: &DataStore,
    market: &Market,
    prices: &MarketPrices,
    side: Side,
    maximize: bool,
) -> Result<U256, MathError> {
    let token = market.backing_token(side);
    let price = prices.backing(side);
    let gross = fixed::mul(store.pool_amount(market.id, token), price.pick(maximize))?;
    let owed = fixed::mul(store.claimable_funding_pool(market.id, token), price.pick(!maximize))?;
    Ok(gross.saturating_sub(owed))
}

/// Aggregate unrealized PnL of all positions on `side`. long: tokens * price - usd,
/// short: usd - tokens * price. `maximize` picks the price that makes the PnL larger.
pub fn pnl(
    store: &DataStore,
    market: &Market,
    index_price: &PriceProps,
    side: Side,
    maximize: bool,
) -> Result<SignedU256, MathError> {
    let oi_usd = open_interest_for_side(store, market, side)?;
    let oi_tokens = open_interest_in_tokens_for_side(store, market, side)?;
    let price = match side {
        Side::Long => index_price.pick(maximize),
        Side::Short => index_price.pick(!maximize),
    };
    let value = fixed::mul(oi_tokens, price)?;
    Ok(match side {
        Side::Long => SignedU256::diff(value, oi_usd),
        Side::Short => SignedU256::diff(oi_usd, value),
    })
}

/// PnL of `side` as a fraction of its backing pool value. zero when the pool is empty.
pub fn pnl_to_pool_factor(
    store: &DataStore,
    market: &Market,
    prices: &MarketPrices,
    side: Side,
    maximize: bool,
) -> Result<SignedU256, MathError> {
    let pool = pool_usd(store, market, prices, side, !maximize)?;
    if pool.is_zero() {
        return Ok(SignedU256::zero());
    }
    pnl(store, market, &prices.index, side, maximize)?.mul_div(fixed::precision(), pool)
}

/// USD that open interest on `side` could claim from the pool. longs reserve the current value
/// of their index tokens, shorts their entry notional.
pub fn reserved_usd(
    store: &DataStore,
    market: &Market,
    prices: &MarketPrices,
    side: Side,
) -> Result<U256, MathError> {
    match side {
        Side::Long => fixed::mul(
            open_interest_in_tokens_for_side(store, market, side)?,
            prices.index.max,
        ),
        Side::Short => open_interest_for_side(store, market, side),
    }
}

pub fn validate_reserve(
    store: &DataStore,
    market: &Market,
    prices: &MarketPrices,
    side: Side,
) -> Result<(), MarketError> {
    let pool = pool_usd(store, market, prices, side, false)?;
    let max = fixed::apply_factor(pool, store.reserve_factor(market.id, side))?;
    let reserved = reserved_usd(store, market, prices, side)?;
    if reserved > max {
        return Err(MarketError::InsufficientReserve { reserved, max });
    }
    Ok(())
}

/// Trader pnl on `side` with profits limited to the max pnl factor of the backing pool.
pub fn capped_pnl(
    store: &DataStore,
    market: &Market,
    prices: &MarketPrices,
    side: Side,
    maximize: bool,
) -> Result<SignedU256, MathError> {
    let value = pnl(store, market, &prices.index, side, maximize)?;
    if !value.is_positive() {
        return Ok(value);
    }
    let pool = pool_usd(store, market, prices, side, !maximize)?;
    let max = fixed::apply_factor(pool, store.max_pnl_factor(market.id, side))?;
    Ok(SignedU256::positive(value.abs().min(max)))
}

/// LP-facing value of the market: both pools minus unclaimed funding and what traders are owed
/// (capped). `maximize` picks the prices that make the pool worth more and trader PnL smaller.
pub fn pool_value(
    store: &DataStore,
    market: &Market,
    prices: &MarketPrices,
    maximize: bool,
) -> Result<U256, MathError> {
    let long_usd = net_pool_usd(store, market, prices, Side::Long, maximize)?;
    let short_usd = if market.long_token == market.short_token {
        U256::zero()
    } else {
        net_pool_usd(store, market, prices, Side::Short, maximize)?
    };
    let mut value = SignedU256::positive(fixed::add(long_usd, short_usd)?);
    for side in Side::BOTH {
        let trader_pnl = capped_pnl(store, market, prices, side, !maximize)?;
        value = value.checked_sub(trader_pnl)?;
    }
    if value.is_negative() {
        return Err(MathError::Underflow);
    }
    Ok(value.abs())
}

/// What the vault should hold for `token` versus what it does hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolBalance {
    pub token_balance: U256,
    pub accounted: U256,
}

impl PoolBalance {
    pub fn is_balanced(&self) -> bool {
        self.token_balance == self.accounted
    }
}

pub fn pool_balance(store: &DataStore, market: &Market, token: TokenId) -> Result<PoolBalance, MathError> {
    let mut accounted = fixed::add(
        store.pool_amount(market.id, token),
        store.swap_impact_pool_amount(market.id, token),
    )?;
    for side in Side::BOTH {
        accounted = fixed::add(accounted, store.collateral_sum(market.id, token, side))?;
    }
    accounted = fixed::add(accounted, store.affiliate_reward_pool(market.id, token))?;
    Ok(PoolBalance {
        token_balance: store.token_balance(market.id, token),
        accounted,
    })
}
