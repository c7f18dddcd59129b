//! Swaps along a path of markets.
//!
//! Each hop trades one backing token of a market for the other. The hop's output moves
//! straight into the next market on the path, and the last hop pays the receiver.

use super::core::Engine;
use super::results::{EngineError, SwapHopResult, SwapResult};
use crate::events::{EventPayload, SwapExecutedEvent};
use crate::fees;
use crate::fixed::{self, SignedU256};
use crate::market::{self, Market, MarketPrices};
use crate::oracle::OraclePrices;
use crate::order::OrderParams;
use crate::pricing;
use crate::transfer::Holder;
use crate::types::{AccountId, MarketId, Side, TokenId};
use primitive_types::U256;
use tracing::debug;

impl Engine {
    /// Swaps `params.initial_collateral_delta_amount` of `params.initial_collateral_token` held
    /// in the order vault along `params.swap_path`, paying `params.receiver`.
    pub fn execute_swap(
        &mut self,
        account: AccountId,
        params: &OrderParams,
        prices: &OraclePrices,
    ) -> Result<SwapResult, EngineError> {
        if !params.order_type.is_swap() {
            return Err(EngineError::InvalidOrderType(params.order_type));
        }
        self.atomic(|engine| {
            let mut result = engine.swap(account, params, prices)?;
            result.transfers = engine.take_transfers();
            Ok(result)
        })
    }

    pub(super) fn swap(
        &mut self,
        account: AccountId,
        params: &OrderParams,
        oracle: &OraclePrices,
    ) -> Result<SwapResult, EngineError> {
        let result = self.swap_along(
            params.initial_collateral_token,
            params.initial_collateral_delta_amount,
            &params.swap_path,
            oracle,
            Holder::OrderVault,
            Holder::Account(params.receiver),
            params.should_unwrap_native_token,
        )?;
        if result.amount_out < params.min_output_amount {
            return Err(EngineError::InsufficientSwapOutputAmount {
                output: result.amount_out,
                min: params.min_output_amount,
            });
        }
        debug!(%account, token_out = %result.token_out, amount_out = %result.amount_out, hops = result.hops.len(), "swap executed");
        Ok(result)
    }

    /// Moves `amount_in` from `from` through every market on `path` and delivers the output to
    /// `receiver`. transfers stay queued on the engine.
    pub(super) fn swap_along(
        &mut self,
        token_in: TokenId,
        amount_in: U256,
        path: &[MarketId],
        oracle: &OraclePrices,
        from: Holder,
        receiver: Holder,
        unwrap_native: bool,
    ) -> Result<SwapResult, EngineError> {
        let Some(first) = path.first() else {
            return Err(EngineError::EmptySwapPath);
        };
        self.transfer(token_in, from, Holder::Market(*first), amount_in, false)?;

        let mut token = token_in;
        let mut amount = amount_in;
        let mut hops = Vec::with_capacity(path.len());
        for (i, market_id) in path.iter().enumerate() {
            if i > 0 && path[i - 1] == *market_id {
                return Err(EngineError::DuplicatedMarketInSwapPath(*market_id));
            }
            let market = self
                .markets
                .get(market_id)
                .cloned()
                .ok_or(EngineError::InvalidSwapMarket(*market_id))?;
            let prices = self.market_prices(&market, oracle)?;
            let hop = self.swap_hop(&market, &prices, token, amount)?;

            let is_last = i + 1 == path.len();
            let next = if is_last {
                receiver
            } else {
                Holder::Market(path[i + 1])
            };
            self.transfer(hop.token_out, Holder::Market(market.id), next, hop.amount_out, unwrap_native && is_last)?;
            token = hop.token_out;
            amount = hop.amount_out;
            hops.push(hop);
        }

        Ok(SwapResult {
            token_out: token,
            amount_out: amount,
            hops,
            transfers: Vec::new(),
        })
    }

    // the input has already arrived in the market's vault
    fn swap_hop(
        &mut self,
        market: &Market,
        prices: &MarketPrices,
        token_in: TokenId,
        amount_in: U256,
    ) -> Result<SwapHopResult, EngineError> {
        let token_out = market.opposite_token(token_in)?;
        if token_out == token_in {
            return Err(EngineError::InvalidSwapMarket(market.id));
        }
        let price_in = prices.for_token(market, token_in)?;
        let price_out = prices.for_token(market, token_out)?;

        let fees = fees::swap_fees(&market.params, amount_in)?;
        let usd_in = fixed::mul(amount_in, price_in.mid()?)?;
        let impact_usd = pricing::swap_impact_usd(&self.store, market, token_in, &price_in, &price_out, usd_in, usd_in)?;

        let mut amount_in_after_impact = fees.amount_after_fees;
        let mut impact_paid_out = U256::zero();
        if impact_usd.is_positive() {
            let impact = pricing::swap_impact_amount_with_cap(&self.store, market, token_out, &price_out, impact_usd)?;
            impact_paid_out = impact.abs();
            self.store
                .apply_delta_to_swap_impact_pool_amount(market.id, token_out, SignedU256::negative(impact_paid_out))?;
        } else if impact_usd.is_negative() {
            let impact = pricing::swap_impact_amount_with_cap(&self.store, market, token_in, &price_in, impact_usd)?;
            amount_in_after_impact = fixed::sub(amount_in_after_impact, impact.abs())?;
            self.store
                .apply_delta_to_swap_impact_pool_amount(market.id, token_in, SignedU256::positive(impact.abs()))?;
        }

        let amount_out = fixed::add(
            fixed::mul_div(amount_in_after_impact, price_in.min, price_out.max)?,
            impact_paid_out,
        )?;

        self.transfer(token_in, Holder::Market(market.id), Holder::FeeReceiver, fees.fee_receiver_amount, false)?;
        self.store.apply_delta_to_pool_amount(
            market.id,
            token_in,
            SignedU256::positive(fixed::add(amount_in_after_impact, fees.fee_amount_for_pool)?),
        )?;

        let from_pool = fixed::sub(amount_out, impact_paid_out)?;
        let available = self.store.pool_amount(market.id, token_out);
        if available < from_pool {
            return Err(EngineError::InsufficientPoolAmount {
                available,
                required: from_pool,
            });
        }
        self.store
            .apply_delta_to_pool_amount(market.id, token_out, SignedU256::negative(from_pool))?;
        let side_out = if token_out == market.long_token {
            Side::Long
        } else {
            Side::Short
        };
        market::validate_reserve(&self.store, market, prices, side_out)?;

        self.emit_event(EventPayload::SwapExecuted(SwapExecutedEvent {
            market: market.id,
            token_in,
            token_out,
            amount_in,
            amount_out,
            price_impact_usd: impact_usd,
        }));
        Ok(SwapHopResult {
            market: market.id,
            token_in,
            token_out,
            amount_in,
            amount_out,
            price_impact_usd: impact_usd,
        })
    }
}
