//! Keeper-driven liquidation and auto-deleveraging.

use super::core::Engine;
use super::results::{AdlResult, AdlStateResult, EngineError, LiquidationResult};
use crate::adl::{rank_adl_candidates, AdlCandidate};
use crate::events::{AdlStateUpdatedEvent, EventPayload, PositionLiquidatedEvent};
use crate::fixed::SignedU256;
use crate::market;
use crate::oracle::OraclePrices;
use crate::order::{OrderParams, OrderType};
use crate::position::PositionKey;
use crate::roles::Role;
use crate::types::{AccountId, MarketId, Side};
use primitive_types::U256;
use tracing::{info, warn};

impl Engine {
    /// Fully closes `key` if it has fallen below its collateral thresholds.
    pub fn execute_liquidation(
        &mut self,
        keeper: AccountId,
        key: PositionKey,
        prices: &OraclePrices,
    ) -> Result<LiquidationResult, EngineError> {
        self.require_role(keeper, Role::LiquidationKeeper)?;
        self.atomic(|engine| {
            let market = engine.market_cloned(key.market)?;
            let market_prices = engine.market_prices(&market, prices)?;
            engine.accrue(&market, &market_prices)?;

            let position = match engine.positions.get(&key) {
                Some(position) if !position.is_empty() => position.clone(),
                _ => return Err(EngineError::EmptyPosition),
            };
            let health = engine.health_of(&market, &market_prices, &position)?;
            if !health.is_liquidatable {
                return Err(EngineError::InvalidLiquidation);
            }

            let params = OrderParams::market_decrease(
                key.account,
                key.market,
                key.collateral_token,
                position.size_in_usd,
                key.side,
            )
            .with_type(OrderType::Liquidation);
            let mut decrease = engine.decrease_position(key.account, &params, prices)?;

            warn!(
                position = ?key,
                %keeper,
                remaining = %health.remaining_collateral_usd,
                "position liquidated"
            );
            engine.emit_event(EventPayload::PositionLiquidated(PositionLiquidatedEvent {
                key,
                keeper,
                remaining_collateral_usd: health.remaining_collateral_usd,
                min_collateral_usd: health.min_collateral_usd,
            }));
            decrease.transfers = engine.take_transfers();
            Ok(LiquidationResult { health, decrease })
        })
    }

    /// Turns ADL on for `side` of `market` when its pnl exceeds the max pnl factor, off otherwise.
    pub fn update_adl_state(
        &mut self,
        keeper: AccountId,
        market_id: MarketId,
        side: Side,
        prices: &OraclePrices,
    ) -> Result<AdlStateResult, EngineError> {
        self.require_role(keeper, Role::AdlKeeper)?;
        let market = self.market_cloned(market_id)?;
        let market_prices = self.market_prices(&market, prices)?;

        let pnl_to_pool_factor = market::pnl_to_pool_factor(&self.store, &market, &market_prices, side, true)?;
        let max_pnl_factor = self.store.max_pnl_factor(market_id, side);
        let enabled = pnl_to_pool_factor.is_positive() && pnl_to_pool_factor.abs() > max_pnl_factor;

        self.store.set_adl_enabled(market_id, side, enabled);
        info!(market = %market_id, %side, enabled, "adl state updated");
        self.emit_event(EventPayload::AdlStateUpdated(AdlStateUpdatedEvent {
            market: market_id,
            side,
            pnl_to_pool_factor,
            max_pnl_factor,
            enabled,
        }));
        Ok(AdlStateResult {
            market: market_id,
            side,
            pnl_to_pool_factor,
            max_pnl_factor,
            enabled,
        })
    }

    /// Closes `size_delta_usd` of `key` to bring its side's pnl back under the pool cap.
    pub fn execute_adl(
        &mut self,
        keeper: AccountId,
        key: PositionKey,
        size_delta_usd: U256,
        prices: &OraclePrices,
    ) -> Result<AdlResult, EngineError> {
        self.require_role(keeper, Role::AdlKeeper)?;
        if !self.store.is_adl_enabled(key.market, key.side) {
            return Err(EngineError::AdlNotEnabled);
        }

        self.atomic(|engine| {
            let market = engine.market_cloned(key.market)?;
            let market_prices = engine.market_prices(&market, prices)?;
            engine.accrue(&market, &market_prices)?;

            let before = market::pnl_to_pool_factor(&engine.store, &market, &market_prices, key.side, true)?;
            let params = OrderParams::market_decrease(
                key.account,
                key.market,
                key.collateral_token,
                size_delta_usd,
                key.side,
            );
            let mut decrease = engine.decrease_position(key.account, &params, prices)?;
            let after = market::pnl_to_pool_factor(&engine.store, &market, &market_prices, key.side, true)?;

            if after >= before {
                return Err(EngineError::InvalidAdl);
            }
            let min_after = market.params.min_pnl_factor_after_adl;
            if after < SignedU256::positive(min_after) {
                return Err(EngineError::PnlOvercorrected);
            }

            info!(position = ?key, %before, %after, "position auto-deleveraged");
            decrease.transfers = engine.take_transfers();
            Ok(AdlResult {
                pnl_to_pool_factor_before: before,
                pnl_to_pool_factor_after: after,
                decrease,
            })
        })
    }

    /// Profitable positions on `side` of `market`, most profitable per unit of collateral first.
    pub fn adl_candidates(
        &self,
        market_id: MarketId,
        side: Side,
        prices: &OraclePrices,
    ) -> Result<Vec<AdlCandidate>, EngineError> {
        let market = self.market_cloned(market_id)?;
        let market_prices = self.market_prices(&market, prices)?;
        Ok(rank_adl_candidates(
            self.positions.values(),
            &market,
            &market_prices,
            side,
            self.config.max_adl_candidates,
        )?)
    }
}
