//! Funding and borrowing accrual, and fee claims.

use super::core::Engine;
use super::results::{ClaimResult, EngineError};
use crate::events::{BorrowingUpdatedEvent, ClaimEvent, EventPayload, FundingUpdatedEvent};
use crate::fixed::SignedU256;
use crate::funding::{next_cumulative_borrowing_factor, next_funding_update};
use crate::market::{Market, MarketPrices};
use crate::oracle::OraclePrices;
use crate::transfer::Holder;
use crate::types::{AccountId, MarketId, Side, TokenId};
use tracing::debug;

impl Engine {
    /// Accrues funding and borrowing for `market_id` up to the current engine time.
    pub fn update_funding_state(&mut self, market_id: MarketId, prices: &OraclePrices) -> Result<(), EngineError> {
        let market = self.market_cloned(market_id)?;
        let market_prices = self.market_prices(&market, prices)?;
        self.atomic(|engine| engine.accrue(&market, &market_prices))
    }

    // called at the start of every position action, before any snapshot is read
    pub(super) fn accrue(&mut self, market: &Market, prices: &MarketPrices) -> Result<(), EngineError> {
        let now = self.now_secs();

        let funding_duration = now.saturating_sub(self.store.funding_updated_at(market.id));
        if funding_duration > 0 {
            let update = next_funding_update(&self.store, market, prices, funding_duration)?;
            for delta in &update.deltas {
                let current = self
                    .store
                    .funding_amount_per_size(market.id, delta.collateral_token, delta.side);
                let next = current.checked_add(delta.delta)?;
                self.store
                    .set_funding_amount_per_size(market.id, delta.collateral_token, delta.side, next);
            }
            self.store.set_funding_updated_at(market.id, now);
            if let Some(paying_side) = update.paying_side {
                debug!(market = %market.id, %paying_side, funding_usd = %update.funding_usd, "funding accrued");
                self.emit_event(EventPayload::FundingUpdated(FundingUpdatedEvent {
                    market: market.id,
                    paying_side,
                    funding_usd: update.funding_usd,
                    duration_secs: funding_duration,
                }));
            }
        }

        let borrowing_duration = now.saturating_sub(self.store.borrowing_updated_at(market.id));
        if borrowing_duration > 0 {
            for side in Side::BOTH {
                let current = self.store.cumulative_borrowing_factor(market.id, side);
                let next = next_cumulative_borrowing_factor(&self.store, market, prices, side, borrowing_duration)?;
                if next != current {
                    self.store.set_cumulative_borrowing_factor(market.id, side, next);
                    self.emit_event(EventPayload::BorrowingUpdated(BorrowingUpdatedEvent {
                        market: market.id,
                        side,
                        cumulative_borrowing_factor: next,
                        duration_secs: borrowing_duration,
                    }));
                }
            }
            self.store.set_borrowing_updated_at(market.id, now);
        }
        Ok(())
    }

    /// Pays out `account`'s claimable funding in `token`. credits are a liability of the pool, so
    /// the claim does not wait for the paying side to settle.
    pub fn claim_funding_fees(
        &mut self,
        account: AccountId,
        market_id: MarketId,
        token: TokenId,
        receiver: AccountId,
    ) -> Result<ClaimResult, EngineError> {
        self.market_cloned(market_id)?;
        self.atomic(|engine| {
            let amount = engine.store.take_claimable_funding_amount(market_id, token, account)?;
            let available = engine.store.pool_amount(market_id, token);
            if available < amount {
                return Err(EngineError::InsufficientPoolAmount {
                    available,
                    required: amount,
                });
            }
            engine
                .store
                .apply_delta_to_pool_amount(market_id, token, SignedU256::negative(amount))?;
            engine.transfer(token, Holder::Market(market_id), Holder::Account(receiver), amount, false)?;
            engine.emit_event(EventPayload::FundingClaimed(ClaimEvent {
                market: market_id,
                token,
                account,
                amount,
            }));
            Ok(ClaimResult {
                amount,
                transfers: engine.take_transfers(),
            })
        })
    }

    pub fn claim_affiliate_rewards(
        &mut self,
        affiliate: AccountId,
        market_id: MarketId,
        token: TokenId,
        receiver: AccountId,
    ) -> Result<ClaimResult, EngineError> {
        self.market_cloned(market_id)?;
        self.atomic(|engine| {
            let amount = engine.store.take_affiliate_reward(market_id, token, affiliate)?;
            engine.transfer(token, Holder::Market(market_id), Holder::Account(receiver), amount, false)?;
            engine.emit_event(EventPayload::AffiliateRewardClaimed(ClaimEvent {
                market: market_id,
                token,
                account: affiliate,
                amount,
            }));
            Ok(ClaimResult {
                amount,
                transfers: engine.take_transfers(),
            })
        })
    }
}
