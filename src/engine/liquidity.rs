//! Deposits and withdrawals of backing tokens against market tokens.
//!
//! A deposit or withdrawal that fails validation is cancelled rather than returned as an
//! error: state is rolled back, a cancellation event is logged, and the outcome says why.

use super::core::Engine;
use super::results::{DepositOutcome, EngineError, WithdrawalOutcome};
use crate::events::{DepositExecutedEvent, EventPayload, LiquidityCancelledEvent, WithdrawalExecutedEvent};
use crate::fees;
use crate::fixed::{self, SignedU256};
use crate::liquidity::{self, DepositParams, WithdrawalParams};
use crate::market::{self, Market, MarketPrices};
use crate::oracle::OraclePrices;
use crate::pricing;
use crate::transfer::Holder;
use crate::types::{AccountId, Side, TokenId};
use primitive_types::U256;
use tracing::{info, warn};

impl Engine {
    /// Moves both token amounts from `account` into the market and mints market tokens to
    /// `params.receiver`.
    pub fn execute_deposit(
        &mut self,
        account: AccountId,
        params: DepositParams,
        prices: &OraclePrices,
    ) -> Result<DepositOutcome, EngineError> {
        match self.atomic(|engine| engine.deposit(account, &params, prices)) {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_validation() => {
                let reason = e.to_string();
                warn!(%account, market = %params.market, %reason, "deposit cancelled");
                self.emit_event(EventPayload::DepositCancelled(LiquidityCancelledEvent {
                    market: params.market,
                    account,
                    reason: reason.clone(),
                }));
                Ok(DepositOutcome::Cancelled { reason })
            }
            Err(e) => Err(e),
        }
    }

    /// Burns `params.market_token_amount` of `account`'s market tokens and pays out the pro
    /// rata share of both pools to `params.receiver`.
    pub fn execute_withdrawal(
        &mut self,
        account: AccountId,
        params: WithdrawalParams,
        prices: &OraclePrices,
    ) -> Result<WithdrawalOutcome, EngineError> {
        match self.atomic(|engine| engine.withdraw(account, &params, prices)) {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_validation() => {
                let reason = e.to_string();
                warn!(%account, market = %params.market, %reason, "withdrawal cancelled");
                self.emit_event(EventPayload::WithdrawalCancelled(LiquidityCancelledEvent {
                    market: params.market,
                    account,
                    reason: reason.clone(),
                }));
                Ok(WithdrawalOutcome::Cancelled { reason })
            }
            Err(e) => Err(e),
        }
    }

    fn deposit(
        &mut self,
        account: AccountId,
        params: &DepositParams,
        oracle: &OraclePrices,
    ) -> Result<DepositOutcome, EngineError> {
        let market = self.market_cloned(params.market)?;
        let prices = self.market_prices(&market, oracle)?;
        self.accrue(&market, &prices)?;
        if params.long_token_amount.is_zero() && params.short_token_amount.is_zero() {
            return Err(EngineError::EmptyDeposit);
        }

        let pool_value = market::pool_value(&self.store, &market, &prices, true)?;
        let supply = self.store.market_token_supply(market.id);

        let long_usd = fixed::mul(params.long_token_amount, prices.long.mid()?)?;
        let short_usd = fixed::mul(params.short_token_amount, prices.short.mid()?)?;
        let pool_long_usd = fixed::mul(self.store.pool_amount(market.id, market.long_token), prices.long.mid()?)?;
        let pool_short_usd = fixed::mul(self.store.pool_amount(market.id, market.short_token), prices.short.mid()?)?;
        let impact_usd = pricing::price_impact_usd(
            pool_long_usd,
            pool_short_usd,
            fixed::add(pool_long_usd, long_usd)?,
            fixed::add(pool_short_usd, short_usd)?,
            &market.params.swap_impact,
        )?;
        let total_usd = fixed::add(long_usd, short_usd)?;

        let mut minted = U256::zero();
        for (side, amount, usd) in [
            (Side::Long, params.long_token_amount, long_usd),
            (Side::Short, params.short_token_amount, short_usd),
        ] {
            if amount.is_zero() {
                continue;
            }
            // each token carries its share of the impact
            let impact = impact_usd.mul_div(usd, total_usd)?;
            let usd_added = self.deposit_token(&market, &prices, account, side, amount, impact)?;
            minted = fixed::add(minted, liquidity::usd_to_market_token_amount(usd_added, pool_value, supply)?)?;
        }

        if minted < params.min_market_tokens {
            return Err(EngineError::MinMarketTokens {
                minted,
                min: params.min_market_tokens,
            });
        }
        self.store.mint_market_tokens(market.id, params.receiver, minted)?;

        info!(market = %market.id, receiver = %params.receiver, %minted, "deposit executed");
        self.emit_event(EventPayload::DepositExecuted(DepositExecutedEvent {
            market: market.id,
            account,
            long_token_amount: params.long_token_amount,
            short_token_amount: params.short_token_amount,
            market_tokens_minted: minted,
            price_impact_usd: impact_usd,
        }));
        Ok(DepositOutcome::Executed {
            market_tokens_minted: minted,
            price_impact_usd: impact_usd,
            transfers: self.take_transfers(),
        })
    }

    /// Books one token of a deposit and returns the USD it adds to the pool, for minting.
    fn deposit_token(
        &mut self,
        market: &Market,
        prices: &MarketPrices,
        account: AccountId,
        side: Side,
        amount: U256,
        impact_usd: SignedU256,
    ) -> Result<U256, EngineError> {
        let token = market.backing_token(side);
        let price = prices.backing(side);
        self.transfer(token, Holder::Account(account), Holder::Market(market.id), amount, false)?;

        let fees = fees::swap_fees(&market.params, amount)?;
        self.transfer(token, Holder::Market(market.id), Holder::FeeReceiver, fees.fee_receiver_amount, false)?;
        self.store
            .apply_delta_to_pool_amount(market.id, token, SignedU256::positive(fees.fee_amount_for_pool))?;

        let mut amount_after = fees.amount_after_fees;
        let mut usd_added = U256::zero();
        if impact_usd.is_positive() {
            // paid in the other token, out of its impact pool
            let other = market.backing_token(side.opposite());
            let other_price = prices.backing(side.opposite());
            let bonus = pricing::swap_impact_amount_with_cap(&self.store, market, other, &other_price, impact_usd)?.abs();
            self.store
                .apply_delta_to_swap_impact_pool_amount(market.id, other, SignedU256::negative(bonus))?;
            self.store
                .apply_delta_to_pool_amount(market.id, other, SignedU256::positive(bonus))?;
            usd_added = fixed::mul(bonus, other_price.max)?;
        } else if impact_usd.is_negative() {
            let penalty = pricing::swap_impact_amount_with_cap(&self.store, market, token, &price, impact_usd)?.abs();
            amount_after = fixed::sub(amount_after, penalty)?;
            self.store
                .apply_delta_to_swap_impact_pool_amount(market.id, token, SignedU256::positive(penalty))?;
        }

        self.store
            .apply_delta_to_pool_amount(market.id, token, SignedU256::positive(amount_after))?;
        fixed::add(usd_added, fixed::mul(amount_after, price.min)?).map_err(EngineError::from)
    }

    fn withdraw(
        &mut self,
        account: AccountId,
        params: &WithdrawalParams,
        oracle: &OraclePrices,
    ) -> Result<WithdrawalOutcome, EngineError> {
        let market = self.market_cloned(params.market)?;
        let prices = self.market_prices(&market, oracle)?;
        self.accrue(&market, &prices)?;

        let balance = self.store.market_token_balance(market.id, account);
        if params.market_token_amount.is_zero() || balance < params.market_token_amount {
            return Err(EngineError::InsufficientMarketTokens {
                balance,
                requested: params.market_token_amount,
            });
        }

        let amounts = liquidity::withdrawal_amounts(&self.store, &market, &prices, params.market_token_amount)?;
        self.store
            .burn_market_tokens(market.id, account, params.market_token_amount)?;

        let long_out = self.withdraw_token(&market, params.receiver, market.long_token, amounts.long_token_amount)?;
        let short_out = self.withdraw_token(&market, params.receiver, market.short_token, amounts.short_token_amount)?;
        for side in Side::BOTH {
            market::validate_reserve(&self.store, &market, &prices, side)?;
        }
        if long_out < params.min_long_token_amount {
            return Err(EngineError::InsufficientOutputAmount {
                output: long_out,
                min: params.min_long_token_amount,
            });
        }
        if short_out < params.min_short_token_amount {
            return Err(EngineError::InsufficientOutputAmount {
                output: short_out,
                min: params.min_short_token_amount,
            });
        }

        info!(market = %market.id, %account, burned = %params.market_token_amount, "withdrawal executed");
        self.emit_event(EventPayload::WithdrawalExecuted(WithdrawalExecutedEvent {
            market: market.id,
            account,
            market_tokens_burned: params.market_token_amount,
            long_token_amount: long_out,
            short_token_amount: short_out,
        }));
        Ok(WithdrawalOutcome::Executed {
            long_token_amount: long_out,
            short_token_amount: short_out,
            transfers: self.take_transfers(),
        })
    }

    /// Pays `amount` of `token` out of the pool less swap fees. returns what the receiver got.
    fn withdraw_token(
        &mut self,
        market: &Market,
        receiver: AccountId,
        token: TokenId,
        amount: U256,
    ) -> Result<U256, EngineError> {
        if amount.is_zero() {
            return Ok(U256::zero());
        }
        let fees = fees::swap_fees(&market.params, amount)?;
        let leaving = fixed::sub(amount, fees.fee_amount_for_pool)?;
        let available = self.store.pool_amount(market.id, token);
        if available < leaving {
            return Err(EngineError::InsufficientPoolAmount {
                available,
                required: leaving,
            });
        }
        self.store
            .apply_delta_to_pool_amount(market.id, token, SignedU256::negative(leaving))?;
        self.transfer(token, Holder::Market(market.id), Holder::FeeReceiver, fees.fee_receiver_amount, false)?;
        self.transfer(token, Holder::Market(market.id), Holder::Account(receiver), fees.amount_after_fees, false)?;
        Ok(fees.amount_after_fees)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::MarketConfig;
    use crate::engine::{DepositOutcome, Engine, EngineConfig, WithdrawalOutcome};
    use crate::fixed::{expand_decimals, token_price};
    use crate::liquidity::{DepositParams, WithdrawalParams};
    use crate::oracle::{OraclePrices, PriceProps};
    use crate::transfer::{total_received, Holder};
    use crate::types::{AccountId, MarketId, TokenId};
    use primitive_types::U256;

    const ADMIN: AccountId = AccountId(100);
    const LP: AccountId = AccountId(1);
    const WNT: TokenId = TokenId(1);
    const USDC: TokenId = TokenId(2);

    fn prices() -> OraclePrices {
        OraclePrices::new()
            .with(WNT, PriceProps::single(token_price(5000, 18)))
            .with(USDC, PriceProps::single(token_price(1, 6)))
    }

    fn setup_engine(config: MarketConfig) -> (Engine, MarketId) {
        let mut engine = Engine::new(EngineConfig::default(), ADMIN);
        let market = engine.add_market(ADMIN, WNT, WNT, USDC, &config).unwrap();
        (engine, market)
    }

    #[test]
    fn first_deposit_mints_one_token_per_usd() {
        let (mut engine, market) = setup_engine(MarketConfig::frictionless());
        let outcome = engine
            .execute_deposit(
                LP,
                DepositParams::new(market, LP, expand_decimals(10, 18), expand_decimals(50_000, 6)),
                &prices(),
            )
            .unwrap();
        let DepositOutcome::Executed { market_tokens_minted, transfers, .. } = outcome else {
            panic!("deposit cancelled");
        };
        assert_eq!(market_tokens_minted, expand_decimals(100_000, 18));
        assert_eq!(transfers.len(), 2);
        assert_eq!(engine.store().market_token_balance(market, LP), market_tokens_minted);
        assert!(engine.is_solvent().unwrap());
    }

    #[test]
    fn single_sided_deposit_pays_impact_into_the_pool() {
        let (mut engine, market) = setup_engine(MarketConfig::eth_usd());
        engine
            .execute_deposit(LP, DepositParams::new(market, LP, expand_decimals(10, 18), U256::zero()), &prices())
            .unwrap();
        // $50k of imbalance at 2e-8 costs $25, i.e. 0.005 WNT
        assert_eq!(engine.store().swap_impact_pool_amount(market, WNT), expand_decimals(5, 15));
        assert!(engine.is_solvent().unwrap());
    }

    #[test]
    fn min_market_tokens_cancels_the_deposit() {
        let (mut engine, market) = setup_engine(MarketConfig::frictionless());
        let mut params = DepositParams::new(market, LP, expand_decimals(1, 18), U256::zero());
        params.min_market_tokens = expand_decimals(5_001, 18);
        let outcome = engine.execute_deposit(LP, params, &prices()).unwrap();
        assert!(matches!(outcome, DepositOutcome::Cancelled { .. }));
        assert!(engine.store().pool_amount(market, WNT).is_zero());
        assert!(engine.store().market_token_supply(market).is_zero());
        assert_eq!(engine.events().last().unwrap().payload.kind(), "DepositCancelled");
    }

    #[test]
    fn empty_deposit_is_cancelled() {
        let (mut engine, market) = setup_engine(MarketConfig::frictionless());
        let outcome = engine
            .execute_deposit(LP, DepositParams::new(market, LP, U256::zero(), U256::zero()), &prices())
            .unwrap();
        assert!(matches!(outcome, DepositOutcome::Cancelled { .. }));
    }

    #[test]
    fn withdrawal_redeems_both_pools() {
        let (mut engine, market) = setup_engine(MarketConfig::frictionless());
        engine
            .execute_deposit(
                LP,
                DepositParams::new(market, LP, expand_decimals(10, 18), expand_decimals(50_000, 6)),
                &prices(),
            )
            .unwrap();
        let outcome = engine
            .execute_withdrawal(LP, WithdrawalParams::new(market, LP, expand_decimals(10_000, 18)), &prices())
            .unwrap();
        let WithdrawalOutcome::Executed { long_token_amount, short_token_amount, transfers } = outcome else {
            panic!("withdrawal cancelled");
        };
        assert_eq!(long_token_amount, expand_decimals(1, 18));
        assert_eq!(short_token_amount, expand_decimals(5_000, 6));
        assert_eq!(total_received(&transfers, Holder::Account(LP), USDC), expand_decimals(5_000, 6));
        assert_eq!(engine.store().market_token_balance(market, LP), expand_decimals(90_000, 18));
        assert!(engine.is_solvent().unwrap());
    }

    #[test]
    fn withdrawing_more_than_held_is_cancelled() {
        let (mut engine, market) = setup_engine(MarketConfig::frictionless());
        engine
            .execute_deposit(LP, DepositParams::new(market, LP, expand_decimals(1, 18), U256::zero()), &prices())
            .unwrap();
        let outcome = engine
            .execute_withdrawal(AccountId(7), WithdrawalParams::new(market, AccountId(7), expand_decimals(1, 18)), &prices())
            .unwrap();
        assert!(matches!(outcome, WithdrawalOutcome::Cancelled { .. }));
        assert_eq!(engine.events().last().unwrap().payload.kind(), "WithdrawalCancelled");
    }
}
