//! Position increases and decreases.
//!
//! Both run against the market state after funding and borrowing have been brought up to date.
//! Collateral for an increase arrives from the order vault (optionally swapped on the way);
//! a decrease pays its output to the order receiver (optionally swapped on the way out).

use super::core::Engine;
use super::results::{DecreaseResult, EngineError, IncreaseResult};
use crate::events::{BadDebtEvent, EventPayload, PositionDecreaseEvent, PositionIncreaseEvent};
use crate::fees::{self, PositionFees};
use crate::fixed::{self, MathError, SignedU256};
use crate::funding;
use crate::liquidation::{self, PositionHealth};
use crate::market::{self, Market, MarketPrices};
use crate::oracle::{OraclePrices, PriceProps};
use crate::order::{OrderParams, OrderType};
use crate::position::{Position, PositionKey};
use crate::pricing;
use crate::transfer::Holder;
use crate::types::{AccountId, TokenId};
use primitive_types::U256;
use tracing::{debug, warn};

/// How the collateral side of one decrease settles, in collateral token units.
#[derive(Debug, Clone, Copy, Default)]
struct DecreaseSettlement {
    profit_amount: U256,
    loss_amount: U256,
    // paid to the receiver before any collateral withdrawal
    output_amount: U256,
    next_collateral_amount: U256,
    // what the pool absorbs beyond the position's collateral. nonzero means insolvent
    shortfall_amount: U256,
}

impl DecreaseSettlement {
    fn is_insolvent(&self) -> bool {
        !self.shortfall_amount.is_zero()
    }
}

/// Everything priced for one decrease before any state is written.
#[derive(Debug, Clone)]
struct DecreasePlan {
    size_delta_usd: U256,
    size_delta_in_tokens: U256,
    price_impact_usd: SignedU256,
    execution_price: U256,
    realized_pnl_usd: SignedU256,
    fees: PositionFees,
    settlement: DecreaseSettlement,
}

impl Engine {
    /// Opens or grows a position. collateral is taken from the order vault.
    pub fn execute_increase(
        &mut self,
        account: AccountId,
        params: &OrderParams,
        prices: &OraclePrices,
    ) -> Result<IncreaseResult, EngineError> {
        if !params.order_type.is_increase() {
            return Err(EngineError::InvalidOrderType(params.order_type));
        }
        self.atomic(|engine| {
            let mut result = engine.increase_position(account, params, prices)?;
            result.transfers = engine.take_transfers();
            Ok(result)
        })
    }

    /// Shrinks or closes a position and pays the output to `params.receiver`.
    pub fn execute_decrease(
        &mut self,
        account: AccountId,
        params: &OrderParams,
        prices: &OraclePrices,
    ) -> Result<DecreaseResult, EngineError> {
        if !params.order_type.is_decrease() {
            return Err(EngineError::InvalidOrderType(params.order_type));
        }
        self.atomic(|engine| {
            let mut result = engine.decrease_position(account, params, prices)?;
            result.transfers = engine.take_transfers();
            Ok(result)
        })
    }

    // transfers stay queued on the engine; the caller takes them
    pub(super) fn increase_position(
        &mut self,
        account: AccountId,
        params: &OrderParams,
        oracle: &OraclePrices,
    ) -> Result<IncreaseResult, EngineError> {
        let market = self.market_cloned(params.market)?;
        let prices = self.market_prices(&market, oracle)?;
        self.accrue(&market, &prices)?;

        if params.size_delta_usd.is_zero() {
            return Err(EngineError::InvalidSizeDelta);
        }

        let (collateral_token, collateral_delta_amount) = self.collect_collateral(&market, params, oracle)?;
        let key = PositionKey::new(account, market.id, collateral_token, params.side);
        let side = params.side;
        let now = self.current_time;
        let mut position = self
            .positions
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Position::new(key, now));
        if position.is_empty() && collateral_delta_amount.is_zero() {
            return Err(EngineError::InsufficientCollateral);
        }

        let size_delta_usd = params.size_delta_usd;
        let impact = pricing::position_impact_usd(&self.store, &market, side, SignedU256::positive(size_delta_usd))?;
        let impact = pricing::cap_position_impact_usd(&self.store, &market, &prices.index, impact)?;
        let execution_price = pricing::execution_price(&prices.index, size_delta_usd, impact, side, true)?;
        if !pricing::is_acceptable_price(execution_price, params.acceptable_price, side, true) {
            return Err(EngineError::OrderNotFulfillableDueToPriceImpact {
                price: execution_price,
                acceptable: params.acceptable_price,
            });
        }
        let size_delta_in_tokens = fixed::usd_to_token_amount(size_delta_usd, execution_price)?;

        let collateral_price = prices.for_token(&market, collateral_token)?;
        let fees = self.position_fees_for(&market, &position, collateral_price.min, size_delta_usd)?;

        let next_collateral = fixed::add(position.collateral_amount, collateral_delta_amount)?;
        let next_collateral = fixed::sub(next_collateral, fees.total_cost_amount).map_err(|e| match e {
            MathError::Underflow => EngineError::InsufficientCollateral,
            other => EngineError::Math(other),
        })?;

        self.route_position_fees(&market, &key, &fees)?;
        self.store.apply_delta_to_collateral_sum(
            market.id,
            collateral_token,
            side,
            SignedU256::diff(next_collateral, position.collateral_amount),
        )?;
        self.store
            .apply_delta_to_position_impact_pool_amount(market.id, pricing::position_impact_amount(impact, &prices.index)?.neg())?;

        position.size_in_usd = fixed::add(position.size_in_usd, size_delta_usd)?;
        position.size_in_tokens = fixed::add(position.size_in_tokens, size_delta_in_tokens)?;
        position.collateral_amount = next_collateral;
        position.borrowing_factor = self.store.cumulative_borrowing_factor(market.id, side);
        position.long_token_funding_amount_per_size = fees.funding.latest_long_token_funding_amount_per_size;
        position.short_token_funding_amount_per_size = fees.funding.latest_short_token_funding_amount_per_size;
        position.increased_at = now;

        self.store
            .apply_delta_to_open_interest(market.id, collateral_token, side, SignedU256::positive(size_delta_usd))?;
        self.store.apply_delta_to_open_interest_in_tokens(
            market.id,
            collateral_token,
            side,
            SignedU256::positive(size_delta_in_tokens),
        )?;
        market::validate_reserve(&self.store, &market, &prices, side)?;

        if position.size_in_usd < market.params.min_position_size_usd {
            return Err(EngineError::MinPositionSize {
                size: position.size_in_usd,
                min: market.params.min_position_size_usd,
            });
        }
        if self.health_of(&market, &prices, &position)?.is_liquidatable {
            return Err(EngineError::UnhealthyPosition);
        }

        debug!(position = %key, size = %position.size_in_usd, %execution_price, "position increased");
        self.emit_event(EventPayload::PositionIncrease(PositionIncreaseEvent {
            key,
            size_in_usd: position.size_in_usd,
            size_in_tokens: position.size_in_tokens,
            collateral_amount: position.collateral_amount,
            size_delta_usd,
            size_delta_in_tokens,
            execution_price,
            price_impact_usd: impact,
            total_cost_amount: fees.total_cost_amount,
        }));
        self.positions.insert(key, position);

        Ok(IncreaseResult {
            key,
            collateral_token,
            collateral_delta_amount,
            size_delta_usd,
            size_delta_in_tokens,
            execution_price,
            price_impact_usd: impact,
            fees,
            transfers: Vec::new(),
        })
    }

    pub(super) fn decrease_position(
        &mut self,
        account: AccountId,
        params: &OrderParams,
        oracle: &OraclePrices,
    ) -> Result<DecreaseResult, EngineError> {
        let market = self.market_cloned(params.market)?;
        let prices = self.market_prices(&market, oracle)?;
        self.accrue(&market, &prices)?;

        let key = PositionKey::new(account, market.id, params.initial_collateral_token, params.side);
        let position = match self.positions.get(&key) {
            Some(position) if !position.is_empty() => position.clone(),
            _ => return Err(EngineError::EmptyPosition),
        };
        let side = position.side();

        let mut size_delta_usd = params.size_delta_usd;
        let mut size_clamped = false;
        if size_delta_usd > position.size_in_usd {
            if params.order_type.is_market() {
                return Err(EngineError::InvalidOrderSize);
            }
            size_delta_usd = position.size_in_usd;
            size_clamped = true;
        }

        let mut plan = self.plan_decrease(&market, &prices, &position, size_delta_usd)?;
        if plan.settlement.is_insolvent() && plan.size_delta_usd < position.size_in_usd {
            // a position that cannot cover its costs is closed in full
            plan = self.plan_decrease(&market, &prices, &position, position.size_in_usd)?;
        }
        let is_liquidation = params.order_type == OrderType::Liquidation;
        if !is_liquidation
            && !pricing::is_acceptable_price(plan.execution_price, params.acceptable_price, side, false)
        {
            return Err(EngineError::OrderNotFulfillableDueToPriceImpact {
                price: plan.execution_price,
                acceptable: params.acceptable_price,
            });
        }

        let closes = plan.size_delta_usd == position.size_in_usd;
        let settlement = plan.settlement;
        let mut output_amount = settlement.output_amount;
        let mut next = position.clone();
        next.size_in_usd = fixed::sub(position.size_in_usd, plan.size_delta_usd)?;
        next.size_in_tokens = fixed::sub(position.size_in_tokens, plan.size_delta_in_tokens)?;
        next.collateral_amount = settlement.next_collateral_amount;
        next.borrowing_factor = self.store.cumulative_borrowing_factor(market.id, side);
        next.long_token_funding_amount_per_size = plan.fees.funding.latest_long_token_funding_amount_per_size;
        next.short_token_funding_amount_per_size = plan.fees.funding.latest_short_token_funding_amount_per_size;
        next.decreased_at = self.current_time;

        if closes {
            output_amount = fixed::add(output_amount, next.collateral_amount)?;
            next.collateral_amount = U256::zero();
        } else if !params.initial_collateral_delta_amount.is_zero() {
            let withdrawal = params.initial_collateral_delta_amount.min(next.collateral_amount);
            let mut candidate = next.clone();
            candidate.collateral_amount = fixed::sub(candidate.collateral_amount, withdrawal)?;
            // a withdrawal that would leave the position liquidatable is skipped
            if !self.health_of(&market, &prices, &candidate)?.is_liquidatable {
                next = candidate;
                output_amount = fixed::add(output_amount, withdrawal)?;
            }
        }

        let token = key.collateral_token;
        if settlement.is_insolvent() {
            // everything the position held goes to the pool, unpaid funding included; the pool
            // still owes the position its funding credits
            self.credit_claimable_funding(&market, &key, &plan.fees)?;
            self.store
                .apply_delta_to_pool_amount(market.id, token, SignedU256::positive(position.collateral_amount))?;
            warn!(position = %key, shortfall = %settlement.shortfall_amount, "position closed insolvent");
        } else {
            self.route_position_fees(&market, &key, &plan.fees)?;
            if !settlement.profit_amount.is_zero() {
                let available = self.store.pool_amount(market.id, token);
                if available < settlement.profit_amount {
                    return Err(EngineError::InsufficientPoolAmount {
                        available,
                        required: settlement.profit_amount,
                    });
                }
                self.store
                    .apply_delta_to_pool_amount(market.id, token, SignedU256::negative(settlement.profit_amount))?;
            }
            self.store
                .apply_delta_to_pool_amount(market.id, token, SignedU256::positive(settlement.loss_amount))?;
        }
        self.store.apply_delta_to_collateral_sum(
            market.id,
            token,
            side,
            SignedU256::diff(next.collateral_amount, position.collateral_amount),
        )?;
        self.store.apply_delta_to_position_impact_pool_amount(
            market.id,
            pricing::position_impact_amount(plan.price_impact_usd, &prices.index)?.neg(),
        )?;

        self.store
            .apply_delta_to_open_interest(market.id, token, side, SignedU256::negative(plan.size_delta_usd))?;
        // open interest in tokens grows on a decrease as well
        self.store.apply_delta_to_open_interest_in_tokens(
            market.id,
            token,
            side,
            SignedU256::positive(plan.size_delta_in_tokens),
        )?;

        let position_closed = next.is_empty();
        if position_closed {
            self.positions.remove(&key);
        } else {
            self.positions.insert(key, next.clone());
        }

        let (output_token, paid_amount) = self.pay_out(&market, params, token, output_amount, oracle)?;

        debug!(
            position = %key,
            size_delta = %plan.size_delta_usd,
            pnl = %plan.realized_pnl_usd,
            output = %paid_amount,
            "position decreased"
        );
        self.emit_event(EventPayload::PositionDecrease(PositionDecreaseEvent {
            key,
            size_in_usd: next.size_in_usd,
            size_in_tokens: next.size_in_tokens,
            collateral_amount: next.collateral_amount,
            size_delta_usd: plan.size_delta_usd,
            size_delta_in_tokens: plan.size_delta_in_tokens,
            execution_price: plan.execution_price,
            price_impact_usd: plan.price_impact_usd,
            realized_pnl_usd: plan.realized_pnl_usd,
            output_amount: paid_amount,
            total_cost_amount: plan.fees.total_cost_amount,
        }));
        if settlement.is_insolvent() {
            self.emit_event(EventPayload::BadDebt(BadDebtEvent {
                key,
                token,
                shortfall_amount: settlement.shortfall_amount,
            }));
        }

        Ok(DecreaseResult {
            key,
            size_delta_usd: plan.size_delta_usd,
            size_delta_in_tokens: plan.size_delta_in_tokens,
            execution_price: plan.execution_price,
            price_impact_usd: plan.price_impact_usd,
            realized_pnl_usd: plan.realized_pnl_usd,
            fees: plan.fees,
            output_token,
            output_amount: paid_amount,
            bad_debt_amount: settlement.shortfall_amount,
            position_closed,
            size_clamped,
            transfers: Vec::new(),
        })
    }

    /// Health of `position` at current prices, counting what a full close would cost now.
    pub(super) fn health_of(
        &self,
        market: &Market,
        prices: &MarketPrices,
        position: &Position,
    ) -> Result<PositionHealth, EngineError> {
        let collateral_price = prices.for_token(market, position.key.collateral_token)?;
        let close_fees = self.position_fees_for(market, position, collateral_price.min, position.size_in_usd)?;
        Ok(liquidation::position_health(
            position,
            &market.params,
            &prices.index,
            &collateral_price,
            close_fees.total_cost_amount,
        )?)
    }

    /// Fees `position` pays on a change of `size_delta_usd`, including pending borrowing and funding.
    fn position_fees_for(
        &self,
        market: &Market,
        position: &Position,
        collateral_price_min: U256,
        size_delta_usd: U256,
    ) -> Result<PositionFees, EngineError> {
        let funding = funding::position_funding_fees(&self.store, market, position)?;
        let cumulative = self.store.cumulative_borrowing_factor(market.id, position.side());
        let borrowing = funding::borrowing_fee_amount(position, cumulative, collateral_price_min)?;
        Ok(fees::position_fees(
            &market.params,
            collateral_price_min,
            size_delta_usd,
            self.referrals.lookup(position.key.account),
            borrowing,
            funding,
        )?)
    }

    fn plan_decrease(
        &self,
        market: &Market,
        prices: &MarketPrices,
        position: &Position,
        size_delta_usd: U256,
    ) -> Result<DecreasePlan, EngineError> {
        let side = position.side();
        let impact = pricing::position_impact_usd(&self.store, market, side, SignedU256::negative(size_delta_usd))?;
        let impact = pricing::cap_position_impact_usd(&self.store, market, &prices.index, impact)?;
        let execution_price = pricing::execution_price(&prices.index, size_delta_usd, impact, side, false)?;
        let size_delta_in_tokens = position.size_delta_in_tokens(size_delta_usd)?;
        let realized_pnl_usd = position.realized_pnl(execution_price, size_delta_in_tokens)?;

        let collateral_price = prices.for_token(market, position.key.collateral_token)?;
        let fees = self.position_fees_for(market, position, collateral_price.min, size_delta_usd)?;
        let settlement = settle_collateral(position.collateral_amount, realized_pnl_usd, &collateral_price, &fees)?;

        Ok(DecreasePlan {
            size_delta_usd,
            size_delta_in_tokens,
            price_impact_usd: impact,
            execution_price,
            realized_pnl_usd,
            fees,
            settlement,
        })
    }

    /// Moves the incoming collateral into the position's market, swapping it first when the
    /// order carries a swap path. returns the collateral token and amount that arrived.
    fn collect_collateral(
        &mut self,
        market: &Market,
        params: &OrderParams,
        oracle: &OraclePrices,
    ) -> Result<(TokenId, U256), EngineError> {
        let amount = params.initial_collateral_delta_amount;
        if params.swap_path.is_empty() || amount.is_zero() {
            market.validate_collateral_token(params.initial_collateral_token)?;
            self.transfer(
                params.initial_collateral_token,
                Holder::OrderVault,
                Holder::Market(market.id),
                amount,
                false,
            )?;
            return Ok((params.initial_collateral_token, amount));
        }
        let swapped = self.swap_along(
            params.initial_collateral_token,
            amount,
            &params.swap_path,
            oracle,
            Holder::OrderVault,
            Holder::Market(market.id),
            false,
        )?;
        market.validate_collateral_token(swapped.token_out)?;
        Ok((swapped.token_out, swapped.amount_out))
    }

    /// Sends a decrease's output to the receiver, through the order's swap path if it has one.
    fn pay_out(
        &mut self,
        market: &Market,
        params: &OrderParams,
        token: TokenId,
        amount: U256,
        oracle: &OraclePrices,
    ) -> Result<(TokenId, U256), EngineError> {
        let receiver = Holder::Account(params.receiver);
        if params.swap_path.is_empty() || amount.is_zero() {
            if amount < params.min_output_amount {
                return Err(EngineError::InsufficientOutputAmount {
                    output: amount,
                    min: params.min_output_amount,
                });
            }
            self.transfer(token, Holder::Market(market.id), receiver, amount, params.should_unwrap_native_token)?;
            return Ok((token, amount));
        }
        let swapped = self.swap_along(
            token,
            amount,
            &params.swap_path,
            oracle,
            Holder::Market(market.id),
            receiver,
            params.should_unwrap_native_token,
        )?;
        if swapped.amount_out < params.min_output_amount {
            return Err(EngineError::InsufficientSwapOutputAmount {
                output: swapped.amount_out,
                min: params.min_output_amount,
            });
        }
        Ok((swapped.token_out, swapped.amount_out))
    }

    /// Books a position's fees: receiver share out of the vault, pool share, borrowing and paid
    /// funding into the pool, affiliate reward into its pool, funding credits to the owner.
    fn route_position_fees(&mut self, market: &Market, key: &PositionKey, fees: &PositionFees) -> Result<(), EngineError> {
        let token = key.collateral_token;
        self.transfer(token, Holder::Market(market.id), Holder::FeeReceiver, fees.fee_receiver_amount, false)?;
        let to_pool = fixed::add(fees.pool_amount()?, fees.funding.funding_fee_amount)?;
        self.store
            .apply_delta_to_pool_amount(market.id, token, SignedU256::positive(to_pool))?;
        if let Some(affiliate) = fees.referral.affiliate {
            self.store
                .increment_affiliate_reward(market.id, token, affiliate, fees.referral.affiliate_reward_amount)?;
        }
        self.credit_claimable_funding(market, key, fees)
    }

    fn credit_claimable_funding(&mut self, market: &Market, key: &PositionKey, fees: &PositionFees) -> Result<(), EngineError> {
        self.store.increment_claimable_funding_amount(
            market.id,
            market.long_token,
            key.account,
            fees.funding.claimable_long_token_amount,
        )?;
        if market.short_token != market.long_token {
            self.store.increment_claimable_funding_amount(
                market.id,
                market.short_token,
                key.account,
                fees.funding.claimable_short_token_amount,
            )?;
        }
        Ok(())
    }
}

/// Splits a decrease between receiver, pool and remaining collateral. profit is paid at the
/// max collateral price and loss charged at the min; costs come out of the profit first.
fn settle_collateral(
    collateral_amount: U256,
    realized_pnl_usd: SignedU256,
    collateral_price: &PriceProps,
    fees: &PositionFees,
) -> Result<DecreaseSettlement, MathError> {
    let mut settlement = DecreaseSettlement::default();
    if realized_pnl_usd.is_positive() {
        settlement.profit_amount = fixed::usd_to_token_amount(realized_pnl_usd.abs(), collateral_price.max)?;
    } else if realized_pnl_usd.is_negative() {
        settlement.loss_amount = fixed::usd_to_token_amount(realized_pnl_usd.abs(), collateral_price.min)?;
    }

    let available = fixed::add(collateral_amount, settlement.profit_amount)?;
    let required = fixed::add(settlement.loss_amount, fees.total_cost_amount)?;
    if required > available {
        settlement.shortfall_amount = fixed::sub(required, available)?;
        return Ok(settlement);
    }

    let from_output = fees.total_cost_amount.min(settlement.profit_amount);
    settlement.output_amount = fixed::sub(settlement.profit_amount, from_output)?;
    let from_collateral = fixed::add(settlement.loss_amount, fixed::sub(fees.total_cost_amount, from_output)?)?;
    settlement.next_collateral_amount = fixed::sub(collateral_amount, from_collateral)?;
    Ok(settlement)
}
