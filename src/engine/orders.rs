//! Order store operations: create, update, cancel and keeper execution.
//!
//! Collateral for increase and swap orders, and the execution fee of every order, sit in the
//! order vault until the order settles. Validation failures cancel market orders and freeze
//! limit orders; anything else is returned as an error and leaves the order as it was.

use super::core::Engine;
use super::results::{EngineError, ExecutionResult, OrderCreation, OrderOutcome};
use crate::events::{EventPayload, OrderCreatedEvent, OrderExecutedEvent, OrderReasonEvent, OrderUpdatedEvent};
use crate::oracle::OraclePrices;
use crate::order::{Order, OrderParams, OrderType, OrderUpdate};
use crate::roles::Role;
use crate::transfer::{Holder, Transfer};
use crate::types::{AccountId, OrderId};
use primitive_types::U256;
use tracing::{debug, info, warn};

const USER_CANCEL_REASON: &str = "USER_INITIATED_CANCEL";

impl Engine {
    /// Stores a new order for `account` and escrows its collateral and execution fee.
    pub fn create_order(&mut self, account: AccountId, params: OrderParams) -> Result<OrderCreation, EngineError> {
        let order_type = params.order_type;
        if order_type == OrderType::Liquidation {
            return Err(EngineError::InvalidOrderType(order_type));
        }
        if order_type.is_swap() {
            if params.swap_path.is_empty() {
                return Err(EngineError::EmptySwapPath);
            }
        } else {
            self.market_cloned(params.market)?;
        }

        self.atomic(|engine| {
            let order_id = OrderId(engine.next_order_id);
            engine.next_order_id += 1;

            if escrows_collateral(order_type) {
                engine.transfer(
                    params.initial_collateral_token,
                    Holder::Account(account),
                    Holder::OrderVault,
                    params.initial_collateral_delta_amount,
                    false,
                )?;
            }
            let native_token = engine.config.native_token;
            engine.transfer(native_token, Holder::Account(account), Holder::OrderVault, params.execution_fee, false)?;

            debug!(order = %order_id, %account, ?order_type, "order created");
            engine.emit_event(EventPayload::OrderCreated(OrderCreatedEvent {
                order_id,
                account,
                order_type,
                market: params.market,
                size_delta_usd: params.size_delta_usd,
                initial_collateral_delta_amount: params.initial_collateral_delta_amount,
            }));
            let now = engine.current_time;
            engine.orders.insert(Order::new(order_id, account, params, now));
            Ok(OrderCreation {
                order_id,
                transfers: engine.take_transfers(),
            })
        })
    }

    /// Changes the price and size fields of a pending limit order. an update unfreezes it.
    pub fn update_order(&mut self, account: AccountId, order_id: OrderId, update: OrderUpdate) -> Result<(), EngineError> {
        let now = self.current_time;
        let order = self.orders.get_mut(order_id).ok_or(EngineError::OrderNotFound(order_id))?;
        if order.account != account {
            return Err(EngineError::NotOrderOwner(order_id, account));
        }
        if order.order_type().is_market() {
            return Err(EngineError::OrderNotUpdatable(order_id));
        }
        order.params.size_delta_usd = update.size_delta_usd;
        order.params.acceptable_price = update.acceptable_price;
        order.params.trigger_price = update.trigger_price;
        order.params.min_output_amount = update.min_output_amount;
        order.is_frozen = false;
        order.updated_at = now;

        self.emit_event(EventPayload::OrderUpdated(OrderUpdatedEvent {
            order_id,
            size_delta_usd: update.size_delta_usd,
            acceptable_price: update.acceptable_price,
            trigger_price: update.trigger_price,
            min_output_amount: update.min_output_amount,
        }));
        Ok(())
    }

    /// Removes `account`'s order and refunds its escrow to them.
    pub fn cancel_order(&mut self, account: AccountId, order_id: OrderId) -> Result<Vec<Transfer>, EngineError> {
        let (order, transfers) = self.atomic(|engine| {
            let order = engine.orders.get(order_id).cloned().ok_or(EngineError::OrderNotFound(order_id))?;
            if order.account != account {
                return Err(EngineError::NotOrderOwner(order_id, account));
            }
            engine.orders.remove(order_id);
            engine.release_collateral(&order)?;
            engine.release_execution_fee(&order, Holder::Account(account))?;
            engine.emit_event(EventPayload::OrderCancelled(OrderReasonEvent {
                order_id,
                reason: USER_CANCEL_REASON.to_string(),
            }));
            Ok((order, engine.take_transfers()))
        })?;
        if let Some(receiver) = order.params.callback.and_then(|id| self.callbacks.get_mut(&id)) {
            receiver.after_order_cancellation(&order, USER_CANCEL_REASON);
        }
        Ok(transfers)
    }

    /// Executes `order_id` at `prices` on behalf of `keeper`.
    pub fn execute_order(
        &mut self,
        keeper: AccountId,
        order_id: OrderId,
        prices: &OraclePrices,
    ) -> Result<OrderOutcome, EngineError> {
        let (outcome, order) = self.atomic(|engine| engine.settle_order(keeper, order_id, prices))?;
        self.notify_callback(&order, &outcome);
        Ok(outcome)
    }

    // returns the outcome and the order as it stands once settled
    fn settle_order(
        &mut self,
        keeper: AccountId,
        order_id: OrderId,
        oracle: &OraclePrices,
    ) -> Result<(OrderOutcome, Order), EngineError> {
        let order = self.orders.get(order_id).cloned().ok_or(EngineError::OrderNotFound(order_id))?;
        if order.is_frozen {
            if !self.has_role(keeper, Role::FrozenOrderKeeper) {
                return Err(EngineError::FrozenOrder);
            }
        } else {
            self.require_role(keeper, Role::OrderKeeper)?;
        }

        if !order.order_type().is_swap() {
            let market = self.market_cloned(order.params.market)?;
            let prices = self.market_prices(&market, oracle)?;
            if !order.is_triggered(&prices.index) {
                return Err(EngineError::TriggerPriceNotReached {
                    trigger: order.params.trigger_price,
                    price: prices.index.max,
                });
            }
        }

        let checkpoint = self.checkpoint();
        let attempt = match order.order_type() {
            t if t.is_increase() => self
                .increase_position(order.account, &order.params, oracle)
                .map(ExecutionResult::Increase),
            t if t.is_decrease() => self
                .decrease_position(order.account, &order.params, oracle)
                .map(ExecutionResult::Decrease),
            _ => self.swap(order.account, &order.params, oracle).map(ExecutionResult::Swap),
        };

        match attempt {
            Ok(result) => self.finish_execution(keeper, order, result),
            Err(e) if e.is_validation() => {
                self.restore(checkpoint);
                let reason = e.to_string();
                if order.order_type().is_market() {
                    self.orders.remove(order_id);
                    self.release_collateral(&order)?;
                    self.release_execution_fee(&order, Holder::Account(keeper))?;
                    warn!(order = %order_id, %reason, "order cancelled");
                    self.emit_event(EventPayload::OrderCancelled(OrderReasonEvent {
                        order_id,
                        reason: reason.clone(),
                    }));
                    let transfers = self.take_transfers();
                    Ok((
                        OrderOutcome::Cancelled {
                            order_id,
                            reason,
                            transfers,
                        },
                        order,
                    ))
                } else {
                    self.release_execution_fee(&order, Holder::Account(keeper))?;
                    let mut frozen = order;
                    frozen.is_frozen = true;
                    frozen.params.execution_fee = U256::zero();
                    frozen.updated_at = self.current_time;
                    self.orders.insert(frozen.clone());
                    warn!(order = %order_id, %reason, "order frozen");
                    self.emit_event(EventPayload::OrderFrozen(OrderReasonEvent {
                        order_id,
                        reason: reason.clone(),
                    }));
                    let transfers = self.take_transfers();
                    Ok((
                        OrderOutcome::Frozen {
                            order_id,
                            reason,
                            transfers,
                        },
                        frozen,
                    ))
                }
            }
            Err(e) => Err(e),
        }
    }

    fn finish_execution(
        &mut self,
        keeper: AccountId,
        order: Order,
        result: ExecutionResult,
    ) -> Result<(OrderOutcome, Order), EngineError> {
        let order_id = order.id;
        self.release_execution_fee(&order, Holder::Account(keeper))?;

        let mut settled = order;
        // a clamped limit decrease stays behind with the size it actually closed
        let clamped = match &result {
            ExecutionResult::Decrease(decrease) if decrease.size_clamped && !settled.order_type().is_market() => {
                Some(decrease.size_delta_usd)
            }
            _ => None,
        };
        let order_retained = clamped.is_some();
        match clamped {
            Some(size_delta_usd) => {
                settled.params.size_delta_usd = size_delta_usd;
                settled.params.execution_fee = U256::zero();
                settled.updated_at = self.current_time;
                self.orders.insert(settled.clone());
            }
            None => {
                self.orders.remove(order_id);
            }
        }

        info!(order = %order_id, %keeper, retained = order_retained, "order executed");
        self.emit_event(EventPayload::OrderExecuted(OrderExecutedEvent {
            order_id,
            order_type: settled.order_type(),
            keeper,
            order_retained,
        }));
        let transfers = self.take_transfers();
        Ok((
            OrderOutcome::Executed {
                order_id,
                result,
                order_retained,
                transfers,
            },
            settled,
        ))
    }

    fn release_collateral(&mut self, order: &Order) -> Result<(), EngineError> {
        if !escrows_collateral(order.order_type()) {
            return Ok(());
        }
        self.transfer(
            order.params.initial_collateral_token,
            Holder::OrderVault,
            Holder::Account(order.account),
            order.params.initial_collateral_delta_amount,
            false,
        )
    }

    fn release_execution_fee(&mut self, order: &Order, to: Holder) -> Result<(), EngineError> {
        let native_token = self.config.native_token;
        self.transfer(native_token, Holder::OrderVault, to, order.params.execution_fee, false)
    }

    // runs after every state change of the call has been committed
    fn notify_callback(&mut self, order: &Order, outcome: &OrderOutcome) {
        let Some(callback) = order.params.callback else {
            return;
        };
        let Some(receiver) = self.callbacks.get_mut(&callback) else {
            debug!(order = %order.id, %callback, "callback not registered");
            return;
        };
        match outcome {
            OrderOutcome::Executed { transfers, .. } => receiver.after_order_execution(order, transfers),
            OrderOutcome::Cancelled { reason, .. } => receiver.after_order_cancellation(order, reason),
            OrderOutcome::Frozen { reason, .. } => receiver.after_order_frozen(order, reason),
        }
    }
}

fn escrows_collateral(order_type: OrderType) -> bool {
    order_type.is_increase() || order_type.is_swap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{CallbackCall, RecordingCallback};
    use crate::config::MarketConfig;
    use crate::engine::EngineConfig;
    use crate::fixed::{expand_decimals, float, token_price};
    use crate::liquidity::DepositParams;
    use crate::oracle::PriceProps;
    use crate::position::PositionKey;
    use crate::transfer::total_received;
    use crate::types::{MarketId, Side, TokenId};

    const ADMIN: AccountId = AccountId(100);
    const KEEPER: AccountId = AccountId(50);
    const FROZEN_KEEPER: AccountId = AccountId(51);
    const LP: AccountId = AccountId(1);
    const TRADER: AccountId = AccountId(2);
    const WNT: TokenId = TokenId(1);
    const USDC: TokenId = TokenId(2);

    fn prices(eth: u64) -> OraclePrices {
        OraclePrices::new()
            .with(WNT, PriceProps::single(token_price(eth, 18)))
            .with(USDC, PriceProps::single(token_price(1, 6)))
    }

    fn setup_engine() -> (Engine, MarketId) {
        let mut engine = Engine::new(EngineConfig::default(), ADMIN);
        let market = engine
            .add_market(ADMIN, WNT, WNT, USDC, &MarketConfig::frictionless())
            .unwrap();
        engine.grant_role(ADMIN, KEEPER, Role::OrderKeeper).unwrap();
        engine.grant_role(ADMIN, FROZEN_KEEPER, Role::FrozenOrderKeeper).unwrap();
        engine
            .execute_deposit(
                LP,
                DepositParams::new(market, LP, expand_decimals(100, 18), expand_decimals(500_000, 6)),
                &prices(5000),
            )
            .unwrap();
        (engine, market)
    }

    fn fee() -> U256 {
        expand_decimals(1, 15)
    }

    fn long_increase(market: MarketId) -> OrderParams {
        OrderParams::market_increase(TRADER, market, WNT, expand_decimals(10, 18), float(50_000), Side::Long)
            .with_execution_fee(fee())
    }

    #[test]
    fn create_escrows_collateral_and_fee() {
        let (mut engine, market) = setup_engine();
        let created = engine.create_order(TRADER, long_increase(market)).unwrap();
        assert_eq!(
            total_received(&created.transfers, Holder::OrderVault, WNT),
            expand_decimals(10, 18) + fee()
        );
        assert!(engine.order(created.order_id).is_some());
    }

    #[test]
    fn keeper_executes_market_increase_and_earns_fee() {
        let (mut engine, market) = setup_engine();
        let created = engine.create_order(TRADER, long_increase(market)).unwrap();
        let outcome = engine.execute_order(KEEPER, created.order_id, &prices(5000)).unwrap();

        assert!(outcome.is_executed());
        assert_eq!(total_received(outcome.transfers(), Holder::Account(KEEPER), WNT), fee());
        assert!(engine.order(created.order_id).is_none());
        assert!(engine
            .position(&PositionKey::new(TRADER, market, WNT, Side::Long))
            .is_some());
        assert!(engine.is_solvent().unwrap());
    }

    #[test]
    fn execution_needs_the_order_keeper_role() {
        let (mut engine, market) = setup_engine();
        let created = engine.create_order(TRADER, long_increase(market)).unwrap();
        assert_eq!(
            engine.execute_order(TRADER, created.order_id, &prices(5000)).unwrap_err(),
            EngineError::Unauthorized {
                account: TRADER,
                role: Role::OrderKeeper
            }
        );
    }

    #[test]
    fn market_order_failing_validation_is_cancelled_and_refunded() {
        let (mut engine, market) = setup_engine();
        let params = long_increase(market).with_acceptable_price(token_price(4900, 18));
        let created = engine.create_order(TRADER, params).unwrap();
        let outcome = engine.execute_order(KEEPER, created.order_id, &prices(5000)).unwrap();

        assert!(matches!(outcome, OrderOutcome::Cancelled { .. }));
        assert!(outcome.reason().unwrap().starts_with("OrderNotFulfillableDueToPriceImpact"));
        assert_eq!(total_received(outcome.transfers(), Holder::Account(TRADER), WNT), expand_decimals(10, 18));
        assert_eq!(total_received(outcome.transfers(), Holder::Account(KEEPER), WNT), fee());
        assert!(engine.order(created.order_id).is_none());
    }

    #[test]
    fn limit_increase_waits_for_its_trigger() {
        let (mut engine, market) = setup_engine();
        let params = long_increase(market)
            .with_type(OrderType::LimitIncrease)
            .with_trigger_price(token_price(4500, 18));
        let created = engine.create_order(TRADER, params).unwrap();
        assert!(matches!(
            engine.execute_order(KEEPER, created.order_id, &prices(5000)).unwrap_err(),
            EngineError::TriggerPriceNotReached { .. }
        ));
        assert!(engine.order(created.order_id).is_some());

        let outcome = engine.execute_order(KEEPER, created.order_id, &prices(4500)).unwrap();
        assert!(outcome.is_executed());
    }

    #[test]
    fn frozen_orders_need_the_frozen_keeper_and_refreeze() {
        let (mut engine, market) = setup_engine();
        let params = long_increase(market)
            .with_type(OrderType::LimitIncrease)
            .with_trigger_price(token_price(5000, 18))
            .with_acceptable_price(token_price(4000, 18));
        let created = engine.create_order(TRADER, params).unwrap();

        let first = engine.execute_order(KEEPER, created.order_id, &prices(5000)).unwrap();
        assert!(matches!(first, OrderOutcome::Frozen { .. }));
        assert!(engine.order(created.order_id).unwrap().is_frozen);

        assert_eq!(
            engine.execute_order(KEEPER, created.order_id, &prices(5000)).unwrap_err(),
            EngineError::FrozenOrder
        );
        let again = engine.execute_order(FROZEN_KEEPER, created.order_id, &prices(5000)).unwrap();
        assert!(matches!(again, OrderOutcome::Frozen { .. }));
        let frozen_events = engine
            .events()
            .iter()
            .filter(|e| matches!(e.payload, EventPayload::OrderFrozen(_)))
            .count();
        assert_eq!(frozen_events, 2);
    }

    #[test]
    fn update_unfreezes_and_market_orders_cannot_be_updated() {
        let (mut engine, market) = setup_engine();
        let params = long_increase(market)
            .with_type(OrderType::LimitIncrease)
            .with_trigger_price(token_price(5000, 18))
            .with_acceptable_price(token_price(4000, 18));
        let created = engine.create_order(TRADER, params).unwrap();
        engine.execute_order(KEEPER, created.order_id, &prices(5000)).unwrap();

        let update = OrderUpdate {
            size_delta_usd: float(50_000),
            acceptable_price: token_price(5100, 18),
            trigger_price: token_price(5000, 18),
            min_output_amount: U256::zero(),
        };
        assert_eq!(
            engine.update_order(AccountId(9), created.order_id, update),
            Err(EngineError::NotOrderOwner(created.order_id, AccountId(9)))
        );
        engine.update_order(TRADER, created.order_id, update).unwrap();
        assert!(!engine.order(created.order_id).unwrap().is_frozen);
        assert!(engine.execute_order(KEEPER, created.order_id, &prices(5000)).unwrap().is_executed());

        let market_order = engine.create_order(TRADER, long_increase(market)).unwrap();
        assert_eq!(
            engine.update_order(TRADER, market_order.order_id, update),
            Err(EngineError::OrderNotUpdatable(market_order.order_id))
        );
    }

    #[test]
    fn owner_cancel_refunds_everything() {
        let (mut engine, market) = setup_engine();
        let created = engine.create_order(TRADER, long_increase(market)).unwrap();
        assert_eq!(
            engine.cancel_order(AccountId(9), created.order_id).unwrap_err(),
            EngineError::NotOrderOwner(created.order_id, AccountId(9))
        );
        let refund = engine.cancel_order(TRADER, created.order_id).unwrap();
        assert_eq!(
            total_received(&refund, Holder::Account(TRADER), WNT),
            expand_decimals(10, 18) + fee()
        );
        assert!(engine.order(created.order_id).is_none());
    }

    #[test]
    fn oversized_limit_decrease_is_retained_then_hits_empty_position() {
        let (mut engine, market) = setup_engine();
        let created = engine.create_order(TRADER, long_increase(market)).unwrap();
        engine.execute_order(KEEPER, created.order_id, &prices(5000)).unwrap();

        let params = OrderParams::market_decrease(TRADER, market, WNT, float(80_000), Side::Long)
            .with_type(OrderType::LimitDecrease)
            .with_trigger_price(token_price(5000, 18))
            .with_execution_fee(fee());
        let decrease = engine.create_order(TRADER, params).unwrap();
        let outcome = engine.execute_order(KEEPER, decrease.order_id, &prices(5000)).unwrap();
        let OrderOutcome::Executed { order_retained, .. } = outcome else {
            panic!("decrease not executed");
        };
        assert!(order_retained);
        let stale = engine.order(decrease.order_id).unwrap();
        assert_eq!(stale.params.size_delta_usd, float(50_000));
        assert!(stale.params.execution_fee.is_zero());

        assert_eq!(
            engine.execute_order(KEEPER, decrease.order_id, &prices(5000)).unwrap_err(),
            EngineError::EmptyPosition
        );
        assert!(engine.order(decrease.order_id).is_some());
    }

    #[test]
    fn callbacks_see_the_settled_order() {
        let (mut engine, market) = setup_engine();
        let recorder = RecordingCallback::new();
        let callback = engine.register_callback(Box::new(recorder.clone()));

        let ok = engine
            .create_order(TRADER, long_increase(market).with_callback(callback, 100_000))
            .unwrap();
        engine.execute_order(KEEPER, ok.order_id, &prices(5000)).unwrap();

        let bad = engine
            .create_order(
                TRADER,
                long_increase(market)
                    .with_acceptable_price(token_price(4000, 18))
                    .with_callback(callback, 100_000),
            )
            .unwrap();
        engine.execute_order(KEEPER, bad.order_id, &prices(5000)).unwrap();

        let calls = recorder.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], CallbackCall::Executed { order_id, .. } if order_id == ok.order_id));
        assert!(matches!(calls[1], CallbackCall::Cancelled { order_id, .. } if order_id == bad.order_id));
    }
}
