//! Order types and the pending order store.
//!
//! An order is a request held in escrow until a keeper executes it against oracle prices.
//! Market orders execute at whatever price the keeper brings, bounded by the acceptable price.
//! Limit and stop orders also wait for their trigger price.

use crate::callback::CallbackId;
use crate::oracle::PriceProps;
use crate::types::{AccountId, MarketId, OrderId, Side, Timestamp, TokenId};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Order kind. the discriminants are the persisted values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderType {
    /// Swap along the swap path at current prices.
    MarketSwap = 0,
    /// Swap once the output would reach the min output amount.
    LimitSwap = 1,
    MarketIncrease = 2,
    /// Increase once the index price crosses the trigger in the trader's favour.
    LimitIncrease = 3,
    MarketDecrease = 4,
    /// Take profit.
    LimitDecrease = 5,
    StopLossDecrease = 6,
    /// Keeper-initiated close of an undercollateralized position. never stored.
    Liquidation = 7,
}

impl OrderType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::MarketSwap,
            1 => Self::LimitSwap,
            2 => Self::MarketIncrease,
            3 => Self::LimitIncrease,
            4 => Self::MarketDecrease,
            5 => Self::LimitDecrease,
            6 => Self::StopLossDecrease,
            7 => Self::Liquidation,
            _ => return None,
        })
    }

    pub fn is_swap(&self) -> bool {
        matches!(self, Self::MarketSwap | Self::LimitSwap)
    }

    pub fn is_increase(&self) -> bool {
        matches!(self, Self::MarketIncrease | Self::LimitIncrease)
    }

    pub fn is_decrease(&self) -> bool {
        matches!(
            self,
            Self::MarketDecrease | Self::LimitDecrease | Self::StopLossDecrease | Self::Liquidation
        )
    }

    /// Market orders cancel on validation failure, limit orders freeze.
    pub fn is_market(&self) -> bool {
        matches!(
            self,
            Self::MarketSwap | Self::MarketIncrease | Self::MarketDecrease | Self::Liquidation
        )
    }
}

/// What a trader submits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderParams {
    pub order_type: OrderType,
    pub receiver: AccountId,
    pub market: MarketId,
    pub initial_collateral_token: TokenId,
    pub initial_collateral_delta_amount: U256,
    pub size_delta_usd: U256,
    pub acceptable_price: U256,
    pub trigger_price: U256,
    pub swap_path: Vec<MarketId>,
    pub execution_fee: U256,
    pub callback: Option<CallbackId>,
    pub callback_gas_limit: u64,
    pub min_output_amount: U256,
    pub side: Side,
    pub should_unwrap_native_token: bool,
}

impl OrderParams {
    /// Market increase with no price bound and no swap path.
    pub fn market_increase(
        receiver: AccountId,
        market: MarketId,
        collateral_token: TokenId,
        collateral_amount: U256,
        size_delta_usd: U256,
        side: Side,
    ) -> Self {
        Self {
            order_type: OrderType::MarketIncrease,
            receiver,
            market,
            initial_collateral_token: collateral_token,
            initial_collateral_delta_amount: collateral_amount,
            size_delta_usd,
            acceptable_price: if side.is_long() { U256::MAX } else { U256::zero() },
            trigger_price: U256::zero(),
            swap_path: Vec::new(),
            execution_fee: U256::zero(),
            callback: None,
            callback_gas_limit: 0,
            min_output_amount: U256::zero(),
            side,
            should_unwrap_native_token: false,
        }
    }

    /// Market decrease with no price bound.
    pub fn market_decrease(
        receiver: AccountId,
        market: MarketId,
        collateral_token: TokenId,
        size_delta_usd: U256,
        side: Side,
    ) -> Self {
        Self {
            order_type: OrderType::MarketDecrease,
            acceptable_price: if side.is_long() { U256::zero() } else { U256::MAX },
            ..Self::market_increase(receiver, market, collateral_token, U256::zero(), size_delta_usd, side)
        }
    }

    pub fn market_swap(
        receiver: AccountId,
        token_in: TokenId,
        amount_in: U256,
        swap_path: Vec<MarketId>,
        min_output_amount: U256,
    ) -> Self {
        let market = swap_path.first().copied().unwrap_or(MarketId(0));
        Self {
            order_type: OrderType::MarketSwap,
            swap_path,
            min_output_amount,
            ..Self::market_increase(receiver, market, token_in, amount_in, U256::zero(), Side::Long)
        }
    }

    pub fn with_type(mut self, order_type: OrderType) -> Self {
        self.order_type = order_type;
        self
    }

    pub fn with_trigger_price(mut self, trigger_price: U256) -> Self {
        self.trigger_price = trigger_price;
        self
    }

    pub fn with_acceptable_price(mut self, acceptable_price: U256) -> Self {
        self.acceptable_price = acceptable_price;
        self
    }

    pub fn with_swap_path(mut self, swap_path: Vec<MarketId>) -> Self {
        self.swap_path = swap_path;
        self
    }

    pub fn with_execution_fee(mut self, execution_fee: U256) -> Self {
        self.execution_fee = execution_fee;
        self
    }

    pub fn with_callback(mut self, callback: CallbackId, gas_limit: u64) -> Self {
        self.callback = Some(callback);
        self.callback_gas_limit = gas_limit;
        self
    }

    pub fn with_min_output(mut self, min_output_amount: U256) -> Self {
        self.min_output_amount = min_output_amount;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account: AccountId,
    pub params: OrderParams,
    pub is_frozen: bool,
    pub updated_at: Timestamp,
}

impl Order {
    pub fn new(id: OrderId, account: AccountId, params: OrderParams, timestamp: Timestamp) -> Self {
        Self {
            id,
            account,
            params,
            is_frozen: false,
            updated_at: timestamp,
        }
    }

    pub fn order_type(&self) -> OrderType {
        self.params.order_type
    }

    pub fn side(&self) -> Side {
        self.params.side
    }

    /// Whether the index price has crossed this order's trigger. market orders always pass.
    pub fn is_triggered(&self, index_price: &PriceProps) -> bool {
        let trigger = self.params.trigger_price;
        let long = self.params.side.is_long();
        match self.params.order_type {
            OrderType::LimitIncrease => {
                if long {
                    index_price.max <= trigger
                } else {
                    index_price.min >= trigger
                }
            }
            OrderType::LimitDecrease => {
                if long {
                    index_price.min >= trigger
                } else {
                    index_price.max <= trigger
                }
            }
            OrderType::StopLossDecrease => {
                if long {
                    index_price.min <= trigger
                } else {
                    index_price.max >= trigger
                }
            }
            _ => true,
        }
    }
}

/// Fields a trader may change on a pending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub size_delta_usd: U256,
    pub acceptable_price: U256,
    pub trigger_price: U256,
    pub min_output_amount: U256,
}

/// Pending orders by id.
#[derive(Debug, Clone, Default)]
pub struct OrderStore {
    orders: BTreeMap<OrderId, Order>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, order: Order) {
        self.orders.insert(order.id, order);
    }

    pub fn remove(&mut self, order_id: OrderId) -> Option<Order> {
        self.orders.remove(&order_id)
    }

    pub fn get(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    pub fn get_mut(&mut self, order_id: OrderId) -> Option<&mut Order> {
        self.orders.get_mut(&order_id)
    }

    pub fn for_account(&self, account: AccountId) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(move |o| o.account == account)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::{float, token_price};

    fn limit(order_type: OrderType, side: Side, trigger_usd: u64) -> Order {
        let params = OrderParams::market_increase(AccountId(1), MarketId(1), TokenId(1), U256::one(), float(1), side)
            .with_type(order_type)
            .with_trigger_price(token_price(trigger_usd, 18));
        Order::new(OrderId(1), AccountId(1), params, Timestamp::from_millis(0))
    }

    fn at(usd: u64) -> PriceProps {
        PriceProps::single(token_price(usd, 18))
    }

    #[test]
    fn type_round_trip_through_u8() {
        for value in 0u8..8 {
            let order_type = OrderType::from_u8(value).unwrap();
            assert_eq!(order_type as u8, value);
        }
        assert!(OrderType::from_u8(8).is_none());
    }

    #[test]
    fn classification() {
        assert!(OrderType::LimitSwap.is_swap());
        assert!(!OrderType::LimitSwap.is_market());
        assert!(OrderType::Liquidation.is_decrease());
        assert!(OrderType::Liquidation.is_market());
        assert!(OrderType::LimitIncrease.is_increase());
    }

    #[test]
    fn limit_increase_triggers() {
        let long = limit(OrderType::LimitIncrease, Side::Long, 4800);
        assert!(!long.is_triggered(&at(5000)));
        assert!(long.is_triggered(&at(4800)));
        let short = limit(OrderType::LimitIncrease, Side::Short, 5200);
        assert!(!short.is_triggered(&at(5000)));
        assert!(short.is_triggered(&at(5300)));
    }

    #[test]
    fn take_profit_and_stop_loss_trigger() {
        let take_profit = limit(OrderType::LimitDecrease, Side::Long, 6000);
        assert!(!take_profit.is_triggered(&at(5999)));
        assert!(take_profit.is_triggered(&at(6000)));

        let stop = limit(OrderType::StopLossDecrease, Side::Long, 4000);
        assert!(!stop.is_triggered(&at(4500)));
        assert!(stop.is_triggered(&at(3900)));

        let short_stop = limit(OrderType::StopLossDecrease, Side::Short, 6000);
        assert!(short_stop.is_triggered(&at(6100)));
    }

    #[test]
    fn market_orders_always_trigger() {
        let order = limit(OrderType::MarketIncrease, Side::Long, 1);
        assert!(order.is_triggered(&at(5000)));
    }

    #[test]
    fn store_filters_by_account() {
        let mut store = OrderStore::new();
        store.insert(limit(OrderType::LimitIncrease, Side::Long, 1));
        let mut other = limit(OrderType::LimitIncrease, Side::Long, 1);
        other.id = OrderId(2);
        other.account = AccountId(2);
        store.insert(other);
        assert_eq!(store.for_account(AccountId(2)).count(), 1);
        assert!(store.remove(OrderId(1)).is_some());
        assert_eq!(store.len(), 1);
    }
}
