// 12.0: every settlement produces events. used for audit trails, indexers and debugging a
// failed execution. EventPayload lists them all; amounts are raw token units, usd values floats.

use crate::fixed::SignedU256;
use crate::order::OrderType;
use crate::position::PositionKey;
use crate::types::{AccountId, MarketId, OrderId, Side, Timestamp, TokenId};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Order lifecycle
    OrderCreated(OrderCreatedEvent),
    OrderUpdated(OrderUpdatedEvent),
    OrderExecuted(OrderExecutedEvent),
    OrderCancelled(OrderReasonEvent),
    OrderFrozen(OrderReasonEvent),

    // Positions
    PositionIncrease(PositionIncreaseEvent),
    PositionDecrease(PositionDecreaseEvent),
    PositionLiquidated(PositionLiquidatedEvent),
    BadDebt(BadDebtEvent),

    // Swaps and liquidity
    SwapExecuted(SwapExecutedEvent),
    DepositExecuted(DepositExecutedEvent),
    DepositCancelled(LiquidityCancelledEvent),
    WithdrawalExecuted(WithdrawalExecutedEvent),
    WithdrawalCancelled(LiquidityCancelledEvent),

    // Market state
    AdlStateUpdated(AdlStateUpdatedEvent),
    FundingUpdated(FundingUpdatedEvent),
    BorrowingUpdated(BorrowingUpdatedEvent),

    // Claims
    FundingClaimed(ClaimEvent),
    AffiliateRewardClaimed(ClaimEvent),
}

impl EventPayload {
    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::OrderCreated(_) => "OrderCreated",
            EventPayload::OrderUpdated(_) => "OrderUpdated",
            EventPayload::OrderExecuted(_) => "OrderExecuted",
            EventPayload::OrderCancelled(_) => "OrderCancelled",
            EventPayload::OrderFrozen(_) => "OrderFrozen",
            EventPayload::PositionIncrease(_) => "PositionIncrease",
            EventPayload::PositionDecrease(_) => "PositionDecrease",
            EventPayload::PositionLiquidated(_) => "PositionLiquidated",
            EventPayload::BadDebt(_) => "BadDebt",
            EventPayload::SwapExecuted(_) => "SwapExecuted",
            EventPayload::DepositExecuted(_) => "DepositExecuted",
            EventPayload::DepositCancelled(_) => "DepositCancelled",
            EventPayload::WithdrawalExecuted(_) => "WithdrawalExecuted",
            EventPayload::WithdrawalCancelled(_) => "WithdrawalCancelled",
            EventPayload::AdlStateUpdated(_) => "AdlStateUpdated",
            EventPayload::FundingUpdated(_) => "FundingUpdated",
            EventPayload::BorrowingUpdated(_) => "BorrowingUpdated",
            EventPayload::FundingClaimed(_) => "FundingClaimed",
            EventPayload::AffiliateRewardClaimed(_) => "AffiliateRewardClaimed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order_id: OrderId,
    pub account: AccountId,
    pub order_type: OrderType,
    pub market: MarketId,
    pub size_delta_usd: U256,
    pub initial_collateral_delta_amount: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderUpdatedEvent {
    pub order_id: OrderId,
    pub size_delta_usd: U256,
    pub acceptable_price: U256,
    pub trigger_price: U256,
    pub min_output_amount: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderExecutedEvent {
    pub order_id: OrderId,
    pub order_type: OrderType,
    pub keeper: AccountId,
    // an oversized limit decrease leaves the order in place
    pub order_retained: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReasonEvent {
    pub order_id: OrderId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionIncreaseEvent {
    pub key: PositionKey,
    pub size_in_usd: U256,
    pub size_in_tokens: U256,
    pub collateral_amount: U256,
    pub size_delta_usd: U256,
    pub size_delta_in_tokens: U256,
    pub execution_price: U256,
    pub price_impact_usd: SignedU256,
    pub total_cost_amount: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionDecreaseEvent {
    pub key: PositionKey,
    pub size_in_usd: U256,
    pub size_in_tokens: U256,
    pub collateral_amount: U256,
    pub size_delta_usd: U256,
    pub size_delta_in_tokens: U256,
    pub execution_price: U256,
    pub price_impact_usd: SignedU256,
    pub realized_pnl_usd: SignedU256,
    pub output_amount: U256,
    pub total_cost_amount: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLiquidatedEvent {
    pub key: PositionKey,
    pub keeper: AccountId,
    pub remaining_collateral_usd: SignedU256,
    pub min_collateral_usd: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadDebtEvent {
    pub key: PositionKey,
    pub token: TokenId,
    // collateral token units the pool absorbs beyond the seized collateral
    pub shortfall_amount: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapExecutedEvent {
    pub market: MarketId,
    pub token_in: TokenId,
    pub token_out: TokenId,
    pub amount_in: U256,
    pub amount_out: U256,
    pub price_impact_usd: SignedU256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositExecutedEvent {
    pub market: MarketId,
    pub account: AccountId,
    pub long_token_amount: U256,
    pub short_token_amount: U256,
    pub market_tokens_minted: U256,
    pub price_impact_usd: SignedU256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalExecutedEvent {
    pub market: MarketId,
    pub account: AccountId,
    pub market_tokens_burned: U256,
    pub long_token_amount: U256,
    pub short_token_amount: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidityCancelledEvent {
    pub market: MarketId,
    pub account: AccountId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdlStateUpdatedEvent {
    pub market: MarketId,
    pub side: Side,
    pub pnl_to_pool_factor: SignedU256,
    pub max_pnl_factor: U256,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingUpdatedEvent {
    pub market: MarketId,
    pub paying_side: Side,
    pub funding_usd: U256,
    pub duration_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorrowingUpdatedEvent {
    pub market: MarketId,
    pub side: Side,
    pub cumulative_borrowing_factor: U256,
    pub duration_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimEvent {
    pub market: MarketId,
    pub token: TokenId,
    pub account: AccountId,
    pub amount: U256,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization() {
        let event = Event::new(
            EventId(4),
            Timestamp::from_millis(1_000),
            EventPayload::OrderFrozen(OrderReasonEvent {
                order_id: OrderId(2),
                reason: "Invalid adl".to_string(),
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, EventId(4));
        assert_eq!(back.payload.kind(), "OrderFrozen");
    }
}
