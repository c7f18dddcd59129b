// 20.0.2: result types and errors for engine operations.

use crate::config::ConfigError;
use crate::fees::PositionFees;
use crate::fixed::{MathError, SignedU256};
use crate::liquidation::PositionHealth;
use crate::market::MarketError;
use crate::position::PositionKey;
use crate::roles::Role;
use crate::transfer::Transfer;
use crate::types::{AccountId, MarketId, OrderId, Side, TokenId};
use primitive_types::U256;

#[derive(Debug, Clone)]
pub struct IncreaseResult {
    pub key: PositionKey,
    pub collateral_token: TokenId,
    pub collateral_delta_amount: U256,
    pub size_delta_usd: U256,
    pub size_delta_in_tokens: U256,
    pub execution_price: U256,
    pub price_impact_usd: SignedU256,
    pub fees: PositionFees,
    pub transfers: Vec<Transfer>,
}

#[derive(Debug, Clone)]
pub struct DecreaseResult {
    pub key: PositionKey,
    pub size_delta_usd: U256,
    pub size_delta_in_tokens: U256,
    pub execution_price: U256,
    pub price_impact_usd: SignedU256,
    pub realized_pnl_usd: SignedU256,
    pub fees: PositionFees,
    pub output_token: TokenId,
    // tokens paid to the receiver after any swap
    pub output_amount: U256,
    // collateral units the pool absorbed beyond the position's collateral
    pub bad_debt_amount: U256,
    pub position_closed: bool,
    // requested size exceeded the position and was clamped
    pub size_clamped: bool,
    pub transfers: Vec<Transfer>,
}

#[derive(Debug, Clone)]
pub struct SwapHopResult {
    pub market: MarketId,
    pub token_in: TokenId,
    pub token_out: TokenId,
    pub amount_in: U256,
    pub amount_out: U256,
    pub price_impact_usd: SignedU256,
}

#[derive(Debug, Clone)]
pub struct SwapResult {
    pub token_out: TokenId,
    pub amount_out: U256,
    pub hops: Vec<SwapHopResult>,
    pub transfers: Vec<Transfer>,
}

#[derive(Debug, Clone)]
pub struct LiquidationResult {
    pub health: PositionHealth,
    pub decrease: DecreaseResult,
}

#[derive(Debug, Clone)]
pub struct AdlStateResult {
    pub market: MarketId,
    pub side: Side,
    pub pnl_to_pool_factor: SignedU256,
    pub max_pnl_factor: U256,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct AdlResult {
    pub pnl_to_pool_factor_before: SignedU256,
    pub pnl_to_pool_factor_after: SignedU256,
    pub decrease: DecreaseResult,
}

#[derive(Debug, Clone)]
pub enum ExecutionResult {
    Increase(IncreaseResult),
    Decrease(DecreaseResult),
    Swap(SwapResult),
}

/// A stored order and the escrow transfers that funded it.
#[derive(Debug, Clone)]
pub struct OrderCreation {
    pub order_id: OrderId,
    pub transfers: Vec<Transfer>,
}

#[derive(Debug, Clone)]
pub enum OrderOutcome {
    Executed {
        order_id: OrderId,
        result: ExecutionResult,
        // oversized limit decreases stay in the store with the clamped size
        order_retained: bool,
        transfers: Vec<Transfer>,
    },
    Cancelled {
        order_id: OrderId,
        reason: String,
        transfers: Vec<Transfer>,
    },
    Frozen {
        order_id: OrderId,
        reason: String,
        transfers: Vec<Transfer>,
    },
}

impl OrderOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, OrderOutcome::Executed { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            OrderOutcome::Executed { .. } => None,
            OrderOutcome::Cancelled { reason, .. } | OrderOutcome::Frozen { reason, .. } => Some(reason),
        }
    }

    pub fn transfers(&self) -> &[Transfer] {
        match self {
            OrderOutcome::Executed { transfers, .. }
            | OrderOutcome::Cancelled { transfers, .. }
            | OrderOutcome::Frozen { transfers, .. } => transfers,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClaimResult {
    pub amount: U256,
    pub transfers: Vec<Transfer>,
}

#[derive(Debug, Clone)]
pub enum DepositOutcome {
    Executed {
        market_tokens_minted: U256,
        price_impact_usd: SignedU256,
        transfers: Vec<Transfer>,
    },
    Cancelled {
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub enum WithdrawalOutcome {
    Executed {
        long_token_amount: U256,
        short_token_amount: U256,
        transfers: Vec<Transfer>,
    },
    Cancelled {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("{0} not found")]
    MarketNotFound(MarketId),

    #[error("{0} not found")]
    OrderNotFound(OrderId),

    #[error("EMPTY_POSITION_ERROR")]
    EmptyPosition,

    #[error("FROZEN_ORDER_ERROR")]
    FrozenOrder,

    #[error("DecreasePositionUtils: Invalid Liquidation")]
    InvalidLiquidation,

    #[error("DecreasePositionUtils: Invalid order size")]
    InvalidOrderSize,

    #[error("Adl is not enabled")]
    AdlNotEnabled,

    #[error("Invalid adl")]
    InvalidAdl,

    #[error("Pnl overcorrected")]
    PnlOvercorrected,

    #[error("Invalid size delta")]
    InvalidSizeDelta,

    #[error("Insufficient collateral")]
    InsufficientCollateral,

    #[error("Position would be liquidatable")]
    UnhealthyPosition,

    #[error("Position size {size} below minimum {min}")]
    MinPositionSize { size: U256, min: U256 },

    #[error("Invalid swap market {0}")]
    InvalidSwapMarket(MarketId),

    #[error("Duplicated market in swap path {0}")]
    DuplicatedMarketInSwapPath(MarketId),

    #[error("Insufficient swap output amount: {output} < {min}")]
    InsufficientSwapOutputAmount { output: U256, min: U256 },

    #[error("Insufficient pool amount: {available} < {required}")]
    InsufficientPoolAmount { available: U256, required: U256 },

    #[error("OrderNotFulfillableDueToPriceImpact: price {price}, acceptable {acceptable}")]
    OrderNotFulfillableDueToPriceImpact { price: U256, acceptable: U256 },

    #[error("Trigger price not reached: trigger {trigger}, price {price}")]
    TriggerPriceNotReached { trigger: U256, price: U256 },

    #[error("{account} lacks role {role}")]
    Unauthorized { account: AccountId, role: Role },

    #[error("{0} is not owned by {1}")]
    NotOrderOwner(OrderId, AccountId),

    #[error("{caller} cannot act for {account}")]
    NotAccountOwner { caller: AccountId, account: AccountId },

    #[error("{0} cannot be updated")]
    OrderNotUpdatable(OrderId),

    #[error("Order type {0:?} cannot be created")]
    InvalidOrderType(crate::order::OrderType),

    #[error("Empty swap path")]
    EmptySwapPath,

    #[error("Insufficient market tokens: {balance} < {requested}")]
    InsufficientMarketTokens { balance: U256, requested: U256 },

    #[error("Min market tokens: {minted} < {min}")]
    MinMarketTokens { minted: U256, min: U256 },

    #[error("Insufficient output amount: {output} < {min}")]
    InsufficientOutputAmount { output: U256, min: U256 },

    #[error("Empty deposit")]
    EmptyDeposit,

    #[error("Market error: {0}")]
    Market(#[from] MarketError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Math error: {0}")]
    Math(#[from] MathError),
}

impl EngineError {
    /// Validation failures settle the order (cancel or freeze). everything else is a hard error
    /// that leaves the order untouched.
    pub fn is_validation(&self) -> bool {
        match self {
            EngineError::InvalidOrderSize
            | EngineError::InvalidSizeDelta
            | EngineError::InsufficientCollateral
            | EngineError::UnhealthyPosition
            | EngineError::MinPositionSize { .. }
            | EngineError::InvalidSwapMarket(_)
            | EngineError::DuplicatedMarketInSwapPath(_)
            | EngineError::InsufficientSwapOutputAmount { .. }
            | EngineError::InsufficientPoolAmount { .. }
            | EngineError::OrderNotFulfillableDueToPriceImpact { .. }
            | EngineError::InsufficientMarketTokens { .. }
            | EngineError::MinMarketTokens { .. }
            | EngineError::InsufficientOutputAmount { .. }
            | EngineError::EmptyDeposit => true,
            EngineError::Market(inner) => matches!(
                inner,
                MarketError::InsufficientReserve { .. }
                    | MarketError::InvalidCollateralToken { .. }
                    | MarketError::InvalidSwapToken { .. }
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_strings_are_verbatim() {
        assert_eq!(EngineError::EmptyPosition.to_string(), "EMPTY_POSITION_ERROR");
        assert_eq!(EngineError::FrozenOrder.to_string(), "FROZEN_ORDER_ERROR");
        assert_eq!(
            EngineError::InvalidLiquidation.to_string(),
            "DecreasePositionUtils: Invalid Liquidation"
        );
        assert_eq!(
            EngineError::InvalidOrderSize.to_string(),
            "DecreasePositionUtils: Invalid order size"
        );
        assert_eq!(EngineError::AdlNotEnabled.to_string(), "Adl is not enabled");
        assert_eq!(EngineError::InvalidAdl.to_string(), "Invalid adl");
        assert_eq!(EngineError::PnlOvercorrected.to_string(), "Pnl overcorrected");
    }

    #[test]
    fn classification() {
        assert!(EngineError::InvalidOrderSize.is_validation());
        assert!(EngineError::Market(MarketError::InsufficientReserve {
            reserved: U256::one(),
            max: U256::zero()
        })
        .is_validation());
        assert!(!EngineError::EmptyPosition.is_validation());
        assert!(!EngineError::Math(MathError::Overflow).is_validation());
        assert!(!EngineError::Market(MarketError::MissingPrice(TokenId(1))).is_validation());
    }
}
