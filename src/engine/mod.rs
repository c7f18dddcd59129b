// 20.0: settlement engine. owns market state, positions and orders, and settles every
// action atomically against a checkpoint. single-writer, deterministic, no I/O.

mod config;
mod core;
mod funding;
mod liquidations;
mod liquidity;
mod orders;
mod positions;
mod results;
mod swaps;

pub use config::EngineConfig;
pub use core::Engine;
pub use results::{
    AdlResult, AdlStateResult, ClaimResult, DecreaseResult, DepositOutcome, EngineError, ExecutionResult,
    IncreaseResult, LiquidationResult, OrderCreation, OrderOutcome, SwapHopResult, SwapResult,
    WithdrawalOutcome,
};
