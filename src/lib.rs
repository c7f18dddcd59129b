// perps-settlement: pool-backed perpetual futures settlement engine.
// liquidity pools take the other side of every trade; the engine settles orders against
// oracle prices and keeps pool accounting exact.
// all computation is deterministic with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: ids, side, timestamps
//   1.5  fixed.rs: 10^30 fixed point math, signed magnitudes
//   2.x  keys.rs: typed market state keys and their byte encoding
//   3.x  store.rs: keyed uint/int/bool store
//   4.x  market.rs: market identity, state accessor, pool value, pnl, reserves
//   5.x  pricing.rs: price impact and execution prices
//   6.x  fees.rs: position and swap fees, referral tiers
//   7.x  config.rs: per-market parameters and presets
//   8.x  funding.rs: borrowing and funding accumulators
//   9.x  oracle.rs: min/max oracle prices per call
//   10.x position.rs: position records
//   11.x order.rs: order types, params, pending order store
//   12.x events.rs: settlement events
//   13.x liquidation.rs: liquidation thresholds
//   14.x adl.rs: auto-deleveraging candidates
//   15.x liquidity.rs: market token minting and burning math
//   16.x callback.rs: order lifecycle callbacks
//   17.x transfer.rs: outbound token transfers
//   18.x roles.rs: keeper and controller roles
//   20.x engine/: positions, swaps, orders, liquidity, liquidations, funding

// primitives and state
pub mod fixed;
pub mod keys;
pub mod store;
pub mod types;

// market math
pub mod config;
pub mod fees;
pub mod funding;
pub mod market;
pub mod oracle;
pub mod pricing;

// trading records
pub mod order;
pub mod position;

// risk
pub mod adl;
pub mod liquidation;

// integration surface
pub mod callback;
pub mod events;
pub mod liquidity;
pub mod roles;
pub mod transfer;

pub mod engine;

// re exports for convenience
pub use callback::{CallbackId, OrderCallbackReceiver};
pub use config::{MarketConfig, MarketParams};
pub use engine::*;
pub use events::{Event, EventPayload};
pub use fixed::{MathError, SignedU256};
pub use liquidity::{DepositParams, WithdrawalParams};
pub use market::{Market, MarketError, MarketPrices};
pub use oracle::{OraclePrices, PriceProps};
pub use order::{Order, OrderParams, OrderType, OrderUpdate};
pub use position::{Position, PositionKey};
pub use roles::Role;
pub use transfer::{Holder, Transfer};
pub use types::*;
