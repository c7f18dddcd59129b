//! Engine configuration options.

use crate::types::TokenId;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of events to retain in memory.
    pub max_events: usize,
    /// Log every event at info level instead of debug.
    pub verbose: bool,
    /// Token execution fees are paid in.
    pub native_token: TokenId,
    /// Cap on candidates returned by ADL ranking.
    pub max_adl_candidates: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            verbose: false,
            native_token: TokenId(1),
            max_adl_candidates: 50,
        }
    }
}
