// 17.0 transfer.rs: token movements the engine asks the host to perform. the engine never
// holds tokens itself; it tracks what each market vault should hold and returns the ordered
// list of transfers that make the real balances match.

use crate::types::{AccountId, MarketId, TokenId};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Holder {
    Account(AccountId),
    Market(MarketId),
    /// Escrow for pending order collateral and execution fees.
    OrderVault,
    FeeReceiver,
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Holder::Account(account) => write!(f, "{}", account),
            Holder::Market(market) => write!(f, "{}", market),
            Holder::OrderVault => write!(f, "order-vault"),
            Holder::FeeReceiver => write!(f, "fee-receiver"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub token: TokenId,
    pub from: Holder,
    pub to: Holder,
    pub amount: U256,
    pub unwrap_native: bool,
}

/// Net amount of `token` that `holder` receives across `transfers`. negative totals saturate
/// to zero; use it for payouts, not for balances.
pub fn total_received(transfers: &[Transfer], holder: Holder, token: TokenId) -> U256 {
    transfers
        .iter()
        .filter(|t| t.to == holder && t.token == token)
        .fold(U256::zero(), |acc, t| acc.saturating_add(t.amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn received_sums_matching_transfers() {
        let alice = Holder::Account(AccountId(1));
        let transfers = [
            Transfer { token: TokenId(1), from: Holder::Market(MarketId(1)), to: alice, amount: U256::from(5u64), unwrap_native: false },
            Transfer { token: TokenId(1), from: Holder::OrderVault, to: alice, amount: U256::from(2u64), unwrap_native: false },
            Transfer { token: TokenId(2), from: Holder::OrderVault, to: alice, amount: U256::from(9u64), unwrap_native: false },
            Transfer { token: TokenId(1), from: alice, to: Holder::FeeReceiver, amount: U256::from(1u64), unwrap_native: false },
        ];
        assert_eq!(total_received(&transfers, alice, TokenId(1)), U256::from(7u64));
        assert_eq!(Holder::OrderVault.to_string(), "order-vault");
    }
}
