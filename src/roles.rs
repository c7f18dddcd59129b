// 18.0 roles.rs: who may call what. keepers execute orders, liquidate and deleverage; the
// controller registers markets, grants roles and sets referral tiers.

use crate::types::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Controller,
    OrderKeeper,
    FrozenOrderKeeper,
    LiquidationKeeper,
    AdlKeeper,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Controller => "CONTROLLER",
            Role::OrderKeeper => "ORDER_KEEPER",
            Role::FrozenOrderKeeper => "FROZEN_ORDER_KEEPER",
            Role::LiquidationKeeper => "LIQUIDATION_KEEPER",
            Role::AdlKeeper => "ADL_KEEPER",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoleStore {
    grants: HashMap<AccountId, HashSet<Role>>,
}

impl RoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, account: AccountId, role: Role) {
        self.grants.entry(account).or_default().insert(role);
    }

    /// Returns whether the role was held.
    pub fn revoke(&mut self, account: AccountId, role: Role) -> bool {
        self.grants
            .get_mut(&account)
            .map(|roles| roles.remove(&role))
            .unwrap_or(false)
    }

    pub fn has_role(&self, account: AccountId, role: Role) -> bool {
        self.grants
            .get(&account)
            .map(|roles| roles.contains(&role))
            .unwrap_or(false)
    }
}
