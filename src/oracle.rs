// 9.0 oracle.rs: validated oracle prices handed in per call. signature checks and staleness
// happen upstream; here a price is just a (min, max) pair per token.

use crate::fixed::{add, MathError};
use crate::types::TokenId;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Min/max price of one smallest token unit, in float USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceProps {
    pub min: U256,
    pub max: U256,
}

impl PriceProps {
    pub fn new(min: U256, max: U256) -> Self {
        Self { min, max }
    }

    pub fn single(price: U256) -> Self {
        Self { min: price, max: price }
    }

    pub fn pick(&self, maximize: bool) -> U256 {
        if maximize {
            self.max
        } else {
            self.min
        }
    }

    pub fn mid(&self) -> Result<U256, MathError> {
        Ok(add(self.min, self.max)? / 2)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OraclePrices {
    prices: HashMap<TokenId, PriceProps>,
}

impl OraclePrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, token: TokenId, price: PriceProps) -> Self {
        self.prices.insert(token, price);
        self
    }

    pub fn set(&mut self, token: TokenId, price: PriceProps) {
        self.prices.insert(token, price);
    }

    pub fn get(&self, token: TokenId) -> Option<PriceProps> {
        self.prices.get(&token).copied()
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}
