// 3.0 store.rs: keyed state store owned by the engine. unsigned values, signed values and flags
// live in separate maps. missing entries read as zero / false. all deltas are checked.

use crate::fixed::{MathError, SignedU256};
use crate::keys::MarketKey;
use primitive_types::U256;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct DataStore {
    uints: HashMap<MarketKey, U256>,
    ints: HashMap<MarketKey, SignedU256>,
    bools: HashMap<MarketKey, bool>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_uint(&self, key: &MarketKey) -> U256 {
        self.uints.get(key).copied().unwrap_or_default()
    }

    pub fn set_uint(&mut self, key: MarketKey, value: U256) {
        if value.is_zero() {
            self.uints.remove(&key);
        } else {
            self.uints.insert(key, value);
        }
    }

    /// Applies a signed delta and returns the new value. going negative is an underflow.
    pub fn apply_delta_to_uint(&mut self, key: MarketKey, delta: SignedU256) -> Result<U256, MathError> {
        let next = delta.apply_to(self.get_uint(&key))?;
        self.set_uint(key, next);
        Ok(next)
    }

    pub fn increment_uint(&mut self, key: MarketKey, amount: U256) -> Result<U256, MathError> {
        self.apply_delta_to_uint(key, SignedU256::positive(amount))
    }

    pub fn decrement_uint(&mut self, key: MarketKey, amount: U256) -> Result<U256, MathError> {
        self.apply_delta_to_uint(key, SignedU256::negative(amount))
    }

    pub fn get_int(&self, key: &MarketKey) -> SignedU256 {
        self.ints.get(key).copied().unwrap_or_default()
    }

    pub fn set_int(&mut self, key: MarketKey, value: SignedU256) {
        if value.is_zero() {
            self.ints.remove(&key);
        } else {
            self.ints.insert(key, value);
        }
    }

    pub fn apply_delta_to_int(&mut self, key: MarketKey, delta: SignedU256) -> Result<SignedU256, MathError> {
        let next = self.get_int(&key).checked_add(delta)?;
        self.set_int(key, next);
        Ok(next)
    }

    pub fn get_bool(&self, key: &MarketKey) -> bool {
        self.bools.get(key).copied().unwrap_or(false)
    }

    pub fn set_bool(&mut self, key: MarketKey, value: bool) {
        self.bools.insert(key, value);
    }

    /// Number of populated entries, for diagnostics.
    pub fn len(&self) -> usize {
        self.uints.len() + self.ints.len() + self.bools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarketId, TokenId};

    fn pool_key() -> MarketKey {
        MarketKey::PoolAmount { market: MarketId(1), token: TokenId(1) }
    }

    #[test]
    fn missing_entries_read_as_zero() {
        let store = DataStore::new();
        assert_eq!(store.get_uint(&pool_key()), U256::zero());
        assert!(store.get_int(&pool_key()).is_zero());
        assert!(!store.get_bool(&pool_key()));
        assert!(store.is_empty());
    }

    #[test]
    fn uint_delta_underflow_leaves_value_untouched() {
        let mut store = DataStore::new();
        store.increment_uint(pool_key(), U256::from(10u64)).unwrap();

        let err = store.decrement_uint(pool_key(), U256::from(11u64));
        assert_eq!(err, Err(MathError::Underflow));
        assert_eq!(store.get_uint(&pool_key()), U256::from(10u64));

        assert_eq!(store.decrement_uint(pool_key(), U256::from(10u64)).unwrap(), U256::zero());
        assert!(store.is_empty());
    }

    #[test]
    fn int_deltas_cross_zero() {
        let mut store = DataStore::new();
        store.apply_delta_to_int(pool_key(), SignedU256::positive(U256::from(3u64))).unwrap();
        let value = store
            .apply_delta_to_int(pool_key(), SignedU256::negative(U256::from(5u64)))
            .unwrap();
        assert!(value.is_negative());
        assert_eq!(value.abs(), U256::from(2u64));
    }
}
