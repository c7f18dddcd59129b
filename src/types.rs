// 1.0: all the primitives live here. nothing in the engine works without these types.
// IDs for markets, tokens, accounts, orders, plus side and timestamps. each is a newtype
// so the compiler catches a token id passed where a market id belongs.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MarketId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "market#{}", self.0)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token#{}", self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "account#{}", self.0)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order#{}", self.0)
    }
}

// Long = profit when price goes up. Short = profit when price goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn from_is_long(is_long: bool) -> Self {
        if is_long {
            Side::Long
        } else {
            Side::Short
        }
    }

    pub fn is_long(&self) -> bool {
        matches!(self, Side::Long)
    }

    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    pub const BOTH: [Side; 2] = [Side::Long, Side::Short];
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

// 1.6: millisecond timestamp. funding and borrowing accrue per whole second of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn from_secs(secs: i64) -> Self {
        Self(secs * 1000)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    /// Whole seconds from `self` to `later`, zero if `later` is not after `self`.
    pub fn seconds_until(&self, later: &Timestamp) -> u64 {
        let diff_ms = later.0 - self.0;
        if diff_ms <= 0 {
            0
        } else {
            (diff_ms / 1000) as u64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_helpers() {
        assert_eq!(Side::from_is_long(true), Side::Long);
        assert_eq!(Side::from_is_long(false), Side::Short);
        assert_eq!(Side::Long.opposite(), Side::Short);
        assert!(Side::Long.is_long());
        assert!(!Side::Short.is_long());
    }

    #[test]
    fn seconds_until_truncates_and_floors_at_zero() {
        let t0 = Timestamp::from_secs(100);
        assert_eq!(t0.seconds_until(&Timestamp::from_millis(101_999)), 1);
        assert_eq!(t0.seconds_until(&Timestamp::from_secs(90)), 0);
        assert_eq!(t0.seconds_until(&t0), 0);
    }

    #[test]
    fn ids_display() {
        assert_eq!(MarketId(3).to_string(), "market#3");
        assert_eq!(TokenId(7).to_string(), "token#7");
        assert_eq!(Side::Short.to_string(), "short");
    }
}
