// 2.0 keys.rs: typed composite keys for market state. each variant is a tag plus the
// identifiers it is scoped to, so two logical entries can only collide if every field matches.
// 2.1 has a compact byte encoding (tag byte, then big endian fields) that decodes back to the
// same key, for persistence and audit logs.

use crate::types::{AccountId, MarketId, Side, TokenId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketKey {
    PoolAmount { market: MarketId, token: TokenId },
    SwapImpactPoolAmount { market: MarketId, token: TokenId },
    PositionImpactPoolAmount { market: MarketId },
    OpenInterest { market: MarketId, collateral_token: TokenId, side: Side },
    OpenInterestInTokens { market: MarketId, collateral_token: TokenId, side: Side },
    CollateralSum { market: MarketId, collateral_token: TokenId, side: Side },
    CumulativeBorrowingFactor { market: MarketId, side: Side },
    CumulativeBorrowingFactorUpdatedAt { market: MarketId },
    FundingAmountPerSize { market: MarketId, collateral_token: TokenId, side: Side },
    FundingUpdatedAt { market: MarketId },
    AdlEnabled { market: MarketId, side: Side },
    MaxPnlFactor { market: MarketId, side: Side },
    ReserveFactor { market: MarketId, side: Side },
    TokenBalance { market: MarketId, token: TokenId },
    MarketTokenSupply { market: MarketId },
    MarketTokenBalance { market: MarketId, account: AccountId },
    ClaimableFundingAmount { market: MarketId, token: TokenId, account: AccountId },
    ClaimableFundingPool { market: MarketId, token: TokenId },
    AffiliateReward { market: MarketId, token: TokenId, account: AccountId },
    AffiliateRewardPool { market: MarketId, token: TokenId },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("unknown key tag {0}")]
    UnknownTag(u8),

    #[error("key with tag {tag} must be {expected} bytes, got {actual}")]
    InvalidLength { tag: u8, expected: usize, actual: usize },

    #[error("invalid side byte {0}")]
    InvalidSide(u8),

    #[error("empty key")]
    Empty,
}

// field layout per tag. M = market u32, T = token u32, S = side u8, A = account u64
const M: usize = 4;
const T: usize = 4;
const S: usize = 1;
const A: usize = 8;

impl MarketKey {
    pub fn tag(&self) -> u8 {
        match self {
            MarketKey::PoolAmount { .. } => 1,
            MarketKey::SwapImpactPoolAmount { .. } => 2,
            MarketKey::PositionImpactPoolAmount { .. } => 3,
            MarketKey::OpenInterest { .. } => 4,
            MarketKey::OpenInterestInTokens { .. } => 5,
            MarketKey::CollateralSum { .. } => 6,
            MarketKey::CumulativeBorrowingFactor { .. } => 7,
            MarketKey::CumulativeBorrowingFactorUpdatedAt { .. } => 8,
            MarketKey::FundingAmountPerSize { .. } => 9,
            MarketKey::FundingUpdatedAt { .. } => 10,
            MarketKey::AdlEnabled { .. } => 11,
            MarketKey::MaxPnlFactor { .. } => 12,
            MarketKey::ReserveFactor { .. } => 13,
            MarketKey::TokenBalance { .. } => 14,
            MarketKey::MarketTokenSupply { .. } => 15,
            MarketKey::MarketTokenBalance { .. } => 16,
            MarketKey::ClaimableFundingAmount { .. } => 17,
            MarketKey::ClaimableFundingPool { .. } => 18,
            MarketKey::AffiliateReward { .. } => 19,
            MarketKey::AffiliateRewardPool { .. } => 20,
        }
    }

    pub fn market(&self) -> MarketId {
        match *self {
            MarketKey::PoolAmount { market, .. }
            | MarketKey::SwapImpactPoolAmount { market, .. }
            | MarketKey::PositionImpactPoolAmount { market }
            | MarketKey::OpenInterest { market, .. }
            | MarketKey::OpenInterestInTokens { market, .. }
            | MarketKey::CollateralSum { market, .. }
            | MarketKey::CumulativeBorrowingFactor { market, .. }
            | MarketKey::CumulativeBorrowingFactorUpdatedAt { market }
            | MarketKey::FundingAmountPerSize { market, .. }
            | MarketKey::FundingUpdatedAt { market }
            | MarketKey::AdlEnabled { market, .. }
            | MarketKey::MaxPnlFactor { market, .. }
            | MarketKey::ReserveFactor { market, .. }
            | MarketKey::TokenBalance { market, .. }
            | MarketKey::MarketTokenSupply { market }
            | MarketKey::MarketTokenBalance { market, .. }
            | MarketKey::ClaimableFundingAmount { market, .. }
            | MarketKey::ClaimableFundingPool { market, .. }
            | MarketKey::AffiliateReward { market, .. }
            | MarketKey::AffiliateRewardPool { market, .. } => market,
        }
    }

    // 2.1: encoding
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + M + T + S + A);
        out.push(self.tag());
        out.extend_from_slice(&self.market().0.to_be_bytes());
        match *self {
            MarketKey::PoolAmount { token, .. }
            | MarketKey::SwapImpactPoolAmount { token, .. }
            | MarketKey::TokenBalance { token, .. }
            | MarketKey::ClaimableFundingPool { token, .. }
            | MarketKey::AffiliateRewardPool { token, .. } => {
                out.extend_from_slice(&token.0.to_be_bytes());
            }
            MarketKey::OpenInterest { collateral_token, side, .. }
            | MarketKey::OpenInterestInTokens { collateral_token, side, .. }
            | MarketKey::CollateralSum { collateral_token, side, .. }
            | MarketKey::FundingAmountPerSize { collateral_token, side, .. } => {
                out.extend_from_slice(&collateral_token.0.to_be_bytes());
                out.push(side_byte(side));
            }
            MarketKey::CumulativeBorrowingFactor { side, .. }
            | MarketKey::AdlEnabled { side, .. }
            | MarketKey::MaxPnlFactor { side, .. }
            | MarketKey::ReserveFactor { side, .. } => {
                out.push(side_byte(side));
            }
            MarketKey::MarketTokenBalance { account, .. } => {
                out.extend_from_slice(&account.0.to_be_bytes());
            }
            MarketKey::ClaimableFundingAmount { token, account, .. }
            | MarketKey::AffiliateReward { token, account, .. } => {
                out.extend_from_slice(&token.0.to_be_bytes());
                out.extend_from_slice(&account.0.to_be_bytes());
            }
            MarketKey::PositionImpactPoolAmount { .. }
            | MarketKey::CumulativeBorrowingFactorUpdatedAt { .. }
            | MarketKey::FundingUpdatedAt { .. }
            | MarketKey::MarketTokenSupply { .. } => {}
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, KeyError> {
        let (&tag, _) = bytes.split_first().ok_or(KeyError::Empty)?;
        let expected = 1 + match tag {
            1 | 2 | 14 | 18 | 20 => M + T,
            3 | 8 | 10 | 15 => M,
            4 | 5 | 6 | 9 => M + T + S,
            7 | 11 | 12 | 13 => M + S,
            16 => M + A,
            17 | 19 => M + T + A,
            other => return Err(KeyError::UnknownTag(other)),
        };
        if bytes.len() != expected {
            return Err(KeyError::InvalidLength {
                tag,
                expected,
                actual: bytes.len(),
            });
        }

        let mut reader = KeyReader { bytes, pos: 1 };
        let market = MarketId(reader.u32());
        let key = match tag {
            1 => MarketKey::PoolAmount { market, token: reader.token() },
            2 => MarketKey::SwapImpactPoolAmount { market, token: reader.token() },
            3 => MarketKey::PositionImpactPoolAmount { market },
            4 => {
                let collateral_token = reader.token();
                MarketKey::OpenInterest { market, collateral_token, side: reader.side()? }
            }
            5 => {
                let collateral_token = reader.token();
                MarketKey::OpenInterestInTokens { market, collateral_token, side: reader.side()? }
            }
            6 => {
                let collateral_token = reader.token();
                MarketKey::CollateralSum { market, collateral_token, side: reader.side()? }
            }
            7 => MarketKey::CumulativeBorrowingFactor { market, side: reader.side()? },
            8 => MarketKey::CumulativeBorrowingFactorUpdatedAt { market },
            9 => {
                let collateral_token = reader.token();
                MarketKey::FundingAmountPerSize { market, collateral_token, side: reader.side()? }
            }
            10 => MarketKey::FundingUpdatedAt { market },
            11 => MarketKey::AdlEnabled { market, side: reader.side()? },
            12 => MarketKey::MaxPnlFactor { market, side: reader.side()? },
            13 => MarketKey::ReserveFactor { market, side: reader.side()? },
            14 => MarketKey::TokenBalance { market, token: reader.token() },
            15 => MarketKey::MarketTokenSupply { market },
            16 => MarketKey::MarketTokenBalance { market, account: reader.account() },
            17 => {
                let token = reader.token();
                MarketKey::ClaimableFundingAmount { market, token, account: reader.account() }
            }
            18 => MarketKey::ClaimableFundingPool { market, token: reader.token() },
            19 => {
                let token = reader.token();
                MarketKey::AffiliateReward { market, token, account: reader.account() }
            }
            20 => MarketKey::AffiliateRewardPool { market, token: reader.token() },
            other => return Err(KeyError::UnknownTag(other)),
        };
        Ok(key)
    }
}

fn side_byte(side: Side) -> u8 {
    match side {
        Side::Long => 1,
        Side::Short => 0,
    }
}

// length is validated before any read, so the slices below are always in range
struct KeyReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> KeyReader<'a> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut buf = [0u8; N];
        buf.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        buf
    }

    fn u32(&mut self) -> u32 {
        u32::from_be_bytes(self.take::<4>())
    }

    fn token(&mut self) -> TokenId {
        TokenId(self.u32())
    }

    fn account(&mut self) -> AccountId {
        AccountId(u64::from_be_bytes(self.take::<8>()))
    }

    fn side(&mut self) -> Result<Side, KeyError> {
        match self.take::<1>()[0] {
            1 => Ok(Side::Long),
            0 => Ok(Side::Short),
            other => Err(KeyError::InvalidSide(other)),
        }
    }
}
