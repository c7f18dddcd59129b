// 6.0 fees.rs: position and swap fees. a position fee is a factor of the size delta paid in the
// collateral token. a referred trader gets part of the rebate as a discount and the affiliate
// earns the rest; whatever is left is protocol revenue, split between the fee receiver and
// the pool by the fee receiver factor.
// 6.1 swap fees. 6.2 the referral registry.

use crate::config::MarketParams;
use crate::fixed::{self, MathError};
use crate::funding::PositionFundingFees;
use crate::types::AccountId;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rebate schedule of an affiliate. both factors are floats in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReferralTier {
    pub total_rebate_factor: U256,
    pub discount_share_factor: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PositionReferralFees {
    pub affiliate: Option<AccountId>,
    pub total_rebate_amount: U256,
    pub trader_discount_amount: U256,
    pub affiliate_reward_amount: U256,
}

/// Everything a position pays on one increase or decrease, in collateral token units.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PositionFees {
    pub referral: PositionReferralFees,
    pub funding: PositionFundingFees,
    pub position_fee_amount: U256,
    pub fee_receiver_amount: U256,
    pub fee_amount_for_pool: U256,
    pub borrowing_fee_amount: U256,
    pub total_cost_amount: U256,
}

impl PositionFees {
    /// Amount that stays in the pool: the pool's share of the position fee plus borrowing.
    pub fn pool_amount(&self) -> Result<U256, MathError> {
        fixed::add(self.fee_amount_for_pool, self.borrowing_fee_amount)
    }
}

pub fn position_fees(
    params: &MarketParams,
    collateral_price_min: U256,
    size_delta_usd: U256,
    referral: Option<(AccountId, ReferralTier)>,
    borrowing_fee_amount: U256,
    funding: PositionFundingFees,
) -> Result<PositionFees, MathError> {
    let fee_usd = fixed::apply_factor(size_delta_usd, params.position_fee_factor)?;
    let position_fee_amount = fixed::usd_to_token_amount(fee_usd, collateral_price_min)?;

    let referral = match referral {
        Some((affiliate, tier)) => {
            let total_rebate_amount = fixed::apply_factor(position_fee_amount, tier.total_rebate_factor)?;
            let trader_discount_amount = fixed::apply_factor(total_rebate_amount, tier.discount_share_factor)?;
            PositionReferralFees {
                affiliate: Some(affiliate),
                total_rebate_amount,
                trader_discount_amount,
                affiliate_reward_amount: fixed::sub(total_rebate_amount, trader_discount_amount)?,
            }
        }
        None => PositionReferralFees::default(),
    };

    let protocol_fee_amount = fixed::sub(position_fee_amount, referral.total_rebate_amount)?;
    let fee_receiver_amount = fixed::apply_factor(protocol_fee_amount, params.fee_receiver_factor)?;
    let fee_amount_for_pool = fixed::sub(protocol_fee_amount, fee_receiver_amount)?;

    let mut total_cost_amount = fixed::sub(position_fee_amount, referral.trader_discount_amount)?;
    total_cost_amount = fixed::add(total_cost_amount, borrowing_fee_amount)?;
    total_cost_amount = fixed::add(total_cost_amount, funding.funding_fee_amount)?;

    Ok(PositionFees {
        referral,
        funding,
        position_fee_amount,
        fee_receiver_amount,
        fee_amount_for_pool,
        borrowing_fee_amount,
        total_cost_amount,
    })
}

// 6.1: swap fees are taken from the input amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SwapFees {
    pub fee_receiver_amount: U256,
    pub fee_amount_for_pool: U256,
    pub amount_after_fees: U256,
}

pub fn swap_fees(params: &MarketParams, amount: U256) -> Result<SwapFees, MathError> {
    let fee_amount = fixed::apply_factor(amount, params.swap_fee_factor)?;
    let fee_receiver_amount = fixed::apply_factor(fee_amount, params.fee_receiver_factor)?;
    Ok(SwapFees {
        fee_receiver_amount,
        fee_amount_for_pool: fixed::sub(fee_amount, fee_receiver_amount)?,
        amount_after_fees: fixed::sub(amount, fee_amount)?,
    })
}

// 6.2: trader -> affiliate links and affiliate tiers
#[derive(Debug, Clone, Default)]
pub struct ReferralRegistry {
    referrers: HashMap<AccountId, AccountId>,
    tiers: HashMap<AccountId, ReferralTier>,
}

impl ReferralRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_referrer(&mut self, trader: AccountId, affiliate: AccountId) {
        self.referrers.insert(trader, affiliate);
    }

    pub fn set_tier(&mut self, affiliate: AccountId, tier: ReferralTier) {
        self.tiers.insert(affiliate, tier);
    }

    pub fn referrer(&self, trader: AccountId) -> Option<AccountId> {
        self.referrers.get(&trader).copied()
    }

    /// Affiliate and tier applying to `trader`. an affiliate without a tier earns nothing.
    pub fn lookup(&self, trader: AccountId) -> Option<(AccountId, ReferralTier)> {
        let affiliate = self.referrer(trader)?;
        let tier = self.tiers.get(&affiliate).copied().unwrap_or_default();
        Some((affiliate, tier))
    }
}
