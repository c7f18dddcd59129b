// 7.0 config.rs: per-market parameters. humans write factors as decimals (0.0005 = 5 bps),
// the engine runs on 10^30 floats. MarketConfig is the serde-friendly form, MarketParams the
// converted form stored on each market.
// 7.1 presets: frictionless (no fees, no impact) and eth_usd (fees and quadratic impact).

use crate::fixed::{from_decimal, MathError};
use primitive_types::U256;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    // Fee charged on position size changes
    pub position_fee_factor: Decimal,
    // Fee charged on swap, deposit and withdrawal input
    pub swap_fee_factor: Decimal,
    // Share of protocol fees routed to the fee receiver, rest stays in the pool
    pub fee_receiver_factor: Decimal,
    pub swap_impact_factor_positive: Decimal,
    pub swap_impact_factor_negative: Decimal,
    pub swap_impact_exponent: Decimal,
    pub position_impact_factor_positive: Decimal,
    pub position_impact_factor_negative: Decimal,
    pub position_impact_exponent: Decimal,
    // Max fraction of backing pool value that open interest may reserve
    pub reserve_factor_long: Decimal,
    pub reserve_factor_short: Decimal,
    // PnL to pool value ratio above which ADL may be enabled
    pub max_pnl_factor_long: Decimal,
    pub max_pnl_factor_short: Decimal,
    pub min_pnl_factor_after_adl: Decimal,
    // Per second, scaled by utilization
    pub borrowing_factor_long: Decimal,
    pub borrowing_factor_short: Decimal,
    // Per second, scaled by OI imbalance
    pub funding_factor: Decimal,
    // Liquidation threshold in USD
    pub min_collateral_usd: Decimal,
    // Liquidation threshold as a fraction of size (1 / max leverage)
    pub min_collateral_factor: Decimal,
    pub min_position_size_usd: Decimal,
}

impl MarketConfig {
    /// No fees, no impact, no borrowing or funding. 100x max leverage.
    pub fn frictionless() -> Self {
        Self {
            position_fee_factor: Decimal::ZERO,
            swap_fee_factor: Decimal::ZERO,
            fee_receiver_factor: Decimal::ZERO,
            swap_impact_factor_positive: Decimal::ZERO,
            swap_impact_factor_negative: Decimal::ZERO,
            swap_impact_exponent: Decimal::ONE,
            position_impact_factor_positive: Decimal::ZERO,
            position_impact_factor_negative: Decimal::ZERO,
            position_impact_exponent: Decimal::ONE,
            reserve_factor_long: Decimal::ONE,
            reserve_factor_short: Decimal::ONE,
            max_pnl_factor_long: dec!(0.5),
            max_pnl_factor_short: dec!(0.5),
            min_pnl_factor_after_adl: Decimal::ZERO,
            borrowing_factor_long: Decimal::ZERO,
            borrowing_factor_short: Decimal::ZERO,
            funding_factor: Decimal::ZERO,
            min_collateral_usd: dec!(1),
            min_collateral_factor: dec!(0.01),
            min_position_size_usd: Decimal::ZERO,
        }
    }

    /// Typical ETH/USD settings: 5 bps position fee, 5 bps swap fee, quadratic impact.
    pub fn eth_usd() -> Self {
        Self {
            position_fee_factor: dec!(0.0005),
            swap_fee_factor: dec!(0.0005),
            fee_receiver_factor: dec!(0.3),
            swap_impact_factor_positive: dec!(0.00000001),
            swap_impact_factor_negative: dec!(0.00000002),
            swap_impact_exponent: dec!(2),
            position_impact_factor_positive: dec!(0.00000001),
            position_impact_factor_negative: dec!(0.00000002),
            position_impact_exponent: dec!(2),
            borrowing_factor_long: dec!(0.00000001),
            borrowing_factor_short: dec!(0.00000001),
            funding_factor: dec!(0.00000001),
            ..Self::frictionless()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let bounded = [
            ("position_fee_factor", self.position_fee_factor),
            ("swap_fee_factor", self.swap_fee_factor),
            ("fee_receiver_factor", self.fee_receiver_factor),
            ("min_collateral_factor", self.min_collateral_factor),
        ];
        for (name, value) in bounded {
            if value > Decimal::ONE || value < Decimal::ZERO {
                return Err(ConfigError::FactorOutOfRange { name, value });
            }
        }
        for (name, value) in [
            ("swap_impact_exponent", self.swap_impact_exponent),
            ("position_impact_exponent", self.position_impact_exponent),
        ] {
            if value < Decimal::ONE || !value.fract().is_zero() {
                return Err(ConfigError::InvalidExponent { name, value });
            }
        }
        Ok(())
    }

    pub fn to_params(&self) -> Result<MarketParams, ConfigError> {
        self.validate()?;
        Ok(MarketParams {
            position_fee_factor: from_decimal(self.position_fee_factor)?,
            swap_fee_factor: from_decimal(self.swap_fee_factor)?,
            fee_receiver_factor: from_decimal(self.fee_receiver_factor)?,
            swap_impact: ImpactParams {
                positive_factor: from_decimal(self.swap_impact_factor_positive)?,
                negative_factor: from_decimal(self.swap_impact_factor_negative)?,
                exponent: from_decimal(self.swap_impact_exponent)?,
            },
            position_impact: ImpactParams {
                positive_factor: from_decimal(self.position_impact_factor_positive)?,
                negative_factor: from_decimal(self.position_impact_factor_negative)?,
                exponent: from_decimal(self.position_impact_exponent)?,
            },
            reserve_factor_long: from_decimal(self.reserve_factor_long)?,
            reserve_factor_short: from_decimal(self.reserve_factor_short)?,
            max_pnl_factor_long: from_decimal(self.max_pnl_factor_long)?,
            max_pnl_factor_short: from_decimal(self.max_pnl_factor_short)?,
            min_pnl_factor_after_adl: from_decimal(self.min_pnl_factor_after_adl)?,
            borrowing_factor_long: from_decimal(self.borrowing_factor_long)?,
            borrowing_factor_short: from_decimal(self.borrowing_factor_short)?,
            funding_factor: from_decimal(self.funding_factor)?,
            min_collateral_usd: from_decimal(self.min_collateral_usd)?,
            min_collateral_factor: from_decimal(self.min_collateral_factor)?,
            min_position_size_usd: from_decimal(self.min_position_size_usd)?,
        })
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self::frictionless()
    }
}

/// Curve parameters shared by swap and position impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactParams {
    pub positive_factor: U256,
    pub negative_factor: U256,
    pub exponent: U256,
}

impl ImpactParams {
    pub fn is_disabled(&self) -> bool {
        self.positive_factor.is_zero() && self.negative_factor.is_zero()
    }
}

/// Float-scaled market parameters. Reserve and max PnL factors seed the store when the market
/// is added; the store copies are the live values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketParams {
    pub position_fee_factor: U256,
    pub swap_fee_factor: U256,
    pub fee_receiver_factor: U256,
    pub swap_impact: ImpactParams,
    pub position_impact: ImpactParams,
    pub reserve_factor_long: U256,
    pub reserve_factor_short: U256,
    pub max_pnl_factor_long: U256,
    pub max_pnl_factor_short: U256,
    pub min_pnl_factor_after_adl: U256,
    pub borrowing_factor_long: U256,
    pub borrowing_factor_short: U256,
    pub funding_factor: U256,
    pub min_collateral_usd: U256,
    pub min_collateral_factor: U256,
    pub min_position_size_usd: U256,
}

impl MarketParams {
    pub fn borrowing_factor(&self, is_long: bool) -> U256 {
        if is_long {
            self.borrowing_factor_long
        } else {
            self.borrowing_factor_short
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    FactorOutOfRange { name: &'static str, value: Decimal },

    #[error("{name} must be a whole number >= 1, got {value}")]
    InvalidExponent { name: &'static str, value: Decimal },

    #[error("config math error: {0}")]
    Math(#[from] MathError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::{decimal_to_float, float, precision};

    #[test]
    fn presets_convert() {
        let params = MarketConfig::eth_usd().to_params().unwrap();
        assert_eq!(params.swap_impact.negative_factor, decimal_to_float(2, 8));
        assert_eq!(params.swap_impact.exponent, float(2));
        assert_eq!(params.position_fee_factor, decimal_to_float(5, 4));
        assert_eq!(params.reserve_factor_long, precision());

        let flat = MarketConfig::frictionless().to_params().unwrap();
        assert!(flat.swap_impact.is_disabled());
        assert!(flat.position_impact.is_disabled());
        assert_eq!(flat.min_collateral_usd, float(1));
    }

    #[test]
    fn rejects_out_of_range() {
        let mut config = MarketConfig::frictionless();
        config.position_fee_factor = dec!(1.5);
        assert!(matches!(config.to_params(), Err(ConfigError::FactorOutOfRange { .. })));

        let mut config = MarketConfig::frictionless();
        config.swap_impact_exponent = dec!(1.5);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidExponent { .. })));
    }

    #[test]
    fn config_serialization() {
        let config = MarketConfig::eth_usd();
        let json = serde_json::to_string(&config).unwrap();
        let back: MarketConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
