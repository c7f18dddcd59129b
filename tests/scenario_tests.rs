//! End-to-end settlement scenarios through the public engine API.

use perps_settlement::fees::ReferralTier;
use perps_settlement::fixed::{decimal_to_float, expand_decimals, float, token_price};
use perps_settlement::*;
use primitive_types::U256;

const ADMIN: AccountId = AccountId(100);
const KEEPER: AccountId = AccountId(50);
const LP: AccountId = AccountId(1);
const TRADER: AccountId = AccountId(2);
const AFFILIATE: AccountId = AccountId(3);
const WNT: TokenId = TokenId(1);
const USDC: TokenId = TokenId(2);
const BTC: TokenId = TokenId(3);

fn prices(eth: u64) -> OraclePrices {
    OraclePrices::new()
        .with(WNT, PriceProps::single(token_price(eth, 18)))
        .with(USDC, PriceProps::single(token_price(1, 6)))
}

fn keeper_engine() -> Engine {
    let mut engine = Engine::new(EngineConfig::default(), ADMIN);
    for role in [
        Role::OrderKeeper,
        Role::FrozenOrderKeeper,
        Role::LiquidationKeeper,
        Role::AdlKeeper,
    ] {
        engine.grant_role(ADMIN, KEEPER, role).unwrap();
    }
    engine
}

/// ETH/USD market seeded with 100 WNT and 500k USDC at $5,000.
fn setup_engine(config: &MarketConfig) -> (Engine, MarketId) {
    let mut engine = keeper_engine();
    let market = engine.add_market(ADMIN, WNT, WNT, USDC, config).unwrap();
    engine
        .execute_deposit(
            LP,
            DepositParams::new(market, LP, expand_decimals(100, 18), expand_decimals(500_000, 6)),
            &prices(5000),
        )
        .unwrap();
    (engine, market)
}

fn open_long_via_orders(engine: &mut Engine, market: MarketId) -> PositionKey {
    let params = OrderParams::market_increase(TRADER, market, WNT, expand_decimals(10, 18), float(50_000), Side::Long);
    let created = engine.create_order(TRADER, params).unwrap();
    assert!(engine.execute_order(KEEPER, created.order_id, &prices(5000)).unwrap().is_executed());
    PositionKey::new(TRADER, market, WNT, Side::Long)
}

mod lifecycle {
    use super::*;

    #[test]
    fn doubled_price_pays_fifteen_wnt() {
        let (mut engine, market) = setup_engine(&MarketConfig::frictionless());
        open_long_via_orders(&mut engine, market);

        let close = OrderParams::market_decrease(TRADER, market, WNT, float(50_000), Side::Long);
        let created = engine.create_order(TRADER, close).unwrap();
        let outcome = engine.execute_order(KEEPER, created.order_id, &prices(10_000)).unwrap();

        assert_eq!(
            transfer::total_received(outcome.transfers(), Holder::Account(TRADER), WNT),
            expand_decimals(15, 18)
        );
        assert!(engine.positions_for_account(TRADER).next().is_none());
        assert_eq!(engine.store().pool_amount(market, WNT), expand_decimals(95, 18));
        assert!(engine.is_solvent().unwrap());
    }

    #[test]
    fn one_sided_deposit_pays_impact() {
        let mut engine = keeper_engine();
        let market = engine.add_market(ADMIN, WNT, WNT, USDC, &MarketConfig::eth_usd()).unwrap();
        let outcome = engine
            .execute_deposit(
                LP,
                DepositParams::new(market, LP, expand_decimals(10, 18), U256::zero()),
                &prices(5000),
            )
            .unwrap();

        let DepositOutcome::Executed { price_impact_usd, .. } = outcome else {
            panic!("deposit cancelled");
        };
        assert!(price_impact_usd.is_negative());
        assert_eq!(engine.store().swap_impact_pool_amount(market, WNT), expand_decimals(5, 15));
        assert!(engine.is_solvent().unwrap());
    }

    #[test]
    fn events_follow_the_order() {
        let (mut engine, market) = setup_engine(&MarketConfig::frictionless());
        engine.clear_events();
        open_long_via_orders(&mut engine, market);

        let kinds: Vec<&str> = engine.events().iter().map(|e| e.payload.kind()).collect();
        let created = kinds.iter().position(|k| *k == "OrderCreated").unwrap();
        let increased = kinds.iter().position(|k| *k == "PositionIncrease").unwrap();
        let executed = kinds.iter().position(|k| *k == "OrderExecuted").unwrap();
        assert!(created < increased && increased < executed);
    }
}

mod quirks {
    use super::*;

    #[test]
    fn closed_long_still_reserves_its_tokens() {
        let (mut engine, market) = setup_engine(&MarketConfig::frictionless());
        open_long_via_orders(&mut engine, market);
        let close = OrderParams::market_decrease(TRADER, market, WNT, float(50_000), Side::Long);
        engine.execute_decrease(TRADER, &close, &prices(10_000)).unwrap();

        assert!(engine.store().open_interest(market, WNT, Side::Long).is_zero());
        assert_eq!(
            engine.store().open_interest_in_tokens(market, WNT, Side::Long),
            expand_decimals(20, 18)
        );

        // 95% of the pool would leave 17.2 WNT against 20 phantom tokens
        let supply = engine.store().market_token_supply(market);
        let large = WithdrawalParams::new(market, LP, supply * U256::from(95) / U256::from(100));
        let outcome = engine.execute_withdrawal(LP, large, &prices(10_000)).unwrap();
        let WithdrawalOutcome::Cancelled { reason } = outcome else {
            panic!("withdrawal should be cancelled");
        };
        assert!(reason.contains("reserve"), "{}", reason);
        assert_eq!(engine.store().market_token_supply(market), supply);

        let half = WithdrawalParams::new(market, LP, supply / 2);
        assert!(matches!(
            engine.execute_withdrawal(LP, half, &prices(10_000)).unwrap(),
            WithdrawalOutcome::Executed { .. }
        ));
        assert!(engine.is_solvent().unwrap());
    }

    #[test]
    fn oversized_stop_loss_goes_stale() {
        let (mut engine, market) = setup_engine(&MarketConfig::frictionless());
        let key = open_long_via_orders(&mut engine, market);

        let stop = OrderParams::market_decrease(TRADER, market, WNT, float(75_000), Side::Long)
            .with_type(OrderType::StopLossDecrease)
            .with_trigger_price(token_price(4500, 18));
        let created = engine.create_order(TRADER, stop).unwrap();

        let outcome = engine.execute_order(KEEPER, created.order_id, &prices(4400)).unwrap();
        let OrderOutcome::Executed { order_retained, result, .. } = outcome else {
            panic!("stop loss not executed");
        };
        assert!(order_retained);
        let ExecutionResult::Decrease(decrease) = result else {
            panic!("expected a decrease");
        };
        assert!(decrease.size_clamped && decrease.position_closed);
        assert!(engine.position(&key).is_none());

        let stale = engine.order(created.order_id).unwrap();
        assert_eq!(stale.params.size_delta_usd, float(50_000));
        let err = engine.execute_order(KEEPER, created.order_id, &prices(4400)).unwrap_err();
        assert_eq!(err.to_string(), "EMPTY_POSITION_ERROR");
    }

    #[test]
    fn frozen_limit_order_keeps_refreezing() {
        let (mut engine, market) = setup_engine(&MarketConfig::frictionless());
        let params = OrderParams::market_increase(TRADER, market, WNT, expand_decimals(1, 18), float(10_000), Side::Long)
            .with_type(OrderType::LimitIncrease)
            .with_trigger_price(token_price(5000, 18))
            .with_acceptable_price(token_price(4000, 18));
        let created = engine.create_order(TRADER, params).unwrap();

        for _ in 0..3 {
            let outcome = engine.execute_order(KEEPER, created.order_id, &prices(5000)).unwrap();
            assert!(matches!(outcome, OrderOutcome::Frozen { .. }));
        }
        let err = engine.execute_order(TRADER, created.order_id, &prices(5000)).unwrap_err();
        assert_eq!(err.to_string(), "FROZEN_ORDER_ERROR");
        assert!(engine.order(created.order_id).unwrap().is_frozen);
    }
}

mod adl {
    use super::*;

    fn btc_prices(btc: u64) -> OraclePrices {
        prices(5000).with(BTC, PriceProps::single(token_price(btc, 8)))
    }

    /// BTC-indexed market backed by WNT/USDC with a 6 BTC long.
    fn btc_market(max_pnl_factor_long: rust_decimal::Decimal) -> (Engine, MarketId, PositionKey) {
        let mut config = MarketConfig::frictionless();
        config.max_pnl_factor_long = max_pnl_factor_long;
        let mut engine = keeper_engine();
        let market = engine.add_market(ADMIN, BTC, WNT, USDC, &config).unwrap();
        engine
            .execute_deposit(
                LP,
                DepositParams::new(market, LP, expand_decimals(100, 18), expand_decimals(500_000, 6)),
                &btc_prices(20_000),
            )
            .unwrap();
        let params = OrderParams::market_increase(TRADER, market, WNT, expand_decimals(10, 18), float(120_000), Side::Long);
        let key = engine.execute_increase(TRADER, &params, &btc_prices(20_000)).unwrap().key;
        (engine, market, key)
    }

    #[test]
    fn toggles_with_pnl_above_the_pool() {
        let (mut engine, market, _) = btc_market(rust_decimal::Decimal::new(5, 1));
        assert!(!engine.update_adl_state(KEEPER, market, Side::Long, &btc_prices(20_000)).unwrap().enabled);

        // 10x: $1.08M pnl against a $500k pool
        let state = engine.update_adl_state(KEEPER, market, Side::Long, &btc_prices(200_000)).unwrap();
        assert!(state.enabled);
        assert!(state.pnl_to_pool_factor > SignedU256::positive(float(1)));
        assert!(!engine.update_adl_state(KEEPER, market, Side::Short, &btc_prices(200_000)).unwrap().enabled);

        assert!(!engine.update_adl_state(KEEPER, market, Side::Long, &btc_prices(20_000)).unwrap().enabled);
        assert!(!engine.store().is_adl_enabled(market, Side::Long));
    }

    #[test]
    fn toggles_with_pnl_below_the_pool() {
        let (mut engine, market, _) = btc_market(rust_decimal::Decimal::new(1, 1));
        // 3x: $240k pnl against a $500k pool
        let state = engine.update_adl_state(KEEPER, market, Side::Long, &btc_prices(60_000)).unwrap();
        assert!(state.enabled);
        assert!(state.pnl_to_pool_factor < SignedU256::positive(float(1)));

        assert!(!engine.update_adl_state(KEEPER, market, Side::Long, &btc_prices(12_000)).unwrap().enabled);
    }

    #[test]
    fn long_adl_is_invalid() {
        let (mut engine, market, key) = btc_market(rust_decimal::Decimal::new(1, 1));
        assert_eq!(
            engine.execute_adl(KEEPER, key, float(60_000), &btc_prices(60_000)).unwrap_err().to_string(),
            "Adl is not enabled"
        );
        engine.update_adl_state(KEEPER, market, Side::Long, &btc_prices(60_000)).unwrap();

        let err = engine.execute_adl(KEEPER, key, float(60_000), &btc_prices(60_000)).unwrap_err();
        assert_eq!(err.to_string(), "Invalid adl");
        assert_eq!(engine.position(&key).unwrap().size_in_usd, float(120_000));
        assert!(engine.is_solvent().unwrap());
    }

    #[test]
    fn liquidation_of_a_healthy_position_is_rejected() {
        let (mut engine, _, key) = btc_market(rust_decimal::Decimal::new(5, 1));
        let err = engine.execute_liquidation(KEEPER, key, &btc_prices(20_000)).unwrap_err();
        assert_eq!(err.to_string(), "DecreasePositionUtils: Invalid Liquidation");
    }
}

mod funding {
    use super::*;

    const RECEIVER: AccountId = AccountId(4);

    fn open_usdc(engine: &mut Engine, market: MarketId, account: AccountId, collateral: u64, size: u64, side: Side) -> PositionKey {
        let params = OrderParams::market_increase(account, market, USDC, expand_decimals(collateral, 6), float(size), side);
        engine.execute_increase(account, &params, &prices(5000)).unwrap().key
    }

    #[test]
    fn receiver_claims_while_the_payer_is_still_open() {
        let (mut engine, market) = setup_engine(&MarketConfig::eth_usd());
        open_usdc(&mut engine, market, TRADER, 20_000, 100_000, Side::Long);
        open_usdc(&mut engine, market, RECEIVER, 10_000, 20_000, Side::Short);

        engine.advance_time(3_600_000);
        let close = OrderParams::market_decrease(RECEIVER, market, USDC, float(20_000), Side::Short);
        engine.execute_decrease(RECEIVER, &close, &prices(5000)).unwrap();

        // 100000 * 3.6e-5 * 80000 / 120000 = $2.40
        let claimed = engine.claim_funding_fees(RECEIVER, market, USDC, RECEIVER).unwrap();
        assert_eq!(claimed.amount, expand_decimals(24, 5));
        assert_eq!(
            transfer::total_received(&claimed.transfers, Holder::Account(RECEIVER), USDC),
            expand_decimals(24, 5)
        );
        assert!(engine.is_solvent().unwrap());
        assert!(engine.position(&PositionKey::new(TRADER, market, USDC, Side::Long)).is_some());
    }

    #[test]
    fn receiver_claims_after_an_insolvent_payer_is_liquidated() {
        let mut config = MarketConfig::frictionless();
        config.funding_factor = rust_decimal::Decimal::new(1, 7);
        let (mut engine, market) = setup_engine(&config);
        let payer = open_usdc(&mut engine, market, TRADER, 1_000, 50_000, Side::Long);
        open_usdc(&mut engine, market, RECEIVER, 2_000, 10_000, Side::Short);

        engine.advance_time(3_600_000);
        // $1,000 of loss plus $12 of funding against $1,000 of collateral
        let liquidated = engine.execute_liquidation(KEEPER, payer, &prices(4900)).unwrap();
        assert!(liquidated.decrease.position_closed);
        assert!(!liquidated.decrease.bad_debt_amount.is_zero());

        let close = OrderParams::market_decrease(RECEIVER, market, USDC, float(10_000), Side::Short);
        engine.execute_decrease(RECEIVER, &close, &prices(4900)).unwrap();
        let claimable = engine.store().claimable_funding_amount(market, USDC, RECEIVER);
        assert_eq!(claimable, expand_decimals(12, 6));

        let claimed = engine.claim_funding_fees(RECEIVER, market, USDC, RECEIVER).unwrap();
        assert_eq!(claimed.amount, claimable);
        assert!(engine.store().claimable_funding_pool(market, USDC).is_zero());
        assert!(engine.is_solvent().unwrap());
    }
}

mod integrations {
    use super::*;

    #[test]
    fn affiliate_earns_part_of_the_position_fee() {
        let (mut engine, market) = setup_engine(&MarketConfig::eth_usd());
        engine.set_referrer(TRADER, TRADER, AFFILIATE).unwrap();
        engine
            .set_referral_tier(
                ADMIN,
                AFFILIATE,
                ReferralTier {
                    total_rebate_factor: decimal_to_float(1, 1),
                    discount_share_factor: decimal_to_float(5, 1),
                },
            )
            .unwrap();

        let params = OrderParams::market_increase(TRADER, market, WNT, expand_decimals(10, 18), float(50_000), Side::Long);
        let result = engine.execute_increase(TRADER, &params, &prices(5000)).unwrap();
        // $25 fee is 0.005 WNT. 10% rebated, half of that back to the trader
        assert_eq!(result.fees.position_fee_amount, expand_decimals(5, 15));
        assert_eq!(result.fees.referral.trader_discount_amount, expand_decimals(25, 13));

        let claimed = engine.claim_affiliate_rewards(AFFILIATE, market, WNT, AFFILIATE).unwrap();
        assert_eq!(claimed.amount, expand_decimals(25, 13));
        assert_eq!(
            transfer::total_received(&claimed.transfers, Holder::Account(AFFILIATE), WNT),
            expand_decimals(25, 13)
        );
        let again = engine.claim_affiliate_rewards(AFFILIATE, market, WNT, AFFILIATE).unwrap();
        assert!(again.amount.is_zero());
        assert!(engine.is_solvent().unwrap());
    }

    #[test]
    fn bad_swap_order_is_cancelled_with_refund() {
        let (mut engine, market) = setup_engine(&MarketConfig::frictionless());
        let params = OrderParams::market_swap(TRADER, WNT, expand_decimals(1, 18), vec![market, MarketId(99)], U256::zero());
        let created = engine.create_order(TRADER, params).unwrap();
        let outcome = engine.execute_order(KEEPER, created.order_id, &prices(5000)).unwrap();

        assert_eq!(outcome.reason(), Some("Invalid swap market market#99"));
        assert_eq!(
            transfer::total_received(outcome.transfers(), Holder::Account(TRADER), WNT),
            expand_decimals(1, 18)
        );
        assert_eq!(engine.store().pool_amount(market, WNT), expand_decimals(100, 18));

        let duplicated = OrderParams::market_swap(TRADER, WNT, expand_decimals(1, 18), vec![market, market], U256::zero());
        assert!(matches!(
            engine.execute_swap(TRADER, &duplicated, &prices(5000)),
            Err(EngineError::DuplicatedMarketInSwapPath(m)) if m == market
        ));
        let empty = OrderParams::market_swap(TRADER, WNT, expand_decimals(1, 18), vec![], U256::zero());
        assert_eq!(engine.create_order(TRADER, empty).unwrap_err(), EngineError::EmptySwapPath);
    }

    #[test]
    fn unregistered_callback_is_skipped() {
        let (mut engine, market) = setup_engine(&MarketConfig::frictionless());
        let recorder = callback::RecordingCallback::new();
        let id = engine.register_callback(Box::new(recorder.clone()));
        assert!(engine.unregister_callback(id));

        let params = OrderParams::market_increase(TRADER, market, WNT, expand_decimals(10, 18), float(50_000), Side::Long)
            .with_callback(id, 50_000);
        let created = engine.create_order(TRADER, params).unwrap();
        assert!(engine.execute_order(KEEPER, created.order_id, &prices(5000)).unwrap().is_executed());
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn referrer_is_chosen_by_the_trader() {
        let (mut engine, _) = setup_engine(&MarketConfig::eth_usd());
        assert!(matches!(
            engine.set_referrer(AFFILIATE, TRADER, AFFILIATE),
            Err(EngineError::NotAccountOwner { .. })
        ));
    }
}
