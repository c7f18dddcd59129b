//! Settlement engine simulation.
//!
//! Walks an ETH/USD market through its lifecycle: liquidity, trading through the order store,
//! swaps, funding accrual, liquidation and auto-deleveraging. Run with `RUST_LOG=debug` to see
//! the engine's own logs.

use perps_settlement::fixed::{expand_decimals, float, to_decimal, token_price};
use perps_settlement::*;
use primitive_types::U256;
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

const ADMIN: AccountId = AccountId(100);
const KEEPER: AccountId = AccountId(50);
const LP: AccountId = AccountId(1);
const ALICE: AccountId = AccountId(2);
const BOB: AccountId = AccountId(3);
const WNT: TokenId = TokenId(1);
const USDC: TokenId = TokenId(2);

fn main() -> Result<(), EngineError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    println!("Perpetual Settlement Engine Simulation");
    println!("ETH/USD market backed by WNT and USDC pools\n");

    scenario_1_order_lifecycle()?;
    scenario_2_swaps()?;
    scenario_3_frozen_limit_order()?;
    scenario_4_funding()?;
    scenario_5_liquidation()?;
    scenario_6_adl()?;

    println!("\nAll simulations completed successfully.");
    Ok(())
}

fn prices(eth: u64) -> OraclePrices {
    OraclePrices::new()
        .with(WNT, PriceProps::single(token_price(eth, 18)))
        .with(USDC, PriceProps::single(token_price(1, 6)))
}

fn usd(value: U256) -> Decimal {
    to_decimal(value, 30).unwrap_or_default()
}

fn signed_usd(value: SignedU256) -> Decimal {
    let magnitude = usd(value.abs());
    if value.is_negative() {
        -magnitude
    } else {
        magnitude
    }
}

fn wnt(amount: U256) -> Decimal {
    to_decimal(amount, 18).unwrap_or_default()
}

fn usdc(amount: U256) -> Decimal {
    to_decimal(amount, 6).unwrap_or_default()
}

/// Engine with one funded market and a keeper holding every role.
fn setup(config: &MarketConfig) -> Result<(Engine, MarketId), EngineError> {
    let mut engine = Engine::new(EngineConfig::default(), ADMIN);
    let market = engine.add_market(ADMIN, WNT, WNT, USDC, config)?;
    for role in [
        Role::OrderKeeper,
        Role::FrozenOrderKeeper,
        Role::LiquidationKeeper,
        Role::AdlKeeper,
    ] {
        engine.grant_role(ADMIN, KEEPER, role)?;
    }
    engine.execute_deposit(
        LP,
        DepositParams::new(market, LP, expand_decimals(100, 18), expand_decimals(500_000, 6)),
        &prices(5000),
    )?;
    Ok((engine, market))
}

/// Market increase and decrease through the order store.
fn scenario_1_order_lifecycle() -> Result<(), EngineError> {
    println!("Scenario 1: Order Lifecycle\n");

    let (mut engine, market) = setup(&MarketConfig::frictionless())?;
    let lp_tokens = engine.store().market_token_balance(market, LP);
    println!("  LP deposits 100 WNT + 500,000 USDC at $5,000, receives {} market tokens", wnt(lp_tokens));

    let open = OrderParams::market_increase(ALICE, market, WNT, expand_decimals(10, 18), float(50_000), Side::Long);
    let created = engine.create_order(ALICE, open)?;
    engine.execute_order(KEEPER, created.order_id, &prices(5000))?;
    let key = PositionKey::new(ALICE, market, WNT, Side::Long);
    if let Some(position) = engine.position(&key) {
        println!(
            "  Alice opens $50,000 long with 10 WNT: {} tokens of size",
            wnt(position.size_in_tokens)
        );
    }

    let close = OrderParams::market_decrease(ALICE, market, WNT, float(50_000), Side::Long);
    let created = engine.create_order(ALICE, close)?;
    let outcome = engine.execute_order(KEEPER, created.order_id, &prices(10_000))?;
    if let OrderOutcome::Executed {
        result: ExecutionResult::Decrease(decrease),
        ..
    } = &outcome
    {
        println!(
            "  ETH doubles to $10,000, Alice closes: pnl ${}, receives {} WNT",
            signed_usd(decrease.realized_pnl_usd),
            wnt(decrease.output_amount)
        );
    }
    println!(
        "  Pool now holds {} WNT, solvent: {}\n",
        wnt(engine.store().pool_amount(market, WNT)),
        engine.is_solvent()?
    );
    Ok(())
}

/// Swap fees and impact on a market with friction.
fn scenario_2_swaps() -> Result<(), EngineError> {
    println!("Scenario 2: Swaps\n");

    let (mut engine, market) = setup(&MarketConfig::eth_usd())?;
    let swap = OrderParams::market_swap(BOB, WNT, expand_decimals(1, 18), vec![market], U256::zero());
    let result = engine.execute_swap(BOB, &swap, &prices(5000))?;
    println!(
        "  Bob swaps 1 WNT for {} USDC (impact ${})",
        usdc(result.amount_out),
        signed_usd(result.hops[0].price_impact_usd)
    );

    let strict = OrderParams::market_swap(BOB, WNT, expand_decimals(1, 18), vec![market], expand_decimals(5_000, 6));
    match engine.execute_swap(BOB, &strict, &prices(5000)) {
        Ok(_) => println!("  Strict swap filled"),
        Err(e) => println!("  Swap with min output 5,000 USDC rejected: {}", e),
    }
    println!(
        "  Swap impact pool: {} WNT\n",
        wnt(engine.store().swap_impact_pool_amount(market, WNT))
    );
    Ok(())
}

/// A limit order that fails its acceptable price freezes until updated.
fn scenario_3_frozen_limit_order() -> Result<(), EngineError> {
    println!("Scenario 3: Frozen Limit Order\n");

    let (mut engine, market) = setup(&MarketConfig::frictionless())?;
    let params = OrderParams::market_increase(ALICE, market, WNT, expand_decimals(5, 18), float(20_000), Side::Long)
        .with_type(OrderType::LimitIncrease)
        .with_trigger_price(token_price(4800, 18))
        .with_acceptable_price(token_price(4700, 18));
    let created = engine.create_order(ALICE, params)?;

    match engine.execute_order(KEEPER, created.order_id, &prices(5000)) {
        Ok(_) => println!("  Limit order executed early"),
        Err(e) => println!("  At $5,000 the keeper is turned away: {}", e),
    }
    let outcome = engine.execute_order(KEEPER, created.order_id, &prices(4800))?;
    println!("  At $4,800 the order freezes: {}", outcome.reason().unwrap_or("-"));

    engine.update_order(
        ALICE,
        created.order_id,
        OrderUpdate {
            size_delta_usd: float(20_000),
            acceptable_price: token_price(4850, 18),
            trigger_price: token_price(4800, 18),
            min_output_amount: U256::zero(),
        },
    )?;
    let outcome = engine.execute_order(KEEPER, created.order_id, &prices(4800))?;
    println!("  After raising the acceptable price: executed {}\n", outcome.is_executed());
    Ok(())
}

/// Funding flows from the larger side to the smaller one over time.
fn scenario_4_funding() -> Result<(), EngineError> {
    println!("Scenario 4: Funding\n");

    let (mut engine, market) = setup(&MarketConfig::eth_usd())?;
    let long = OrderParams::market_increase(ALICE, market, USDC, expand_decimals(20_000, 6), float(100_000), Side::Long);
    engine.execute_increase(ALICE, &long, &prices(5000))?;
    let short = OrderParams::market_increase(BOB, market, USDC, expand_decimals(10_000, 6), float(20_000), Side::Short);
    engine.execute_increase(BOB, &short, &prices(5000))?;
    println!("  Alice is long $100,000, Bob short $20,000");

    engine.advance_time(3_600_000);
    let close = OrderParams::market_decrease(BOB, market, USDC, float(20_000), Side::Short);
    engine.execute_decrease(BOB, &close, &prices(5000))?;
    let claimed = engine.claim_funding_fees(BOB, market, USDC, BOB)?;
    println!("  After an hour Bob closes and claims {} USDC of funding\n", usdc(claimed.amount));
    Ok(())
}

/// A highly leveraged long is liquidated after a small move.
fn scenario_5_liquidation() -> Result<(), EngineError> {
    println!("Scenario 5: Liquidation\n");

    let (mut engine, market) = setup(&MarketConfig::frictionless())?;
    let params = OrderParams::market_increase(ALICE, market, USDC, expand_decimals(1_000, 6), float(50_000), Side::Long);
    let key = engine.execute_increase(ALICE, &params, &prices(5000))?.key;
    println!("  Alice opens $50,000 long on 1,000 USDC (50x)");

    match engine.execute_liquidation(KEEPER, key, &prices(4950)) {
        Ok(_) => println!("  Liquidated at $4,950"),
        Err(e) => println!("  At $4,950 the position survives: {}", e),
    }
    let result = engine.execute_liquidation(KEEPER, key, &prices(4900))?;
    println!(
        "  At $4,900 remaining collateral is ${}, the position is closed: {}",
        signed_usd(result.health.remaining_collateral_usd),
        result.decrease.position_closed
    );
    println!("  USDC pool: {}\n", usdc(engine.store().pool_amount(market, USDC)));
    Ok(())
}

/// Short pnl above the cap is trimmed by the ADL keeper.
fn scenario_6_adl() -> Result<(), EngineError> {
    println!("Scenario 6: Auto-Deleveraging\n");

    let mut config = MarketConfig::frictionless();
    config.max_pnl_factor_short = Decimal::new(5, 2);
    let (mut engine, market) = setup(&config)?;
    let params = OrderParams::market_increase(BOB, market, USDC, expand_decimals(50_000, 6), float(200_000), Side::Short);
    let key = engine.execute_increase(BOB, &params, &prices(5000))?.key;

    let state = engine.update_adl_state(KEEPER, market, Side::Short, &prices(4000))?;
    println!(
        "  ETH falls to $4,000, short pnl/pool = {}, adl enabled: {}",
        usd(state.pnl_to_pool_factor.abs()),
        state.enabled
    );
    for candidate in engine.adl_candidates(market, Side::Short, &prices(4000))? {
        println!("  Candidate {:?} with pnl ${}", candidate.key.account, signed_usd(candidate.pnl_usd));
    }

    let result = engine.execute_adl(KEEPER, key, float(10_000), &prices(4000))?;
    println!(
        "  ADL closes $10,000: factor {} -> {}",
        usd(result.pnl_to_pool_factor_before.abs()),
        usd(result.pnl_to_pool_factor_after.abs())
    );
    let state = engine.update_adl_state(KEEPER, market, Side::Short, &prices(4000))?;
    println!("  Re-checked, adl enabled: {}", state.enabled);
    Ok(())
}
