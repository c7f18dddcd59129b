// 20.0 engine/core.rs: main engine. owns the market store, positions, pending orders, roles,
// referrals and callbacks. every mutating call takes &mut self, so settlements never
// interleave, and runs against a checkpoint that is restored if the call fails.

use super::config::EngineConfig;
use super::results::EngineError;
use crate::callback::{CallbackId, OrderCallbackReceiver};
use crate::config::MarketConfig;
use crate::events::{Event, EventId, EventPayload};
use crate::fees::{ReferralRegistry, ReferralTier};
use crate::fixed::SignedU256;
use crate::market::{self, Market, MarketPrices, PoolBalance};
use crate::oracle::OraclePrices;
use crate::order::{Order, OrderStore};
use crate::position::{Position, PositionKey};
use crate::roles::{Role, RoleStore};
use crate::store::DataStore;
use crate::transfer::{Holder, Transfer};
use crate::types::{AccountId, MarketId, OrderId, Side, Timestamp, TokenId};
use primitive_types::U256;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/** 20.1: main engine struct. all state lives here */
#[derive(Debug)]
pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) store: DataStore,
    pub(super) markets: BTreeMap<MarketId, Market>,
    pub(super) positions: BTreeMap<PositionKey, Position>,
    pub(super) orders: OrderStore,
    pub(super) roles: RoleStore,
    pub(super) referrals: ReferralRegistry,
    pub(super) callbacks: HashMap<CallbackId, Box<dyn OrderCallbackReceiver>>,
    pub(super) events: Vec<Event>,
    // transfers produced by the call in progress
    pub(super) transfers: Vec<Transfer>,
    pub(super) next_event_id: u64,
    pub(super) next_order_id: u64,
    pub(super) next_market_id: u32,
    pub(super) next_callback_id: u64,
    pub(super) current_time: Timestamp,
}

/// Snapshot of everything a failed settlement may have touched.
pub(super) struct Checkpoint {
    store: DataStore,
    positions: BTreeMap<PositionKey, Position>,
    orders: OrderStore,
    next_event_id: u64,
    transfers_len: usize,
}

impl Engine {
    /// `controller` may register markets and grant roles.
    pub fn new(config: EngineConfig, controller: AccountId) -> Self {
        let mut roles = RoleStore::new();
        roles.grant(controller, Role::Controller);
        Self {
            config,
            store: DataStore::new(),
            markets: BTreeMap::new(),
            positions: BTreeMap::new(),
            orders: OrderStore::new(),
            roles,
            referrals: ReferralRegistry::new(),
            callbacks: HashMap::new(),
            events: Vec::new(),
            transfers: Vec::new(),
            next_event_id: 1,
            next_order_id: 1,
            next_market_id: 1,
            next_callback_id: 1,
            current_time: Timestamp::from_millis(0),
        }
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, millis: i64) {
        self.current_time = Timestamp::from_millis(self.current_time.as_millis() + millis);
    }

    pub(super) fn now_secs(&self) -> u64 {
        Timestamp::from_millis(0).seconds_until(&self.current_time)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // 20.2: roles

    pub fn grant_role(&mut self, caller: AccountId, account: AccountId, role: Role) -> Result<(), EngineError> {
        self.require_role(caller, Role::Controller)?;
        self.roles.grant(account, role);
        Ok(())
    }

    pub fn revoke_role(&mut self, caller: AccountId, account: AccountId, role: Role) -> Result<bool, EngineError> {
        self.require_role(caller, Role::Controller)?;
        Ok(self.roles.revoke(account, role))
    }

    pub fn has_role(&self, account: AccountId, role: Role) -> bool {
        self.roles.has_role(account, role)
    }

    pub(super) fn require_role(&self, account: AccountId, role: Role) -> Result<(), EngineError> {
        if self.roles.has_role(account, role) {
            Ok(())
        } else {
            Err(EngineError::Unauthorized { account, role })
        }
    }

    // 20.3: markets

    /// Registers a market. reserve and max pnl factors are copied into the store, where keepers
    /// and governance read them from then on.
    pub fn add_market(
        &mut self,
        caller: AccountId,
        index_token: TokenId,
        long_token: TokenId,
        short_token: TokenId,
        config: &MarketConfig,
    ) -> Result<MarketId, EngineError> {
        self.require_role(caller, Role::Controller)?;
        let params = config.to_params()?;
        let id = MarketId(self.next_market_id);
        self.next_market_id += 1;

        self.store.set_reserve_factor(id, Side::Long, params.reserve_factor_long);
        self.store.set_reserve_factor(id, Side::Short, params.reserve_factor_short);
        self.store.set_max_pnl_factor(id, Side::Long, params.max_pnl_factor_long);
        self.store.set_max_pnl_factor(id, Side::Short, params.max_pnl_factor_short);
        let now = self.now_secs();
        self.store.set_funding_updated_at(id, now);
        self.store.set_borrowing_updated_at(id, now);

        self.markets
            .insert(id, Market::new(id, index_token, long_token, short_token, params));
        info!(market = %id, index = %index_token, long = %long_token, short = %short_token, "market added");
        Ok(id)
    }

    pub fn market(&self, market_id: MarketId) -> Option<&Market> {
        self.markets.get(&market_id)
    }

    pub(super) fn market_cloned(&self, market_id: MarketId) -> Result<Market, EngineError> {
        self.markets
            .get(&market_id)
            .cloned()
            .ok_or(EngineError::MarketNotFound(market_id))
    }

    pub(super) fn market_prices(&self, market: &Market, oracle: &OraclePrices) -> Result<MarketPrices, EngineError> {
        Ok(MarketPrices::from_oracle(market, oracle)?)
    }

    /// Read-only view of the market store.
    pub fn store(&self) -> &DataStore {
        &self.store
    }

    /// Vault balance versus accounted buckets for one token of one market.
    pub fn pool_balance(&self, market_id: MarketId, token: TokenId) -> Result<PoolBalance, EngineError> {
        let market = self
            .markets
            .get(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;
        Ok(market::pool_balance(&self.store, market, token)?)
    }

    /// True when every backing token of every market is fully accounted for.
    pub fn is_solvent(&self) -> Result<bool, EngineError> {
        for market in self.markets.values() {
            for token in market.backing_tokens() {
                if !market::pool_balance(&self.store, market, token)?.is_balanced() {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    // 20.4: positions and orders

    pub fn position(&self, key: &PositionKey) -> Option<&Position> {
        self.positions.get(key)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn positions_for_account(&self, account: AccountId) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(move |p| p.key.account == account)
    }

    pub fn order(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    pub fn orders(&self) -> &OrderStore {
        &self.orders
    }

    // 20.5: referrals

    /// Binds `trader` to `affiliate`. only the trader may choose their referrer.
    pub fn set_referrer(
        &mut self,
        caller: AccountId,
        trader: AccountId,
        affiliate: AccountId,
    ) -> Result<(), EngineError> {
        if caller != trader {
            return Err(EngineError::NotAccountOwner { caller, account: trader });
        }
        self.referrals.set_referrer(trader, affiliate);
        Ok(())
    }

    pub fn set_referral_tier(
        &mut self,
        caller: AccountId,
        affiliate: AccountId,
        tier: ReferralTier,
    ) -> Result<(), EngineError> {
        self.require_role(caller, Role::Controller)?;
        self.referrals.set_tier(affiliate, tier);
        Ok(())
    }

    // 20.6: callbacks

    pub fn register_callback(&mut self, receiver: Box<dyn OrderCallbackReceiver>) -> CallbackId {
        let id = CallbackId(self.next_callback_id);
        self.next_callback_id += 1;
        self.callbacks.insert(id, receiver);
        id
    }

    pub fn unregister_callback(&mut self, id: CallbackId) -> bool {
        self.callbacks.remove(&id).is_some()
    }

    // 20.7: events

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;

        if self.config.verbose {
            info!(id = event.id.0, kind = event.payload.kind(), payload = ?event.payload, "event");
        } else {
            debug!(id = event.id.0, kind = event.payload.kind(), "event");
        }

        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }

    // 20.8: atomicity

    pub(super) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            store: self.store.clone(),
            positions: self.positions.clone(),
            orders: self.orders.clone(),
            next_event_id: self.next_event_id,
            transfers_len: self.transfers.len(),
        }
    }

    pub(super) fn restore(&mut self, checkpoint: Checkpoint) {
        self.store = checkpoint.store;
        self.positions = checkpoint.positions;
        self.orders = checkpoint.orders;
        let cutoff = checkpoint.next_event_id;
        self.events.retain(|e| e.id.0 < cutoff);
        self.next_event_id = cutoff;
        self.transfers.truncate(checkpoint.transfers_len);
    }

    /// Runs `action` atomically: on error all state is rolled back and the error returned.
    pub(super) fn atomic<T>(
        &mut self,
        action: impl FnOnce(&mut Self) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let checkpoint = self.checkpoint();
        match action(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.restore(checkpoint);
                Err(e)
            }
        }
    }

    // 20.9: token movements. transfers touching a market vault keep its balance key in step.

    pub(super) fn transfer(
        &mut self,
        token: TokenId,
        from: Holder,
        to: Holder,
        amount: U256,
        unwrap_native: bool,
    ) -> Result<(), EngineError> {
        if amount.is_zero() || from == to {
            return Ok(());
        }
        if let Holder::Market(market) = from {
            self.store
                .apply_delta_to_token_balance(market, token, SignedU256::negative(amount))?;
        }
        if let Holder::Market(market) = to {
            self.store
                .apply_delta_to_token_balance(market, token, SignedU256::positive(amount))?;
        }
        let unwrap_native = unwrap_native && token == self.config.native_token;
        self.transfers.push(Transfer {
            token,
            from,
            to,
            amount,
            unwrap_native,
        });
        Ok(())
    }

    pub(super) fn take_transfers(&mut self) -> Vec<Transfer> {
        std::mem::take(&mut self.transfers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixed::expand_decimals;

    const ADMIN: AccountId = AccountId(100);

    fn setup_engine() -> Engine {
        Engine::new(EngineConfig::default(), ADMIN)
    }

    #[test]
    fn add_market_seeds_store() {
        let mut engine = setup_engine();
        let config = MarketConfig::frictionless();
        let id = engine.add_market(ADMIN, TokenId(1), TokenId(1), TokenId(2), &config).unwrap();
        assert_eq!(id, MarketId(1));
        let params = config.to_params().unwrap();
        assert_eq!(engine.store().max_pnl_factor(id, Side::Long), params.max_pnl_factor_long);
        assert_eq!(engine.store().reserve_factor(id, Side::Short), params.reserve_factor_short);
    }

    #[test]
    fn only_controller_adds_markets() {
        let mut engine = setup_engine();
        let result = engine.add_market(AccountId(1), TokenId(1), TokenId(1), TokenId(2), &MarketConfig::frictionless());
        assert_eq!(
            result,
            Err(EngineError::Unauthorized {
                account: AccountId(1),
                role: Role::Controller
            })
        );
    }

    #[test]
    fn restore_rolls_back_everything() {
        let mut engine = setup_engine();
        let id = engine
            .add_market(ADMIN, TokenId(1), TokenId(1), TokenId(2), &MarketConfig::frictionless())
            .unwrap();
        let result: Result<(), EngineError> = engine.atomic(|engine| {
            engine.transfer(TokenId(1), Holder::OrderVault, Holder::Market(id), expand_decimals(1, 18), false)?;
            engine.emit_event(EventPayload::OrderCancelled(crate::events::OrderReasonEvent {
                order_id: OrderId(1),
                reason: "test".to_string(),
            }));
            Err(EngineError::EmptyPosition)
        });
        assert_eq!(result, Err(EngineError::EmptyPosition));
        assert!(engine.store().token_balance(id, TokenId(1)).is_zero());
        assert!(engine.events().is_empty());
        assert!(engine.take_transfers().is_empty());
    }

    #[test]
    fn event_log_is_capped() {
        let mut engine = Engine::new(
            EngineConfig {
                max_events: 2,
                ..EngineConfig::default()
            },
            ADMIN,
        );
        for i in 0..5 {
            engine.emit_event(EventPayload::OrderFrozen(crate::events::OrderReasonEvent {
                order_id: OrderId(i),
                reason: String::new(),
            }));
        }
        assert_eq!(engine.events().len(), 2);
        assert_eq!(engine.events()[0].id, EventId(4));
    }

    #[test]
    fn only_the_trader_sets_their_referrer() {
        let mut engine = setup_engine();
        assert_eq!(
            engine.set_referrer(AccountId(9), AccountId(2), AccountId(3)),
            Err(EngineError::NotAccountOwner {
                caller: AccountId(9),
                account: AccountId(2)
            })
        );
        assert!(engine.referrals.lookup(AccountId(2)).is_none());

        engine.set_referrer(AccountId(2), AccountId(2), AccountId(3)).unwrap();
        engine.set_referral_tier(ADMIN, AccountId(3), ReferralTier::default()).unwrap();
        assert_eq!(engine.referrals.lookup(AccountId(2)).map(|(affiliate, _)| affiliate), Some(AccountId(3)));
    }

    #[test]
    fn transfers_out_of_a_market_need_balance() {
        let mut engine = setup_engine();
        let id = engine
            .add_market(ADMIN, TokenId(1), TokenId(1), TokenId(2), &MarketConfig::frictionless())
            .unwrap();
        let result = engine.transfer(TokenId(1), Holder::Market(id), Holder::FeeReceiver, U256::one(), false);
        assert!(matches!(result, Err(EngineError::Math(_))));
    }
}
