// 16.0 callback.rs: order lifecycle hooks. integrators register a receiver and reference it
// from an order; the engine calls it once the order is finalized, after every state change
// and transfer of that execution has been computed. receivers only get read-only views.

use crate::order::Order;
use crate::transfer::Transfer;
use crate::types::OrderId;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CallbackId(pub u64);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "callback#{}", self.0)
    }
}

pub trait OrderCallbackReceiver: fmt::Debug {
    fn after_order_execution(&mut self, _order: &Order, _transfers: &[Transfer]) {}

    fn after_order_cancellation(&mut self, _order: &Order, _reason: &str) {}

    fn after_order_frozen(&mut self, _order: &Order, _reason: &str) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackCall {
    Executed { order_id: OrderId, transfer_count: usize },
    Cancelled { order_id: OrderId, reason: String },
    Frozen { order_id: OrderId, reason: String },
}

/// Receiver that records every call into a shared log. clone the receiver before registering
/// it to keep a handle on the log.
#[derive(Debug, Default, Clone)]
pub struct RecordingCallback {
    calls: Rc<RefCell<Vec<CallbackCall>>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<CallbackCall> {
        self.calls.borrow().clone()
    }
}

impl OrderCallbackReceiver for RecordingCallback {
    fn after_order_execution(&mut self, order: &Order, transfers: &[Transfer]) {
        self.calls.borrow_mut().push(CallbackCall::Executed {
            order_id: order.id,
            transfer_count: transfers.len(),
        });
    }

    fn after_order_cancellation(&mut self, order: &Order, reason: &str) {
        self.calls.borrow_mut().push(CallbackCall::Cancelled {
            order_id: order.id,
            reason: reason.to_string(),
        });
    }

    fn after_order_frozen(&mut self, order: &Order, reason: &str) {
        self.calls.borrow_mut().push(CallbackCall::Frozen {
            order_id: order.id,
            reason: reason.to_string(),
        });
    }
}
