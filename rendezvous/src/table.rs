//! Reconcile arrived bytes against outstanding receive requests.
//!
//! # Design
//!
//! A [MatchingTable] keeps two ledgers keyed by [MatchKey]:
//! - `standby`: bytes that arrived before anyone asked for them.
//! - `waiting`: receive requests that asked before enough bytes arrived.
//!
//! A receive first drains `standby`; an arrival first drains `waiting`. Whichever side is in
//! deficit absorbs the other side's delta, so after any operation a key has at most one of the
//! two entries. Every stored count is greater than zero.

use crate::{
    metrics::{self, Table},
    types::Request,
    Callback, Error, MatchKey, MessageEvent, NodeId,
};
use std::collections::HashMap;
use tracing::debug;

/// Outcome of posting a receive request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    /// The request was satisfied and its callback already ran.
    Complete,

    /// The request is pending; `remaining` bytes are outstanding on its key (including any
    /// earlier requests it was merged behind).
    Waiting { remaining: u64 },
}

/// The matching state owned by a single simulated node.
pub struct MatchingTable {
    node: NodeId,

    /// Bytes that arrived but were not yet claimed.
    standby: HashMap<MatchKey, u64>,

    /// Receive requests not yet satisfied (at most one event per key).
    waiting: HashMap<MatchKey, MessageEvent>,

    /// Sums over both ledgers (wider than any single entry).
    standby_total: u128,
    waiting_total: u128,

    /// Lifetime byte totals, saturating at `u64::MAX`.
    sent: u64,
    arrived: u64,

    metrics: Table,
}

impl MatchingTable {
    /// Create an empty table for `node` with unregistered metrics.
    pub fn new(node: NodeId) -> Self {
        Self::with_metrics(node, Table::default())
    }

    pub(crate) fn with_metrics(node: NodeId, metrics: Table) -> Self {
        Self {
            node,
            standby: HashMap::new(),
            waiting: HashMap::new(),
            standby_total: 0,
            waiting_total: 0,
            sent: 0,
            arrived: 0,
            metrics,
        }
    }

    /// The node that owns this table.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Post a request for `requested` bytes on `key`.
    ///
    /// If enough bytes are already banked, `callback` runs before this returns. Otherwise the
    /// request is queued behind any earlier request on the same key and `callback` runs when
    /// later arrivals cover it.
    pub fn receive(
        &mut self,
        key: MatchKey,
        requested: u64,
        callback: Callback,
    ) -> Result<Progress, Error> {
        // Nothing to wait for
        if requested == 0 {
            self.metrics.receives.inc();
            self.complete(&key, callback);
            return Ok(Progress::Complete);
        }

        // Claim banked bytes first
        if let Some(available) = self.standby.get(&key).copied() {
            debug_assert!(!self.waiting.contains_key(&key));
            self.metrics.receives.inc();
            if available >= requested {
                if available == requested {
                    self.standby.remove(&key);
                } else {
                    self.standby.insert(key, available - requested);
                }
                self.sub_standby(requested);
                self.metrics.bytes_claimed.inc_by(requested);
                self.complete(&key, callback);
                return Ok(Progress::Complete);
            }

            // Not enough: consume everything and wait for the rest
            self.standby.remove(&key);
            let remaining = requested - available;
            self.sub_standby(available);
            self.metrics.bytes_claimed.inc_by(available);
            self.add_waiting(remaining);
            self.waiting
                .insert(key, MessageEvent::receive(&key, remaining, callback));
            debug!(
                node = self.node,
                %key,
                claimed = available,
                remaining,
                "partially satisfied receive"
            );
            return Ok(Progress::Waiting { remaining });
        }

        // Nothing banked, so queue the request
        let remaining = match self.waiting.get_mut(&key) {
            Some(event) => event
                .merge(requested, callback)
                .ok_or(Error::Overflow(key))?,
            None => {
                self.waiting
                    .insert(key, MessageEvent::receive(&key, requested, callback));
                requested
            }
        };
        self.metrics.receives.inc();
        self.add_waiting(requested);
        debug!(node = self.node, %key, requested, remaining, "waiting for bytes");
        Ok(Progress::Waiting { remaining })
    }

    /// Reconcile `bytes` that arrived on `key`.
    ///
    /// Returns the number of requests that were completed (their callbacks have run). Bytes not
    /// needed by any waiting request are banked for future receives.
    pub fn arrive(&mut self, key: MatchKey, bytes: u64) -> Result<usize, Error> {
        if bytes == 0 {
            return Ok(0);
        }

        // Bank the bytes if nobody is waiting
        let Some(event) = self.waiting.get_mut(&key) else {
            let banked = self
                .standby
                .get(&key)
                .copied()
                .unwrap_or(0)
                .checked_add(bytes)
                .ok_or(Error::Overflow(key))?;
            self.standby.insert(key, banked);
            self.record_arrived(bytes);
            self.add_standby(bytes);
            debug!(node = self.node, %key, bytes, banked, "banked bytes");
            return Ok(0);
        };

        // Feed waiting requests in the order they were issued
        let (satisfied, excess) = event.absorb(bytes);
        let remaining = event.remaining_bytes();
        if event.is_satisfied() {
            self.waiting.remove(&key);
        }
        if excess > 0 {
            debug_assert!(!self.waiting.contains_key(&key));
            debug_assert!(!self.standby.contains_key(&key));
            self.standby.insert(key, excess);
            self.add_standby(excess);
        }
        let absorbed = bytes - excess;
        self.record_arrived(bytes);
        self.metrics.bytes_claimed.inc_by(absorbed);
        self.sub_waiting(absorbed);
        debug!(
            node = self.node,
            %key,
            bytes,
            completed = satisfied.len(),
            remaining,
            excess,
            "reconciled arrival"
        );

        // Notify after the ledgers are consistent
        let completed = satisfied.len();
        for Request { callback, .. } in satisfied {
            self.complete(&key, callback);
        }
        Ok(completed)
    }

    /// Bytes banked on `key`, if any.
    pub fn standby(&self, key: &MatchKey) -> Option<u64> {
        self.standby.get(key).copied()
    }

    /// The outstanding receive on `key`, if any.
    pub fn waiting(&self, key: &MatchKey) -> Option<&MessageEvent> {
        self.waiting.get(key)
    }

    /// Bytes still needed on `key`, if any request is waiting.
    pub fn remaining(&self, key: &MatchKey) -> Option<u64> {
        self.waiting.get(key).map(MessageEvent::remaining_bytes)
    }

    /// Number of receive requests not yet satisfied.
    pub fn pending(&self) -> usize {
        self.waiting.values().map(MessageEvent::requests).sum()
    }

    /// Total bytes banked across all keys, saturating at `u64::MAX`.
    pub fn standby_bytes(&self) -> u64 {
        u64::try_from(self.standby_total).unwrap_or(u64::MAX)
    }

    /// Whether both ledgers are empty.
    pub fn is_empty(&self) -> bool {
        self.standby.is_empty() && self.waiting.is_empty()
    }

    /// Bytes this node has handed to the transport.
    pub fn bytes_sent(&self) -> u64 {
        self.sent
    }

    /// Bytes the transport has delivered to this node.
    pub fn bytes_arrived(&self) -> u64 {
        self.arrived
    }

    pub(crate) fn record_sent(&mut self, bytes: u64) {
        self.sent = self.sent.saturating_add(bytes);
        self.metrics.bytes_sent.inc_by(bytes);
    }

    fn record_arrived(&mut self, bytes: u64) {
        self.arrived = self.arrived.saturating_add(bytes);
        self.metrics.bytes_arrived.inc_by(bytes);
    }

    /// Discard all state, dropping pending callbacks without running them.
    ///
    /// Returns the number of receive requests that were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.pending();
        self.standby.clear();
        self.waiting.clear();
        self.standby_total = 0;
        self.waiting_total = 0;
        self.metrics.standby_bytes.set(0);
        self.metrics.waiting_bytes.set(0);
        discarded
    }

    fn add_standby(&mut self, bytes: u64) {
        self.standby_total += u128::from(bytes);
        self.metrics.standby_bytes.set(metrics::clamp(self.standby_total));
    }

    fn sub_standby(&mut self, bytes: u64) {
        self.standby_total -= u128::from(bytes);
        self.metrics.standby_bytes.set(metrics::clamp(self.standby_total));
    }

    fn add_waiting(&mut self, bytes: u64) {
        self.waiting_total += u128::from(bytes);
        self.metrics.waiting_bytes.set(metrics::clamp(self.waiting_total));
    }

    fn sub_waiting(&mut self, bytes: u64) {
        self.waiting_total -= u128::from(bytes);
        self.metrics.waiting_bytes.set(metrics::clamp(self.waiting_total));
    }

    fn complete(&self, key: &MatchKey, callback: Callback) {
        self.metrics.completions.inc();
        debug!(node = self.node, %key, "completed receive");
        callback.invoke();
    }
}
