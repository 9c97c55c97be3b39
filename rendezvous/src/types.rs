//! Entities shared by the ledgers.

use crate::{Callback, NodeId, Tag};
use std::{collections::VecDeque, fmt};

/// Identifies a matching bucket.
///
/// A send and its matching receive name the same `(tag, src, dst)`. Keys only match when all
/// three fields are equal (there is no wildcard).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchKey {
    pub tag: Tag,
    pub src: NodeId,
    pub dst: NodeId,
}

impl MatchKey {
    pub const fn new(tag: Tag, src: NodeId, dst: NodeId) -> Self {
        Self { tag, src, dst }
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tag={} src={} dst={}", self.tag, self.src, self.dst)
    }
}

/// Which side of a rendezvous an event was issued by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

/// A single receive request queued behind a [MessageEvent].
pub(crate) struct Request {
    /// Bytes this request still needs.
    pub(crate) remaining: u64,

    /// Invoked once `remaining` reaches zero.
    pub(crate) callback: Callback,
}

/// An outstanding receive on one [MatchKey].
///
/// Back-to-back receives on the same key are merged into one event: `remaining_bytes` grows by
/// each new request, and the request is queued behind the earlier ones so that every caller's
/// callback is kept. Arrivals are applied to queued requests in the order they were issued.
pub struct MessageEvent {
    src: NodeId,
    dst: NodeId,
    direction: Direction,

    /// Sum of `remaining` over all queued requests (always greater than zero while stored).
    remaining_bytes: u64,
    requests: VecDeque<Request>,
}

impl MessageEvent {
    pub(crate) fn receive(key: &MatchKey, remaining: u64, callback: Callback) -> Self {
        let mut requests = VecDeque::with_capacity(1);
        requests.push_back(Request {
            remaining,
            callback,
        });
        Self {
            src: key.src,
            dst: key.dst,
            direction: Direction::Receive,
            remaining_bytes: remaining,
            requests,
        }
    }

    pub fn src(&self) -> NodeId {
        self.src
    }

    pub fn dst(&self) -> NodeId {
        self.dst
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Bytes still needed before every queued request is satisfied.
    pub fn remaining_bytes(&self) -> u64 {
        self.remaining_bytes
    }

    /// Number of receive requests merged into this event.
    pub fn requests(&self) -> usize {
        self.requests.len()
    }

    /// Append another request to the event.
    ///
    /// Returns `None` (leaving the event unchanged) if the total would overflow.
    pub(crate) fn merge(&mut self, remaining: u64, callback: Callback) -> Option<u64> {
        let total = self.remaining_bytes.checked_add(remaining)?;
        self.remaining_bytes = total;
        self.requests.push_back(Request {
            remaining,
            callback,
        });
        Some(total)
    }

    /// Apply `bytes` to the queued requests, oldest first.
    ///
    /// Returns the requests that were satisfied (in issue order) and the bytes left over once
    /// every request was satisfied. Excess is only returned when the event is drained.
    pub(crate) fn absorb(&mut self, mut bytes: u64) -> (Vec<Request>, u64) {
        let mut satisfied = Vec::new();
        while bytes > 0 {
            let Some(front) = self.requests.front_mut() else {
                break;
            };
            if front.remaining > bytes {
                front.remaining -= bytes;
                self.remaining_bytes -= bytes;
                bytes = 0;
                break;
            }
            bytes -= front.remaining;
            self.remaining_bytes -= front.remaining;
            if let Some(request) = self.requests.pop_front() {
                satisfied.push(request);
            }
        }
        (satisfied, bytes)
    }

    pub(crate) fn is_satisfied(&self) -> bool {
        self.requests.is_empty()
    }
}

impl fmt::Debug for MessageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEvent")
            .field("src", &self.src)
            .field("dst", &self.dst)
            .field("direction", &self.direction)
            .field("remaining_bytes", &self.remaining_bytes)
            .field("requests", &self.requests.len())
            .finish()
    }
}
