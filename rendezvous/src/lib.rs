//! Match receive requests against arrived bytes in a simulated training network.
//!
//! # Overview
//!
//! Each simulated node owns a [MatchingTable] with two ledgers:
//! - a standby ledger of bytes that have arrived but were not yet claimed, and
//! - a waiting ledger of receive requests that are not yet satisfied.
//!
//! Sends are handed to an external [Transport] and never touch the table. The transport later
//! reports delivered bytes through [Registry::arrive]. Whichever side of a [MatchKey] is in
//! deficit absorbs the other side's bytes, and a request's [Callback] fires the moment the
//! cumulative supply for its key covers it.
//!
//! # Example
//!
//! ```rust
//! use rendezvous::{registry, simulated, Callback, Registry};
//!
//! let mut metrics = prometheus_client::registry::Registry::default();
//! let fabric = simulated::Fabric::new(simulated::Config {
//!     segment_size: 64,
//!     reorder: true,
//!     seed: 42,
//! })
//! .unwrap();
//! let mut registry = Registry::new(&mut metrics, registry::Config { nodes: 2 }, fabric).unwrap();
//!
//! // Node 1 asks for 100 bytes from node 0 before anything was sent
//! let (callback, mut done) = Callback::oneshot();
//! registry.adapter(1).unwrap().recv(0, 100, 7, callback).unwrap();
//!
//! // Node 0 sends them and the transport delivers every segment
//! registry.adapter(0).unwrap().send(1, 100, 7, Callback::noop()).unwrap();
//! registry.settle().unwrap();
//! assert_eq!(done.try_recv(), Ok(Some(())));
//! ```

use thiserror::Error;

mod adapter;
pub use adapter::Adapter;
mod callback;
pub use callback::Callback;
mod metrics;
pub mod registry;
pub use registry::{Registry, Report};
pub mod simulated;
mod table;
pub use table::{MatchingTable, Progress};
mod types;
pub use types::{Direction, MatchKey, MessageEvent};

#[cfg(test)]
pub mod mocks;

/// Identifier of a simulated node.
pub type NodeId = u32;

/// Tag distinguishing logical messages between the same pair of nodes.
pub type Tag = u64;

/// Errors that can occur when interacting with the matching layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("byte count overflow: {0}")]
    Overflow(MatchKey),
    #[error("registry requires at least one node")]
    NoNodes,
    #[error("logical topology exceeds the maximum number of nodes")]
    TopologyOverflow,
    #[error("segment size must be greater than zero")]
    InvalidSegmentSize,
}

/// A request to move `size` bytes from `src` to `dst` under `tag`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Flow {
    pub src: NodeId,
    pub dst: NodeId,
    pub tag: Tag,
    pub size: u64,
}

/// Notification that `bytes` tagged `tag` from `src` arrived at `dst`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Arrival {
    pub tag: Tag,
    pub src: NodeId,
    pub dst: NodeId,
    pub bytes: u64,
}

impl Arrival {
    /// The key of the ledger entries this arrival reconciles against.
    pub fn key(&self) -> MatchKey {
        MatchKey::new(self.tag, self.src, self.dst)
    }
}

/// Moves flows between simulated nodes.
///
/// Implementations must eventually surface every dispatched byte as an [Arrival] (in any
/// segmentation and any order) keyed with the flow's `tag`, `src` and `dst`. They must not
/// assume `dispatch` populates any ledger synchronously.
pub trait Transport {
    /// Accept a flow for delivery and return immediately.
    ///
    /// `sent` is invoked once the transport has finished sending the flow.
    fn dispatch(&mut self, flow: Flow, sent: Callback);
}
