//! Deliver flows between nodes in memory, in configurable segments and order.
//!
//! The [Fabric] models no timing or bandwidth: it only decides how a flow's bytes are split into
//! arrival notifications and in which order those notifications are delivered. This is enough to
//! exercise partial and out-of-order delivery against the matching tables.

mod fabric;
pub use fabric::{Fabric, Segment};

/// Configuration for a [Fabric].
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum number of bytes delivered by a single arrival.
    pub segment_size: u64,

    /// Whether segments of in-flight flows are delivered in random order.
    pub reorder: bool,

    /// Seed for the delivery order (only used if `reorder` is set).
    pub seed: u64,
}
