use crate::NodeId;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

/// Label for per-node metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct Node {
    pub node: NodeId,
}

/// Metrics for the [Registry](crate::Registry).
#[derive(Default)]
pub struct Metrics {
    /// Bytes handed to the transport by each node
    pub bytes_sent: Family<Node, Counter>,
    /// Bytes delivered to each node by the transport
    pub bytes_arrived: Family<Node, Counter>,
    /// Bytes consumed by satisfied receive requests
    pub bytes_claimed: Family<Node, Counter>,
    /// Receive requests posted
    pub receives: Family<Node, Counter>,
    /// Receive requests completed
    pub completions: Family<Node, Counter>,
    /// Bytes arrived but not yet claimed
    pub standby_bytes: Family<Node, Gauge>,
    /// Bytes requested but not yet arrived
    pub waiting_bytes: Family<Node, Gauge>,
}

impl Metrics {
    /// Create and return a new set of metrics, registered with the given registry.
    pub fn init(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "bytes_sent",
            "Bytes handed to the transport by each node",
            metrics.bytes_sent.clone(),
        );
        registry.register(
            "bytes_arrived",
            "Bytes delivered to each node by the transport",
            metrics.bytes_arrived.clone(),
        );
        registry.register(
            "bytes_claimed",
            "Bytes consumed by satisfied receive requests",
            metrics.bytes_claimed.clone(),
        );
        registry.register(
            "receives",
            "Receive requests posted",
            metrics.receives.clone(),
        );
        registry.register(
            "completions",
            "Receive requests completed",
            metrics.completions.clone(),
        );
        registry.register(
            "standby_bytes",
            "Bytes arrived but not yet claimed",
            metrics.standby_bytes.clone(),
        );
        registry.register(
            "waiting_bytes",
            "Bytes requested but not yet arrived",
            metrics.waiting_bytes.clone(),
        );
        metrics
    }

    /// Handles for a single node, sharing state with the registered families.
    pub fn node(&self, node: NodeId) -> Table {
        let label = Node { node };
        Table {
            bytes_sent: self.bytes_sent.get_or_create(&label).clone(),
            bytes_arrived: self.bytes_arrived.get_or_create(&label).clone(),
            bytes_claimed: self.bytes_claimed.get_or_create(&label).clone(),
            receives: self.receives.get_or_create(&label).clone(),
            completions: self.completions.get_or_create(&label).clone(),
            standby_bytes: self.standby_bytes.get_or_create(&label).clone(),
            waiting_bytes: self.waiting_bytes.get_or_create(&label).clone(),
        }
    }
}

/// Metrics for a single [MatchingTable](crate::MatchingTable).
///
/// A table created on its own gets unregistered handles.
#[derive(Clone, Default)]
pub struct Table {
    pub bytes_sent: Counter,
    pub bytes_arrived: Counter,
    pub bytes_claimed: Counter,
    pub receives: Counter,
    pub completions: Counter,
    pub standby_bytes: Gauge,
    pub waiting_bytes: Gauge,
}

/// Convert a byte total into a gauge value, saturating at `i64::MAX`.
pub fn clamp(total: u128) -> i64 {
    i64::try_from(total).unwrap_or(i64::MAX)
}
