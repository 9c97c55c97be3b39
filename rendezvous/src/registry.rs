//! Own one [MatchingTable] per simulated node.

use crate::{metrics::Metrics, Adapter, Arrival, Error, MatchingTable, NodeId, Transport};
use prometheus_client::registry::Registry as MetricsRegistry;
use tracing::{info, warn};

/// Configuration for a [Registry].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Number of simulated nodes (fixed for the lifetime of the registry).
    pub nodes: NodeId,
}

impl Config {
    /// Size the registry for a logical topology with the given dimensions.
    ///
    /// The number of nodes is the product of all dimensions.
    pub fn from_logical_dims(dims: &[NodeId]) -> Result<Self, Error> {
        if dims.is_empty() {
            return Err(Error::NoNodes);
        }
        let nodes = dims
            .iter()
            .try_fold(1 as NodeId, |acc, dim| acc.checked_mul(*dim))
            .ok_or(Error::TopologyOverflow)?;
        if nodes == 0 {
            return Err(Error::NoNodes);
        }
        Ok(Self { nodes })
    }
}

/// Per-node matching state plus the transport that connects the nodes.
pub struct Registry<T: Transport> {
    transport: T,
    tables: Vec<MatchingTable>,
}

impl<T: Transport> Registry<T> {
    /// Create a registry with an empty table for every node.
    pub fn new(metrics: &mut MetricsRegistry, cfg: Config, transport: T) -> Result<Self, Error> {
        if cfg.nodes == 0 {
            return Err(Error::NoNodes);
        }
        let metrics = Metrics::init(metrics);
        let tables = (0..cfg.nodes)
            .map(|node| MatchingTable::with_metrics(node, metrics.node(node)))
            .collect();
        Ok(Self { transport, tables })
    }

    /// Number of nodes in the registry.
    pub fn nodes(&self) -> NodeId {
        self.tables.len() as NodeId
    }

    /// The send/receive entry points of `node`.
    pub fn adapter(&mut self, node: NodeId) -> Result<Adapter<'_, T>, Error> {
        let nodes = self.nodes();
        let table = self
            .tables
            .get_mut(node as usize)
            .ok_or(Error::UnknownNode(node))?;
        Ok(Adapter::new(node, nodes, table, &mut self.transport))
    }

    /// The matching table owned by `node`.
    pub fn table(&self, node: NodeId) -> Option<&MatchingTable> {
        self.tables.get(node as usize)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Deliver an arrival notification to the destination node.
    ///
    /// Returns the number of receive requests it completed.
    pub fn arrive(&mut self, arrival: Arrival) -> Result<usize, Error> {
        if arrival.src >= self.nodes() {
            return Err(Error::UnknownNode(arrival.src));
        }
        let table = self
            .tables
            .get_mut(arrival.dst as usize)
            .ok_or(Error::UnknownNode(arrival.dst))?;
        table.arrive(arrival.key(), arrival.bytes)
    }

    /// Tear down the registry and summarize what every node sent and received.
    ///
    /// Pending receive requests are discarded without invoking their callbacks.
    pub fn finish(mut self) -> Report {
        let mut nodes = Vec::with_capacity(self.tables.len());
        for table in &mut self.tables {
            let node = table.node();
            let bytes_sent = table.bytes_sent();
            let bytes_arrived = table.bytes_arrived();
            let standby_bytes = table.standby_bytes();
            info!(node, bytes_sent, bytes_arrived, standby_bytes, "node finished");
            let pending = table.clear();
            if pending > 0 {
                warn!(node, pending, "discarding pending receives");
            }
            nodes.push(NodeReport {
                node,
                bytes_sent,
                bytes_arrived,
                pending,
                standby_bytes,
            });
        }
        Report { nodes }
    }
}

/// Activity of a single node over the lifetime of a [Registry].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeReport {
    pub node: NodeId,
    /// Bytes the node handed to the transport.
    pub bytes_sent: u64,
    /// Bytes the transport delivered to the node.
    pub bytes_arrived: u64,
    /// Receive requests that were still waiting at teardown.
    pub pending: usize,
    /// Bytes that arrived but were never claimed.
    pub standby_bytes: u64,
}

/// Summary returned by [Registry::finish].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub nodes: Vec<NodeReport>,
}

impl Report {
    /// Bytes sent by all nodes, saturating at `u64::MAX`.
    pub fn bytes_sent(&self) -> u64 {
        self.nodes
            .iter()
            .map(|node| node.bytes_sent)
            .fold(0, u64::saturating_add)
    }

    /// Bytes delivered to all nodes, saturating at `u64::MAX`.
    pub fn bytes_arrived(&self) -> u64 {
        self.nodes
            .iter()
            .map(|node| node.bytes_arrived)
            .fold(0, u64::saturating_add)
    }

    /// Whether every request was satisfied and every arrived byte was claimed.
    pub fn is_settled(&self) -> bool {
        self.nodes
            .iter()
            .all(|node| node.pending == 0 && node.standby_bytes == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mocks::Recorder, Callback, MatchKey, Progress};
    use commonware_macros::test_traced;
    use test_case::test_case;

    fn registry(nodes: NodeId) -> Registry<Recorder> {
        let mut metrics = MetricsRegistry::default();
        Registry::new(&mut metrics, Config { nodes }, Recorder::default()).unwrap()
    }

    #[test_case(&[4], Ok(4); "single dimension")]
    #[test_case(&[2, 4, 8], Ok(64); "three dimensions")]
    #[test_case(&[], Err(Error::NoNodes); "no dimensions")]
    #[test_case(&[4, 0], Err(Error::NoNodes); "zero dimension")]
    #[test_case(&[65536, 65536], Err(Error::TopologyOverflow); "overflow")]
    fn test_from_logical_dims(dims: &[NodeId], expected: Result<NodeId, Error>) {
        assert_eq!(
            Config::from_logical_dims(dims).map(|cfg| cfg.nodes),
            expected
        );
    }

    #[test]
    fn test_rejects_empty_registry() {
        let mut metrics = MetricsRegistry::default();
        assert!(matches!(
            Registry::new(&mut metrics, Config { nodes: 0 }, Recorder::default()),
            Err(Error::NoNodes)
        ));
    }

    #[test_traced]
    fn test_nodes_are_isolated() {
        let mut registry = registry(3);
        assert_eq!(registry.nodes(), 3);

        // Node 1 and node 2 both wait on node 0 with the same tag
        let (first, mut first_done) = Callback::oneshot();
        let (second, mut second_done) = Callback::oneshot();
        registry.adapter(1).unwrap().recv(0, 10, 4, first).unwrap();
        registry.adapter(2).unwrap().recv(0, 10, 4, second).unwrap();

        // Only node 2 gets the bytes
        let completed = registry
            .arrive(Arrival {
                tag: 4,
                src: 0,
                dst: 2,
                bytes: 10,
            })
            .unwrap();
        assert_eq!(completed, 1);
        assert_eq!(first_done.try_recv(), Ok(None));
        assert_eq!(second_done.try_recv(), Ok(Some(())));
        assert_eq!(
            registry.table(1).unwrap().remaining(&MatchKey::new(4, 0, 1)),
            Some(10)
        );
        assert!(registry.table(2).unwrap().is_empty());
    }

    #[test_traced]
    fn test_send_surfaces_through_arrivals() {
        let mut registry = registry(2);
        let (sent, mut sent_done) = Callback::oneshot();
        registry.adapter(0).unwrap().send(1, 100, 5, sent).unwrap();

        // Sending alone never banks bytes at the destination
        assert!(registry.table(1).unwrap().is_empty());

        // Play the transport: deliver the flow in two pieces
        let dispatched = registry.transport_mut().drain();
        assert_eq!(dispatched.len(), 1);
        for (flow, sent) in dispatched {
            for bytes in [40, flow.size - 40] {
                registry
                    .arrive(Arrival {
                        tag: flow.tag,
                        src: flow.src,
                        dst: flow.dst,
                        bytes,
                    })
                    .unwrap();
            }
            sent.invoke();
        }
        assert_eq!(sent_done.try_recv(), Ok(Some(())));
        assert_eq!(
            registry.table(1).unwrap().standby(&MatchKey::new(5, 0, 1)),
            Some(100)
        );

        let (callback, mut done) = Callback::oneshot();
        assert_eq!(
            registry.adapter(1).unwrap().recv(0, 100, 5, callback).unwrap(),
            Progress::Complete
        );
        assert_eq!(done.try_recv(), Ok(Some(())));
    }

    #[test]
    fn test_unknown_nodes() {
        let mut registry = registry(2);
        assert!(matches!(registry.adapter(2), Err(Error::UnknownNode(2))));
        assert!(registry.table(2).is_none());
        let arrival = Arrival {
            tag: 0,
            src: 0,
            dst: 5,
            bytes: 1,
        };
        assert_eq!(registry.arrive(arrival), Err(Error::UnknownNode(5)));
        let arrival = Arrival {
            tag: 0,
            src: 9,
            dst: 1,
            bytes: 1,
        };
        assert_eq!(registry.arrive(arrival), Err(Error::UnknownNode(9)));
    }

    #[test_traced]
    fn test_finish_reports_and_discards() {
        let mut registry = registry(2);
        registry
            .adapter(0)
            .unwrap()
            .send(1, 30, 1, Callback::noop())
            .unwrap();
        registry
            .arrive(Arrival {
                tag: 1,
                src: 0,
                dst: 1,
                bytes: 30,
            })
            .unwrap();
        registry
            .adapter(1)
            .unwrap()
            .recv(0, 20, 1, Callback::noop())
            .unwrap();
        let (callback, mut never) = Callback::oneshot();
        registry.adapter(0).unwrap().recv(1, 8, 2, callback).unwrap();

        let report = registry.finish();
        assert_eq!(
            report.nodes,
            vec![
                NodeReport {
                    node: 0,
                    bytes_sent: 30,
                    bytes_arrived: 0,
                    pending: 1,
                    standby_bytes: 0,
                },
                NodeReport {
                    node: 1,
                    bytes_sent: 0,
                    bytes_arrived: 30,
                    pending: 0,
                    standby_bytes: 10,
                },
            ]
        );
        assert_eq!(report.bytes_sent(), 30);
        assert_eq!(report.bytes_arrived(), 30);
        assert!(!report.is_settled());

        // Discarded requests never complete
        assert!(never.try_recv().is_err());
    }

    #[test_traced]
    fn test_finish_with_large_standby() {
        let mut registry = registry(2);
        for (tag, bytes) in [(1, u64::MAX), (2, 1)] {
            registry
                .arrive(Arrival {
                    tag,
                    src: 0,
                    dst: 1,
                    bytes,
                })
                .unwrap();
        }

        let report = registry.finish();
        assert_eq!(report.nodes[1].standby_bytes, u64::MAX);
        assert_eq!(report.nodes[1].bytes_arrived, u64::MAX);
        assert!(!report.is_settled());
    }

    #[test]
    fn test_report_totals_saturate() {
        let node = |node, bytes| NodeReport {
            node,
            bytes_sent: bytes,
            bytes_arrived: bytes,
            pending: 0,
            standby_bytes: 0,
        };
        let report = Report {
            nodes: vec![node(0, u64::MAX), node(1, 5)],
        };
        assert_eq!(report.bytes_sent(), u64::MAX);
        assert_eq!(report.bytes_arrived(), u64::MAX);
        assert!(report.is_settled());
    }
}
