use crate::{Callback, Error, Flow, MatchKey, MatchingTable, NodeId, Progress, Tag, Transport};
use tracing::debug;

/// Send and receive entry points of a single simulated node.
///
/// Obtained from [Registry::adapter](crate::Registry::adapter). The adapter borrows the node's
/// [MatchingTable] and the shared [Transport] for as long as it is held.
pub struct Adapter<'a, T: Transport> {
    rank: NodeId,
    nodes: NodeId,
    table: &'a mut MatchingTable,
    transport: &'a mut T,
}

impl<'a, T: Transport> Adapter<'a, T> {
    pub(crate) fn new(
        rank: NodeId,
        nodes: NodeId,
        table: &'a mut MatchingTable,
        transport: &'a mut T,
    ) -> Self {
        Self {
            rank,
            nodes,
            table,
            transport,
        }
    }

    /// The node this adapter acts for.
    pub fn rank(&self) -> NodeId {
        self.rank
    }

    /// Send `size` bytes tagged `tag` to `dst`.
    ///
    /// The flow is handed to the transport and this returns immediately. `sent` is invoked by
    /// the transport once the flow has been sent. The matching table is not touched: the bytes
    /// only count towards `dst`'s receives once the transport reports their arrival.
    pub fn send(&mut self, dst: NodeId, size: u64, tag: Tag, sent: Callback) -> Result<(), Error> {
        self.check(dst)?;
        let flow = Flow {
            src: self.rank,
            dst,
            tag,
            size,
        };
        self.table.record_sent(size);
        debug!(src = flow.src, dst, tag, size, "dispatching flow");
        self.transport.dispatch(flow, sent);
        Ok(())
    }

    /// Receive `size` bytes tagged `tag` from `src`.
    ///
    /// Returns [Progress::Complete] if `callback` already ran (the bytes had arrived), otherwise
    /// the request waits for future arrivals.
    pub fn recv(
        &mut self,
        src: NodeId,
        size: u64,
        tag: Tag,
        callback: Callback,
    ) -> Result<Progress, Error> {
        self.check(src)?;
        let key = MatchKey::new(tag, src, self.rank);
        self.table.receive(key, size, callback)
    }

    fn check(&self, peer: NodeId) -> Result<(), Error> {
        if peer >= self.nodes {
            return Err(Error::UnknownNode(peer));
        }
        Ok(())
    }
}
