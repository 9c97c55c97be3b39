//! Transports for testing the entry points in isolation.

use crate::{Callback, Flow, Transport};

/// A [Transport] that records every dispatched flow and never delivers anything.
#[derive(Default)]
pub struct Recorder {
    dispatched: Vec<(Flow, Callback)>,
}

impl Recorder {
    /// Flows dispatched so far, in order.
    pub fn flows(&self) -> Vec<Flow> {
        self.dispatched.iter().map(|(flow, _)| *flow).collect()
    }

    /// Take every dispatched flow along with its send callback.
    pub fn drain(&mut self) -> Vec<(Flow, Callback)> {
        std::mem::take(&mut self.dispatched)
    }
}

impl Transport for Recorder {
    fn dispatch(&mut self, flow: Flow, sent: Callback) {
        self.dispatched.push((flow, sent));
    }
}
