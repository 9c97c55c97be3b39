//! Implementation of a `simulated` transport.

use super::Config;
use crate::{Arrival, Callback, Error, Flow, Registry, Transport};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::VecDeque;
use tracing::trace;

/// A flow with bytes still to deliver.
struct Pending {
    id: u64,
    flow: Flow,

    /// Bytes not yet delivered (an empty flow still delivers one empty segment).
    remaining: u64,
    sent: Callback,
}

/// The next piece of a flow, delivered as one [Arrival].
///
/// Obtained from [Fabric::peek] and handed back to [Fabric::commit] once the arrival has been
/// accepted. Until then the bytes stay queued in the fabric.
#[derive(Debug)]
pub struct Segment {
    flow: u64,
    index: usize,
    pub arrival: Arrival,
}

/// An in-memory [Transport] that delivers flows in segments.
///
/// Each in-flight flow is split lazily, one segment of at most `segment_size` bytes at a time.
/// Without `reorder` flows drain in dispatch order; with it, every segment is taken from a flow
/// drawn at random (deterministically, from `seed`), so arrivals for a key may interleave with
/// arrivals for any other key.
pub struct Fabric {
    segment_size: u64,
    reorder: bool,
    rng: StdRng,

    next_flow: u64,
    in_flight: VecDeque<Pending>,
}

impl Fabric {
    /// Create a new fabric with the given configuration.
    pub fn new(cfg: Config) -> Result<Self, Error> {
        if cfg.segment_size == 0 {
            return Err(Error::InvalidSegmentSize);
        }
        Ok(Self {
            segment_size: cfg.segment_size,
            reorder: cfg.reorder,
            rng: StdRng::seed_from_u64(cfg.seed),
            next_flow: 0,
            in_flight: VecDeque::new(),
        })
    }

    /// Number of flows not yet fully delivered.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether every dispatched flow has been fully delivered.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Select the next segment to deliver without removing it.
    pub fn peek(&mut self) -> Option<Segment> {
        let index = if self.reorder && self.in_flight.len() > 1 {
            self.rng.gen_range(0..self.in_flight.len())
        } else {
            0
        };
        let pending = self.in_flight.get(index)?;
        Some(Segment {
            flow: pending.id,
            index,
            arrival: Arrival {
                tag: pending.flow.tag,
                src: pending.flow.src,
                dst: pending.flow.dst,
                bytes: pending.remaining.min(self.segment_size),
            },
        })
    }

    /// Remove a delivered segment from its flow.
    ///
    /// Returns the flow's send callback if this was its last segment (the caller should invoke
    /// it). Committing a segment whose flow is no longer in flight does nothing.
    pub fn commit(&mut self, segment: Segment) -> Option<Callback> {
        let index = match self.in_flight.get(segment.index) {
            Some(pending) if pending.id == segment.flow => segment.index,
            _ => self
                .in_flight
                .iter()
                .position(|pending| pending.id == segment.flow)?,
        };
        let pending = self.in_flight.get_mut(index)?;
        let bytes = segment.arrival.bytes.min(pending.remaining);
        pending.remaining -= bytes;
        let last = pending.remaining == 0;
        trace!(
            flow = segment.flow,
            tag = segment.arrival.tag,
            src = segment.arrival.src,
            dst = segment.arrival.dst,
            bytes,
            last,
            "delivered segment"
        );
        if !last {
            return None;
        }
        self.in_flight.remove(index).map(|pending| pending.sent)
    }

    /// Deliver the next segment without waiting for it to be accepted.
    ///
    /// Returns the resulting arrival and, if this was the last segment of its flow, the flow's
    /// send callback.
    pub fn poll(&mut self) -> Option<(Arrival, Option<Callback>)> {
        let segment = self.peek()?;
        let arrival = segment.arrival;
        Some((arrival, self.commit(segment)))
    }
}

impl Transport for Fabric {
    fn dispatch(&mut self, flow: Flow, sent: Callback) {
        let id = self.next_flow;
        self.next_flow += 1;
        trace!(flow = id, size = flow.size, "queued flow");
        self.in_flight.push_back(Pending {
            id,
            flow,
            remaining: flow.size,
            sent,
        });
    }
}

impl Registry<Fabric> {
    /// Deliver every in-flight segment to its destination node.
    ///
    /// Returns the number of receive requests completed. If a destination rejects an arrival,
    /// the error is returned and the rejected segment stays in flight (its flow's send callback
    /// is kept until the flow is fully delivered).
    pub fn settle(&mut self) -> Result<usize, Error> {
        let mut completed = 0;
        while let Some(segment) = self.transport_mut().peek() {
            completed += self.arrive(segment.arrival)?;
            if let Some(sent) = self.transport_mut().commit(segment) {
                sent.invoke();
            }
        }
        Ok(completed)
    }
}
