use std::collections::{BTreeMap, VecDeque};

use super::frame::Frame;
use crate::packet::Packet;
use crate::utils::Metrics;

pub struct QueuedPacket {
    pub seq: u64,
    pub packet: Packet,
}

/// Bounded input queue of the decode worker.
///
/// When full, the eldest non-key packet is dropped; key packets are never
/// dropped, so the queue may exceed `max_size` if it holds only keys.
pub struct PacketQueue {
    input_queue: VecDeque<QueuedPacket>,
    max_size: usize,
    metrics: Metrics,
}

impl PacketQueue {
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(2);
        Self {
            input_queue: VecDeque::with_capacity(max_size + 1),
            max_size,
            metrics: Metrics::new(),
        }
    }

    /// Queues `packet`, returning the sequence tag of a dropped packet.
    pub fn push(&mut self, seq: u64, packet: Packet) -> Option<u64> {
        self.input_queue.push_back(QueuedPacket { seq, packet });
        self.metrics.record_queue_size(self.input_queue.len());
        if self.input_queue.len() <= self.max_size {
            return None;
        }
        let eldest = self.input_queue.iter().position(|q| !q.packet.is_key())?;
        self.input_queue.remove(eldest).map(|q| q.seq)
    }

    pub fn drain(&mut self) -> Vec<QueuedPacket> {
        self.input_queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.input_queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_queue.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

/// Releases tagged decode results in submission order.
#[derive(Default)]
pub struct ReorderBuffer {
    next: u64,
    pending: BTreeMap<u64, Option<Frame>>,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts the result for `seq` and returns every result now in order.
    pub fn push(&mut self, seq: u64, frame: Option<Frame>) -> Vec<Option<Frame>> {
        if seq < self.next {
            return Vec::new();
        }
        self.pending.insert(seq, frame);
        let mut ready = Vec::new();
        while let Some(frame) = self.pending.remove(&self.next) {
            ready.push(frame);
            self.next += 1;
        }
        ready
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
