use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, warn};
use parking_lot::{Condvar, Mutex};

use super::queue::PacketQueue;
use super::FrameDecoder;
use crate::event::{Completion, EventSender};
use crate::packet::Packet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerStatus {
    Running = 0,
    Stopping = 1,
    Stopped = 2,
}

impl WorkerStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerStatus::Running,
            1 => WorkerStatus::Stopping,
            _ => WorkerStatus::Stopped,
        }
    }
}

struct Shared {
    queue: Mutex<PacketQueue>,
    cond: Condvar,
    status: AtomicU8,
}

impl Shared {
    fn status(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.status.load(Ordering::SeqCst))
    }
}

/// Decodes queued packets on a background thread.
///
/// Every submitted sequence tag gets exactly one completion: a frame, `None`
/// for packets that produced nothing, failed, or were dropped on overflow.
/// Packets still queued when the worker stops are discarded silently.
pub struct DecodeWorker {
    shared: Arc<Shared>,
    events: EventSender,
    handle: Option<JoinHandle<()>>,
}

impl DecodeWorker {
    pub fn spawn(
        codec: Box<dyn FrameDecoder>,
        queue_size: usize,
        events: EventSender,
    ) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(PacketQueue::new(queue_size)),
            cond: Condvar::new(),
            status: AtomicU8::new(WorkerStatus::Running as u8),
        });

        let handle = thread::Builder::new().name("stream-decode".into()).spawn({
            let shared = shared.clone();
            let events = events.clone();
            move || run(shared, codec, events)
        })?;

        Ok(Self {
            shared,
            events,
            handle: Some(handle),
        })
    }

    pub fn status(&self) -> WorkerStatus {
        self.shared.status()
    }

    pub fn submit(&self, seq: u64, packet: Packet) {
        if self.status() != WorkerStatus::Running {
            self.events.decoded(Completion::tagged(seq, None));
            return;
        }
        let dropped = self.shared.queue.lock().push(seq, packet);
        if let Some(dropped) = dropped {
            warn!("decode eldest data (not key packet) ignored, as queue is full");
            self.events.decoded(Completion::tagged(dropped, None));
        }
        self.shared.cond.notify_one();
    }

    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.shared
            .status
            .store(WorkerStatus::Stopping as u8, Ordering::SeqCst);
        {
            // Taking the lock orders the store before the worker's next wait.
            let _queue = self.shared.queue.lock();
            self.shared.cond.notify_all();
        }
        if handle.join().is_err() {
            error!("decode worker panicked");
        }
        self.shared
            .status
            .store(WorkerStatus::Stopped as u8, Ordering::SeqCst);
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(shared: Arc<Shared>, mut codec: Box<dyn FrameDecoder>, events: EventSender) {
    debug!("decode worker started");
    loop {
        let batch = {
            let mut queue = shared.queue.lock();
            while queue.is_empty() && shared.status() == WorkerStatus::Running {
                shared.cond.wait(&mut queue);
            }
            if shared.status() != WorkerStatus::Running {
                break;
            }
            queue.drain()
        };

        for item in batch {
            if shared.status() != WorkerStatus::Running {
                break;
            }
            let frame = match codec.decode_packet(&item.packet) {
                Ok(Some(frame)) => Some(frame),
                Ok(None) => {
                    debug!("decode frame is null, need new packets");
                    None
                }
                Err(err) => {
                    error!("decode packet failed: {err}");
                    None
                }
            };
            if !events.decoded(Completion::tagged(item.seq, frame)) {
                debug!("decode worker lost its client");
            }
        }
    }
    debug!("decode worker stopped");
}
