// event.rs - Events delivered to the stream client
use futures::channel::mpsc;
use serde::Serialize;

use crate::decoder::Frame;

#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
    pub was_clean: bool,
}

#[derive(Debug)]
pub enum TransportEvent {
    Open,
    Message(Vec<u8>),
    Close(CloseFrame),
    Error(String),
}

/// Result of one asynchronous decode submission.
#[derive(Debug)]
pub struct Completion {
    /// Sequence tag of the submission, when the decoder can echo it.
    pub seq: Option<u64>,
    pub frame: Option<Frame>,
}

impl Completion {
    pub fn tagged(seq: u64, frame: Option<Frame>) -> Self {
        Self {
            seq: Some(seq),
            frame,
        }
    }

    pub fn untagged(frame: Option<Frame>) -> Self {
        Self { seq: None, frame }
    }
}

#[derive(Debug)]
pub enum ClientEvent {
    Transport { session: u64, event: TransportEvent },
    Decoded { session: u64, completion: Completion },
    Close,
}

pub type EventReceiver = mpsc::UnboundedReceiver<ClientEvent>;

pub fn channel() -> (mpsc::UnboundedSender<ClientEvent>, EventReceiver) {
    mpsc::unbounded()
}

/// Posts events on behalf of one client session.
#[derive(Clone, Debug)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<ClientEvent>,
    session: u64,
}

impl EventSender {
    pub fn new(tx: mpsc::UnboundedSender<ClientEvent>, session: u64) -> Self {
        Self { tx, session }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Returns false once the client is gone.
    pub fn transport(&self, event: TransportEvent) -> bool {
        self.tx
            .unbounded_send(ClientEvent::Transport {
                session: self.session,
                event,
            })
            .is_ok()
    }

    pub fn decoded(&self, completion: Completion) -> bool {
        self.tx
            .unbounded_send(ClientEvent::Decoded {
                session: self.session,
                completion,
            })
            .is_ok()
    }
}
