pub mod frame;
pub mod queue;
pub mod raw;
pub mod stream;
pub mod worker;

use std::rc::Rc;

use serde::Deserialize;

pub use frame::{Frame, PixelFormat, PlaneLayout};
pub use queue::{PacketQueue, ReorderBuffer};
pub use raw::RawVideoDecoder;
pub use stream::StreamDecoder;
pub use worker::DecodeWorker;

use crate::error::DecodeError;
use crate::event::EventSender;
use crate::packet::Packet;
use crate::types::CodecParameters;
use crate::utils::{BufferHandle, DecoderMemory};

/// Codec threading mode, forwarded to the codec untouched.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(from = "u32")]
pub enum ThreadType {
    #[default]
    Auto,
    /// Decode more than one frame at once.
    Frame,
    /// Decode more than one part of a single frame at once.
    Slice,
}

impl ThreadType {
    pub fn code(self) -> u32 {
        match self {
            ThreadType::Auto => 0,
            ThreadType::Frame => 1,
            ThreadType::Slice => 2,
        }
    }
}

impl From<u32> for ThreadType {
    fn from(code: u32) -> Self {
        match code {
            1 => ThreadType::Frame,
            2 => ThreadType::Slice,
            _ => ThreadType::Auto,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CodecOptions {
    pub thread_count: u32,
    pub thread_type: ThreadType,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    pub asynchronous: bool,
    pub queue_size: u32,
    pub codec: CodecOptions,
}

/// The decoder as seen by the stream client.
///
/// Implemented by [`StreamDecoder`] natively and by an adapter over the
/// emscripten decoder module in the browser.
pub trait Decoder {
    /// Opens the stream described by `stream` (JSON). Asynchronous
    /// completions are posted through `events`.
    fn open(
        &mut self,
        stream: &str,
        options: &DecodeOptions,
        events: EventSender,
    ) -> Result<(), DecodeError>;

    /// Memory that [`Decoder::decode`] reads its input from.
    fn memory(&self) -> Rc<dyn DecoderMemory>;

    /// Decodes one packet inline. `Ok(None)` means more data is needed.
    fn decode(&mut self, buffer: BufferHandle, len: usize) -> Result<Option<Frame>, DecodeError>;

    /// Submits one packet. Exactly one completion tagged `seq` follows,
    /// unless the decoder cannot echo tags.
    fn decode_async(&mut self, seq: u64, buffer: BufferHandle, len: usize)
        -> Result<(), DecodeError>;

    /// Whether completions carry the `seq` given to [`Decoder::decode_async`].
    /// Untagged completions are presented as they arrive.
    fn tags_completions(&self) -> bool {
        true
    }

    fn close(&mut self);
}

/// A codec turning compressed packets into pictures.
pub trait FrameDecoder: Send {
    fn decode_packet(&mut self, packet: &Packet) -> Result<Option<Frame>, DecodeError>;
}

pub type CodecFactory =
    Box<dyn Fn(&CodecParameters, &CodecOptions) -> Result<Box<dyn FrameDecoder>, DecodeError>>;
