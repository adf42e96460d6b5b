use std::rc::Rc;

use log::{debug, error, info, warn};

use super::raw::rawvideo_codecs;
use super::worker::DecodeWorker;
use super::{CodecFactory, DecodeOptions, Decoder, Frame, FrameDecoder};
use crate::error::DecodeError;
use crate::event::{Completion, EventSender};
use crate::packet::Packet;
use crate::types::{MediaType, StreamInfo};
use crate::utils::{BufferHandle, DecoderMemory, FramePool, HeapMemory};

enum Engine {
    Inline(Box<dyn FrameDecoder>),
    Worker(DecodeWorker),
}

struct OpenStream {
    info: StreamInfo,
    engine: Engine,
    events: EventSender,
    from_key_frame: bool,
}

/// In-process decoder: parses wire packets out of its own heap and feeds
/// the video sub-stream to a codec built by `codecs`.
pub struct StreamDecoder {
    memory: Rc<HeapMemory>,
    codecs: CodecFactory,
    open: Option<OpenStream>,
}

impl StreamDecoder {
    pub fn new(memory: Rc<HeapMemory>, codecs: CodecFactory) -> Self {
        Self {
            memory,
            codecs,
            open: None,
        }
    }

    /// A decoder that understands `rawvideo` streams only.
    pub fn rawvideo() -> Self {
        Self::new(Rc::new(HeapMemory::new()), rawvideo_codecs(FramePool::new(4)))
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn info(&self) -> Option<&StreamInfo> {
        self.open.as_ref().map(|open| &open.info)
    }

    pub fn heap(&self) -> &Rc<HeapMemory> {
        &self.memory
    }

    fn read_packet(&self, buffer: BufferHandle, len: usize) -> Result<Packet, DecodeError> {
        let packet = self.memory.read(buffer, len, Packet::decode)??;
        debug!(
            "decode packet type={}, size={}",
            packet.media_type.as_str(),
            packet.data.len()
        );
        Ok(packet)
    }
}

impl OpenStream {
    /// False when the packet must not reach the codec.
    fn admit(&mut self, packet: &Packet) -> bool {
        if packet.media_type != MediaType::Video {
            debug!(
                "decode packet ignored, media type not support at present, type={}",
                packet.media_type.as_str()
            );
            return false;
        }
        if !self.from_key_frame {
            if !packet.is_key() {
                debug!("decode packet ignored, wait key for the first one");
                return false;
            }
            self.from_key_frame = true;
        }
        true
    }
}

impl Decoder for StreamDecoder {
    fn open(
        &mut self,
        stream: &str,
        options: &DecodeOptions,
        events: EventSender,
    ) -> Result<(), DecodeError> {
        self.close();
        debug!("decoder open: {stream}");
        let info = StreamInfo::from_json(stream)?;

        let mut codec = None;
        for (kind, par) in info.subs() {
            match kind {
                MediaType::Video => codec = Some(((self.codecs)(par, &options.codec)?, par)),
                other => warn!(
                    "Stream[{}] media type not support at present, type={}",
                    info.id,
                    other.as_str()
                ),
            }
        }
        let (codec, par) = codec.ok_or(DecodeError::NoVideoStream)?;

        let engine = if options.asynchronous {
            match DecodeWorker::spawn(codec, options.queue_size as usize, events.clone()) {
                Ok(worker) => Engine::Worker(worker),
                Err(err) => {
                    warn!("decode worker unavailable ({err}), decoding inline");
                    Engine::Inline((self.codecs)(par, &options.codec)?)
                }
            }
        } else {
            Engine::Inline(codec)
        };

        info!("decoder opened stream {}", info.id);
        self.open = Some(OpenStream {
            info,
            engine,
            events,
            from_key_frame: false,
        });
        Ok(())
    }

    fn memory(&self) -> Rc<dyn DecoderMemory> {
        self.memory.clone()
    }

    fn decode(&mut self, buffer: BufferHandle, len: usize) -> Result<Option<Frame>, DecodeError> {
        if self.open.is_none() {
            return Err(DecodeError::NotOpen);
        }
        let packet = self.read_packet(buffer, len)?;
        let open = self.open.as_mut().ok_or(DecodeError::NotOpen)?;
        if !open.admit(&packet) {
            return Ok(None);
        }
        match &mut open.engine {
            Engine::Inline(codec) => codec.decode_packet(&packet),
            Engine::Worker(_) => Err(DecodeError::Unsupported(
                "synchronous decode on an asynchronous decoder",
            )),
        }
    }

    fn decode_async(
        &mut self,
        seq: u64,
        buffer: BufferHandle,
        len: usize,
    ) -> Result<(), DecodeError> {
        if self.open.is_none() {
            return Err(DecodeError::NotOpen);
        }
        let packet = self.read_packet(buffer, len)?;
        let open = self.open.as_mut().ok_or(DecodeError::NotOpen)?;
        if !open.admit(&packet) {
            open.events.decoded(Completion::tagged(seq, None));
            return Ok(());
        }
        match &mut open.engine {
            Engine::Worker(worker) => worker.submit(seq, packet),
            Engine::Inline(codec) => {
                let frame = codec.decode_packet(&packet).unwrap_or_else(|err| {
                    error!("decode packet failed: {err}");
                    None
                });
                open.events.decoded(Completion::tagged(seq, frame));
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(open) = self.open.take() {
            // dropping the worker joins its thread
            drop(open.engine);
            debug!("decoder closed stream {}", open.info.id);
        }
    }
}

impl Drop for StreamDecoder {
    fn drop(&mut self) {
        self.close();
    }
}
