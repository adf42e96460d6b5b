// client.rs - WebSocket stream client: socket lifecycle and decode hand-off
use std::rc::Rc;

use futures::channel::mpsc::UnboundedSender;
use log::{debug, error, Level};
use serde::Deserialize;
use serde_json::Value;

use crate::decoder::{CodecOptions, DecodeOptions, Decoder, Frame, ReorderBuffer, ThreadType};
use crate::error::{ClientError, ConfigError};
use crate::event::{
    self, ClientEvent, CloseFrame, Completion, EventReceiver, EventSender, TransportEvent,
};
use crate::render::FrameRenderer;
use crate::transport::{Connection, Connector};
use crate::utils::{now_ms, Metrics, TransferBuffer};

/// Client configuration. Every field may be given at construction and
/// overridden at [`StreamClient::open`].
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct ClientOptions {
    /// Required on open.
    pub url: Option<String>,
    /// Required on open.
    pub stream: Option<Value>,
    pub decode_async: bool,
    pub decode_queue_size: u32,
    pub decode_thread_count: u32,
    /// 1: frame threading, 2: slice threading.
    pub decode_thread_type: ThreadType,
    pub dbg: bool,
}

/// Partial [`ClientOptions`]; present fields win when merged.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct OptionsPatch {
    pub url: Option<String>,
    pub stream: Option<Value>,
    pub decode_async: Option<bool>,
    pub decode_queue_size: Option<u32>,
    pub decode_thread_count: Option<u32>,
    pub decode_thread_type: Option<ThreadType>,
    pub dbg: Option<bool>,
}

impl OptionsPatch {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn with_stream(mut self, stream: Value) -> Self {
        self.stream = Some(stream);
        self
    }
}

impl ClientOptions {
    pub fn merged(&self, patch: OptionsPatch) -> ClientOptions {
        ClientOptions {
            url: patch.url.or_else(|| self.url.clone()),
            stream: patch.stream.or_else(|| self.stream.clone()),
            decode_async: patch.decode_async.unwrap_or(self.decode_async),
            decode_queue_size: patch.decode_queue_size.unwrap_or(self.decode_queue_size),
            decode_thread_count: patch.decode_thread_count.unwrap_or(self.decode_thread_count),
            decode_thread_type: patch.decode_thread_type.unwrap_or(self.decode_thread_type),
            dbg: patch.dbg.unwrap_or(self.dbg),
        }
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            asynchronous: self.decode_async,
            queue_size: self.decode_queue_size,
            codec: CodecOptions {
                thread_count: self.decode_thread_count,
                thread_type: self.decode_thread_type,
            },
        }
    }
}

/// What the data callback receives: a decoded frame, or the raw payload
/// when no decoder is configured.
#[derive(Debug, Clone, Copy)]
pub enum StreamData<'a> {
    Frame(&'a Frame),
    Bytes(&'a [u8]),
}

pub type LogSink = Rc<dyn Fn(Level, &str)>;
pub type DecoderFactory = Box<dyn FnMut() -> Box<dyn Decoder>>;

#[derive(Default)]
pub struct ClientCallbacks {
    pub on_open: Option<Box<dyn FnMut()>>,
    pub on_message: Option<Box<dyn FnMut(&[u8])>>,
    pub on_close: Option<Box<dyn FnMut(&CloseFrame)>>,
    pub on_error: Option<Box<dyn FnMut(&str)>>,
    /// Frames are borrowed for the duration of the call only.
    pub on_data: Option<Box<dyn FnMut(StreamData<'_>)>>,
    pub log: Option<LogSink>,
}

struct Session {
    id: u64,
    connection: Box<dyn Connection>,
    decoder: Option<Box<dyn Decoder>>,
    reorder: ReorderBuffer,
    next_seq: u64,
}

enum ConnectionState {
    Closed,
    Open(Session),
}

/// Posts commands to a client from inside its own callbacks.
#[derive(Clone)]
pub struct ClientHandle {
    tx: UnboundedSender<ClientEvent>,
}

impl ClientHandle {
    /// Closes the client once the current event has been handled.
    pub fn close(&self) {
        let _ = self.tx.unbounded_send(ClientEvent::Close);
    }
}

pub struct ClientBuilder {
    options: ClientOptions,
    connector: Box<dyn Connector>,
    decoders: Option<DecoderFactory>,
    player: Option<Box<dyn FrameRenderer>>,
    callbacks: ClientCallbacks,
}

impl ClientBuilder {
    pub fn options(mut self, patch: OptionsPatch) -> Self {
        self.options = self.options.merged(patch);
        self
    }

    /// Without a decoder factory the client passes payloads through untouched.
    pub fn decoder(mut self, factory: impl FnMut() -> Box<dyn Decoder> + 'static) -> Self {
        self.decoders = Some(Box::new(factory));
        self
    }

    pub fn player(mut self, player: Box<dyn FrameRenderer>) -> Self {
        self.player = Some(player);
        self
    }

    pub fn callbacks(mut self, callbacks: ClientCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn on_open(mut self, f: impl FnMut() + 'static) -> Self {
        self.callbacks.on_open = Some(Box::new(f));
        self
    }

    pub fn on_message(mut self, f: impl FnMut(&[u8]) + 'static) -> Self {
        self.callbacks.on_message = Some(Box::new(f));
        self
    }

    pub fn on_close(mut self, f: impl FnMut(&CloseFrame) + 'static) -> Self {
        self.callbacks.on_close = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&str) + 'static) -> Self {
        self.callbacks.on_error = Some(Box::new(f));
        self
    }

    pub fn on_data(mut self, f: impl FnMut(StreamData<'_>) + 'static) -> Self {
        self.callbacks.on_data = Some(Box::new(f));
        self
    }

    pub fn log(mut self, sink: impl Fn(Level, &str) + 'static) -> Self {
        self.callbacks.log = Some(Rc::new(sink));
        self
    }

    /// The receiver must be drained into [`StreamClient::dispatch`] (or
    /// [`StreamClient::pump`]) for anything to happen after `open`.
    pub fn build(self) -> (StreamClient, EventReceiver) {
        let (tx, rx) = event::channel();
        let client = StreamClient {
            options: self.options,
            connector: self.connector,
            decoders: self.decoders,
            player: self.player,
            callbacks: self.callbacks,
            state: ConnectionState::Closed,
            tx,
            next_session: 1,
            last_message: now_ms(),
            metrics: Metrics::new(),
        };
        client.logd(&format!("ws options: {:?}", client.options));
        (client, rx)
    }
}

/// Receives an encoded stream over a socket, hands each message to the
/// decoder and presents what comes out.
pub struct StreamClient {
    options: ClientOptions,
    connector: Box<dyn Connector>,
    decoders: Option<DecoderFactory>,
    player: Option<Box<dyn FrameRenderer>>,
    callbacks: ClientCallbacks,
    state: ConnectionState,
    tx: UnboundedSender<ClientEvent>,
    next_session: u64,
    last_message: f64,
    metrics: Metrics,
}

impl StreamClient {
    pub fn builder(connector: impl Connector + 'static) -> ClientBuilder {
        ClientBuilder {
            options: ClientOptions::default(),
            connector: Box::new(connector),
            decoders: None,
            player: None,
            callbacks: ClientCallbacks::default(),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, ConnectionState::Open(_))
    }

    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn set_player(&mut self, player: Option<Box<dyn FrameRenderer>>) {
        self.player = player;
    }

    /// Decode results held back until an earlier submission completes.
    pub fn pending_results(&self) -> usize {
        match &self.state {
            ConnectionState::Open(session) => session.reorder.pending(),
            ConnectionState::Closed => 0,
        }
    }

    /// Rolling message intervals and dispatch times, recorded with `dbg`.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Connects with `patch` merged over the current options. Failures are
    /// logged and leave the client closed with its options unchanged.
    pub fn open(&mut self, patch: OptionsPatch) -> Result<(), ClientError> {
        let opened = self.try_open(patch);
        if let Err(err) = &opened {
            self.log(Level::Error, &err.to_string());
        }
        opened
    }

    /// [`StreamClient::open`], then renders on `player`. A failed open keeps
    /// the current player.
    pub fn open_with_player(
        &mut self,
        patch: OptionsPatch,
        player: Box<dyn FrameRenderer>,
    ) -> Result<(), ClientError> {
        self.open(patch)?;
        self.player = Some(player);
        Ok(())
    }

    fn try_open(&mut self, patch: OptionsPatch) -> Result<(), ClientError> {
        if self.is_open() {
            return Err(ConfigError::AlreadyOpen.into());
        }
        let options = self.options.merged(patch);
        self.logd(&format!("ws open options: {options:?}"));
        let url = options.url.clone().ok_or(ConfigError::MissingUrl)?;
        let stream = options
            .stream
            .as_ref()
            .map(Value::to_string)
            .ok_or(ConfigError::MissingStream)?;

        let id = self.next_session;
        self.next_session += 1;
        let events = EventSender::new(self.tx.clone(), id);

        let mut decoder = None;
        if let Some(factory) = self.decoders.as_mut() {
            let mut created = factory();
            if let Err(err) = created.open(&stream, &options.decode_options(), events.clone()) {
                created.close();
                return Err(err.into());
            }
            decoder = Some(created);
        }

        let connection = match self.connector.connect(&url, events) {
            Ok(connection) => connection,
            Err(err) => {
                if let Some(mut decoder) = decoder {
                    decoder.close();
                }
                return Err(err.into());
            }
        };

        self.options = options;
        self.state = ConnectionState::Open(Session {
            id,
            connection,
            decoder,
            reorder: ReorderBuffer::new(),
            next_seq: 0,
        });
        Ok(())
    }

    /// Closes the socket and releases the decoder. Safe to call repeatedly.
    pub fn close(&mut self) {
        let ConnectionState::Open(mut session) =
            std::mem::replace(&mut self.state, ConnectionState::Closed)
        else {
            return;
        };
        self.logd("ws close");
        session.connection.close();
        if let Some(mut decoder) = session.decoder.take() {
            decoder.close();
        }
        if session.reorder.pending() > 0 {
            debug!(
                "discarding {} out-of-order decode results",
                session.reorder.pending()
            );
        }
    }

    /// Handles every event currently queued, including events posted while
    /// handling them. Returns how many were handled.
    pub fn pump(&mut self, events: &mut EventReceiver) -> usize {
        let mut handled = 0;
        while let Ok(event) = events.try_recv() {
            self.dispatch(event);
            handled += 1;
        }
        handled
    }

    pub fn dispatch(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Close => self.close(),
            ClientEvent::Transport { session, event } => self.on_transport(session, event),
            ClientEvent::Decoded {
                session,
                completion,
            } => self.on_decoded(session, completion),
        }
    }

    fn current(&mut self, id: u64) -> Option<&mut Session> {
        match &mut self.state {
            ConnectionState::Open(session) if session.id == id => Some(session),
            _ => None,
        }
    }

    fn url(&self) -> &str {
        self.options.url.as_deref().unwrap_or_default()
    }

    fn on_transport(&mut self, session: u64, event: TransportEvent) {
        match event {
            TransportEvent::Open => {
                self.logd(&format!("ws open: {}", self.url()));
                if let Some(on_open) = self.callbacks.on_open.as_mut() {
                    on_open();
                }
            }
            TransportEvent::Message(bytes) => {
                if self.current(session).is_none() {
                    debug!("ws message of closed session {session} dropped");
                    return;
                }
                self.on_message(session, &bytes);
            }
            TransportEvent::Close(frame) => {
                self.logd(&format!("ws close: {}", self.url()));
                if let Some(on_close) = self.callbacks.on_close.as_mut() {
                    on_close(&frame);
                }
            }
            TransportEvent::Error(detail) => {
                self.logd(&format!("ws error: {}, {detail}", self.url()));
                if let Some(on_error) = self.callbacks.on_error.as_mut() {
                    on_error(&detail);
                }
            }
        }
    }

    fn on_message(&mut self, id: u64, bytes: &[u8]) {
        let started = now_ms();
        if self.options.dbg {
            let interval = started - self.last_message;
            self.logd(&format!("ws message: {}, interval: {interval} ms", self.url()));
            self.metrics.record_frame_time(interval);
        }
        self.last_message = started;

        if let Some(on_message) = self.callbacks.on_message.as_mut() {
            on_message(bytes);
        }

        let decode_async = self.options.decode_async;
        let Some(session) = self.current(id) else {
            return;
        };
        let Some(decoder) = session.decoder.as_mut() else {
            if let Some(on_data) = self.callbacks.on_data.as_mut() {
                on_data(StreamData::Bytes(bytes));
            }
            return;
        };

        let memory = decoder.memory();
        let ready = match TransferBuffer::copy_from(memory.as_ref(), bytes) {
            Err(err) => {
                error!("ws message of {} bytes not decoded: {err}", bytes.len());
                Vec::new()
            }
            Ok(buffer) if decode_async => {
                let seq = session.next_seq;
                session.next_seq += 1;
                match decoder.decode_async(seq, buffer.handle(), buffer.len()) {
                    Ok(()) => Vec::new(),
                    Err(err) if decoder.tags_completions() => {
                        debug!("decode submit failed: {err}");
                        session.reorder.push(seq, None)
                    }
                    Err(err) => {
                        debug!("decode submit failed, packet dropped: {err}");
                        Vec::new()
                    }
                }
            }
            Ok(buffer) => {
                let frame = decoder
                    .decode(buffer.handle(), buffer.len())
                    .unwrap_or_else(|err| {
                        debug!("decode failed: {err}");
                        None
                    });
                vec![frame]
            }
        };

        for frame in ready {
            self.on_frame(frame);
        }
        if self.options.dbg {
            self.metrics.record_processing_time(now_ms() - started);
        }
    }

    fn on_decoded(&mut self, id: u64, completion: Completion) {
        let Some(session) = self.current(id) else {
            debug!("decode result of closed session {id} discarded");
            return;
        };
        let ready = match completion.seq {
            Some(seq) => session.reorder.push(seq, completion.frame),
            None => vec![completion.frame],
        };
        for frame in ready {
            self.on_frame(frame);
        }
    }

    /// Presents `frame`, then drops it.
    fn on_frame(&mut self, frame: Option<Frame>) {
        let Some(frame) = frame else {
            self.logd("ws frame is null: decode error or need new packets");
            return;
        };
        self.logd(&format!("ws frame size={}x{}", frame.width(), frame.height()));
        if let Some(player) = self.player.as_mut() {
            if let Err(err) = player.render(&frame) {
                debug!("render failed: {err}");
            }
        }
        if let Some(on_data) = self.callbacks.on_data.as_mut() {
            on_data(StreamData::Frame(&frame));
        }
    }

    fn log(&self, level: Level, message: &str) {
        log::log!(level, "{message}");
        if let Some(sink) = &self.callbacks.log {
            sink(level, message);
        }
    }

    /// Logs only with `dbg`.
    fn logd(&self, message: &str) {
        if self.options.dbg {
            self.log(Level::Debug, message);
        }
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.close();
    }
}
