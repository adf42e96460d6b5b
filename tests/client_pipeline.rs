use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::Level;
use serde_json::json;

use ws_stream_player::decoder::raw::rawvideo_codecs;
use ws_stream_player::decoder::{CodecFactory, CodecOptions, FrameDecoder};
use ws_stream_player::error::TransportError;
use ws_stream_player::event::Completion;
use ws_stream_player::types::CodecParameters;
use ws_stream_player::utils::memory::POISON;
use ws_stream_player::utils::{BufferHandle, DecoderMemory, FramePool, HeapMemory};
use ws_stream_player::{
    ClientError, ClientHandle, CloseFrame, ConfigError, Connection, Connector, DecodeError,
    DecodeOptions, Decoder, EventReceiver, EventSender, Frame, FrameRenderer, OptionsPatch, Packet,
    RenderError, StreamClient, StreamData, StreamDecoder, TransportEvent,
};

#[derive(Default)]
struct Wire {
    urls: Vec<String>,
    senders: Vec<EventSender>,
    closed: usize,
}

#[derive(Clone, Default)]
struct MockConnector(Rc<RefCell<Wire>>);

struct MockConnection(Rc<RefCell<Wire>>);

impl Connector for MockConnector {
    fn connect(
        &mut self,
        url: &str,
        events: EventSender,
    ) -> Result<Box<dyn Connection>, TransportError> {
        let mut wire = self.0.borrow_mut();
        wire.urls.push(url.to_string());
        wire.senders.push(events);
        Ok(Box::new(MockConnection(self.0.clone())))
    }
}

impl Connection for MockConnection {
    fn close(&mut self) {
        self.0.borrow_mut().closed += 1;
    }
}

impl MockConnector {
    /// Posts `event` on the socket of the `n`th connect.
    fn post(&self, n: usize, event: TransportEvent) {
        assert!(self.0.borrow().senders[n].transport(event));
    }

    fn connects(&self) -> usize {
        self.0.borrow().urls.len()
    }

    fn closed(&self) -> usize {
        self.0.borrow().closed
    }
}

/// Counts every decode submission.
struct Counting {
    inner: StreamDecoder,
    calls: Rc<Cell<usize>>,
}

impl Decoder for Counting {
    fn open(
        &mut self,
        stream: &str,
        options: &DecodeOptions,
        events: EventSender,
    ) -> Result<(), DecodeError> {
        self.inner.open(stream, options, events)
    }

    fn memory(&self) -> Rc<dyn DecoderMemory> {
        self.inner.memory()
    }

    fn decode(&mut self, buffer: BufferHandle, len: usize) -> Result<Option<Frame>, DecodeError> {
        self.calls.set(self.calls.get() + 1);
        self.inner.decode(buffer, len)
    }

    fn decode_async(
        &mut self,
        seq: u64,
        buffer: BufferHandle,
        len: usize,
    ) -> Result<(), DecodeError> {
        self.calls.set(self.calls.get() + 1);
        self.inner.decode_async(seq, buffer, len)
    }

    fn close(&mut self) {
        self.inner.close()
    }
}

/// Holds every codec call until `lock` is free.
#[derive(Clone, Default)]
struct Gate {
    lock: Arc<Mutex<()>>,
    started: Arc<AtomicUsize>,
}

struct GatedCodec {
    inner: Box<dyn FrameDecoder>,
    gate: Gate,
}

impl FrameDecoder for GatedCodec {
    fn decode_packet(&mut self, packet: &Packet) -> Result<Option<Frame>, DecodeError> {
        self.gate.started.fetch_add(1, Ordering::SeqCst);
        let _held = self.gate.lock.lock().unwrap();
        self.inner.decode_packet(packet)
    }
}

impl Gate {
    fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    fn codecs(&self, pool: FramePool) -> CodecFactory {
        let raw = rawvideo_codecs(pool);
        let gate = self.clone();
        Box::new(
            move |par: &CodecParameters,
                  options: &CodecOptions|
                  -> Result<Box<dyn FrameDecoder>, DecodeError> {
                let inner = raw(par, options)?;
                Ok(Box::new(GatedCodec {
                    inner,
                    gate: gate.clone(),
                }))
            },
        )
    }
}

/// Completes successful submissions at once without their tag; odd
/// submissions are refused.
struct Untagged {
    memory: Rc<HeapMemory>,
    events: Option<EventSender>,
}

impl Decoder for Untagged {
    fn open(
        &mut self,
        _stream: &str,
        _options: &DecodeOptions,
        events: EventSender,
    ) -> Result<(), DecodeError> {
        self.events = Some(events);
        Ok(())
    }

    fn memory(&self) -> Rc<dyn DecoderMemory> {
        self.memory.clone()
    }

    fn decode(
        &mut self,
        _buffer: BufferHandle,
        _len: usize,
    ) -> Result<Option<Frame>, DecodeError> {
        Ok(None)
    }

    fn decode_async(
        &mut self,
        seq: u64,
        _buffer: BufferHandle,
        _len: usize,
    ) -> Result<(), DecodeError> {
        if seq % 2 == 1 {
            return Err(DecodeError::External("decoder busy".into()));
        }
        let frame = Frame::yuv420(2, 2, vec![0u8; 6])?.with_pts(seq as i64);
        if let Some(events) = &self.events {
            events.decoded(Completion::untagged(Some(frame)));
        }
        Ok(())
    }

    fn tags_completions(&self) -> bool {
        false
    }

    fn close(&mut self) {
        self.events = None;
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Seen {
    width: u32,
    height: u32,
    pts: i64,
    planes: [usize; 3],
    first: [u8; 3],
    released_before: usize,
}

#[derive(Default)]
struct Rendered {
    calls: usize,
    sizes: Vec<(u32, u32)>,
}

struct MockRenderer {
    rendered: Rc<RefCell<Rendered>>,
    fail: bool,
}

impl FrameRenderer for MockRenderer {
    fn render(&mut self, frame: &Frame) -> Result<(), RenderError> {
        let mut rendered = self.rendered.borrow_mut();
        rendered.calls += 1;
        rendered.sizes.push((frame.width(), frame.height()));
        if self.fail {
            return Err(RenderError::Unavailable);
        }
        Ok(())
    }
}

struct Fixture {
    wire: MockConnector,
    memory: Rc<HeapMemory>,
    pool: FramePool,
    decoders: Rc<Cell<usize>>,
    decode_calls: Rc<Cell<usize>>,
    frames: Rc<RefCell<Vec<Seen>>>,
    bytes: Rc<RefCell<Vec<Vec<u8>>>>,
    messages: Rc<Cell<usize>>,
    opens: Rc<Cell<usize>>,
    closes: Rc<RefCell<Vec<CloseFrame>>>,
    errors: Rc<RefCell<Vec<String>>>,
    logs: Rc<RefCell<Vec<(Level, String)>>>,
    rendered: Rc<RefCell<Rendered>>,
    handle: Rc<RefCell<Option<ClientHandle>>>,
    close_on_data: Rc<Cell<bool>>,
    gate: Option<Gate>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            wire: MockConnector::default(),
            memory: Rc::new(HeapMemory::new()),
            pool: FramePool::new(4),
            decoders: Rc::default(),
            decode_calls: Rc::default(),
            frames: Rc::default(),
            bytes: Rc::default(),
            messages: Rc::default(),
            opens: Rc::default(),
            closes: Rc::default(),
            errors: Rc::default(),
            logs: Rc::default(),
            rendered: Rc::default(),
            handle: Rc::default(),
            close_on_data: Rc::default(),
            gate: None,
        }
    }

    fn client(&self, with_decoder: bool, failing_renderer: bool) -> (StreamClient, EventReceiver) {
        let frames = self.frames.clone();
        let bytes = self.bytes.clone();
        let pool = self.pool.clone();
        let handle = self.handle.clone();
        let close_on_data = self.close_on_data.clone();
        let messages = self.messages.clone();
        let opens = self.opens.clone();
        let closes = self.closes.clone();
        let errors = self.errors.clone();
        let logs = self.logs.clone();

        let mut builder = StreamClient::builder(self.wire.clone())
            .player(Box::new(MockRenderer {
                rendered: self.rendered.clone(),
                fail: failing_renderer,
            }))
            .on_open(move || opens.set(opens.get() + 1))
            .on_message(move |_| messages.set(messages.get() + 1))
            .on_close(move |frame| closes.borrow_mut().push(frame.clone()))
            .on_error(move |detail| errors.borrow_mut().push(detail.to_string()))
            .log(move |level, msg| logs.borrow_mut().push((level, msg.to_string())))
            .on_data(move |data| {
                match data {
                    StreamData::Frame(frame) => {
                        let planes = frame.planes();
                        frames.borrow_mut().push(Seen {
                            width: frame.width(),
                            height: frame.height(),
                            pts: frame.pts(),
                            planes: [planes.y.len(), planes.u.len(), planes.v.len()],
                            first: [planes.y[0], planes.u[0], planes.v[0]],
                            released_before: pool.released(),
                        });
                    }
                    StreamData::Bytes(b) => bytes.borrow_mut().push(b.to_vec()),
                }
                if close_on_data.get() {
                    if let Some(handle) = handle.borrow().as_ref() {
                        handle.close();
                    }
                }
            });

        if with_decoder {
            let memory = self.memory.clone();
            let pool = self.pool.clone();
            let decoders = self.decoders.clone();
            let calls = self.decode_calls.clone();
            let gate = self.gate.clone();
            builder = builder.decoder(move || {
                decoders.set(decoders.get() + 1);
                let codecs = match &gate {
                    Some(gate) => gate.codecs(pool.clone()),
                    None => rawvideo_codecs(pool.clone()),
                };
                Box::new(Counting {
                    inner: StreamDecoder::new(memory.clone(), codecs),
                    calls: calls.clone(),
                }) as Box<dyn Decoder>
            });
        }

        let (client, rx) = builder.build();
        *self.handle.borrow_mut() = Some(client.handle());
        (client, rx)
    }

    fn logged(&self, level: Level, needle: &str) -> bool {
        self.logs
            .borrow()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }
}

fn stream(width: u32, height: u32) -> serde_json::Value {
    json!({
        "id": "cam",
        "video": {"codecpar": {
            "codec_type": 0,
            "codec_id": 13,
            "format": 0,
            "width": width,
            "height": height,
        }},
    })
}

fn open_patch(width: u32, height: u32) -> OptionsPatch {
    OptionsPatch::url("ws://localhost:8080/cam").with_stream(stream(width, height))
}

/// Y plane filled with 16, U with 128, V with 200.
fn picture(width: u32, height: u32) -> Vec<u8> {
    let luma = (width * height) as usize;
    let mut data = vec![16u8; luma];
    data.extend(std::iter::repeat(128u8).take(luma / 4));
    data.extend(std::iter::repeat(200u8).take(luma / 4));
    data
}

fn message(pts: i64, width: u32, height: u32, key: bool) -> TransportEvent {
    TransportEvent::Message(Packet::video(pts, picture(width, height), key).encode())
}

#[test]
fn frame_travels_from_socket_to_callbacks() {
    let fx = Fixture::new();
    let (mut client, mut rx) = fx.client(true, false);
    client.open(open_patch(64, 64)).unwrap();
    assert!(client.is_open());
    assert_eq!(fx.decoders.get(), 1);
    assert_eq!(fx.wire.connects(), 1);

    fx.wire.post(0, TransportEvent::Open);
    fx.wire.post(0, message(7, 64, 64, true));
    assert_eq!(client.pump(&mut rx), 2);

    assert_eq!(fx.opens.get(), 1);
    assert_eq!(fx.messages.get(), 1);
    let frames = fx.frames.borrow();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].width, 64);
    assert_eq!(frames[0].height, 64);
    assert_eq!(frames[0].pts, 7);
    assert_eq!(frames[0].planes, [4096, 1024, 1024]);
    assert_eq!(frames[0].first, [16, 128, 200]);

    let rendered = fx.rendered.borrow();
    assert_eq!(rendered.calls, 1);
    assert_eq!(rendered.sizes, vec![(64, 64)]);

    // transfer buffer freed, frame released
    assert_eq!(fx.memory.live(), 0);
    assert_eq!(fx.memory.stats().allocations(), 1);
    assert_eq!(fx.memory.stats().frees(), 1);
    assert_eq!(fx.pool.released(), 1);
    assert_eq!(fx.pool.outstanding(), 0);
}

#[test]
fn frames_are_released_after_the_data_callback() {
    let fx = Fixture::new();
    let (mut client, mut rx) = fx.client(true, false);
    client.open(open_patch(8, 8)).unwrap();

    fx.wire.post(0, message(0, 8, 8, true));
    fx.wire.post(0, message(1, 8, 8, false));
    client.pump(&mut rx);

    let seen: Vec<_> = fx.frames.borrow().iter().map(|s| s.released_before).collect();
    assert_eq!(seen, vec![0, 1]);
    assert_eq!(fx.pool.released(), 2);
    fx.pool.inspect_free(|free| {
        assert!(!free.is_empty());
        for buf in free {
            assert!(buf.iter().all(|&b| b == POISON));
        }
    });
}

#[test]
fn missing_stream_aborts_open_before_any_side_effect() {
    let fx = Fixture::new();
    let (mut client, _rx) = fx.client(true, false);

    let err = client.open(OptionsPatch::url("ws://localhost/cam")).unwrap_err();
    assert!(matches!(err, ClientError::Config(ConfigError::MissingStream)));
    assert!(!client.is_open());
    assert_eq!(fx.decoders.get(), 0);
    assert_eq!(fx.wire.connects(), 0);
    assert!(fx.logged(Level::Error, "ws open error: stream is null"));
    // not committed
    assert_eq!(client.options().url, None);
}

#[test]
fn missing_url_aborts_open() {
    let fx = Fixture::new();
    let (mut client, _rx) = fx.client(true, false);

    let patch = OptionsPatch::default().with_stream(stream(8, 8));
    let err = client.open(patch).unwrap_err();
    assert!(matches!(err, ClientError::Config(ConfigError::MissingUrl)));
    assert_eq!(fx.decoders.get(), 0);
    assert_eq!(fx.wire.connects(), 0);
    assert!(fx.logged(Level::Error, "ws open error: url is null"));
}

#[test]
fn second_open_is_rejected_and_not_applied() {
    let fx = Fixture::new();
    let (mut client, _rx) = fx.client(true, false);
    client.open(open_patch(8, 8)).unwrap();

    let err = client
        .open(OptionsPatch::url("ws://elsewhere").with_stream(stream(16, 16)))
        .unwrap_err();
    assert!(matches!(err, ClientError::Config(ConfigError::AlreadyOpen)));
    assert!(fx.logged(Level::Error, "ws open error: already opened"));
    assert_eq!(fx.wire.connects(), 1);
    assert_eq!(fx.decoders.get(), 1);
    assert_eq!(client.options().url.as_deref(), Some("ws://localhost:8080/cam"));
    assert!(client.is_open());
}

#[test]
fn close_is_idempotent() {
    let fx = Fixture::new();
    let (mut client, _rx) = fx.client(true, false);
    client.close();
    assert_eq!(fx.wire.closed(), 0);

    client.open(open_patch(8, 8)).unwrap();
    client.close();
    client.close();
    assert!(!client.is_open());
    assert_eq!(fx.wire.closed(), 1);

    // reopening starts a fresh session
    client.open(open_patch(8, 8)).unwrap();
    assert_eq!(fx.decoders.get(), 2);
    assert_eq!(fx.wire.connects(), 2);
}

#[test]
fn packets_without_frames_only_cost_a_transfer_buffer() {
    let fx = Fixture::new();
    let (mut client, mut rx) = fx.client(true, false);
    client.open(open_patch(8, 8)).unwrap();

    // delta packets before the first key packet decode to nothing
    for pts in 0..3 {
        fx.wire.post(0, message(pts, 8, 8, false));
    }
    client.pump(&mut rx);

    assert!(fx.frames.borrow().is_empty());
    assert_eq!(fx.rendered.borrow().calls, 0);
    assert_eq!(fx.messages.get(), 3);
    assert_eq!(fx.decode_calls.get(), 3);
    assert_eq!(fx.memory.stats().allocations(), 3);
    assert_eq!(fx.memory.stats().frees(), 3);
    assert_eq!(fx.memory.live(), 0);
}

#[test]
fn malformed_payloads_are_logged_not_fatal() {
    let fx = Fixture::new();
    let (mut client, mut rx) = fx.client(true, false);
    client.open(open_patch(8, 8)).unwrap();

    fx.wire.post(0, TransportEvent::Message(vec![1, 0, 0, 0]));
    // wrong picture size for the stream
    fx.wire.post(0, message(0, 4, 4, true));
    fx.wire.post(0, message(1, 8, 8, true));
    client.pump(&mut rx);

    assert!(client.is_open());
    assert_eq!(fx.decode_calls.get(), 3);
    let pts: Vec<_> = fx.frames.borrow().iter().map(|s| s.pts).collect();
    assert_eq!(pts, vec![1]);
    assert_eq!(fx.memory.live(), 0);
}

#[test]
fn async_frames_arrive_in_submission_order() {
    let fx = Fixture::new();
    let (mut client, mut rx) = fx.client(true, false);
    let patch = OptionsPatch {
        decode_async: Some(true),
        decode_queue_size: Some(16),
        ..open_patch(8, 8)
    };
    client.open(patch).unwrap();

    fx.wire.post(0, message(0, 8, 8, true));
    for pts in 1..6 {
        fx.wire.post(0, message(pts, 8, 8, false));
    }
    for _ in 0..400 {
        client.pump(&mut rx);
        if fx.frames.borrow().len() == 6 {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }

    let pts: Vec<_> = fx.frames.borrow().iter().map(|s| s.pts).collect();
    assert_eq!(pts, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(fx.decode_calls.get(), 6);
    assert_eq!(fx.memory.live(), 0);
    client.close();
}

#[test]
fn without_decoder_payloads_pass_through() {
    let fx = Fixture::new();
    let (mut client, mut rx) = fx.client(false, false);
    client.open(open_patch(8, 8)).unwrap();

    fx.wire.post(0, TransportEvent::Message(vec![1, 2, 3]));
    fx.wire.post(0, TransportEvent::Message(vec![4]));
    client.pump(&mut rx);

    assert_eq!(*fx.bytes.borrow(), vec![vec![1, 2, 3], vec![4]]);
    assert_eq!(fx.messages.get(), 2);
    assert_eq!(fx.rendered.borrow().calls, 0);
    assert_eq!(fx.memory.stats().allocations(), 0);
}

#[test]
fn without_decoder_stream_is_still_required() {
    let fx = Fixture::new();
    let (mut client, _rx) = fx.client(false, false);

    let err = client.open(OptionsPatch::url("ws://localhost/raw")).unwrap_err();
    assert!(matches!(err, ClientError::Config(ConfigError::MissingStream)));
    assert!(!client.is_open());
    assert_eq!(fx.wire.connects(), 0);
    assert!(fx.logged(Level::Error, "ws open error: stream is null"));
}

#[test]
fn queue_overflow_drops_a_packet_without_stalling_later_frames() {
    let mut fx = Fixture::new();
    let gate = Gate::default();
    fx.gate = Some(gate.clone());
    let (mut client, mut rx) = fx.client(true, false);
    let patch = OptionsPatch {
        decode_async: Some(true),
        decode_queue_size: Some(2),
        ..open_patch(8, 8)
    };
    client.open(patch).unwrap();

    let held = gate.lock.lock().unwrap();
    fx.wire.post(0, message(0, 8, 8, true));
    client.pump(&mut rx);
    for _ in 0..400 {
        if gate.started() > 0 {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(gate.started(), 1);

    // 0 is being decoded, 1..=3 queue behind it and 1 is dropped
    for pts in 1..4 {
        fx.wire.post(0, message(pts, 8, 8, false));
    }
    client.pump(&mut rx);
    assert!(fx.frames.borrow().is_empty());
    assert_eq!(client.pending_results(), 1);
    drop(held);

    for _ in 0..400 {
        client.pump(&mut rx);
        if fx.frames.borrow().len() == 3 {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }

    let pts: Vec<_> = fx.frames.borrow().iter().map(|s| s.pts).collect();
    assert_eq!(pts, vec![0, 2, 3]);
    assert_eq!(client.pending_results(), 0);
    assert_eq!(fx.decode_calls.get(), 4);
    assert_eq!(fx.memory.live(), 0);
    client.close();
}

#[test]
fn failed_untagged_submissions_are_not_held_back() {
    let wire = MockConnector::default();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let frames = seen.clone();
    let (mut client, mut rx) = StreamClient::builder(wire.clone())
        .decoder(|| {
            Box::new(Untagged {
                memory: Rc::new(HeapMemory::new()),
                events: None,
            }) as Box<dyn Decoder>
        })
        .on_data(move |data| {
            if let StreamData::Frame(frame) = data {
                frames.borrow_mut().push(frame.pts());
            }
        })
        .build();
    let patch = OptionsPatch {
        decode_async: Some(true),
        ..open_patch(8, 8)
    };
    client.open(patch).unwrap();

    for n in 0..100u8 {
        wire.post(0, TransportEvent::Message(vec![n]));
    }
    client.pump(&mut rx);

    assert_eq!(client.pending_results(), 0);
    let expected: Vec<i64> = (0..100).step_by(2).collect();
    assert_eq!(*seen.borrow(), expected);
}

#[test]
fn events_of_a_closed_session_are_dropped() {
    let fx = Fixture::new();
    let (mut client, mut rx) = fx.client(true, false);
    client.open(open_patch(8, 8)).unwrap();
    client.close();
    client.open(open_patch(8, 8)).unwrap();

    fx.wire.post(0, message(0, 8, 8, true));
    fx.wire.post(
        0,
        TransportEvent::Close(CloseFrame {
            code: 1000,
            reason: "bye".into(),
            was_clean: true,
        }),
    );
    client.pump(&mut rx);

    assert!(fx.frames.borrow().is_empty());
    assert_eq!(fx.decode_calls.get(), 0);
    assert_eq!(fx.messages.get(), 0);
    // lifecycle events still reach the user
    assert_eq!(fx.closes.borrow().len(), 1);
    assert_eq!(fx.closes.borrow()[0].code, 1000);
    assert!(client.is_open());

    fx.wire.post(1, message(3, 8, 8, true));
    client.pump(&mut rx);
    assert_eq!(fx.frames.borrow().len(), 1);
}

#[test]
fn transport_errors_are_forwarded_without_closing() {
    let fx = Fixture::new();
    let (mut client, mut rx) = fx.client(true, false);
    client.open(open_patch(8, 8)).unwrap();

    fx.wire.post(0, TransportEvent::Error("connection reset".into()));
    fx.wire.post(0, TransportEvent::Close(CloseFrame::default()));
    client.pump(&mut rx);

    assert_eq!(*fx.errors.borrow(), vec!["connection reset".to_string()]);
    assert_eq!(fx.closes.borrow().len(), 1);
    assert!(client.is_open());
}

#[test]
fn data_callback_can_close_through_its_handle() {
    let fx = Fixture::new();
    let (mut client, mut rx) = fx.client(true, false);
    client.open(open_patch(8, 8)).unwrap();
    fx.close_on_data.set(true);

    fx.wire.post(0, message(0, 8, 8, true));
    assert_eq!(client.pump(&mut rx), 2);
    assert!(!client.is_open());
    assert_eq!(fx.wire.closed(), 1);

    fx.close_on_data.set(false);
    fx.wire.post(0, message(1, 8, 8, false));
    client.pump(&mut rx);
    assert_eq!(fx.frames.borrow().len(), 1);
}

#[test]
fn player_given_on_open_replaces_the_current_one() {
    let fx = Fixture::new();
    let (mut client, mut rx) = fx.client(true, false);
    let replacement = Rc::new(RefCell::new(Rendered::default()));
    let player = || {
        Box::new(MockRenderer {
            rendered: replacement.clone(),
            fail: false,
        })
    };

    // a rejected open keeps the current player
    assert!(client
        .open_with_player(OptionsPatch::url("ws://localhost/cam"), player())
        .is_err());
    client.open(open_patch(8, 8)).unwrap();
    fx.wire.post(0, message(0, 8, 8, true));
    client.pump(&mut rx);
    assert_eq!(fx.rendered.borrow().calls, 1);
    assert_eq!(replacement.borrow().calls, 0);
    client.close();

    client.open_with_player(open_patch(8, 8), player()).unwrap();
    fx.wire.post(1, message(1, 8, 8, true));
    client.pump(&mut rx);
    assert_eq!(fx.rendered.borrow().calls, 1);
    assert_eq!(replacement.borrow().calls, 1);
    assert_eq!(fx.frames.borrow().len(), 2);
}

#[test]
fn render_failure_does_not_starve_the_data_callback() {
    let fx = Fixture::new();
    let (mut client, mut rx) = fx.client(true, true);
    client.open(open_patch(8, 8)).unwrap();

    fx.wire.post(0, message(0, 8, 8, true));
    client.pump(&mut rx);

    assert_eq!(fx.rendered.borrow().calls, 1);
    assert_eq!(fx.frames.borrow().len(), 1);
    assert_eq!(fx.pool.released(), 1);
}

#[test]
fn dbg_gates_verbose_logging() {
    let fx = Fixture::new();
    let (mut client, mut rx) = fx.client(true, false);
    client.open(open_patch(8, 8)).unwrap();
    fx.wire.post(0, message(0, 8, 8, false));
    client.pump(&mut rx);
    assert!(fx.logs.borrow().iter().all(|(l, _)| *l != Level::Debug));
    client.close();

    let patch = OptionsPatch {
        dbg: Some(true),
        ..open_patch(8, 8)
    };
    client.open(patch).unwrap();
    fx.wire.post(1, message(0, 8, 8, false));
    fx.wire.post(1, message(1, 8, 8, true));
    client.pump(&mut rx);
    assert!(fx.logged(Level::Debug, "ws frame is null"));
    assert!(fx.logged(Level::Debug, "ws frame size=8x8"));
    assert!(fx.logged(Level::Debug, "interval"));
    assert!(client.metrics().average_processing_time() >= 0.0);
}
