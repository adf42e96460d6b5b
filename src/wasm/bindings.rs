use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::str::FromStr;

use futures::StreamExt;
use js_sys::{Function, Object, Reflect, Uint8Array};
use log::{error, warn, Level};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::HtmlCanvasElement;

use super::decoder::{DecoderModule, JsDecoder};
use super::socket::{describe, WebSocketConnector};
use crate::client::{ClientCallbacks, ClientHandle, OptionsPatch, StreamClient, StreamData};
use crate::decoder::{Decoder, Frame, PixelFormat};
use crate::error::RenderError;
use crate::event::CloseFrame;
use crate::render::{FrameRenderer, WebGlPlayer};
use crate::types::{PIX_FMT_YUV420P, PIX_FMT_YUVJ420P};

const OPTION_KEYS: [&str; 7] = [
    "url",
    "stream",
    "decode_async",
    "decode_queue_size",
    "decode_thread_count",
    "decode_thread_type",
    "dbg",
];

/// Installs the panic hook and the console logger. `level` is one of
/// `error`, `warn`, `info`, `debug`, `trace`; defaults to `info`.
#[wasm_bindgen]
pub fn initialize(level: Option<String>) {
    console_error_panic_hook::set_once();
    let level = level
        .as_deref()
        .and_then(|l| Level::from_str(l).ok())
        .unwrap_or(Level::Info);
    wasm_logger::init(wasm_logger::Config::new(level));
}

#[wasm_bindgen]
pub struct WsClient {
    inner: Rc<RefCell<StreamClient>>,
    handle: ClientHandle,
    open: Rc<Cell<bool>>,
}

#[wasm_bindgen]
impl WsClient {
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue) -> Result<WsClient, JsValue> {
        console_error_panic_hook::set_once();
        let patch = read_patch(&options)?;

        let mut builder = StreamClient::builder(WebSocketConnector)
            .options(patch)
            .callbacks(read_callbacks(&options));
        if let Some(player) = read_player(&options) {
            builder = builder.player(Box::new(player));
        }
        match DecoderModule::lookup(&options) {
            Some(module) => {
                let verbosity = get(&options, "wasm_log_v").as_f64().unwrap_or(0.0) as i32;
                if let Err(err) = module.set_log_verbosity(verbosity) {
                    warn!("decoder log verbosity not set: {}", describe(&err));
                }
                builder = builder
                    .decoder(move || Box::new(JsDecoder::new(module.clone())) as Box<dyn Decoder>);
            }
            None => warn!("decoder module not found, payloads are passed through"),
        }
        let (client, mut events) = builder.build();

        let handle = client.handle();
        let inner = Rc::new(RefCell::new(client));
        let open = Rc::new(Cell::new(false));

        let weak = Rc::downgrade(&inner);
        let open_flag = open.clone();
        spawn_local(async move {
            while let Some(event) = events.next().await {
                let Some(client) = weak.upgrade() else {
                    break;
                };
                let mut client = client.borrow_mut();
                client.dispatch(event);
                open_flag.set(client.is_open());
            }
        });

        Ok(WsClient {
            inner,
            handle,
            open,
        })
    }

    /// Returns false when the client could not be opened; the reason is
    /// logged. A `player` option replaces the current player once open.
    pub fn open(&self, options: JsValue) -> Result<bool, JsValue> {
        let (patch, player) = if options.is_undefined() || options.is_null() {
            (OptionsPatch::default(), None)
        } else {
            (read_patch(&options)?, read_player(&options))
        };
        let Ok(mut client) = self.inner.try_borrow_mut() else {
            error!("ws open error: called from a client callback");
            return Ok(false);
        };
        let opened = match player {
            Some(player) => client.open_with_player(patch, Box::new(player)),
            None => client.open(patch),
        }
        .is_ok();
        self.open.set(client.is_open());
        Ok(opened)
    }

    pub fn close(&self) {
        match self.inner.try_borrow_mut() {
            Ok(mut client) => {
                client.close();
                self.open.set(false);
            }
            // inside a callback: close once the current event is handled
            Err(_) => self.handle.close(),
        }
    }

    #[wasm_bindgen(js_name = isOpen)]
    pub fn is_open(&self) -> bool {
        self.open.get()
    }

    /// `new Module.OpenGLPlayer()` from the decoder module.
    #[wasm_bindgen(js_name = createOpenGLPlayer)]
    pub fn create_opengl_player() -> Result<JsValue, JsValue> {
        DecoderModule::lookup(&JsValue::UNDEFINED)
            .ok_or_else(|| JsValue::from_str("decoder module not found"))?
            .create_player()
    }

    /// Frames are rendered on `player`; the JS object stays usable.
    /// Unlike the `player` option, frames are not copied into JS.
    #[wasm_bindgen(js_name = setPlayer)]
    pub fn set_player(&self, player: &WebGlPlayerHandle) -> Result<(), JsValue> {
        let shared = SharedPlayer(player.inner.clone());
        self.replace_player(Some(Box::new(shared)))
    }

    #[wasm_bindgen(js_name = clearPlayer)]
    pub fn clear_player(&self) -> Result<(), JsValue> {
        self.replace_player(None)
    }

    fn replace_player(&self, player: Option<Box<dyn FrameRenderer>>) -> Result<(), JsValue> {
        let mut client = self
            .inner
            .try_borrow_mut()
            .map_err(|_| JsValue::from_str("player changed from a client callback"))?;
        client.set_player(player);
        Ok(())
    }
}

/// JS face of [`WebGlPlayer`].
#[wasm_bindgen(js_name = WebGLPlayer)]
pub struct WebGlPlayerHandle {
    inner: Rc<RefCell<WebGlPlayer>>,
}

#[wasm_bindgen(js_class = WebGLPlayer)]
impl WebGlPlayerHandle {
    #[wasm_bindgen(constructor)]
    pub fn new(canvas: HtmlCanvasElement) -> WebGlPlayerHandle {
        WebGlPlayerHandle {
            inner: Rc::new(RefCell::new(WebGlPlayer::new(canvas))),
        }
    }

    /// Renders `{width, height, bytes}`.
    pub fn render(&self, frame: JsValue) -> Result<(), JsValue> {
        let width = get(&frame, "width").as_f64().unwrap_or(0.0) as u32;
        let height = get(&frame, "height").as_f64().unwrap_or(0.0) as u32;
        let bytes = get(&frame, "bytes")
            .dyn_into::<Uint8Array>()
            .map_err(|_| JsValue::from_str("frame.bytes must be a Uint8Array"))?
            .to_vec();
        self.inner
            .try_borrow_mut()
            .map_err(|_| to_js(RenderError::Busy))?
            .render_bytes(width, height, &bytes)
            .map_err(to_js)
    }

    pub fn fullscreen(&self) -> Result<(), JsValue> {
        self.inner.borrow().fullscreen().map_err(to_js)
    }

    #[wasm_bindgen(js_name = exitFullscreen)]
    pub fn exit_fullscreen(&self) -> Result<(), JsValue> {
        self.inner.borrow().exit_fullscreen().map_err(to_js)
    }
}

struct SharedPlayer(Rc<RefCell<WebGlPlayer>>);

impl FrameRenderer for SharedPlayer {
    fn render(&mut self, frame: &Frame) -> Result<(), RenderError> {
        self.0
            .try_borrow_mut()
            .map_err(|_| RenderError::Busy)?
            .render(frame)
    }
}

/// Any JS object with a `render(frame)` method; `frame` is the object
/// built by [`frame_object`].
struct JsPlayer {
    target: JsValue,
    render: Function,
}

impl FrameRenderer for JsPlayer {
    fn render(&mut self, frame: &Frame) -> Result<(), RenderError> {
        let frame = frame_object(frame).map_err(|err| RenderError::Player(describe(&err)))?;
        self.render
            .call1(&self.target, &frame)
            .map(drop)
            .map_err(|err| RenderError::Player(describe(&err)))
    }
}

fn read_player(options: &JsValue) -> Option<JsPlayer> {
    let target = get(options, "player");
    if target.is_undefined() || target.is_null() {
        return None;
    }
    match function(&target, "render") {
        Some(render) => Some(JsPlayer { target, render }),
        None => {
            warn!("player option ignored: it has no render(frame) method");
            None
        }
    }
}

fn read_patch(options: &JsValue) -> Result<OptionsPatch, JsValue> {
    let fields = Object::new();
    for key in OPTION_KEYS {
        let value = get(options, key);
        if !value.is_undefined() {
            Reflect::set(&fields, &JsValue::from_str(key), &value)?;
        }
    }
    Ok(serde_wasm_bindgen::from_value(fields.into())?)
}

fn read_callbacks(options: &JsValue) -> ClientCallbacks {
    let mut callbacks = ClientCallbacks::default();
    if let Some(f) = function(options, "onopen") {
        callbacks.on_open = Some(Box::new(move || invoke(&f, &JsValue::UNDEFINED)));
    }
    if let Some(f) = function(options, "onmessage") {
        callbacks.on_message = Some(Box::new(move |bytes: &[u8]| {
            invoke(&f, &Uint8Array::from(bytes).into())
        }));
    }
    if let Some(f) = function(options, "onclose") {
        callbacks.on_close = Some(Box::new(move |frame: &CloseFrame| {
            match serde_wasm_bindgen::to_value(frame) {
                Ok(value) => invoke(&f, &value),
                Err(err) => error!("close event not converted: {err}"),
            }
        }));
    }
    if let Some(f) = function(options, "onerror") {
        callbacks.on_error = Some(Box::new(move |detail: &str| {
            invoke(&f, &JsValue::from_str(detail))
        }));
    }
    if let Some(f) = function(options, "ondata") {
        callbacks.on_data = Some(Box::new(move |data: StreamData<'_>| {
            let value = match data {
                StreamData::Frame(frame) => frame_object(frame),
                StreamData::Bytes(bytes) => Ok(Uint8Array::from(bytes).into()),
            };
            match value {
                Ok(value) => invoke(&f, &value),
                Err(err) => error!("ondata argument not built: {err:?}"),
            }
        }));
    }
    if let Some(f) = function(options, "log") {
        callbacks.log = Some(Rc::new(move |_level: Level, message: &str| {
            invoke(&f, &JsValue::from_str(message))
        }));
    }
    callbacks
}

/// `{width, height, pts, format, bytes}`; `bytes` is a copy.
fn frame_object(frame: &Frame) -> Result<JsValue, JsValue> {
    let object = Object::new();
    Reflect::set(&object, &"width".into(), &frame.width().into())?;
    Reflect::set(&object, &"height".into(), &frame.height().into())?;
    Reflect::set(&object, &"pts".into(), &(frame.pts() as f64).into())?;
    let format = match frame.format() {
        PixelFormat::Yuv420p => PIX_FMT_YUV420P,
        PixelFormat::Yuvj420p => PIX_FMT_YUVJ420P,
    };
    Reflect::set(&object, &"format".into(), &format.into())?;
    Reflect::set(&object, &"bytes".into(), &Uint8Array::from(frame.bytes()).into())?;
    Ok(object.into())
}

fn get(target: &JsValue, key: &str) -> JsValue {
    Reflect::get(target, &JsValue::from_str(key)).unwrap_or(JsValue::UNDEFINED)
}

fn function(options: &JsValue, key: &str) -> Option<Function> {
    get(options, key).dyn_into::<Function>().ok()
}

fn invoke(f: &Function, arg: &JsValue) {
    if let Err(err) = f.call1(&JsValue::NULL, arg) {
        error!("callback failed: {err:?}");
    }
}

fn to_js(err: RenderError) -> JsValue {
    JsValue::from_str(&err.to_string())
}
