use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use js_sys::{Array, BigInt, Function, Reflect, Uint8Array};
use log::debug;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use super::socket::describe;
use crate::decoder::{DecodeOptions, Decoder, Frame, PixelFormat};
use crate::error::DecodeError;
use crate::event::{Completion, EventSender};
use crate::types::{PIX_FMT_YUV420P, PIX_FMT_YUVJ420P};
use crate::utils::{BufferHandle, DecoderMemory};

#[wasm_bindgen]
extern "C" {
    /// The emscripten module hosting the native decoder.
    #[derive(Clone, Debug)]
    pub type DecoderModule;

    #[wasm_bindgen(method, js_name = _malloc)]
    fn malloc(this: &DecoderModule, size: u32) -> u32;

    #[wasm_bindgen(method, js_name = _free)]
    fn free(this: &DecoderModule, ptr: u32);

    #[wasm_bindgen(method, getter = HEAPU8)]
    fn heap_u8(this: &DecoderModule) -> Uint8Array;

    type ExternalDecoder;

    #[wasm_bindgen(method, catch)]
    fn open(
        this: &ExternalDecoder,
        stream: &str,
        queue_size: u32,
        thread_count: u32,
        thread_type: u32,
        callback: &JsValue,
    ) -> Result<(), JsValue>;

    #[wasm_bindgen(method, catch)]
    fn decode(this: &ExternalDecoder, buf: u32, size: u32) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(method, catch, js_name = decodeAsync)]
    fn decode_async(this: &ExternalDecoder, buf: u32, size: u32) -> Result<(), JsValue>;

    #[wasm_bindgen(method)]
    fn delete(this: &ExternalDecoder);

    type ExternalFrame;

    #[wasm_bindgen(method, getter)]
    fn width(this: &ExternalFrame) -> u32;

    #[wasm_bindgen(method, getter)]
    fn height(this: &ExternalFrame) -> u32;

    #[wasm_bindgen(method, getter)]
    fn format(this: &ExternalFrame) -> i32;

    #[wasm_bindgen(method, getter)]
    fn pts(this: &ExternalFrame) -> JsValue;

    #[wasm_bindgen(method, js_name = getBytes)]
    fn get_bytes(this: &ExternalFrame) -> Uint8Array;

    #[wasm_bindgen(method, js_name = delete)]
    fn release(this: &ExternalFrame);
}

impl DecoderModule {
    /// `Module` option when given, else the global emscripten `Module`.
    pub fn lookup(options: &JsValue) -> Option<DecoderModule> {
        let explicit = Reflect::get(options, &JsValue::from_str("module")).ok();
        let module = match explicit {
            Some(m) if m.is_object() => m,
            _ => Reflect::get(&js_sys::global(), &JsValue::from_str("Module")).ok()?,
        };
        let decoder = Reflect::get(&module, &JsValue::from_str("Decoder")).ok()?;
        decoder
            .is_function()
            .then(|| module.unchecked_into::<DecoderModule>())
    }

    /// Verbosity of the module's own logging (`Module.Log.set_v`).
    pub fn set_log_verbosity(&self, level: i32) -> Result<(), JsValue> {
        let log = Reflect::get(self, &JsValue::from_str("Log"))?;
        let set_v = if log.is_object() {
            Reflect::get(&log, &JsValue::from_str("set_v"))?
        } else {
            JsValue::UNDEFINED
        };
        match set_v.dyn_into::<Function>() {
            Ok(set_v) => set_v.call1(&log, &level.into()).map(drop),
            Err(_) => {
                debug!("decoder module has no Log.set_v");
                Ok(())
            }
        }
    }

    /// `new Module.OpenGLPlayer()`, when the module was built with one.
    pub fn create_player(&self) -> Result<JsValue, JsValue> {
        let ctor = Reflect::get(self, &JsValue::from_str("OpenGLPlayer"))?
            .dyn_into::<Function>()
            .map_err(|_| JsValue::from_str("decoder module has no OpenGLPlayer"))?;
        Reflect::construct(&ctor, &Array::new())
    }
}

/// `_malloc`ed regions of the module heap.
pub struct JsMemory {
    module: DecoderModule,
    sizes: RefCell<HashMap<u32, usize>>,
}

impl JsMemory {
    pub fn new(module: DecoderModule) -> Self {
        Self {
            module,
            sizes: RefCell::new(HashMap::new()),
        }
    }
}

impl DecoderMemory for JsMemory {
    fn alloc(&self, len: usize) -> Result<BufferHandle, DecodeError> {
        let size = u32::try_from(len).map_err(|_| DecodeError::OutOfMemory(len))?;
        let ptr = self.module.malloc(size);
        if ptr == 0 {
            return Err(DecodeError::OutOfMemory(len));
        }
        self.sizes.borrow_mut().insert(ptr, len);
        Ok(BufferHandle(ptr))
    }

    fn write(&self, handle: BufferHandle, bytes: &[u8]) -> Result<(), DecodeError> {
        let len = *self
            .sizes
            .borrow()
            .get(&handle.0)
            .ok_or(DecodeError::InvalidHandle(handle.0))?;
        let n = bytes.len().min(len);
        // the heap view is replaced whenever wasm memory grows
        let heap = self.module.heap_u8();
        heap.subarray(handle.0, handle.0 + n as u32)
            .copy_from(&bytes[..n]);
        Ok(())
    }

    fn free(&self, handle: BufferHandle) {
        if self.sizes.borrow_mut().remove(&handle.0).is_some() {
            self.module.free(handle.0);
        }
    }
}

/// [`Decoder`] over `Module.Decoder`. Completions carry no sequence tag;
/// the module delivers them in submission order.
pub struct JsDecoder {
    module: DecoderModule,
    memory: Rc<JsMemory>,
    inner: Option<ExternalDecoder>,
    callback: Option<Closure<dyn FnMut(JsValue)>>,
}

impl JsDecoder {
    pub fn new(module: DecoderModule) -> Self {
        Self {
            memory: Rc::new(JsMemory::new(module.clone())),
            module,
            inner: None,
            callback: None,
        }
    }

    fn construct(&self) -> Result<ExternalDecoder, DecodeError> {
        let ctor = Reflect::get(&self.module, &JsValue::from_str("Decoder")).map_err(external)?;
        let ctor = ctor
            .dyn_into::<Function>()
            .map_err(|_| DecodeError::External("Module.Decoder is not a constructor".into()))?;
        let decoder = Reflect::construct(&ctor, &Array::new()).map_err(external)?;
        Ok(decoder.unchecked_into())
    }
}

impl Decoder for JsDecoder {
    fn open(
        &mut self,
        stream: &str,
        options: &DecodeOptions,
        events: EventSender,
    ) -> Result<(), DecodeError> {
        self.close();
        let inner = self.construct()?;

        let asynchronous = options.asynchronous;
        // sync results come back from `decode`; the callback then only
        // releases its frame reference
        let callback = Closure::wrap(Box::new(move |frame: JsValue| {
            if asynchronous {
                events.decoded(Completion::untagged(take_frame(frame)));
            } else {
                release_frame(frame);
            }
        }) as Box<dyn FnMut(JsValue)>);

        let opened = inner.open(
            stream,
            options.queue_size,
            options.codec.thread_count,
            options.codec.thread_type.code(),
            callback.as_ref(),
        );
        if let Err(err) = opened {
            inner.delete();
            return Err(external(err));
        }
        self.inner = Some(inner);
        self.callback = Some(callback);
        Ok(())
    }

    fn memory(&self) -> Rc<dyn DecoderMemory> {
        self.memory.clone()
    }

    fn decode(&mut self, buffer: BufferHandle, len: usize) -> Result<Option<Frame>, DecodeError> {
        let inner = self.inner.as_ref().ok_or(DecodeError::NotOpen)?;
        let frame = inner.decode(buffer.0, len as u32).map_err(external)?;
        Ok(take_frame(frame))
    }

    fn decode_async(
        &mut self,
        _seq: u64,
        buffer: BufferHandle,
        len: usize,
    ) -> Result<(), DecodeError> {
        let inner = self.inner.as_ref().ok_or(DecodeError::NotOpen)?;
        inner.decode_async(buffer.0, len as u32).map_err(external)
    }

    fn tags_completions(&self) -> bool {
        false
    }

    fn close(&mut self) {
        if let Some(inner) = self.inner.take() {
            // joins the module's decode thread
            inner.delete();
        }
        self.callback = None;
    }
}

impl Drop for JsDecoder {
    fn drop(&mut self) {
        self.close();
    }
}

/// Copies a module frame out of the wasm heap and deletes it.
fn take_frame(value: JsValue) -> Option<Frame> {
    if value.is_null() || value.is_undefined() {
        return None;
    }
    let external: ExternalFrame = value.unchecked_into();
    let frame = copy_frame(&external);
    external.release();
    frame
        .map_err(|err| debug!("decoded frame dropped: {err}"))
        .ok()
}

fn release_frame(value: JsValue) {
    if !value.is_null() && !value.is_undefined() {
        value.unchecked_into::<ExternalFrame>().release();
    }
}

fn copy_frame(external: &ExternalFrame) -> Result<Frame, DecodeError> {
    let format = match external.format() {
        PIX_FMT_YUV420P => PixelFormat::Yuv420p,
        PIX_FMT_YUVJ420P => PixelFormat::Yuvj420p,
        other => return Err(DecodeError::UnsupportedFormat(other)),
    };
    let frame = Frame::yuv420(
        external.width(),
        external.height(),
        external.get_bytes().to_vec(),
    )?;
    Ok(frame.with_format(format).with_pts(pts(&external.pts())))
}

/// `int64_t` arrives as a BigInt or a plain number depending on the build.
fn pts(value: &JsValue) -> i64 {
    if let Some(n) = value.as_f64() {
        return n as i64;
    }
    value
        .dyn_ref::<BigInt>()
        .and_then(|b| b.to_string(10).ok())
        .and_then(|s| String::from(s).parse().ok())
        .unwrap_or(0)
}

fn external(err: JsValue) -> DecodeError {
    DecodeError::External(describe(&err))
}
