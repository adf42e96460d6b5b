use js_sys::{ArrayBuffer, Uint8Array};
use log::debug;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{BinaryType, CloseEvent, ErrorEvent, Event, MessageEvent, WebSocket};

use crate::error::TransportError;
use crate::event::{CloseFrame, EventSender, TransportEvent};
use crate::transport::{Connection, Connector};

/// Opens browser `WebSocket`s in `arraybuffer` mode.
#[derive(Default)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(
        &mut self,
        url: &str,
        events: EventSender,
    ) -> Result<Box<dyn Connection>, TransportError> {
        let ws = WebSocket::new(url).map_err(|err| TransportError::Connect {
            url: url.to_string(),
            reason: describe(&err),
        })?;
        ws.set_binary_type(BinaryType::Arraybuffer);
        Ok(Box::new(WebSocketConnection::attach(ws, events)))
    }
}

/// A socket and the handlers installed on it. On drop only a one-shot
/// `close` handler stays attached, so the final close event still arrives.
pub struct WebSocketConnection {
    ws: WebSocket,
    events: EventSender,
    _onopen: Closure<dyn FnMut(Event)>,
    _onmessage: Closure<dyn FnMut(MessageEvent)>,
    _onclose: Closure<dyn FnMut(CloseEvent)>,
    _onerror: Closure<dyn FnMut(Event)>,
}

impl WebSocketConnection {
    fn attach(ws: WebSocket, events: EventSender) -> Self {
        let tx = events.clone();
        let onopen = Closure::wrap(Box::new(move |_: Event| {
            tx.transport(TransportEvent::Open);
        }) as Box<dyn FnMut(Event)>);

        let tx = events.clone();
        let onmessage = Closure::wrap(Box::new(move |e: MessageEvent| {
            match e.data().dyn_into::<ArrayBuffer>() {
                Ok(buf) => {
                    tx.transport(TransportEvent::Message(Uint8Array::new(&buf).to_vec()));
                }
                Err(data) => debug!("ws non-binary message ignored: {data:?}"),
            }
        }) as Box<dyn FnMut(MessageEvent)>);

        let tx = events.clone();
        let onclose = Closure::wrap(Box::new(move |e: CloseEvent| {
            tx.transport(TransportEvent::Close(close_frame(&e)));
        }) as Box<dyn FnMut(CloseEvent)>);

        let tx = events.clone();
        let onerror = Closure::wrap(Box::new(move |e: Event| {
            let detail = match e.dyn_ref::<ErrorEvent>() {
                Some(err) => err.message(),
                None => e.type_(),
            };
            tx.transport(TransportEvent::Error(detail));
        }) as Box<dyn FnMut(Event)>);

        ws.set_onopen(Some(onopen.as_ref().unchecked_ref()));
        ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
        ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));
        ws.set_onerror(Some(onerror.as_ref().unchecked_ref()));

        Self {
            ws,
            events,
            _onopen: onopen,
            _onmessage: onmessage,
            _onclose: onclose,
            _onerror: onerror,
        }
    }
}

impl Connection for WebSocketConnection {
    fn close(&mut self) {
        if let Err(err) = self.ws.close() {
            debug!("ws close failed: {}", describe(&err));
        }
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        self.ws.set_onopen(None);
        self.ws.set_onmessage(None);
        self.ws.set_onerror(None);
        if self.ws.ready_state() == WebSocket::CLOSED {
            self.ws.set_onclose(None);
            return;
        }
        let tx = self.events.clone();
        let onclose = Closure::once_into_js(move |e: CloseEvent| {
            tx.transport(TransportEvent::Close(close_frame(&e)));
        });
        self.ws.set_onclose(Some(onclose.unchecked_ref()));
    }
}

fn close_frame(e: &CloseEvent) -> CloseFrame {
    CloseFrame {
        code: e.code(),
        reason: e.reason(),
        was_clean: e.was_clean(),
    }
}

pub(crate) fn describe(err: &JsValue) -> String {
    err.as_string().unwrap_or_else(|| format!("{err:?}"))
}
