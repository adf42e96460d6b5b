//! Browser glue: `WebSocket` transport, the emscripten decoder module and
//! the JS classes `WsClient` and `WebGLPlayer`.
pub mod bindings;
pub mod decoder;
pub mod socket;

pub use bindings::{initialize, WebGlPlayerHandle, WsClient};
pub use decoder::{DecoderModule, JsDecoder, JsMemory};
pub use socket::{WebSocketConnection, WebSocketConnector};
