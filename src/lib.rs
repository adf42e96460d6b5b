//! Browser player for encoded video streams delivered over a WebSocket.
//!
//! [`StreamClient`] owns the socket and a [`Decoder`]; every binary message
//! is copied into decoder memory and decoded, and the resulting YUV420
//! [`Frame`]s go to a [`FrameRenderer`] (on the web, the WebGL
//! [`render::WebGlPlayer`]) and to the user's data callback.
pub mod client;
pub mod decoder;
pub mod error;
pub mod event;
pub mod packet;
pub mod render;
pub mod transport;
pub mod types;
pub mod utils;

#[cfg(target_arch = "wasm32")]
pub mod wasm;

pub use client::{
    ClientCallbacks, ClientHandle, ClientOptions, OptionsPatch, StreamClient, StreamData,
};
pub use decoder::{Decoder, DecodeOptions, Frame, PixelFormat, StreamDecoder};
pub use error::{ClientError, ConfigError, DecodeError, RenderError, TransportError};
pub use event::{ClientEvent, CloseFrame, EventReceiver, EventSender, TransportEvent};
pub use packet::Packet;
pub use render::FrameRenderer;
pub use transport::{Connection, Connector};
pub use types::StreamInfo;
