// error.rs - Error types shared across the player
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("ws open error: url is null")]
    MissingUrl,
    #[error("ws open error: stream is null")]
    MissingStream,
    #[error("ws open error: already opened")]
    AlreadyOpen,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet truncated: need {needed} bytes, have {available}")]
    NotEnough { needed: usize, available: usize },
    #[error("negative length field: {0}")]
    NegativeLength(i32),
    #[error("packet size mismatch: header says {declared}, parsed {parsed}")]
    SizeMismatch { declared: usize, parsed: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("yuv420 frame needs even non-zero dimensions, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("yuv420 frame of {width}x{height} needs {expected} bytes, got {actual}")]
    LengthMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("decoder is not open")]
    NotOpen,
    #[error("invalid stream descriptor: {0}")]
    InvalidStream(#[from] serde_json::Error),
    #[error("stream has no video sub-stream")]
    NoVideoStream,
    #[error("codec not supported: id={0}")]
    UnsupportedCodec(i32),
    #[error("pixel format not supported: {0}")]
    UnsupportedFormat(i32),
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("unable to allocate {0} bytes of decoder memory")]
    OutOfMemory(usize),
    #[error("unknown buffer handle {0}")]
    InvalidHandle(u32),
    #[error("{0}")]
    Unsupported(&'static str),
    #[error("external decoder error: {0}")]
    External(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("render failed due to WebGL not supported")]
    Unavailable,
    #[error("renderer is busy")]
    Busy,
    #[error("gl error: {0}")]
    Gl(String),
    #[error("{0}")]
    Fullscreen(&'static str),
    #[error("player error: {0}")]
    Player(String),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
