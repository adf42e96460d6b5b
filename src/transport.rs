// transport.rs - Duplex message socket seam
use crate::error::TransportError;
use crate::event::EventSender;

/// Opens connections; each connection posts `open`, `message`, `close` and
/// `error` events through the sender it was given.
pub trait Connector {
    fn connect(
        &mut self,
        url: &str,
        events: EventSender,
    ) -> Result<Box<dyn Connection>, TransportError>;
}

pub trait Connection {
    /// Starts closing; a `close` event follows asynchronously.
    fn close(&mut self);
}
