//! Transport contract between a node and one peer
//!
//! The core does not implement networking. The host application supplies a
//! point-to-point channel to each peer that already provides authentication,
//! privacy, reliability and in-order delivery while connected (an
//! authenticated TLS connection, say). Two implementations ship with this
//! crate: [`crate::sim::SimChannel`] for in-process tests and demos, and
//! [`crate::net::StreamChannel`] for hosts that hand over an already-secured
//! async byte stream.

/// Handler for frames received from the peer
pub type FrameHandler = Box<dyn FnMut(Vec<u8>) + Send>;

/// Handler invoked exactly once when the channel closes
pub type CloseHandler = Box<dyn FnOnce() + Send>;

/// Point-to-point transport between exactly two nodes
///
/// ## Contract
///
/// - `send` is best-effort and fire-and-forget: frames are delivered in
///   send order while the channel stays connected, and silently dropped if
///   it is or becomes disconnected. Delivery must be asynchronous with
///   respect to the caller: `send` must never synchronously invoke the
///   receive path of either end, because node handlers run to completion
///   and are not reentrant.
/// - `on_receive` is registerable exactly once per channel instance. The
///   handler is invoked once per frame ever received on the channel, past
///   or future: frames that arrived before registration are replayed first,
///   in arrival order.
/// - `on_close` is registerable exactly once. The handler fires exactly
///   once, either immediately (if the channel is already closed) or upon
///   future closure. Closing stops future deliveries, but frames already
///   handed to the transport are not recalled.
pub trait Channel: Send + Sync {
    /// Send an opaque frame to the peer, best-effort
    fn send(&self, frame: Vec<u8>);

    /// Register the receive handler; invalid to call twice
    fn on_receive(&self, handler: FrameHandler);

    /// Register the close handler; invalid to call twice
    fn on_close(&self, handler: CloseHandler);
}
