//! Channel adapter over an async byte stream
//!
//! Bridges the callback-based [`Channel`] contract onto any
//! `AsyncRead + AsyncWrite` stream using length-delimited frames. The host
//! remains responsible for securing the stream (the protocol assumes the
//! transport already provides authentication, privacy and integrity - an
//! authenticated TLS connection, say); this adapter only does framing and
//! task plumbing.
//!
//! A reader task feeds inbound frames to the receive callback, buffering
//! anything that arrives before registration. A writer task drains an
//! unbounded outbound queue, which matches the protocol's fire-and-forget
//! send model: there is no backpressure, and a slow peer accumulates
//! outstanding frames on the transport side.

use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, trace};

use crate::channel::{Channel, CloseHandler, FrameHandler};

struct Hooks {
    receive_handler: Option<FrameHandler>,
    close_handler: Option<CloseHandler>,
    /// Frames that arrived before on_receive registration
    backlog: Vec<Vec<u8>>,
    closed: bool,
}

/// A [`Channel`] over an already-secured byte stream
pub struct StreamChannel {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    hooks: Arc<Mutex<Hooks>>,
}

impl StreamChannel {
    /// Wrap a stream, spawning reader and writer tasks on the current
    /// tokio runtime
    ///
    /// The channel reports closure when the stream hits EOF or an I/O
    /// error; frames sent after that are silently dropped.
    pub fn spawn<S>(stream: S) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let hooks = Arc::new(Mutex::new(Hooks {
            receive_handler: None,
            close_handler: None,
            backlog: Vec::new(),
            closed: false,
        }));

        let mut writer = FramedWrite::new(write_half, LengthDelimitedCodec::new());
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if let Err(err) = writer.send(Bytes::from(frame)).await {
                    debug!(error = %err, "stream write failed, stopping writer");
                    break;
                }
            }
        });

        let reader_hooks = hooks.clone();
        let mut reader = FramedRead::new(read_half, LengthDelimitedCodec::new());
        tokio::spawn(async move {
            while let Some(result) = reader.next().await {
                match result {
                    Ok(frame) => Self::dispatch(&reader_hooks, frame.to_vec()),
                    Err(err) => {
                        debug!(error = %err, "stream read failed");
                        break;
                    }
                }
            }
            Self::mark_closed(&reader_hooks);
        });

        Arc::new(Self { outbound, hooks })
    }

    fn dispatch(hooks: &Mutex<Hooks>, frame: Vec<u8>) {
        let mut handler = {
            let mut hooks = hooks.lock();
            match hooks.receive_handler.take() {
                Some(handler) => handler,
                None => {
                    hooks.backlog.push(frame);
                    return;
                }
            }
        };
        // Invoked outside the lock: the handler typically sends back on
        // this same channel.
        handler(frame);
        hooks.lock().receive_handler = Some(handler);
    }

    fn mark_closed(hooks: &Mutex<Hooks>) {
        let handler = {
            let mut hooks = hooks.lock();
            if hooks.closed {
                return;
            }
            hooks.closed = true;
            hooks.close_handler.take()
        };
        debug!("stream channel closed");
        if let Some(handler) = handler {
            handler();
        }
    }
}

impl Channel for StreamChannel {
    fn send(&self, frame: Vec<u8>) {
        if self.outbound.send(frame).is_err() {
            trace!("dropping frame on closed stream channel");
        }
    }

    fn on_receive(&self, mut handler: FrameHandler) {
        assert!(
            self.hooks.lock().receive_handler.is_none(),
            "on_receive registered twice on the same channel"
        );
        // Drain the backlog in rounds: the reader task may append more
        // frames while the handler runs on an earlier batch.
        loop {
            let backlog = {
                let mut hooks = self.hooks.lock();
                if hooks.backlog.is_empty() {
                    hooks.receive_handler = Some(handler);
                    return;
                }
                std::mem::take(&mut hooks.backlog)
            };
            for frame in backlog {
                handler(frame);
            }
        }
    }

    fn on_close(&self, handler: CloseHandler) {
        let mut hooks = self.hooks.lock();
        assert!(
            hooks.close_handler.is_none(),
            "on_close registered twice on the same channel"
        );
        if hooks.closed {
            drop(hooks);
            handler();
        } else {
            hooks.close_handler = Some(handler);
        }
    }
}
