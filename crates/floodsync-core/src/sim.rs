//! In-memory transport with a discrete-event scheduler
//!
//! For tests and local demos. A [`Sim`] is a plain FIFO of deferred
//! deliveries; a [`SimChannel`] pair forms a bidirectional link whose sends
//! are postponed through the queue, so a node's handlers never re-enter
//! while one of them is still running. Draining the queue to quiescence
//! makes multi-node convergence scenarios deterministic and instantaneous.
//!
//! ```ignore
//! use floodsync_core::{Node, Sim};
//!
//! let sim = Sim::new();
//! let (a, b) = (Node::new(), Node::new());
//! a.publish("hi");
//! let link = sim.connect_nodes(&a, &b);
//! sim.run_until_quiescent();
//! assert_eq!(a.origins(), b.origins());
//! link.close();
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::channel::{Channel, CloseHandler, FrameHandler};
use crate::node::Node;

type Event = Box<dyn FnOnce() + Send>;

/// Discrete-event scheduler: a queue of pending frame deliveries
#[derive(Clone, Default)]
pub struct Sim {
    queue: Arc<Mutex<VecDeque<Event>>>,
}

impl Sim {
    /// Create a new scheduler with nothing pending
    pub fn new() -> Self {
        Self::default()
    }

    fn postpone(&self, event: Event) {
        self.queue.lock().push_back(event);
    }

    /// Run the oldest pending event; returns false when nothing was pending
    pub fn run_next(&self) -> bool {
        let event = self.queue.lock().pop_front();
        match event {
            Some(event) => {
                event();
                true
            }
            None => false,
        }
    }

    /// Run pending events until no inter-node messages remain
    pub fn run_until_quiescent(&self) {
        while self.run_next() {}
    }

    /// Number of deliveries currently pending
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Create a connected pair of channel endpoints
    pub fn channel_pair(&self) -> (Arc<SimChannel>, Arc<SimChannel>) {
        let a = SimChannel::new(self.clone());
        let b = SimChannel::new(self.clone());
        a.state.lock().other_end = Some(Arc::downgrade(&b));
        b.state.lock().other_end = Some(Arc::downgrade(&a));
        (a, b)
    }

    /// Connect two nodes with a fresh bidirectional link
    pub fn connect_nodes(&self, a: &Node, b: &Node) -> SimLink {
        let (end_a, end_b) = self.channel_pair();
        a.connect(end_a.clone());
        b.connect(end_b.clone());
        SimLink { end: end_a }
    }
}

struct SimChannelState {
    /// The opposite endpoint; None once closed
    other_end: Option<Weak<SimChannel>>,
    receive_handler: Option<FrameHandler>,
    close_handler: Option<CloseHandler>,
    /// Frames that arrived before on_receive registration
    backlog: Vec<Vec<u8>>,
    closed: bool,
}

/// One endpoint of an in-memory link between two nodes
pub struct SimChannel {
    sim: Sim,
    state: Mutex<SimChannelState>,
}

impl SimChannel {
    fn new(sim: Sim) -> Arc<Self> {
        Arc::new(Self {
            sim,
            state: Mutex::new(SimChannelState {
                other_end: None,
                receive_handler: None,
                close_handler: None,
                backlog: Vec::new(),
                closed: false,
            }),
        })
    }

    /// Close both ends of the link, firing each end's close handler once
    ///
    /// Frames already postponed through the scheduler are not recalled;
    /// they will still be delivered when the queue drains.
    pub fn close(&self) {
        let (other_end, close_handler) = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            (state.other_end.take(), state.close_handler.take())
        };
        trace!("closing sim channel");
        if let Some(handler) = close_handler {
            handler();
        }
        if let Some(other) = other_end.and_then(|end| end.upgrade()) {
            other.close();
        }
    }

    fn deliver(self: Arc<Self>, frame: Vec<u8>) {
        let mut handler = {
            let mut state = self.state.lock();
            match state.receive_handler.take() {
                Some(handler) => handler,
                None => {
                    state.backlog.push(frame);
                    return;
                }
            }
        };
        // Run the handler outside the lock: handling a frame typically
        // sends on this same channel.
        handler(frame);
        self.state.lock().receive_handler = Some(handler);
    }
}

impl Channel for SimChannel {
    fn send(&self, frame: Vec<u8>) {
        let other_end = {
            let state = self.state.lock();
            if state.closed {
                trace!("dropping frame on closed sim channel");
                return;
            }
            state.other_end.clone()
        };
        let Some(other) = other_end.and_then(|end| end.upgrade()) else {
            return;
        };
        // The queue is FIFO, which preserves per-link send order.
        self.sim.postpone(Box::new(move || other.deliver(frame)));
    }

    fn on_receive(&self, mut handler: FrameHandler) {
        let backlog = {
            let mut state = self.state.lock();
            assert!(
                state.receive_handler.is_none(),
                "on_receive registered twice on the same channel"
            );
            std::mem::take(&mut state.backlog)
        };
        for frame in backlog {
            handler(frame);
        }
        self.state.lock().receive_handler = Some(handler);
    }

    fn on_close(&self, handler: CloseHandler) {
        let mut state = self.state.lock();
        assert!(
            state.close_handler.is_none(),
            "on_close registered twice on the same channel"
        );
        if state.closed {
            drop(state);
            handler();
        } else {
            state.close_handler = Some(handler);
        }
    }
}

/// Handle to a live link between two nodes, used to cut it
pub struct SimLink {
    end: Arc<SimChannel>,
}

impl SimLink {
    /// Cut the link; both nodes drop the peer and keep their data
    pub fn close(&self) {
        self.end.close();
    }
}
