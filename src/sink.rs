//! Output sinks
//!
//! Rendered output leaves the engine through an [`OutputSink`]. Writes are
//! async so a slow consumer exerts backpressure on the template itself: the
//! template function suspends inside `print` until the sink accepts the
//! chunk. A sink whose consumer has gone away reports [`SinkError::Closed`],
//! which the engine treats as early termination rather than failure.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use tokio::sync::mpsc;

/// Error produced by a sink write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The consuming side of the sink is gone; no further output can be
    /// delivered.
    Closed,
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Closed => write!(f, "output sink closed"),
        }
    }
}

impl std::error::Error for SinkError {}

pub type SinkFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SinkError>> + 'a>>;

/// Destination for rendered template output.
///
/// Object safe; the engine holds sinks as `Rc<dyn OutputSink>`.
pub trait OutputSink {
    /// Deliver one chunk of rendered text, suspending until the consumer has
    /// room for it.
    fn write(&self, chunk: String) -> SinkFuture<'_>;
}

/// Sink that accumulates output in memory. Mainly for tests and the
/// check/compile paths; never exerts backpressure.
#[derive(Clone, Default)]
pub struct MemorySink {
    buffer: Rc<RefCell<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        self.buffer.borrow().clone()
    }
}

impl OutputSink for MemorySink {
    fn write(&self, chunk: String) -> SinkFuture<'_> {
        self.buffer.borrow_mut().push_str(&chunk);
        Box::pin(async { Ok(()) })
    }
}

/// Sink backed by a bounded channel.
///
/// The channel capacity is the backpressure window: once the consumer falls
/// that many chunks behind, `write` suspends. Dropping the receiver closes
/// the sink.
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
    closed: Cell<bool>,
}

impl ChannelSink {
    /// Create a sink and its consuming end with the given chunk capacity.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            ChannelSink {
                tx,
                closed: Cell::new(false),
            },
            rx,
        )
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get() || self.tx.is_closed()
    }
}

impl OutputSink for ChannelSink {
    fn write(&self, chunk: String) -> SinkFuture<'_> {
        Box::pin(async move {
            if self.closed.get() {
                return Err(SinkError::Closed);
            }
            self.tx.send(chunk).await.map_err(|_| {
                self.closed.set(true);
                SinkError::Closed
            })
        })
    }
}
