//! Bounded queue of terminal resize notifications.

use std::sync::mpsc::{self, Receiver, SyncSender};

use execrelay_frame::TtySize;
use tracing::{debug, warn};

/// Terminal dimensions delivered to the process engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub height: u32,
    pub width: u32,
}

impl From<TtySize> for TerminalSize {
    fn from(size: TtySize) -> Self {
        Self {
            height: size.height,
            width: size.width,
        }
    }
}

/// Consumer end handed to the process engine.
pub type ResizeReceiver = Receiver<TerminalSize>;

/// Producer end owned by the inbound relay.
#[derive(Debug, Clone)]
pub struct ResizeSender {
    tx: SyncSender<TerminalSize>,
}

/// Create a resize queue holding at most `capacity` undelivered events.
///
/// Once full, [`ResizeSender::push`] blocks until the consumer takes one.
pub fn resize_queue(capacity: usize) -> (ResizeSender, ResizeReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity);
    (ResizeSender { tx }, rx)
}

impl ResizeSender {
    /// Enqueue a resize, blocking while the queue is full.
    ///
    /// Returns `false` if the consumer is gone and the event was discarded.
    pub fn push(&self, size: TerminalSize) -> bool {
        match self.tx.send(size) {
            Ok(()) => {
                debug!(height = size.height, width = size.width, "queued terminal resize");
                true
            }
            Err(_) => {
                warn!(
                    height = size.height,
                    width = size.width,
                    "resize consumer gone, discarding terminal resize"
                );
                false
            }
        }
    }
}
