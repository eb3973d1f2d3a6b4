//! Single-slot carrier for the first error raised by any relay thread.
//!
//! Recording never blocks. When the slot is already full the new error is
//! logged and discarded, so only one error reaches the completion signal.

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use tracing::{debug, warn};

use crate::error::ExecStreamError;

#[derive(Clone)]
pub(crate) struct ErrorSlot {
    tx: SyncSender<ExecStreamError>,
}

pub(crate) struct ErrorSlotReader {
    rx: Receiver<ExecStreamError>,
}

pub(crate) fn error_slot() -> (ErrorSlot, ErrorSlotReader) {
    let (tx, rx) = mpsc::sync_channel(1);
    (ErrorSlot { tx }, ErrorSlotReader { rx })
}

impl ErrorSlot {
    pub(crate) fn record(&self, err: ExecStreamError) {
        match self.tx.try_send(err) {
            Ok(()) => debug!("recorded exec stream error"),
            Err(TrySendError::Full(err)) => {
                warn!(error = %err, "exec stream error already recorded, dropping this one");
            }
            Err(TrySendError::Disconnected(err)) => {
                warn!(error = %err, "exec stream already completed, dropping late error");
            }
        }
    }
}

impl ErrorSlotReader {
    /// Take the recorded error, if any, without blocking.
    pub(crate) fn take(&self) -> Option<ExecStreamError> {
        self.rx.try_recv().ok()
    }
}
