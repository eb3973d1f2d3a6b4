use std::sync::{Arc, Mutex};

use execrelay_frame::ExecResponse;

use crate::error::{ExecStreamError, Result};
use crate::transport::ResponseSink;

/// Shares one [`ResponseSink`] between threads, one message at a time.
///
/// Callers are served in lock acquisition order; nothing is buffered or
/// reordered.
pub struct SerializedSender<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> Clone for SerializedSender<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ResponseSink> SerializedSender<S> {
    pub fn new(sink: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sink)),
        }
    }

    /// Send one message while holding exclusive access to the sink.
    pub fn send(&self, msg: &ExecResponse) -> Result<()> {
        let mut sink = self
            .inner
            .lock()
            .map_err(|_| ExecStreamError::Poisoned("response sink"))?;
        sink.send(msg)
    }

    /// Send the terminal exit message for a finished process.
    pub fn send_exit(&self, exit_code: i32) -> Result<()> {
        self.send(&ExecResponse::exit(exit_code))
    }

    /// Recover the sink once every other clone has been dropped.
    pub fn into_inner(self) -> Option<S> {
        Arc::try_unwrap(self.inner)
            .ok()
            .and_then(|mutex| mutex.into_inner().ok())
    }
}

impl<S> std::fmt::Debug for SerializedSender<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializedSender")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;

    /// Sink that fails if two sends ever overlap.
    struct OverlapDetector {
        busy: Arc<AtomicBool>,
        sent: Vec<ExecResponse>,
    }

    impl ResponseSink for OverlapDetector {
        fn send(&mut self, msg: &ExecResponse) -> Result<()> {
            assert!(!self.busy.swap(true, Ordering::SeqCst), "overlapping send");
            thread::sleep(Duration::from_micros(200));
            self.sent.push(msg.clone());
            self.busy.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn concurrent_senders_never_overlap() {
        let sender = SerializedSender::new(OverlapDetector {
            busy: Arc::new(AtomicBool::new(false)),
            sent: Vec::new(),
        });

        let workers: Vec<_> = (0..4)
            .map(|n| {
                let sender = sender.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        sender.send(&ExecResponse::stdout(vec![n as u8])).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let sink = sender.into_inner().expect("all clones dropped");
        assert_eq!(sink.sent.len(), 100);
    }

    #[test]
    fn per_thread_order_is_preserved() {
        let (tx, rx) = std::sync::mpsc::channel();
        let sender = SerializedSender::new(tx);

        let out = {
            let sender = sender.clone();
            thread::spawn(move || {
                for i in 0..50u8 {
                    sender.send(&ExecResponse::stdout(vec![i])).unwrap();
                }
            })
        };
        let err = {
            let sender = sender.clone();
            thread::spawn(move || {
                for i in 0..50u8 {
                    sender.send(&ExecResponse::stderr(vec![i])).unwrap();
                }
            })
        };
        out.join().unwrap();
        err.join().unwrap();
        drop(sender);

        let msgs: Vec<ExecResponse> = rx.iter().collect();
        let stdout: Vec<u8> = msgs
            .iter()
            .filter_map(|m| m.stdout.as_ref().map(|op| op.data[0]))
            .collect();
        let stderr: Vec<u8> = msgs
            .iter()
            .filter_map(|m| m.stderr.as_ref().map(|op| op.data[0]))
            .collect();
        assert_eq!(stdout, (0..50).collect::<Vec<u8>>());
        assert_eq!(stderr, (0..50).collect::<Vec<u8>>());
    }

    #[test]
    fn send_exit_builds_exit_message() {
        let (tx, rx) = std::sync::mpsc::channel();
        let sender = SerializedSender::new(tx);
        sender.send_exit(127).unwrap();

        assert_eq!(rx.recv().unwrap(), ExecResponse::exit(127));
    }

    #[test]
    fn into_inner_fails_while_shared() {
        let (tx, _rx) = std::sync::mpsc::channel::<ExecResponse>();
        let sender = SerializedSender::new(tx);
        let _other = sender.clone();
        assert!(sender.into_inner().is_none());
    }
}
