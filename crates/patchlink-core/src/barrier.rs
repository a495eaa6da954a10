//! One-shot completion barriers and cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, never, select};
use parking_lot::Mutex;
use thiserror::Error;

use crate::protocol::StatusCode;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("Wait interrupted")]
    Interrupted,
}

/// Cancellation token shared by everything that may block on the device.
///
/// Cancelling drops the only sender of an internal channel, so every
/// `select!` watching the signal wakes at once.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            inner: Arc::new(CancelInner {
                trigger: Mutex::new(Some(tx)),
                signal: rx,
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.trigger.lock().take();
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.inner.signal.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Receiver that becomes disconnected once the token is cancelled.
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot barrier carrying a status code.
///
/// Released at most once; later releases are ignored.
pub struct Barrier {
    tx: Sender<StatusCode>,
    rx: Receiver<StatusCode>,
    fired: AtomicBool,
}

impl Barrier {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self {
            tx,
            rx,
            fired: AtomicBool::new(false),
        }
    }

    /// Release the barrier. Returns `false` if it was already released.
    pub fn release(&self, status: StatusCode) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        let _ = self.tx.try_send(status);
        true
    }

    pub fn is_released(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Block until released, cancelled or `timeout` elapses.
    ///
    /// A status already released wins over a cancellation.
    pub fn wait(
        &self,
        timeout: Duration,
        cancel: Option<&CancelToken>,
    ) -> Result<StatusCode, WaitError> {
        if let Ok(status) = self.rx.try_recv() {
            return Ok(status);
        }
        let idle = never::<()>();
        let cancel_rx = cancel.map(CancelToken::signal).unwrap_or(&idle);
        select! {
            recv(self.rx) -> msg => msg.map_err(|_| WaitError::Interrupted),
            recv(cancel_rx) -> _ => self.rx.try_recv().map_err(|_| WaitError::Interrupted),
            default(timeout) => Err(WaitError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

impl Default for Barrier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_release_once() {
        let barrier = Barrier::new();
        assert!(barrier.release(StatusCode::OK));
        assert!(!barrier.release(StatusCode::DISK_ERR));
        assert_eq!(
            barrier.wait(Duration::from_millis(10), None),
            Ok(StatusCode::OK)
        );
    }

    #[test]
    fn test_wait_times_out() {
        let barrier = Barrier::new();
        let start = Instant::now();
        let res = barrier.wait(Duration::from_millis(20), None);
        assert_eq!(res, Err(WaitError::Timeout { timeout_ms: 20 }));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_release_from_other_thread() {
        let barrier = Arc::new(Barrier::new());
        let remote = Arc::clone(&barrier);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            remote.release(StatusCode::NO_FILE);
        });
        let res = barrier.wait(Duration::from_secs(2), None);
        handle.join().unwrap();
        assert_eq!(res, Ok(StatusCode::NO_FILE));
    }

    #[test]
    fn test_cancel_interrupts_wait() {
        let barrier = Barrier::new();
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            remote.cancel();
        });
        let res = barrier.wait(Duration::from_secs(5), Some(&cancel));
        handle.join().unwrap();
        assert_eq!(res, Err(WaitError::Interrupted));
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_released_status_wins_over_cancel() {
        let cancel = CancelToken::new();
        for _ in 0..50 {
            let barrier = Barrier::new();
            barrier.release(StatusCode::EXIST);
            cancel.cancel();
            assert_eq!(
                barrier.wait(Duration::from_secs(1), Some(&cancel)),
                Ok(StatusCode::EXIST)
            );
        }
    }
}
