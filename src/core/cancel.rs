//! Caller-supplied cancellation for in-flight stages.
//!
//! A [`Canceller`] flips a shared flag; every [`CancelSignal`] cloned from it
//! observes the flip. Built on a tokio `watch` channel.

use tokio::sync::watch;

/// Owning side: triggers cancellation
#[derive(Debug)]
pub struct Canceller {
    tx: watch::Sender<bool>,
}

/// Observing side: passed into `PipelineEngine::advance_with`
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl Canceller {
    /// Create a canceller and its first signal
    pub fn new() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelSignal { rx })
    }

    /// Cancel every signal derived from this canceller
    pub fn cancel(&self) {
        // send_replace succeeds even when no receiver is alive
        self.tx.send_replace(true);
    }

    /// Another signal observing this canceller
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // Dropping the sender leaves the value at false forever
        drop(tx);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested; pends forever otherwise
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::never()
    }
}
