//! One-shot broadcast signal.
//!
//! A `Signal` fires at most once and can be awaited by any number of tasks, before
//! or after it fired. The session uses one for "connected" and one for "closed".

use tokio::sync::watch;

#[derive(Debug)]
pub struct Signal {
    tx: watch::Sender<bool>,
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Fire the signal. Returns true only for the call that actually fired it.
    pub fn fire(&self) -> bool {
        self.tx.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        })
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal fires. Returns immediately if it already has.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so `wait_for` can only fail after we are dropped
        let _ = rx.wait_for(|fired| *fired).await;
    }
}
