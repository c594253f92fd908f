//! Cooperative stop signal shared by the bridge's long-running loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Cloneable handle that asks a loop to exit at its next sleep boundary.
#[derive(Clone, Debug)]
pub struct StopHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StopHandle {
    /// Creates a handle in the running state.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Requests the loop to stop. An in-flight poll or tick runs to completion first.
    pub fn stop(&self) {
        self.sender.send_replace(true);
    }

    /// Returns `true` once [`StopHandle::stop`] has been called.
    pub fn is_stopped(&self) -> bool {
        *self.sender.borrow()
    }

    /// Sleeps for `duration` unless stopped first.
    ///
    /// Returns `false` if the handle was or became stopped, i.e. the caller should exit.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let mut receiver = self.sender.subscribe();
        if *receiver.borrow_and_update() {
            return false;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_stopped(),
            _ = receiver.changed() => !self.is_stopped(),
        }
    }
}
