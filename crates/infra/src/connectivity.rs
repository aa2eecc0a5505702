//! Connectivity state shared between the client and the drain worker.

use lifeline_core::ConnectivityMonitor;
use tokio::sync::watch;
use tracing::info;

/// Observable online/offline flag.
///
/// The client reads the current value synchronously through
/// [`ConnectivityMonitor`]; the drain worker subscribes to transitions
/// through a watch channel. Whoever detects connectivity changes (a network
/// probe, a platform callback, a test) pushes them in via
/// [`set_online`](Self::set_online).
pub struct ConnectivityWatcher {
    sender: watch::Sender<bool>,
}

impl ConnectivityWatcher {
    /// Create a watcher with the given initial state.
    pub fn new(initially_online: bool) -> Self {
        let (sender, _) = watch::channel(initially_online);
        Self { sender }
    }

    /// Record a connectivity change. Setting the current value again is a
    /// no-op and wakes no subscribers.
    pub fn set_online(&self, online: bool) {
        let changed = self.sender.send_if_modified(|state| {
            if *state == online {
                false
            } else {
                *state = online;
                true
            }
        });
        if changed {
            info!(online, "connectivity changed");
        }
    }

    /// Subscribe to connectivity transitions.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl ConnectivityMonitor for ConnectivityWatcher {
    fn is_online(&self) -> bool {
        *self.sender.borrow()
    }
}
