//! Network reachability as seen by the sync engine.
//!
//! The platform (or the agent's backend probe) reports transitions; the
//! engine's supervisor watches them to go offline and to resync on return.

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(self) -> bool {
        self == Self::Online
    }
}

pub struct ConnectivityMonitor {
    tx: watch::Sender<Connectivity>,
}

impl ConnectivityMonitor {
    pub fn new(initial: Connectivity) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Connectivity {
        *self.tx.borrow()
    }

    /// Report the current reachability. Returns whether it changed.
    pub fn set(&self, connectivity: Connectivity) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == connectivity {
                return false;
            }
            *current = connectivity;
            true
        });
        if changed {
            tracing::info!(connectivity = ?connectivity, "Connectivity changed");
        }
        changed
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(Connectivity::Online)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_reports_do_not_wake_watchers() {
        let monitor = ConnectivityMonitor::default();
        let mut rx = monitor.subscribe();

        assert!(!monitor.set(Connectivity::Online));
        assert!(!rx.has_changed().unwrap());

        assert!(monitor.set(Connectivity::Offline));
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Connectivity::Offline);
    }
}
