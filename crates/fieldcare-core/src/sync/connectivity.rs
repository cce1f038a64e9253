//! Connectivity monitor.

use std::sync::RwLock;

use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A genuine change in reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// unreachable → reachable
    Restored,
    /// reachable → unreachable
    Lost,
}

type Handler = Box<dyn Fn(Transition) + Send + Sync>;

/// Tracks whether the remote service is reachable.
///
/// Platform reachability reports go through [`report`](Self::report);
/// repeated reports of the current state are swallowed, so handlers see
/// each transition exactly once. Handlers run on the reporting thread and
/// must not block.
///
/// The `watch` value is the only copy of the flag; compare and update
/// happen under its lock.
pub struct ConnectivityMonitor {
    handlers: RwLock<Vec<Handler>>,
    state_tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Create a monitor seeded with the platform's current reachability.
    pub fn new(initially_reachable: bool) -> Self {
        let (state_tx, _) = watch::channel(initially_reachable);
        Self {
            handlers: RwLock::new(Vec::new()),
            state_tx,
        }
    }

    pub fn is_reachable(&self) -> bool {
        *self.state_tx.borrow()
    }

    /// Feed in a reachability observation.
    ///
    /// Returns the transition it caused, or `None` for a duplicate report.
    pub fn report(&self, reachable: bool) -> Option<Transition> {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == reachable {
                return false;
            }
            *current = reachable;
            true
        });
        if !changed {
            debug!(reachable, "Duplicate reachability report ignored");
            return None;
        }

        let transition = if reachable {
            info!("Connectivity restored");
            Transition::Restored
        } else {
            info!("Connectivity lost; changes will sync when the connection is restored");
            Transition::Lost
        };

        match self.handlers.read() {
            Ok(handlers) => {
                for handler in handlers.iter() {
                    handler(transition);
                }
            }
            Err(e) => warn!(error = %e, "Connectivity handlers unavailable"),
        }

        Some(transition)
    }

    /// Register a handler invoked once per genuine transition.
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(Transition) + Send + Sync + 'static,
    {
        match self.handlers.write() {
            Ok(mut handlers) => handlers.push(Box::new(handler)),
            Err(e) => warn!(error = %e, "Failed to register connectivity handler"),
        }
    }

    /// Watch the reachable flag from async code.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.state_tx.subscribe()
    }
}
