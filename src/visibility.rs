//! Host visibility (foreground/background) signal.
//!
//! The synchronizer only needs a current value and a stream of transitions,
//! both of which a `watch` channel provides. Hosts bridge their own signal
//! (document visibility, window focus, terminal focus) into `ManualVisibility`.

use std::sync::Arc;

use tokio::sync::watch;

/// Source of the host's visibility state.
pub trait VisibilityMonitor: Send + Sync {
    fn is_visible(&self) -> bool;

    /// Receiver that is notified on every visibility transition.
    fn on_visibility_change(&self) -> watch::Receiver<bool>;
}

/// Visibility driven explicitly by the host.
#[derive(Clone)]
pub struct ManualVisibility {
    tx: Arc<watch::Sender<bool>>,
}

impl ManualVisibility {
    pub fn new(visible: bool) -> Self {
        let (tx, _rx) = watch::channel(visible);
        Self { tx: Arc::new(tx) }
    }

    /// Record a transition. Repeating the current value is a no-op.
    pub fn set_visible(&self, visible: bool) {
        self.tx.send_if_modified(|current| {
            if *current == visible {
                return false;
            }
            tracing::debug!(visible, "visibility changed");
            *current = visible;
            true
        });
    }

    pub fn show(&self) {
        self.set_visible(true);
    }

    pub fn hide(&self) {
        self.set_visible(false);
    }
}

impl Default for ManualVisibility {
    fn default() -> Self {
        Self::new(true)
    }
}

impl VisibilityMonitor for ManualVisibility {
    fn is_visible(&self) -> bool {
        *self.tx.borrow()
    }

    fn on_visibility_change(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Always foregrounded, for hosts with no visibility concept (CLI, daemons).
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysVisible;

impl VisibilityMonitor for AlwaysVisible {
    fn is_visible(&self) -> bool {
        true
    }

    fn on_visibility_change(&self) -> watch::Receiver<bool> {
        // The sender is dropped at once; the receiver keeps reporting `true`
        // and never signals a change.
        let (_tx, rx) = watch::channel(true);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_transitions_notify() {
        let visibility = ManualVisibility::new(true);
        let mut rx = visibility.on_visibility_change();

        visibility.hide();
        assert!(!visibility.is_visible());
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());

        visibility.hide();
        assert!(!rx.has_changed().unwrap());

        visibility.show();
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());
    }

    #[test]
    fn test_always_visible() {
        let visibility = AlwaysVisible;
        assert!(visibility.is_visible());
        assert!(*visibility.on_visibility_change().borrow());
    }
}
