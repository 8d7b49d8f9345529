//! Connection eligibility tracking.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy)]
struct Signals {
    visible: bool,
    focused: bool,
}

impl Signals {
    fn eligible(self) -> bool {
        self.visible && self.focused
    }
}

/// Reports whether the consuming surface may hold a live connection.
///
/// Eligible means visible and focused. The host feeds visibility-change,
/// focus and blur signals in; the synchronizer watches the derived flag.
/// Clones share state.
#[derive(Debug, Clone)]
pub struct VisibilityMonitor {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    signals: Mutex<Signals>,
    eligible: watch::Sender<bool>,
}

impl VisibilityMonitor {
    /// Creates a monitor from the initial visibility and focus.
    pub fn new(visible: bool, focused: bool) -> Self {
        let signals = Signals { visible, focused };
        let (eligible, _) = watch::channel(signals.eligible());
        Self {
            inner: Arc::new(Inner {
                signals: Mutex::new(signals),
                eligible,
            }),
        }
    }

    /// Creates a monitor for hosts with no notion of visibility.
    pub fn always_eligible() -> Self {
        Self::new(true, true)
    }

    /// Records a visibility change.
    pub fn set_visible(&self, visible: bool) {
        self.update(|signals| signals.visible = visible);
    }

    /// Records that the surface gained input focus.
    pub fn focus(&self) {
        self.update(|signals| signals.focused = true);
    }

    /// Records that the surface lost input focus.
    pub fn blur(&self) {
        self.update(|signals| signals.focused = false);
    }

    /// Returns true if a connection may be held right now.
    pub fn is_eligible(&self) -> bool {
        self.inner.signals.lock().eligible()
    }

    /// Returns a receiver that observes eligibility changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.eligible.subscribe()
    }

    fn update(&self, apply: impl FnOnce(&mut Signals)) {
        let mut signals = self.inner.signals.lock();
        apply(&mut signals);
        let eligible = signals.eligible();
        self.inner.eligible.send_if_modified(|current| {
            if *current == eligible {
                false
            } else {
                *current = eligible;
                true
            }
        });
        drop(signals);
        tracing::trace!(eligible, "visibility updated");
    }
}

impl Default for VisibilityMonitor {
    fn default() -> Self {
        Self::always_eligible()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eligible_needs_visible_and_focused() {
        let monitor = VisibilityMonitor::new(true, false);
        assert!(!monitor.is_eligible());
        monitor.focus();
        assert!(monitor.is_eligible());
        monitor.set_visible(false);
        assert!(!monitor.is_eligible());
        monitor.set_visible(true);
        monitor.blur();
        assert!(!monitor.is_eligible());
    }

    #[test]
    fn subscribers_see_only_real_changes() {
        let monitor = VisibilityMonitor::always_eligible();
        let mut rx = monitor.subscribe();
        assert!(*rx.borrow_and_update());

        monitor.focus();
        assert!(!rx.has_changed().unwrap());

        monitor.blur();
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());

        monitor.set_visible(false);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn clones_share_state() {
        let monitor = VisibilityMonitor::new(false, true);
        let handle = monitor.clone();
        handle.set_visible(true);
        assert!(monitor.is_eligible());
    }
}
