//! Per-owner listener set.

use std::sync::{Arc, Weak};

use super::{LifeEvent, LifecycleListener};

/// Weak listeners of one owner plus its last visibility state.
#[derive(Default)]
pub(super) struct Holder {
    listeners: Vec<Weak<dyn LifecycleListener>>,
    hidden: bool,
}

impl Holder {
    /// Add a listener unless the same instance is already present.
    pub(super) fn add(&mut self, listener: Weak<dyn LifecycleListener>) {
        if !self.listeners.iter().any(|l| l.ptr_eq(&listener)) {
            self.listeners.push(listener);
        }
    }

    /// Drop `listener` and any listener that no longer exists.
    pub(super) fn remove(&mut self, listener: *const ()) {
        self.listeners
            .retain(|l| l.strong_count() > 0 && l.as_ptr().cast::<()>() != listener);
    }

    /// Apply the visibility filter; returns false when `event` repeats the
    /// current state.
    pub(super) fn accepts(&mut self, event: LifeEvent) -> bool {
        match event {
            LifeEvent::Show if self.hidden => {
                self.hidden = false;
                true
            }
            LifeEvent::Hide if !self.hidden => {
                self.hidden = true;
                true
            }
            LifeEvent::Show | LifeEvent::Hide => false,
            LifeEvent::Destroy => true,
        }
    }

    /// Live listeners, upgraded for dispatch.
    pub(super) fn live(&self) -> Vec<Arc<dyn LifecycleListener>> {
        self.listeners.iter().filter_map(Weak::upgrade).collect()
    }

    pub(super) fn len(&self) -> usize {
        self.listeners.len()
    }

    #[cfg(test)]
    pub(super) fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
