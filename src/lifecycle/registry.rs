//! Registry mapping owners to their lifecycle listeners.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::holder::Holder;
use super::{LifeEvent, LifecycleListener};
use crate::id::OwnerId;

/// Tracks which listeners follow which owner.
///
/// Holders are created on first registration and live until the owner is
/// destroyed, so an owner keeps its visibility while it has no listeners. Listeners are called after the
/// registry lock is released, so they may register or unregister freely.
#[derive(Default)]
pub struct LifecycleRegistry {
    holders: Mutex<HashMap<OwnerId, Holder>>,
}

impl LifecycleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow `owner` with `listener`. Registering the same instance twice is a no-op.
    pub fn register<L: LifecycleListener + 'static>(&self, owner: OwnerId, listener: &Arc<L>) {
        let weak: Weak<L> = Arc::downgrade(listener);
        let weak: Weak<dyn LifecycleListener> = weak;
        self.holders.lock().entry(owner).or_default().add(weak);
        log::trace!("Registered lifecycle listener for {}", owner);
    }

    /// Stop following `owner`; expired listeners are pruned at the same time.
    /// The holder itself stays until `Destroy`.
    pub fn unregister(&self, owner: OwnerId, listener: &dyn LifecycleListener) {
        if let Some(holder) = self.holders.lock().get_mut(&owner) {
            holder.remove(std::ptr::from_ref(listener).cast());
        }
    }

    /// Deliver `event` to the owner's live listeners and return how many were called.
    ///
    /// `Destroy` forgets the owner. `Show` and `Hide` are only delivered when
    /// they change the owner's visibility.
    pub fn notify(&self, owner: OwnerId, event: LifeEvent) -> usize {
        let listeners = {
            let mut holders = self.holders.lock();
            match event {
                LifeEvent::Destroy => match holders.remove(&owner) {
                    Some(holder) => holder.live(),
                    None => return 0,
                },
                LifeEvent::Show | LifeEvent::Hide => match holders.get_mut(&owner) {
                    Some(holder) => {
                        if !holder.accepts(event) {
                            return 0;
                        }
                        holder.live()
                    }
                    None => return 0,
                },
            }
        };

        log::debug!("Lifecycle {:?} for {}: {} listener(s)", event, owner, listeners.len());
        for listener in &listeners {
            listener.on_event(event);
        }
        listeners.len()
    }

    /// Number of owners currently tracked.
    pub fn holder_count(&self) -> usize {
        self.holders.lock().len()
    }

    /// Number of listener slots held for `owner`, expired ones included.
    pub fn listener_count(&self, owner: OwnerId) -> usize {
        self.holders.lock().get(&owner).map_or(0, Holder::len)
    }
}

impl std::fmt::Debug for LifecycleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleRegistry")
            .field("holders", &self.holder_count())
            .finish()
    }
}
