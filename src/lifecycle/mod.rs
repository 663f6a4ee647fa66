//! Owner lifecycle tracking.
//!
//! Tasks bound to an owner register here and react to the owner's visibility
//! and destruction. The registry only holds weak references, so a task that
//! finishes and is dropped simply disappears from its holder.

mod holder;
mod registry;

pub use registry::LifecycleRegistry;

use serde::{Deserialize, Serialize};

/// Lifecycle transition of an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifeEvent {
    /// Owner became visible again
    Show,
    /// Owner went to the background
    Hide,
    /// Owner is gone; its tasks should stop
    Destroy,
}

/// Something that reacts to an owner's lifecycle.
pub trait LifecycleListener: Send + Sync {
    fn on_event(&self, event: LifeEvent);
}
