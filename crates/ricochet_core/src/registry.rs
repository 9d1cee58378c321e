//! Single-provider gate for collision capture
//!
//! Exactly one capture provider may feed the simulator at a time. The
//! registry is an ordinary shared object handed to each provider; there is
//! no global instance.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Identity of one capture provider
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProviderId(u64);

/// Tracks which capture provider is currently active
#[derive(Debug, Default)]
pub struct CaptureRegistry {
    next_id: AtomicU64,
    active: Mutex<Option<ProviderId>>,
}

impl CaptureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out a fresh provider identity
    pub fn register(&self) -> ProviderId {
        ProviderId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Make `id` the active provider
    ///
    /// # Panics
    ///
    /// Panics if any provider is already active. Two providers writing the
    /// same collision surface is an integration bug.
    pub fn activate(&self, id: ProviderId) {
        let mut active = self.active.lock().unwrap();
        if let Some(current) = *active {
            // Unlock first so the panic does not poison the registry
            drop(active);
            panic!("capture provider {current:?} is already active; cannot activate {id:?}");
        }
        *active = Some(id);
        tracing::debug!("capture provider {:?} activated", id);
    }

    /// Release the active slot if `id` holds it
    pub fn deactivate(&self, id: ProviderId) {
        let mut active = self.active.lock().unwrap();
        if *active == Some(id) {
            *active = None;
            tracing::debug!("capture provider {:?} deactivated", id);
        }
    }

    pub fn active(&self) -> Option<ProviderId> {
        *self.active.lock().unwrap()
    }

    pub fn is_active(&self, id: ProviderId) -> bool {
        self.active() == Some(id)
    }
}
