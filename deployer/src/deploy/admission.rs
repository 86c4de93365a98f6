//! Global admission gate: at most one pipeline runs at a time

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

/// Single-slot gate shared by every pipeline, regardless of product.
///
/// Builds share working trees and the restart target, so two pipelines must
/// never overlap.
#[derive(Debug, Default)]
pub struct AdmissionManager {
    occupied: AtomicBool,
}

impl AdmissionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the slot if it is free. Returns true only for the caller that
    /// flipped the flag.
    pub fn request_slot(&self) -> bool {
        self.occupied
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Free the slot
    pub fn release(&self) {
        self.occupied.store(false, Ordering::Release);
    }

    pub fn is_occupied(&self) -> bool {
        self.occupied.load(Ordering::Acquire)
    }

    /// Take the slot, returning a guard that frees it exactly once
    pub fn try_acquire(self: &Arc<Self>) -> Option<SlotGuard> {
        if self.request_slot() {
            debug!("Admission slot granted");
            Some(SlotGuard {
                manager: Some(self.clone()),
            })
        } else {
            debug!("Admission slot busy");
            None
        }
    }
}

/// Holds the admission slot; releases it on `release` or drop
#[derive(Debug)]
pub struct SlotGuard {
    manager: Option<Arc<AdmissionManager>>,
}

impl SlotGuard {
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(manager) = self.manager.take() {
            manager.release();
            debug!("Admission slot released");
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}
