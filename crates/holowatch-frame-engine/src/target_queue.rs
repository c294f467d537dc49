// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Latest-wins hologram target feed.

The content source pushes targets at its own rate; the frame loop takes at
most one per cycle. Only the newest target survives: a target that was never
taken before a newer one arrived is dropped, and every target is handed to
the optimizer at most once.
*/

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use holowatch_structures::HologramTarget;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct QueueStats {
    submitted: AtomicU64,
    superseded: AtomicU64,
}

/// Cloneable handle; clones share the same slot
#[derive(Debug, Clone, Default)]
pub struct TargetQueue {
    slot: Arc<Mutex<Option<Arc<HologramTarget>>>>,
    stats: Arc<QueueStats>,
}

impl TargetQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a new target (called from the content thread)
    pub fn push(&self, target: HologramTarget) {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        if self.slot.lock().replace(Arc::new(target)).is_some() {
            self.stats.superseded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Take the pending target, if any (called from the frame thread)
    pub fn take(&self) -> Option<Arc<HologramTarget>> {
        self.slot.lock().take()
    }

    pub fn has_pending(&self) -> bool {
        self.slot.lock().is_some()
    }

    pub fn submitted(&self) -> u64 {
        self.stats.submitted.load(Ordering::Relaxed)
    }

    /// Targets replaced before the frame loop got to them
    pub fn superseded(&self) -> u64 {
        self.stats.superseded.load(Ordering::Relaxed)
    }
}
