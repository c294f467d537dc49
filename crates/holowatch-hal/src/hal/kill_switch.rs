// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Hardware inhibit line for one actuator.
///
/// Engaging must never block: it is called from the safety path while the
/// frame thread may hold the controller that owns the actuator.
pub trait KillSwitch: Send + Sync {
    /// Force output to zero (laser) or inhibit drive (mirror, meta-surface)
    fn engage(&self);

    /// Allow output again; only the operator reset path calls this
    fn release(&self);

    fn is_engaged(&self) -> bool;
}

/// Kill switch backed by an atomic flag shared with the driver
#[derive(Debug, Default)]
pub struct AtomicKillSwitch {
    engaged: AtomicBool,
    engage_count: AtomicU64,
}

impl AtomicKillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the switch went from released to engaged
    pub fn engage_count(&self) -> u64 {
        self.engage_count.load(Ordering::Acquire)
    }
}

impl KillSwitch for AtomicKillSwitch {
    fn engage(&self) {
        if !self.engaged.swap(true, Ordering::AcqRel) {
            self.engage_count.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn release(&self) {
        self.engaged.store(false, Ordering::Release);
    }

    fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engage_is_idempotent() {
        let switch = AtomicKillSwitch::new();
        assert!(!switch.is_engaged());

        switch.engage();
        switch.engage();
        assert!(switch.is_engaged());
        assert_eq!(switch.engage_count(), 1);

        switch.release();
        assert!(!switch.is_engaged());
        switch.engage();
        assert_eq!(switch.engage_count(), 2);
    }
}
