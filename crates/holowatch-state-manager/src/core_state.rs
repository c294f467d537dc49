// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Atomic state cells shared between the frame loop and the watchdog

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crossbeam::atomic::AtomicCell;
use holowatch_structures::{SafetyState, SafetyStatus};
use serde::Serialize;

/// Current safety state and its cause.
///
/// The state byte is the fast path for per-cycle checks; the full status
/// (state, cause, timestamp) is replaced as one value so readers never see a
/// cause from one transition paired with the state of another.
/// Only the [`crate::SafetyManager`] writes.
#[derive(Debug)]
pub struct SafetyCell {
    state: AtomicU8,
    status: AtomicCell<SafetyStatus>,
}

impl SafetyCell {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(SafetyState::Idle as u8),
            status: AtomicCell::new(SafetyStatus::idle()),
        }
    }

    pub fn state(&self) -> SafetyState {
        // Only valid discriminants are ever stored
        SafetyState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(SafetyState::Shutdown)
    }

    pub fn status(&self) -> SafetyStatus {
        self.status.load()
    }

    pub(crate) fn store(&self, status: SafetyStatus) {
        self.status.store(status);
        self.state.store(status.state as u8, Ordering::Release);
    }
}

impl Default for SafetyCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-outcome frame counters
#[derive(Debug, Default)]
pub struct FrameCounters {
    pub cycles: AtomicU64,
    pub presented: AtomicU64,
    pub re_presented: AtomicU64,
    pub held: AtomicU64,
    pub blanked: AtomicU64,
    pub skipped: AtomicU64,
    pub infeasible: AtomicU64,
    pub not_settled: AtomicU64,
    pub co_timing_skews: AtomicU64,
    pub dispatch_failures: AtomicU64,
}

/// Plain copy of [`FrameCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameCountersSnapshot {
    pub cycles: u64,
    pub presented: u64,
    pub re_presented: u64,
    pub held: u64,
    pub blanked: u64,
    pub skipped: u64,
    pub infeasible: u64,
    pub not_settled: u64,
    pub co_timing_skews: u64,
    pub dispatch_failures: u64,
}

impl FrameCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FrameCountersSnapshot {
        FrameCountersSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            presented: self.presented.load(Ordering::Relaxed),
            re_presented: self.re_presented.load(Ordering::Relaxed),
            held: self.held.load(Ordering::Relaxed),
            blanked: self.blanked.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            infeasible: self.infeasible.load(Ordering::Relaxed),
            not_settled: self.not_settled.load(Ordering::Relaxed),
            co_timing_skews: self.co_timing_skews.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
        }
    }
}
