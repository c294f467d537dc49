// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Integration Tests: Safety Interlock State Machine
//!
//! - Every state is reachable from Idle
//! - Fault is reachable from both Armed and Projecting and always ends in Shutdown
//! - Only reset (after acknowledgment) leaves Shutdown
//! - Kill switches are engaged on every path into Shutdown

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::thread;

use holowatch_config::SafetyEnvelope;
use holowatch_hal::{AtomicKillSwitch, KillSwitch};
use holowatch_state_manager::{next_state, SafetyManager, SafetyTrigger};
use holowatch_structures::{FaultCause, PowerReading, SafetyState, TelemetrySample};

// ═══════════════════════════════════════════════════════════
// Helper Functions
// ═══════════════════════════════════════════════════════════

fn powered(ts: u64) -> TelemetrySample {
    TelemetrySample::from_readings(
        ts,
        None,
        None,
        None,
        Some(PowerReading {
            timestamp_us: ts,
            available_power_w: 3.0,
            thermal_headroom_c: 12.0,
        }),
    )
}

fn armed_manager() -> (Arc<SafetyManager>, Arc<AtomicKillSwitch>, Arc<AtomicKillSwitch>) {
    let laser = Arc::new(AtomicKillSwitch::new());
    let mirror = Arc::new(AtomicKillSwitch::new());
    let manager = SafetyManager::new(SafetyEnvelope::default())
        .unwrap()
        .with_kill_switch(laser.clone())
        .with_kill_switch(mirror.clone());
    manager.start(&powered(0), 0).unwrap();
    (Arc::new(manager), laser, mirror)
}

const TRIGGERS: [SafetyTrigger; 7] = [
    SafetyTrigger::Start,
    SafetyTrigger::BeginProjection,
    SafetyTrigger::FrameComplete,
    SafetyTrigger::Fault(FaultCause::OperatorStop),
    SafetyTrigger::Escalate,
    SafetyTrigger::Stop,
    SafetyTrigger::Reset,
];

// ═══════════════════════════════════════════════════════════
// Transition Table
// ═══════════════════════════════════════════════════════════

#[test]
fn test_every_state_reachable_from_idle() {
    let mut seen = HashSet::from([SafetyState::Idle]);
    let mut queue = VecDeque::from([SafetyState::Idle]);
    while let Some(state) = queue.pop_front() {
        for trigger in TRIGGERS {
            if let Some(next) = next_state(state, trigger) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
    }
    assert_eq!(seen.len(), SafetyState::ALL.len());
}

#[test]
fn test_shutdown_left_only_by_reset() {
    for trigger in TRIGGERS {
        let next = next_state(SafetyState::Shutdown, trigger);
        match trigger {
            SafetyTrigger::Reset => assert_eq!(next, Some(SafetyState::Idle)),
            SafetyTrigger::Stop => assert_eq!(next, Some(SafetyState::Shutdown)),
            _ => assert_eq!(next, None, "{:?} must not leave Shutdown", trigger),
        }
    }
}

#[test]
fn test_fault_only_from_emitting_states() {
    let cause = FaultCause::OperatorStop;
    for state in SafetyState::ALL {
        let next = next_state(state, SafetyTrigger::Fault(cause));
        assert_eq!(next.is_some(), state.permits_dispatch(), "state {}", state);
    }
}

// ═══════════════════════════════════════════════════════════
// Manager Paths
// ═══════════════════════════════════════════════════════════

#[test]
fn test_fault_from_armed_and_projecting() {
    for projecting in [false, true] {
        let (manager, laser, mirror) = armed_manager();
        if projecting {
            manager.begin_projection(1).unwrap();
        }
        let mut sample = powered(2);
        sample.meta_surface_temp_c = 50.0;
        assert!(matches!(
            manager.observe(&sample),
            Some(FaultCause::MetaSurfaceOverTemperature { .. })
        ));
        assert_eq!(manager.state(), SafetyState::Shutdown);
        assert!(laser.is_engaged());
        assert!(mirror.is_engaged());

        let transitions = manager.journal().transitions();
        let n = transitions.len();
        assert_eq!(transitions[n - 1], (SafetyState::Fault, SafetyState::Shutdown));
        assert_eq!(transitions[n - 2].1, SafetyState::Fault);
    }
}

#[test]
fn test_start_over_temperature_stays_idle_with_cause() {
    let manager = SafetyManager::new(SafetyEnvelope::default()).unwrap();
    let mut sample = powered(0);
    sample.junction_temp_c = 47.0;

    assert!(manager.start(&sample, 0).is_err());
    let status = manager.status();
    assert_eq!(status.state, SafetyState::Idle);
    assert!(matches!(
        status.cause,
        Some(FaultCause::JunctionOverTemperature { .. })
    ));
    assert!(manager.journal().transitions().is_empty());
}

#[test]
fn test_full_recovery_cycle() {
    let (manager, laser, _) = armed_manager();
    manager.begin_projection(1).unwrap();
    manager.report_controller_fault(
        FaultCause::MemsTrackingFault {
            error_deg: 0.3,
            tolerance_deg: 0.1,
            cycles: 2,
        },
        2,
    );
    assert_eq!(manager.state(), SafetyState::Shutdown);
    assert!(manager.begin_projection(3).is_err());
    assert!(manager.start(&powered(3), 3).is_err());

    manager.acknowledge_fault(4).unwrap();
    manager.reset_fault(5).unwrap();
    assert!(!laser.is_engaged());
    manager.start(&powered(6), 6).unwrap();
    assert_eq!(manager.state(), SafetyState::Armed);
}

#[test]
fn test_concurrent_faults_transition_once() {
    let (manager, laser, _) = armed_manager();
    manager.begin_projection(1).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let manager = manager.clone();
            thread::spawn(move || {
                let mut sample = powered(10 + i);
                sample.laser_power_w = 3.0;
                manager.observe(&sample);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let into_fault = manager
        .journal()
        .transitions()
        .iter()
        .filter(|(_, to)| *to == SafetyState::Fault)
        .count();
    assert_eq!(into_fault, 1);
    assert_eq!(manager.state(), SafetyState::Shutdown);
    assert_eq!(laser.engage_count(), 1);
}
