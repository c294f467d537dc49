// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Integration Tests: Dispatch Join
//!
//! - The laser stays dark until mirror and meta-surface have settled
//! - A changed wavefront is loaded only after the laser has gone dark
//! - Prolonged non-settle ends in a SettleTimeout with the laser at zero
//! - A laser start outside half a pixel dwell blanks the frame
//! - Leaving Armed/Projecting mid-settle aborts the dispatch
//! - Re-dispatching an unchanged plan needs no settling

use std::sync::Arc;
use std::time::Duration;

use holowatch_config::HolowatchConfig;
use holowatch_frame_engine::{ActuatorSet, DispatchError, DispatchOutcome, SettlePolicy};
use holowatch_hal::simulated::{SimClock, SimHandles, SimSettings, SimulatedPlatform};
use holowatch_hal::TimeProvider;
use holowatch_projector::ProjectionOptimizer;
use holowatch_state_manager::SafetyManager;
use holowatch_structures::{
    ActuationPlan, ControllerKind, HologramTarget, PowerReading, SafetyState, TelemetrySample,
};
use ndarray::Array2;

// ═══════════════════════════════════════════════════════════
// Helper Functions
// ═══════════════════════════════════════════════════════════

struct Bench {
    actuators: ActuatorSet,
    handles: SimHandles,
    clock: SimClock,
    safety: SafetyManager,
    plan: ActuationPlan,
    settle: SettlePolicy,
}

fn config() -> HolowatchConfig {
    let mut config = HolowatchConfig::default();
    config.meta_surface.rows = 8;
    config.meta_surface.cols = 8;
    config
}

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

fn bench() -> Bench {
    let config = config();
    let clock = SimClock::new(10_000);
    let time: Arc<dyn TimeProvider> = Arc::new(clock.clone());
    let settings = SimSettings {
        meta_rows: 8,
        meta_cols: 8,
        ..SimSettings::default()
    };
    let (platform, handles) = SimulatedPlatform::new(&settings, time);
    let actuators = ActuatorSet::from_devices(
        Box::new(platform.laser),
        Box::new(platform.mirror),
        Box::new(platform.meta_surface),
        &config,
    )
    .unwrap();

    let safety = SafetyManager::new(config.safety).unwrap();
    safety.start(&powered(10_000), 10_000).unwrap();

    let target = HologramTarget::uniform(1, 8, 8, 0.6, 3)
        .unwrap()
        .with_luminance(0.5)
        .unwrap();
    let plan = ProjectionOptimizer::new(&config)
        .compute_plan(&target, &powered(10_000), &config.safety)
        .unwrap();

    Bench {
        actuators,
        handles,
        clock,
        safety,
        plan,
        settle: SettlePolicy::from_config(&config),
    }
}

/// Same brightness as the bench plan, different wavefront
fn shifted_plan(frame_id: u64) -> ActuationPlan {
    let config = config();
    let target = HologramTarget::new(
        frame_id,
        Array2::from_elem((8, 8), 500.0),
        Array2::from_elem((8, 8), 0.6),
        Array2::from_elem((8, 8), 1.0),
        3,
    )
    .unwrap()
    .with_luminance(0.5)
    .unwrap();
    ProjectionOptimizer::new(&config)
        .compute_plan(&target, &powered(10_000), &config.safety)
        .unwrap()
}

fn dispatch(bench: &mut Bench) -> Result<DispatchOutcome, DispatchError> {
    let cell = bench.safety.cell();
    bench
        .actuators
        .dispatch(&bench.plan, &bench.clock, bench.settle, &cell)
}

// ═══════════════════════════════════════════════════════════
// Integration Tests
// ═══════════════════════════════════════════════════════════

#[test]
fn test_laser_waits_for_settle() {
    let mut bench = bench();
    let started = bench.clock.get_time_us();

    let report = match dispatch(&mut bench).unwrap() {
        DispatchOutcome::Presented(report) => report,
        other => panic!("expected presented, got {:?}", other),
    };

    // Meta-surface settles 300 us after a new phase map
    assert!(report.settle_wait_us >= 300);
    assert!(report.slot_us >= started + report.settle_wait_us);
    assert_eq!((report.slot_us - report.epoch.start_us) % bench.plan.trajectory().dwell_us(), 0);
    assert!(report.skew_us <= bench.plan.trajectory().dwell_us() / 2);
    assert!(bench.handles.laser.output_power_w() > 0.0);
    assert_eq!(bench.handles.laser.emission_start_us(), report.slot_us);
}

#[test]
fn test_settle_timeout_blanks_laser() {
    let mut bench = bench();
    bench.handles.meta_surface.stall_settling(true);

    match dispatch(&mut bench) {
        Err(DispatchError::SettleTimeout {
            controller,
            waited_us,
        }) => {
            assert_eq!(controller, ControllerKind::MetaSurface);
            assert!(waited_us >= bench.settle.timeout.as_micros() as u64);
        }
        other => panic!("expected settle timeout, got {:?}", other),
    }
    assert_eq!(bench.handles.laser.output_power_w(), 0.0);

    let cause = dispatch(&mut bench).unwrap_err().fault_cause();
    assert!(matches!(
        cause,
        Some(holowatch_structures::FaultCause::SettleTimeout { .. })
    ));
}

#[test]
fn test_co_timing_skew_blanks_frame() {
    let mut bench = bench();
    let dwell = bench.plan.trajectory().dwell_us();
    bench.handles.laser.inject_timing_skew_us(dwell as i64 + 1);

    match dispatch(&mut bench).unwrap() {
        DispatchOutcome::CoTimingSkew {
            skew_us,
            tolerance_us,
        } => {
            assert_eq!(skew_us, dwell + 1);
            assert_eq!(tolerance_us, dwell / 2);
        }
        other => panic!("expected co-timing skew, got {:?}", other),
    }
    assert_eq!(bench.handles.laser.output_power_w(), 0.0);
}

#[test]
fn test_state_change_aborts_settle_wait() {
    let mut bench = bench();
    bench.handles.meta_surface.stall_settling(true);
    bench.safety.stop(bench.clock.get_time_us());

    match dispatch(&mut bench) {
        Err(DispatchError::Aborted(state)) => assert_eq!(state, SafetyState::Shutdown),
        other => panic!("expected abort, got {:?}", other),
    }
    assert_eq!(bench.handles.laser.output_power_w(), 0.0);
}

#[test]
fn test_unchanged_plan_redispatches_without_settling() {
    let mut bench = bench();
    dispatch(&mut bench).unwrap();
    let first_power = bench.handles.laser.output_power_w();

    bench.clock.advance_us(Duration::from_millis(16).as_micros() as u64);
    let report = match dispatch(&mut bench).unwrap() {
        DispatchOutcome::Presented(report) => report,
        other => panic!("expected presented, got {:?}", other),
    };
    assert_eq!(report.settle_wait_us, 0);
    assert!((bench.handles.laser.output_power_w() - first_power).abs() < 1e-12);
    assert_eq!(bench.handles.meta_surface.set_calls(), 2);
    assert_eq!(bench.handles.mirror.set_calls(), 2);
}

#[test]
fn test_laser_dark_before_wavefront_change() {
    let mut bench = bench();
    // Instant settling: any blanking comes from the wavefront change itself
    bench.handles.meta_surface.set_settle_us(0);
    bench.handles.mirror.set_settle_us(0);
    dispatch(&mut bench).unwrap();
    let lit = bench.handles.laser.output_power_w();
    assert!(lit > 0.0);
    let loads = bench.handles.laser.set_calls();

    // Same wavefront: the laser is reloaded once and never blanked
    bench.clock.advance_us(16_000);
    dispatch(&mut bench).unwrap();
    assert_eq!(bench.handles.laser.set_calls(), loads + 1);

    // New phase map: one blanking load, then the frame itself
    bench.plan = shifted_plan(2);
    let drive_before = bench.handles.meta_surface.drive();
    bench.clock.advance_us(16_000);
    assert!(matches!(
        dispatch(&mut bench).unwrap(),
        DispatchOutcome::Presented(_)
    ));
    assert_ne!(bench.handles.meta_surface.drive(), drive_before);
    assert_eq!(bench.handles.laser.set_calls(), loads + 3);
    assert!(bench.handles.laser.output_power_w() > 0.0);
}
