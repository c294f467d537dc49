// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/// Simulated Actuator Platform
///
/// Software models of the laser source, MEMS mirror, meta-surface and power
/// subsystem. Every device comes with a handle that shares its state so tests
/// and the simulator tool can inject faults while a controller owns the device:
/// - bus latency beyond the actuator timeout
/// - device faults
/// - MEMS position error
/// - laser/mirror timing skew
/// - meta-surface over-temperature and stalled settling
/// - missing power telemetry
///
/// Time comes from a shared [`TimeProvider`]; with [`SimClock`] every delay
/// advances the clock instead of sleeping, which keeps tests deterministic.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::atomic::AtomicCell;
use holowatch_structures::{
    LaserReading, MemsReading, MetaSurfaceReading, MirrorTrajectory, PowerReading,
};
use ndarray::Array2;
use parking_lot::Mutex;

use crate::hal::*;
use crate::{HalError, HalResult};

/// Manually driven clock
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now_us: Arc<AtomicU64>,
}

impl SimClock {
    pub fn new(start_us: u64) -> Self {
        Self {
            now_us: Arc::new(AtomicU64::new(start_us)),
        }
    }

    pub fn advance_us(&self, us: u64) {
        self.now_us.fetch_add(us, Ordering::AcqRel);
    }

    pub fn set_time_us(&self, now_us: u64) {
        self.now_us.store(now_us, Ordering::Release);
    }
}

impl TimeProvider for SimClock {
    fn get_time_us(&self) -> u64 {
        self.now_us.load(Ordering::Acquire)
    }

    fn delay_us(&self, us: u64) {
        self.advance_us(us);
    }
}

/// Physical parameters of the simulated devices
#[derive(Debug, Clone)]
pub struct SimSettings {
    pub channel_full_scale_w: Vec<f64>,
    pub ambient_temp_c: f64,
    /// Junction temperature rise per watt of optical output
    pub junction_c_per_w: f64,
    pub meta_rows: usize,
    pub meta_cols: usize,
    pub meta_drive_levels: u32,
    pub meta_settle_us: u64,
    pub mirror_settle_us: u64,
    /// Delay between loading a trajectory and the start of the scan
    pub scan_lead_us: u64,
    /// Power budget reported at startup; `None` leaves the source silent
    pub initial_power_w: Option<f64>,
    pub initial_headroom_c: f64,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            channel_full_scale_w: vec![1.0, 1.0, 1.0],
            ambient_temp_c: 25.0,
            junction_c_per_w: 4.0,
            meta_rows: 32,
            meta_cols: 32,
            meta_drive_levels: 256,
            meta_settle_us: 300,
            mirror_settle_us: 200,
            scan_lead_us: 100,
            initial_power_w: Some(3.0),
            initial_headroom_c: 15.0,
        }
    }
}

/// Shared fault-injection knobs common to all command sinks
#[derive(Debug, Default)]
struct Injection {
    latency_us: u64,
    fault: Option<String>,
}

impl Injection {
    /// Apply injected latency and faults for one bus transaction
    fn transact(
        &self,
        clock: &dyn TimeProvider,
        operation: &'static str,
        timeout_us: u64,
    ) -> HalResult<()> {
        if let Some(reason) = &self.fault {
            return Err(HalError::DeviceFault(reason.clone()));
        }
        if self.latency_us > timeout_us {
            clock.delay_us(timeout_us);
            return Err(HalError::Timeout {
                operation,
                timeout_us,
            });
        }
        if self.latency_us > 0 {
            clock.delay_us(self.latency_us);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Laser
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct LaserModel {
    applied: Vec<f64>,
    /// Kill-switch engage count at the time `applied` was loaded
    applied_generation: u64,
    emission_start_us: u64,
    timing_skew_us: i64,
    junction_override_c: Option<f64>,
    set_calls: u64,
    injection: Injection,
}

/// Simulated multi-channel laser source
pub struct SimLaser {
    model: Arc<Mutex<LaserModel>>,
    kill: Arc<AtomicKillSwitch>,
    clock: Arc<dyn TimeProvider>,
    full_scale_w: Arc<Vec<f64>>,
    sensors: Arc<SimLaserSensors>,
}

/// Telemetry side of a [`SimLaser`], shared with the watchdog
struct SimLaserSensors {
    model: Arc<Mutex<LaserModel>>,
    kill: Arc<AtomicKillSwitch>,
    clock: Arc<dyn TimeProvider>,
    full_scale_w: Arc<Vec<f64>>,
    ambient_temp_c: f64,
    junction_c_per_w: f64,
}

/// Test-side view of a [`SimLaser`]
#[derive(Clone)]
pub struct SimLaserHandle {
    model: Arc<Mutex<LaserModel>>,
    kill: Arc<AtomicKillSwitch>,
    full_scale_w: Arc<Vec<f64>>,
}

fn emitted(model: &LaserModel, kill: &AtomicKillSwitch) -> Vec<f64> {
    if kill.is_engaged() || kill.engage_count() != model.applied_generation {
        vec![0.0; model.applied.len()]
    } else {
        model.applied.clone()
    }
}

impl SimLaser {
    pub fn kill_switch(&self) -> Arc<dyn KillSwitch> {
        self.kill.clone()
    }
}

impl SimLaserSensors {
    fn output(&self) -> (f64, f64) {
        let model = self.model.lock();
        let per_channel: Vec<f64> = emitted(&model, &self.kill)
            .iter()
            .zip(self.full_scale_w.iter())
            .map(|(i, fs)| i * fs)
            .collect();
        let total = per_channel.iter().sum();
        let max = per_channel.iter().copied().fold(0.0, f64::max);
        (total, max)
    }
}

impl LaserInterface for SimLaser {
    fn name(&self) -> &'static str {
        "sim-laser"
    }

    fn channel_count(&self) -> usize {
        self.full_scale_w.len()
    }

    fn set_intensity(
        &mut self,
        intensity: &[f64],
        start_at_us: u64,
        timeout_us: u64,
    ) -> HalResult<u64> {
        if self.kill.is_engaged() {
            return Err(HalError::Inhibited);
        }
        if intensity.len() != self.full_scale_w.len() {
            return Err(HalError::Rejected(format!(
                "expected {} channels, got {}",
                self.full_scale_w.len(),
                intensity.len()
            )));
        }
        if intensity.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(HalError::Rejected(
                "intensity outside [0, 1]".to_string(),
            ));
        }

        let mut model = self.model.lock();
        model.injection.transact(self.clock.as_ref(), "laser set_intensity", timeout_us)?;
        model.applied = intensity.to_vec();
        model.applied_generation = self.kill.engage_count();
        model.emission_start_us = start_at_us.saturating_add_signed(model.timing_skew_us);
        model.set_calls += 1;
        Ok(model.emission_start_us)
    }

    fn read_telemetry(&self) -> HalResult<LaserReading> {
        self.sensors.read_laser()
    }

    fn telemetry_tap(&self) -> Arc<dyn LaserTelemetry> {
        self.sensors.clone()
    }

    fn kill_switch(&self) -> Arc<dyn KillSwitch> {
        self.kill.clone()
    }
}

impl LaserTelemetry for SimLaserSensors {
    fn read_laser(&self) -> HalResult<LaserReading> {
        let (draw_w, max_channel_w) = self.output();
        let junction_temp_c = self
            .model
            .lock()
            .junction_override_c
            .unwrap_or(self.ambient_temp_c + self.junction_c_per_w * draw_w);
        Ok(LaserReading {
            timestamp_us: self.clock.get_time_us(),
            draw_w,
            max_channel_w,
            junction_temp_c,
        })
    }
}

impl SimLaserHandle {
    pub fn kill_switch(&self) -> Arc<AtomicKillSwitch> {
        self.kill.clone()
    }

    /// Per-channel intensities currently reaching the optics
    pub fn emitted(&self) -> Vec<f64> {
        emitted(&self.model.lock(), &self.kill)
    }

    /// Aggregate optical output in watts
    pub fn output_power_w(&self) -> f64 {
        self.emitted()
            .iter()
            .zip(self.full_scale_w.iter())
            .map(|(i, fs)| i * fs)
            .sum()
    }

    pub fn emission_start_us(&self) -> u64 {
        self.model.lock().emission_start_us
    }

    pub fn set_calls(&self) -> u64 {
        self.model.lock().set_calls
    }

    pub fn inject_latency_us(&self, latency_us: u64) {
        self.model.lock().injection.latency_us = latency_us;
    }

    pub fn inject_fault(&self, reason: Option<&str>) {
        self.model.lock().injection.fault = reason.map(str::to_string);
    }

    /// Offset between the requested and actual emission start
    pub fn inject_timing_skew_us(&self, skew_us: i64) {
        self.model.lock().timing_skew_us = skew_us;
    }

    pub fn set_junction_temp_c(&self, temp_c: Option<f64>) {
        self.model.lock().junction_override_c = temp_c;
    }
}

// ---------------------------------------------------------------------------
// MEMS mirror
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct MirrorModel {
    trajectory: Option<MirrorTrajectory>,
    epoch_us: u64,
    loaded_at_us: u64,
    settle_us: u64,
    scan_lead_us: u64,
    position_error_deg: f64,
    set_calls: u64,
    injection: Injection,
}

/// Simulated two-axis MEMS mirror
pub struct SimMirror {
    model: Arc<Mutex<MirrorModel>>,
    kill: Arc<AtomicKillSwitch>,
    clock: Arc<dyn TimeProvider>,
    sensors: Arc<SimMirrorSensors>,
}

struct SimMirrorSensors {
    model: Arc<Mutex<MirrorModel>>,
    kill: Arc<AtomicKillSwitch>,
    clock: Arc<dyn TimeProvider>,
}

/// Test-side view of a [`SimMirror`]
#[derive(Clone)]
pub struct SimMirrorHandle {
    model: Arc<Mutex<MirrorModel>>,
    kill: Arc<AtomicKillSwitch>,
}

impl SimMirror {
    pub fn kill_switch(&self) -> Arc<dyn KillSwitch> {
        self.kill.clone()
    }
}

impl MirrorInterface for SimMirror {
    fn name(&self) -> &'static str {
        "sim-mems"
    }

    fn set_trajectory(
        &mut self,
        trajectory: &MirrorTrajectory,
        timeout_us: u64,
    ) -> HalResult<ScanEpoch> {
        if self.kill.is_engaged() {
            return Err(HalError::Inhibited);
        }
        let mut model = self.model.lock();
        model.injection.transact(self.clock.as_ref(), "mirror set_trajectory", timeout_us)?;

        let now = self.clock.get_time_us();
        let unchanged = model.trajectory.as_ref() == Some(trajectory);
        if !unchanged {
            model.trajectory = Some(trajectory.clone());
            model.loaded_at_us = now;
        }
        model.epoch_us = now + model.scan_lead_us;
        model.set_calls += 1;
        Ok(ScanEpoch {
            start_us: model.epoch_us,
        })
    }

    fn position(&self) -> (f64, f64) {
        self.sensors.position()
    }

    fn is_settled(&self) -> bool {
        let model = self.model.lock();
        !self.kill.is_engaged()
            && model.trajectory.is_some()
            && self.clock.get_time_us() >= model.loaded_at_us + model.settle_us
    }

    fn read_telemetry(&self) -> HalResult<MemsReading> {
        self.sensors.read_mirror()
    }

    fn telemetry_tap(&self) -> Arc<dyn MirrorTelemetry> {
        self.sensors.clone()
    }
}

impl SimMirrorSensors {
    fn position(&self) -> (f64, f64) {
        let model = self.model.lock();
        let (x, y) = match &model.trajectory {
            Some(traj) if !self.kill.is_engaged() => {
                let now = self.clock.get_time_us();
                let period = traj.duration_us() + traj.dwell_us();
                traj.position_at(now.saturating_sub(model.epoch_us) % period.max(1))
            }
            _ => (0.0, 0.0),
        };
        (x + model.position_error_deg, y)
    }
}

impl MirrorTelemetry for SimMirrorSensors {
    fn read_mirror(&self) -> HalResult<MemsReading> {
        let (x_deg, y_deg) = self.position();
        Ok(MemsReading {
            timestamp_us: self.clock.get_time_us(),
            position_error_deg: self.model.lock().position_error_deg,
            x_deg,
            y_deg,
        })
    }
}

impl SimMirrorHandle {
    pub fn kill_switch(&self) -> Arc<AtomicKillSwitch> {
        self.kill.clone()
    }

    /// Constant tracking error added to the measured x angle
    pub fn inject_position_error_deg(&self, error_deg: f64) {
        self.model.lock().position_error_deg = error_deg;
    }

    pub fn inject_latency_us(&self, latency_us: u64) {
        self.model.lock().injection.latency_us = latency_us;
    }

    pub fn inject_fault(&self, reason: Option<&str>) {
        self.model.lock().injection.fault = reason.map(str::to_string);
    }

    pub fn set_settle_us(&self, settle_us: u64) {
        self.model.lock().settle_us = settle_us;
    }

    pub fn loaded_trajectory(&self) -> Option<MirrorTrajectory> {
        self.model.lock().trajectory.clone()
    }

    pub fn set_calls(&self) -> u64 {
        self.model.lock().set_calls
    }
}

// ---------------------------------------------------------------------------
// Meta-surface
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct MetaModel {
    levels: Array2<u16>,
    loaded_at_us: u64,
    settle_us: u64,
    stalled: bool,
    temperature_c: f64,
    set_calls: u64,
    injection: Injection,
}

/// Simulated phase-modulating meta-surface
pub struct SimMetaSurface {
    model: Arc<Mutex<MetaModel>>,
    kill: Arc<AtomicKillSwitch>,
    clock: Arc<dyn TimeProvider>,
    drive_levels: u32,
    sensors: Arc<SimMetaSurfaceSensors>,
}

struct SimMetaSurfaceSensors {
    model: Arc<Mutex<MetaModel>>,
    kill: Arc<AtomicKillSwitch>,
    clock: Arc<dyn TimeProvider>,
}

/// Test-side view of a [`SimMetaSurface`]
#[derive(Clone)]
pub struct SimMetaSurfaceHandle {
    model: Arc<Mutex<MetaModel>>,
    kill: Arc<AtomicKillSwitch>,
}

impl SimMetaSurface {
    pub fn kill_switch(&self) -> Arc<dyn KillSwitch> {
        self.kill.clone()
    }
}

impl MetaSurfaceInterface for SimMetaSurface {
    fn name(&self) -> &'static str {
        "sim-meta-surface"
    }

    fn dimensions(&self) -> (usize, usize) {
        self.model.lock().levels.dim()
    }

    fn drive_levels(&self) -> u32 {
        self.drive_levels
    }

    fn set_drive(&mut self, levels: &Array2<u16>, timeout_us: u64) -> HalResult<()> {
        if self.kill.is_engaged() {
            return Err(HalError::Inhibited);
        }
        let mut model = self.model.lock();
        if levels.dim() != model.levels.dim() {
            return Err(HalError::Rejected(format!(
                "expected {:?} elements, got {:?}",
                model.levels.dim(),
                levels.dim()
            )));
        }
        if levels.iter().any(|l| u32::from(*l) >= self.drive_levels) {
            return Err(HalError::Rejected("drive level out of range".to_string()));
        }
        model.injection.transact(self.clock.as_ref(), "meta-surface set_drive", timeout_us)?;

        if model.levels != *levels {
            model.levels.assign(levels);
            model.loaded_at_us = self.clock.get_time_us();
        }
        model.set_calls += 1;
        Ok(())
    }

    fn is_settled(&self) -> bool {
        self.sensors.is_settled()
    }

    fn read_telemetry(&self) -> HalResult<MetaSurfaceReading> {
        self.sensors.read_meta_surface()
    }

    fn telemetry_tap(&self) -> Arc<dyn MetaSurfaceTelemetry> {
        self.sensors.clone()
    }
}

impl SimMetaSurfaceSensors {
    fn is_settled(&self) -> bool {
        let model = self.model.lock();
        !model.stalled
            && !self.kill.is_engaged()
            && self.clock.get_time_us() >= model.loaded_at_us + model.settle_us
    }
}

impl MetaSurfaceTelemetry for SimMetaSurfaceSensors {
    fn read_meta_surface(&self) -> HalResult<MetaSurfaceReading> {
        let settled = self.is_settled();
        Ok(MetaSurfaceReading {
            timestamp_us: self.clock.get_time_us(),
            temperature_c: self.model.lock().temperature_c,
            settled,
        })
    }
}

impl SimMetaSurfaceHandle {
    pub fn kill_switch(&self) -> Arc<AtomicKillSwitch> {
        self.kill.clone()
    }

    pub fn set_temperature_c(&self, temperature_c: f64) {
        self.model.lock().temperature_c = temperature_c;
    }

    pub fn set_settle_us(&self, settle_us: u64) {
        self.model.lock().settle_us = settle_us;
    }

    /// Elements never reach their commanded level while stalled
    pub fn stall_settling(&self, stalled: bool) {
        self.model.lock().stalled = stalled;
    }

    pub fn inject_latency_us(&self, latency_us: u64) {
        self.model.lock().injection.latency_us = latency_us;
    }

    pub fn inject_fault(&self, reason: Option<&str>) {
        self.model.lock().injection.fault = reason.map(str::to_string);
    }

    pub fn drive(&self) -> Array2<u16> {
        self.model.lock().levels.clone()
    }

    pub fn set_calls(&self) -> u64 {
        self.model.lock().set_calls
    }
}

// ---------------------------------------------------------------------------
// Power telemetry
// ---------------------------------------------------------------------------

/// Simulated energy subsystem; clones share the same latest reading
#[derive(Clone)]
pub struct SimPowerSource {
    latest: Arc<AtomicCell<Option<PowerReading>>>,
    clock: Arc<dyn TimeProvider>,
}

impl SimPowerSource {
    pub fn new(clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            latest: Arc::new(AtomicCell::new(None)),
            clock,
        }
    }

    pub fn set_budget(&self, available_power_w: f64, thermal_headroom_c: f64) {
        self.latest.store(Some(PowerReading {
            timestamp_us: self.clock.get_time_us(),
            available_power_w,
            thermal_headroom_c,
        }));
    }

    /// Stop reporting, as if the energy subsystem went silent
    pub fn clear(&self) {
        self.latest.store(None);
    }
}

impl PowerTelemetrySource for SimPowerSource {
    fn latest(&self) -> Option<PowerReading> {
        self.latest.load()
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// The four simulated devices, ready to be handed to controllers
pub struct SimulatedPlatform {
    pub laser: SimLaser,
    pub mirror: SimMirror,
    pub meta_surface: SimMetaSurface,
    pub power: SimPowerSource,
}

/// Fault-injection handles for a [`SimulatedPlatform`]
#[derive(Clone)]
pub struct SimHandles {
    pub laser: SimLaserHandle,
    pub mirror: SimMirrorHandle,
    pub meta_surface: SimMetaSurfaceHandle,
    pub power: SimPowerSource,
}

impl SimulatedPlatform {
    pub fn new(settings: &SimSettings, clock: Arc<dyn TimeProvider>) -> (Self, SimHandles) {
        let now = clock.get_time_us();
        let full_scale_w = Arc::new(settings.channel_full_scale_w.clone());

        let laser_model = Arc::new(Mutex::new(LaserModel {
            applied: vec![0.0; full_scale_w.len()],
            applied_generation: 0,
            emission_start_us: 0,
            timing_skew_us: 0,
            junction_override_c: None,
            set_calls: 0,
            injection: Injection::default(),
        }));
        let laser_kill = Arc::new(AtomicKillSwitch::new());

        let mirror_model = Arc::new(Mutex::new(MirrorModel {
            trajectory: None,
            epoch_us: now,
            loaded_at_us: now,
            settle_us: settings.mirror_settle_us,
            scan_lead_us: settings.scan_lead_us,
            position_error_deg: 0.0,
            set_calls: 0,
            injection: Injection::default(),
        }));
        let mirror_kill = Arc::new(AtomicKillSwitch::new());

        let meta_model = Arc::new(Mutex::new(MetaModel {
            levels: Array2::zeros((settings.meta_rows, settings.meta_cols)),
            loaded_at_us: now,
            settle_us: settings.meta_settle_us,
            stalled: false,
            temperature_c: settings.ambient_temp_c,
            set_calls: 0,
            injection: Injection::default(),
        }));
        let meta_kill = Arc::new(AtomicKillSwitch::new());

        let power = SimPowerSource::new(clock.clone());
        if let Some(available_w) = settings.initial_power_w {
            power.set_budget(available_w, settings.initial_headroom_c);
        }

        let platform = Self {
            laser: SimLaser {
                model: laser_model.clone(),
                kill: laser_kill.clone(),
                clock: clock.clone(),
                full_scale_w: full_scale_w.clone(),
                sensors: Arc::new(SimLaserSensors {
                    model: laser_model.clone(),
                    kill: laser_kill.clone(),
                    clock: clock.clone(),
                    full_scale_w: full_scale_w.clone(),
                    ambient_temp_c: settings.ambient_temp_c,
                    junction_c_per_w: settings.junction_c_per_w,
                }),
            },
            mirror: SimMirror {
                model: mirror_model.clone(),
                kill: mirror_kill.clone(),
                clock: clock.clone(),
                sensors: Arc::new(SimMirrorSensors {
                    model: mirror_model.clone(),
                    kill: mirror_kill.clone(),
                    clock: clock.clone(),
                }),
            },
            meta_surface: SimMetaSurface {
                model: meta_model.clone(),
                kill: meta_kill.clone(),
                clock: clock.clone(),
                drive_levels: settings.meta_drive_levels,
                sensors: Arc::new(SimMetaSurfaceSensors {
                    model: meta_model.clone(),
                    kill: meta_kill.clone(),
                    clock,
                }),
            },
            power: power.clone(),
        };

        let handles = SimHandles {
            laser: SimLaserHandle {
                model: laser_model,
                kill: laser_kill,
                full_scale_w,
            },
            mirror: SimMirrorHandle {
                model: mirror_model,
                kill: mirror_kill,
            },
            meta_surface: SimMetaSurfaceHandle {
                model: meta_model,
                kill: meta_kill,
            },
            power,
        };

        (platform, handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use holowatch_structures::TrajectoryPoint;

    fn platform() -> (SimClock, SimulatedPlatform, SimHandles) {
        let clock = SimClock::new(1_000);
        let (platform, handles) =
            SimulatedPlatform::new(&SimSettings::default(), Arc::new(clock.clone()));
        (clock, platform, handles)
    }

    fn line() -> MirrorTrajectory {
        MirrorTrajectory::new(
            vec![
                TrajectoryPoint { t_us: 0, x_deg: -5.0, y_deg: 0.0 },
                TrajectoryPoint { t_us: 1_000, x_deg: 5.0, y_deg: 0.0 },
            ],
            10,
        )
        .unwrap()
    }

    #[test]
    fn test_laser_kill_switch_zeroes_output() {
        let (_clock, mut platform, handles) = platform();
        platform.laser.set_intensity(&[0.5, 0.5, 0.0], 0, 1_000).unwrap();
        assert!((handles.laser.output_power_w() - 1.0).abs() < 1e-9);

        platform.laser.kill_switch().engage();
        assert_eq!(handles.laser.output_power_w(), 0.0);
        assert_eq!(
            platform.laser.set_intensity(&[0.1, 0.1, 0.1], 0, 1_000),
            Err(HalError::Inhibited)
        );

        // Releasing does not resurrect the vector loaded before the kill
        platform.laser.kill_switch().release();
        assert_eq!(handles.laser.output_power_w(), 0.0);
        assert_eq!(platform.laser.read_telemetry().unwrap().draw_w, 0.0);
    }

    #[test]
    fn test_latency_beyond_timeout_is_bounded() {
        let (clock, mut platform, handles) = platform();
        handles.laser.inject_latency_us(5_000);
        let before = clock.get_time_us();

        let err = platform.laser.set_intensity(&[0.1, 0.1, 0.1], 0, 2_000);

        assert!(matches!(err, Err(HalError::Timeout { timeout_us: 2_000, .. })));
        assert_eq!(clock.get_time_us() - before, 2_000);
        assert_eq!(handles.laser.set_calls(), 0);
    }

    #[test]
    fn test_mirror_settles_after_configured_time() {
        let (clock, mut platform, handles) = platform();
        handles.mirror.set_settle_us(500);
        let epoch = platform.mirror.set_trajectory(&line(), 1_000).unwrap();
        assert_eq!(epoch.start_us, clock.get_time_us() + 100);
        assert!(!platform.mirror.is_settled());

        clock.advance_us(500);
        assert!(platform.mirror.is_settled());
    }

    #[test]
    fn test_mirror_position_error_reported() {
        let (_clock, mut platform, handles) = platform();
        platform.mirror.set_trajectory(&line(), 1_000).unwrap();
        handles.mirror.inject_position_error_deg(0.3);
        let reading = platform.mirror.read_telemetry().unwrap();
        assert_eq!(reading.position_error_deg, 0.3);
    }

    #[test]
    fn test_meta_surface_stall_and_temperature() {
        let (clock, mut platform, handles) = platform();
        let levels = Array2::from_elem((32, 32), 7u16);
        platform.meta_surface.set_drive(&levels, 1_000).unwrap();
        clock.advance_us(300);
        assert!(platform.meta_surface.is_settled());

        handles.meta_surface.stall_settling(true);
        handles.meta_surface.set_temperature_c(50.0);
        let reading = platform.meta_surface.read_telemetry().unwrap();
        assert!(!reading.settled);
        assert_eq!(reading.temperature_c, 50.0);
        assert_eq!(handles.meta_surface.drive()[[0, 0]], 7);
    }

    #[test]
    fn test_telemetry_tap_sees_injected_breach() {
        let (_clock, mut platform, handles) = platform();
        let laser_tap = platform.laser.telemetry_tap();
        let meta_tap = platform.meta_surface.telemetry_tap();
        platform.laser.set_intensity(&[0.5, 0.0, 0.0], 0, 1_000).unwrap();

        handles.laser.set_junction_temp_c(Some(80.0));
        handles.meta_surface.set_temperature_c(55.0);

        let laser = laser_tap.read_laser().unwrap();
        assert_eq!(laser.junction_temp_c, 80.0);
        assert!((laser.draw_w - 0.5).abs() < 1e-9);
        assert_eq!(meta_tap.read_meta_surface().unwrap().temperature_c, 55.0);
        assert_eq!(
            laser_tap.read_laser().unwrap(),
            platform.laser.read_telemetry().unwrap()
        );
    }

    #[test]
    fn test_power_source_can_go_silent() {
        let (_clock, platform, handles) = platform();
        assert!(platform.power.latest().is_some());
        handles.power.clear();
        assert!(platform.power.latest().is_none());
    }
}
