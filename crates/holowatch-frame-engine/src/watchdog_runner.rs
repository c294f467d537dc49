// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Independent safety watchdog.

Runs on its own thread at the watchdog period and never touches the frame
scheduler or its lock. Each check:

- faults if the frame cycle has not kicked within the envelope deadline;
- reads the laser, mirror and meta-surface through their telemetry taps and
  the power budget from its source, publishing all of it to the board;
- runs the envelope check on those fresh readings.

A device whose telemetry cannot be read while emission is permitted is an
actuator fault: the envelope cannot be verified without it.

A fault from here engages the kill switches directly, so laser output goes
to zero even while the optimizer or a dispatch is stalled.
*/

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use holowatch_hal::{DeviceTelemetry, PowerTelemetrySource, TimeProvider};
use holowatch_state_manager::{SafetyManager, TelemetryBoard};
use holowatch_structures::{ControllerKind, FaultCause};
use tracing::{error, info, trace, warn};

use crate::error::{FrameEngineError, Result};
use crate::frame_loop_runner::join_with_timeout;

const THREAD_NAME: &str = "holowatch-safety-watchdog";

/// One watchdog check, usable without a thread (tests, simulator stepping)
#[derive(Clone)]
pub struct SafetyWatchdog {
    safety: Arc<SafetyManager>,
    board: Arc<TelemetryBoard>,
    devices: DeviceTelemetry,
    power: Arc<dyn PowerTelemetrySource>,
    clock: Arc<dyn TimeProvider>,
}

impl SafetyWatchdog {
    pub fn new(
        safety: Arc<SafetyManager>,
        board: Arc<TelemetryBoard>,
        devices: DeviceTelemetry,
        power: Arc<dyn PowerTelemetrySource>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            safety,
            board,
            devices,
            power,
            clock,
        }
    }

    /// Run one check; returns the fault it raised or observed
    pub fn check_once(&self) -> Option<FaultCause> {
        let now = self.clock.get_time_us();
        if let Some(cause) = self.safety.check_watchdog(now) {
            error!("[WATCHDOG] Frame cycle missed its deadline: {}", cause);
            return Some(cause);
        }

        let permitted = self.safety.state().permits_dispatch();
        if let Some(cause) = self.refresh_device_telemetry() {
            if permitted {
                self.safety.report_controller_fault(cause, now);
                error!("[WATCHDOG] Telemetry unavailable: {}", cause);
                return Some(cause);
            }
        }

        self.board.publish_power(self.power.latest());
        let sample = self.board.snapshot(now);
        match self.safety.observe(&sample) {
            Some(cause) if permitted => {
                error!("[WATCHDOG] Envelope breach: {}", cause);
                Some(cause)
            }
            _ => None,
        }
    }

    /// Publish a fresh reading from every device; first read failure wins
    fn refresh_device_telemetry(&self) -> Option<FaultCause> {
        let mut failed = None;
        match self.devices.laser.read_laser() {
            Ok(reading) => self.board.publish_laser(reading),
            Err(err) => failed = failed.or(Some(read_failure(ControllerKind::Laser, &err))),
        }
        match self.devices.mirror.read_mirror() {
            Ok(reading) => self.board.publish_mems(reading),
            Err(err) => failed = failed.or(Some(read_failure(ControllerKind::Mems, &err))),
        }
        match self.devices.meta_surface.read_meta_surface() {
            Ok(reading) => self.board.publish_meta_surface(reading),
            Err(err) => {
                failed = failed.or(Some(read_failure(ControllerKind::MetaSurface, &err)))
            }
        }
        failed
    }
}

fn read_failure(controller: ControllerKind, err: &holowatch_hal::HalError) -> FaultCause {
    warn!("[WATCHDOG] {} telemetry read failed: {}", controller, err);
    FaultCause::ActuatorFault { controller }
}

impl std::fmt::Debug for SafetyWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyWatchdog")
            .field("state", &self.safety.state())
            .finish()
    }
}

/// Periodic watchdog thread; stops on drop
pub struct WatchdogRunner {
    watchdog: SafetyWatchdog,
    period: Duration,
    running: Arc<AtomicBool>,
    check_count: Arc<AtomicU64>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl WatchdogRunner {
    pub fn new(watchdog: SafetyWatchdog, period: Duration) -> Self {
        Self {
            watchdog,
            period,
            running: Arc::new(AtomicBool::new(false)),
            check_count: Arc::new(AtomicU64::new(0)),
            thread_handle: None,
        }
    }

    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::Acquire) {
            return Err(FrameEngineError::AlreadyRunning("Safety watchdog"));
        }
        info!(
            "[WATCHDOG] Starting safety watchdog every {:.2} ms",
            self.period.as_secs_f64() * 1000.0
        );
        self.running.store(true, Ordering::Release);

        let watchdog = self.watchdog.clone();
        let running = self.running.clone();
        let check_count = self.check_count.clone();
        let period = self.period;

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || watchdog_loop(watchdog, period, running, check_count))
            .map_err(|source| {
                self.running.store(false, Ordering::Release);
                FrameEngineError::ThreadSpawn {
                    name: THREAD_NAME,
                    source,
                }
            })?;
        self.thread_handle = Some(handle);
        Ok(())
    }

    pub fn stop(&mut self) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            join_with_timeout(handle, Duration::from_secs(2), "[WATCHDOG] Safety watchdog");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn check_count(&self) -> u64 {
        self.check_count.load(Ordering::Relaxed)
    }
}

impl Drop for WatchdogRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watchdog_loop(
    watchdog: SafetyWatchdog,
    period: Duration,
    running: Arc<AtomicBool>,
    check_count: Arc<AtomicU64>,
) {
    let mut next = Instant::now();
    while running.load(Ordering::Acquire) {
        watchdog.check_once();
        let checks = check_count.fetch_add(1, Ordering::Relaxed) + 1;
        if checks % 1000 == 0 {
            trace!("[WATCHDOG] {} checks (watchdog alive)", checks);
        }

        next += period;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            // Fell behind; resynchronize instead of bursting
            next = now;
        }
    }
    info!(
        "[WATCHDOG] Safety watchdog exited after {} checks",
        check_count.load(Ordering::Relaxed)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use holowatch_config::SafetyEnvelope;
    use holowatch_hal::simulated::{SimClock, SimHandles, SimSettings, SimulatedPlatform};
    use holowatch_hal::{
        HalError, HalResult, LaserInterface, LaserTelemetry, MetaSurfaceInterface,
        MirrorInterface,
    };
    use holowatch_structures::{LaserReading, SafetyState};

    struct UnreadableLaser;

    impl LaserTelemetry for UnreadableLaser {
        fn read_laser(&self) -> HalResult<LaserReading> {
            Err(HalError::DeviceFault("bus error".to_string()))
        }
    }

    fn armed_watchdog(clock: &SimClock) -> (SafetyWatchdog, Arc<SafetyManager>, SimHandles) {
        let time: Arc<dyn TimeProvider> = Arc::new(clock.clone());
        let (mut platform, handles) = SimulatedPlatform::new(&SimSettings::default(), time.clone());
        let safety = Arc::new(
            SafetyManager::new(SafetyEnvelope::default())
                .unwrap()
                .with_kill_switch(platform.laser.kill_switch()),
        );
        let board = Arc::new(TelemetryBoard::new());
        board.publish_power(platform.power.latest());
        safety
            .start(&board.snapshot(clock.get_time_us()), clock.get_time_us())
            .unwrap();

        // Something on the optics, as left by the last presented frame
        platform.laser.set_intensity(&[0.3, 0.3, 0.2], 0, 1_000).unwrap();

        let devices = DeviceTelemetry {
            laser: platform.laser.telemetry_tap(),
            mirror: platform.mirror.telemetry_tap(),
            meta_surface: platform.meta_surface.telemetry_tap(),
        };
        let watchdog = SafetyWatchdog::new(
            safety.clone(),
            board,
            devices,
            Arc::new(platform.power),
            time,
        );
        (watchdog, safety, handles)
    }

    #[test]
    fn test_quiet_when_kicked() {
        let clock = SimClock::new(0);
        let (watchdog, safety, _handles) = armed_watchdog(&clock);
        clock.advance_us(40_000);
        safety.kick(clock.get_time_us());
        clock.advance_us(40_000);
        assert_eq!(watchdog.check_once(), None);
        assert_eq!(safety.state(), SafetyState::Armed);
    }

    #[test]
    fn test_missed_kick_faults() {
        let clock = SimClock::new(0);
        let (watchdog, safety, handles) = armed_watchdog(&clock);
        clock.advance_us(50_001);
        assert!(matches!(
            watchdog.check_once(),
            Some(FaultCause::WatchdogTimeout { .. })
        ));
        assert_eq!(safety.state(), SafetyState::Shutdown);
        assert_eq!(handles.laser.output_power_w(), 0.0);
        assert_eq!(watchdog.check_once(), None);
    }

    #[test]
    fn test_device_breach_seen_without_frame_cycle() {
        let clock = SimClock::new(0);
        let (watchdog, safety, handles) = armed_watchdog(&clock);
        assert!(handles.laser.output_power_w() > 0.0);

        handles.laser.set_junction_temp_c(Some(80.0));
        clock.advance_us(5_000);

        assert!(matches!(
            watchdog.check_once(),
            Some(FaultCause::JunctionOverTemperature { measured_c, .. }) if measured_c == 80.0
        ));
        assert_eq!(safety.state(), SafetyState::Shutdown);
        assert_eq!(handles.laser.output_power_w(), 0.0);
    }

    #[test]
    fn test_unreadable_device_faults() {
        let clock = SimClock::new(0);
        let (watchdog, safety, handles) = armed_watchdog(&clock);
        let watchdog = SafetyWatchdog {
            devices: DeviceTelemetry {
                laser: Arc::new(UnreadableLaser),
                ..watchdog.devices.clone()
            },
            ..watchdog
        };

        assert_eq!(
            watchdog.check_once(),
            Some(FaultCause::ActuatorFault {
                controller: ControllerKind::Laser
            })
        );
        assert_eq!(safety.state(), SafetyState::Shutdown);
        assert_eq!(handles.laser.output_power_w(), 0.0);
    }

    #[test]
    fn test_runner_start_stop() {
        let clock = SimClock::new(0);
        let (watchdog, _safety, _handles) = armed_watchdog(&clock);
        let mut runner = WatchdogRunner::new(watchdog, Duration::from_millis(1));
        runner.start().unwrap();
        assert!(runner.is_running());
        assert!(runner.start().is_err());
        std::thread::sleep(Duration::from_millis(20));
        runner.stop();
        assert!(!runner.is_running());
        assert!(runner.check_count() > 0);
    }
}
