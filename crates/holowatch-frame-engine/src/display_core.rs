// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Assembly of the complete display core from a validated configuration and
//! a set of device drivers.

use std::sync::Arc;

use holowatch_config::{validate_config, HolowatchConfig};
use holowatch_hal::{
    DeviceTelemetry, KillSwitch, LaserInterface, MetaSurfaceInterface, MirrorInterface,
    PowerTelemetrySource, TimeProvider,
};
use holowatch_state_manager::{SafetyManager, TelemetryBoard};
use parking_lot::Mutex;
use tracing::info;

use crate::dispatch::ActuatorSet;
use crate::error::Result;
use crate::frame_loop_runner::FrameLoopRunner;
use crate::scheduler::{FrameScheduler, StatusReport};
use crate::target_queue::TargetQueue;
use crate::watchdog_runner::{SafetyWatchdog, WatchdogRunner};

/// Device drivers for one display
pub struct DeviceSet {
    pub laser: Box<dyn LaserInterface>,
    pub mirror: Box<dyn MirrorInterface>,
    pub meta_surface: Box<dyn MetaSurfaceInterface>,
    pub power: Arc<dyn PowerTelemetrySource>,
    /// Further inhibit lines engaged on every path into Shutdown.
    ///
    /// The laser's own line is always wired from the driver, whether or not
    /// it is listed here.
    pub kill_switches: Vec<Arc<dyn KillSwitch>>,
}

/// Frame loop, safety watchdog and the interlock they share
pub struct DisplayCore {
    safety: Arc<SafetyManager>,
    clock: Arc<dyn TimeProvider>,
    targets: TargetQueue,
    watchdog: SafetyWatchdog,
    frame_loop: FrameLoopRunner,
    watchdog_runner: WatchdogRunner,
}

impl DisplayCore {
    /// Validate `config` and wire the devices.
    ///
    /// An invalid configuration is fatal here: nothing is constructed and the
    /// interlock can never be armed.
    pub fn assemble(
        config: &HolowatchConfig,
        devices: DeviceSet,
        clock: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        validate_config(config)?;

        let mut safety =
            SafetyManager::new(config.safety)?.with_kill_switch(devices.laser.kill_switch());
        for switch in devices.kill_switches {
            safety = safety.with_kill_switch(switch);
        }
        let safety = Arc::new(safety);
        let board = Arc::new(TelemetryBoard::new());
        let telemetry = DeviceTelemetry {
            laser: devices.laser.telemetry_tap(),
            mirror: devices.mirror.telemetry_tap(),
            meta_surface: devices.meta_surface.telemetry_tap(),
        };

        let actuators =
            ActuatorSet::from_devices(devices.laser, devices.mirror, devices.meta_surface, config)?;
        let scheduler = FrameScheduler::new(
            config,
            actuators,
            safety.clone(),
            board.clone(),
            devices.power.clone(),
            clock.clone(),
        )?;
        let targets = scheduler.targets();
        let watchdog = SafetyWatchdog::new(
            safety.clone(),
            board,
            telemetry,
            devices.power,
            clock.clone(),
        );

        info!(
            "[FRAME-LOOP] Display core assembled: {} Hz frames, watchdog every {:.1} ms",
            config.frame.frame_rate_hz, config.frame.watchdog_period_ms
        );
        Ok(Self {
            safety,
            clock,
            targets,
            watchdog_runner: WatchdogRunner::new(watchdog.clone(), config.frame.watchdog_period()),
            watchdog,
            frame_loop: FrameLoopRunner::new(scheduler),
        })
    }

    /// Start the watchdog thread, then the frame loop thread
    pub fn start_threads(&mut self) -> Result<()> {
        self.watchdog_runner.start()?;
        if let Err(err) = self.frame_loop.start() {
            self.watchdog_runner.stop();
            return Err(err);
        }
        Ok(())
    }

    /// Operator stop, then join both threads
    pub fn shutdown(&mut self) {
        self.safety.stop(self.clock.get_time_us());
        self.frame_loop.stop();
        self.watchdog_runner.stop();
        self.scheduler().lock().stop();
    }

    pub fn safety(&self) -> Arc<SafetyManager> {
        self.safety.clone()
    }

    /// Producer handle for the content source
    pub fn targets(&self) -> TargetQueue {
        self.targets.clone()
    }

    pub fn scheduler(&self) -> Arc<Mutex<FrameScheduler>> {
        self.frame_loop.scheduler()
    }

    /// Single watchdog check, for stepping without threads
    pub fn watchdog(&self) -> &SafetyWatchdog {
        &self.watchdog
    }

    pub fn frame_loop(&self) -> &FrameLoopRunner {
        &self.frame_loop
    }

    pub fn status(&self) -> StatusReport {
        self.scheduler().lock().status()
    }
}

impl Drop for DisplayCore {
    fn drop(&mut self) {
        self.frame_loop.stop();
        self.watchdog_runner.stop();
    }
}
