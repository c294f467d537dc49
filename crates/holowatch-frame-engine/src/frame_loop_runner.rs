// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Fixed-rate frame loop.

Runs [`FrameScheduler::run_cycle`] on a dedicated thread at the configured
frame rate. The scheduler sits behind a mutex so operator commands and
status reads can reach it between cycles; the safety interlock itself never
needs this lock.
*/

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::error::{FrameEngineError, Result};
use crate::scheduler::{CycleOutcome, FrameScheduler};

const THREAD_NAME: &str = "holowatch-frame-loop";

/// Get current timestamp for logging
fn get_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Frame loop runner; stops the thread on drop
pub struct FrameLoopRunner {
    scheduler: Arc<Mutex<FrameScheduler>>,
    frame_rate_hz: f64,
    running: Arc<AtomicBool>,
    cycle_count: Arc<AtomicU64>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl FrameLoopRunner {
    pub fn new(scheduler: FrameScheduler) -> Self {
        let frame_rate_hz = scheduler.frame_config().frame_rate_hz;
        Self {
            scheduler: Arc::new(Mutex::new(scheduler)),
            frame_rate_hz,
            running: Arc::new(AtomicBool::new(false)),
            cycle_count: Arc::new(AtomicU64::new(0)),
            thread_handle: None,
        }
    }

    /// Shared scheduler for operator commands and status
    pub fn scheduler(&self) -> Arc<Mutex<FrameScheduler>> {
        self.scheduler.clone()
    }

    pub fn frame_rate_hz(&self) -> f64 {
        self.frame_rate_hz
    }

    /// Start the frame loop in a background thread
    pub fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::Acquire) {
            return Err(FrameEngineError::AlreadyRunning("Frame loop"));
        }

        info!(
            "[FRAME-LOOP] Starting frame loop at {:.2} Hz",
            self.frame_rate_hz
        );
        self.running.store(true, Ordering::Release);

        let scheduler = self.scheduler.clone();
        let running = self.running.clone();
        let cycle_count = self.cycle_count.clone();
        let frame_rate_hz = self.frame_rate_hz;

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || frame_loop(scheduler, frame_rate_hz, running, cycle_count))
            .map_err(|source| {
                self.running.store(false, Ordering::Release);
                FrameEngineError::ThreadSpawn {
                    name: THREAD_NAME,
                    source,
                }
            })?;
        self.thread_handle = Some(handle);

        info!("[FRAME-LOOP] Frame loop started");
        Ok(())
    }

    /// Stop the frame loop, waiting up to 2 seconds for the thread
    pub fn stop(&mut self) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }

        info!("[FRAME-LOOP] Stopping frame loop...");
        self.running.store(false, Ordering::Release);

        if let Some(handle) = self.thread_handle.take() {
            join_with_timeout(handle, Duration::from_secs(2), "[FRAME-LOOP] Frame loop");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Cycles completed since start (lock-free)
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count.load(Ordering::Relaxed)
    }
}

impl Drop for FrameLoopRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// `JoinHandle` has no timed join; wait for it from a helper thread
pub(crate) fn join_with_timeout(handle: thread::JoinHandle<()>, timeout: Duration, what: &str) {
    let start = Instant::now();
    let (tx, rx) = std::sync::mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(handle.join());
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(())) => info!("{} stopped cleanly", what),
        Ok(Err(_)) => warn!("{} thread panicked during shutdown", what),
        Err(std::sync::mpsc::RecvTimeoutError::Timeout) => warn!(
            "{} did not stop within {:?}, proceeding with shutdown",
            what,
            start.elapsed()
        ),
        Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
            warn!("{} join thread disconnected unexpectedly", what)
        }
    }
}

fn frame_loop(
    scheduler: Arc<Mutex<FrameScheduler>>,
    frame_rate_hz: f64,
    running: Arc<AtomicBool>,
    cycle_count: Arc<AtomicU64>,
) {
    info!(
        "[{}] [FRAME-LOOP] Entering main loop at {:.2} Hz",
        get_timestamp(),
        frame_rate_hz
    );

    let interval = Duration::from_secs_f64(1.0 / frame_rate_hz);
    let mut cycle_num = 0u64;
    let mut last_stats_time = Instant::now();
    let mut cycle_times: Vec<Duration> = Vec::with_capacity(512);
    let mut last_cycle_start: Option<Instant> = None;
    let mut presented_since_stats = 0u64;

    while running.load(Ordering::Acquire) {
        let cycle_start = Instant::now();
        if let Some(previous) = last_cycle_start.replace(cycle_start) {
            cycle_times.push(cycle_start.duration_since(previous));
        }

        let outcome = scheduler.lock().run_cycle();
        cycle_num += 1;
        cycle_count.store(cycle_num, Ordering::Relaxed);
        match outcome {
            CycleOutcome::Presented { .. } => presented_since_stats += 1,
            CycleOutcome::Faulted(cause) => {
                warn!("[FRAME-LOOP] Cycle {} ended in fault: {}", cycle_num, cause)
            }
            other => trace!("[FRAME-LOOP] Cycle {}: {:?}", cycle_num, other),
        }

        let cycle_duration = cycle_start.elapsed();
        if cycle_duration > interval {
            warn!(
                "[FRAME-LOOP] Slow cycle: {:.2}ms for a {:.2}ms frame (cycle {})",
                cycle_duration.as_secs_f64() * 1000.0,
                interval.as_secs_f64() * 1000.0,
                cycle_num
            );
        }

        // Loop statistics every 5 seconds
        if last_stats_time.elapsed().as_secs() >= 5 {
            if !cycle_times.is_empty() {
                let avg_interval: Duration =
                    cycle_times.iter().sum::<Duration>() / cycle_times.len() as u32;
                let actual_hz = 1.0 / avg_interval.as_secs_f64();
                debug!(
                    cycle_num,
                    desired_hz = frame_rate_hz,
                    actual_hz,
                    accuracy_percent = (actual_hz / frame_rate_hz * 100.0),
                    presented = presented_since_stats,
                    "[FRAME-LOOP] Frame loop stats"
                );
            }
            cycle_times.clear();
            presented_since_stats = 0;
            last_stats_time = Instant::now();
        }

        if !running.load(Ordering::Relaxed) {
            break;
        }
        adaptive_sleep(cycle_start + interval, frame_rate_hz, &running, cycle_num);
    }

    info!(
        "[{}] [FRAME-LOOP] Main loop exited after {} cycles",
        get_timestamp(),
        cycle_num
    );
}

/// Wait until `target_time`.
///
/// Below 5 Hz sleep in 50 ms chunks, above 100 Hz busy-wait, otherwise sleep
/// 80% of the remainder in chunks and busy-wait the rest. The running flag is
/// checked between chunks so stop stays responsive.
fn adaptive_sleep(target_time: Instant, frequency_hz: f64, running: &AtomicBool, cycle_num: u64) {
    let now = Instant::now();
    if now >= target_time {
        let overshoot = now.duration_since(target_time);
        if overshoot.as_millis() > 50 {
            warn!(
                "[FRAME-LOOP] Iteration overshoot: {:.2}ms past target (cycle {})",
                overshoot.as_secs_f64() * 1000.0,
                cycle_num
            );
        }
        return;
    }

    let chunk_size = Duration::from_millis(50);
    let sleep_chunked = |until: Instant| {
        while running.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= until {
                break;
            }
            thread::sleep((until - now).min(chunk_size));
        }
    };

    let remaining = target_time - now;
    if frequency_hz < 5.0 {
        sleep_chunked(target_time);
    } else if frequency_hz > 100.0 {
        while Instant::now() < target_time && running.load(Ordering::Relaxed) {
            std::hint::spin_loop();
        }
    } else {
        let sleep_duration = remaining.mul_f64(0.8);
        if sleep_duration.as_micros() > 100 {
            sleep_chunked(now + sleep_duration);
        }
        while Instant::now() < target_time && running.load(Ordering::Relaxed) {
            std::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::ActuatorSet;
    use holowatch_config::HolowatchConfig;
    use holowatch_hal::simulated::{SimClock, SimSettings, SimulatedPlatform};
    use holowatch_hal::TimeProvider;
    use holowatch_state_manager::{SafetyManager, TelemetryBoard};
    use holowatch_structures::SafetyState;

    fn idle_runner(frame_rate_hz: f64) -> FrameLoopRunner {
        let mut config = HolowatchConfig::default();
        config.meta_surface.rows = 8;
        config.meta_surface.cols = 8;
        config.frame.frame_rate_hz = frame_rate_hz;

        let time: Arc<dyn TimeProvider> = Arc::new(SimClock::new(0));
        let settings = SimSettings {
            meta_rows: 8,
            meta_cols: 8,
            channel_full_scale_w: config.laser.channel_full_scale_w.clone(),
            ..SimSettings::default()
        };
        let (platform, _handles) = SimulatedPlatform::new(&settings, time.clone());
        let actuators = ActuatorSet::from_devices(
            Box::new(platform.laser),
            Box::new(platform.mirror),
            Box::new(platform.meta_surface),
            &config,
        )
        .unwrap();
        let scheduler = FrameScheduler::new(
            &config,
            actuators,
            Arc::new(SafetyManager::new(config.safety).unwrap()),
            Arc::new(TelemetryBoard::new()),
            Arc::new(platform.power),
            time,
        )
        .unwrap();
        FrameLoopRunner::new(scheduler)
    }

    #[test]
    fn test_frame_rate_from_config() {
        let runner = idle_runner(90.0);
        assert_eq!(runner.frame_rate_hz(), 90.0);
        assert!(!runner.is_running());
        assert_eq!(runner.cycle_count(), 0);
    }

    #[test]
    fn test_runner_start_stop() {
        let mut runner = idle_runner(200.0);
        runner.start().unwrap();
        assert!(runner.is_running());
        assert!(matches!(
            runner.start(),
            Err(FrameEngineError::AlreadyRunning(_))
        ));

        thread::sleep(Duration::from_millis(50));
        runner.stop();
        assert!(!runner.is_running());
        assert!(runner.cycle_count() > 0);

        // Idle safety state: every cycle is skipped
        let counters = runner.scheduler().lock().counters().snapshot();
        assert_eq!(counters.skipped, runner.cycle_count());
        assert_eq!(
            runner.scheduler().lock().safety().state(),
            SafetyState::Idle
        );
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut runner = idle_runner(60.0);
        runner.stop();
        assert!(!runner.is_running());
    }
}
