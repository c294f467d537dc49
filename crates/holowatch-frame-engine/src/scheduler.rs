// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
One frame cycle of the display core.

Each call to [`FrameScheduler::run_cycle`]:

1. consults the Safety Manager and does nothing unless Armed or Projecting;
2. takes the newest target, if one arrived since the last cycle;
3. plans it against the latest telemetry within the optimizer budget
   (infeasible targets fall back to the hold/blank policy; no new target
   re-presents the previous plan);
4. dispatches the plan with the settle join and laser co-timing;
5. publishes post-dispatch telemetry, lets the Safety Manager check it and
   feeds the presented plan back to the optimizer as warm start.

The cycle kicks the safety watchdog when it finishes, whatever the outcome.
*/

use std::sync::Arc;
use std::time::Instant;

use holowatch_config::{ConfigError, FrameConfig, HolowatchConfig, InfeasibleFramePolicy};
use holowatch_hal::{PowerTelemetrySource, TimeProvider};
use holowatch_projector::{ControllerError, OptimizerError, ProjectionOptimizer};
use holowatch_state_manager::{
    FrameCounters, FrameCountersSnapshot, SafetyError, SafetyEvent, SafetyManager, TelemetryBoard,
};
use holowatch_structures::{
    ActuationPlan, FaultCause, SafetyState, SafetyStatus, TelemetrySample,
};
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::dispatch::{ActuatorSet, DispatchOutcome, SettlePolicy};
use crate::error::{DispatchError, FrameEngineError, Result};
use crate::target_queue::TargetQueue;

/// Journal entries included in a [`StatusReport`]
const STATUS_EVENT_COUNT: usize = 16;

/// Where the dispatched plan came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    /// Planned from a new target this cycle
    Fresh,
    /// No new target; the previous plan again
    Repeat,
    /// Target was infeasible; previous plan held
    Held,
    /// Zero-emission frame
    Blank,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleOutcome {
    /// Safety state does not permit dispatch
    Skipped(SafetyState),
    /// Nothing has ever been planned
    NoTarget,
    Presented { frame_id: u64, source: PlanSource },
    /// Laser start missed its pixel slot; frame was blanked
    CoTimingSkew { frame_id: u64, skew_us: u64 },
    Faulted(FaultCause),
}

/// Serializable snapshot for operators and the simulator
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub safety: SafetyStatus,
    pub fault_acknowledged: bool,
    pub counters: FrameCountersSnapshot,
    pub last_quality_confidence: Option<f64>,
    pub last_presented_frame: Option<u64>,
    pub targets_submitted: u64,
    pub targets_superseded: u64,
    pub telemetry: TelemetrySample,
    pub recent_events: Vec<SafetyEvent>,
}

pub struct FrameScheduler {
    frame: FrameConfig,
    settle: SettlePolicy,
    optimizer: ProjectionOptimizer,
    actuators: ActuatorSet,
    safety: Arc<SafetyManager>,
    board: Arc<TelemetryBoard>,
    targets: TargetQueue,
    power: Arc<dyn PowerTelemetrySource>,
    clock: Arc<dyn TimeProvider>,
    counters: Arc<FrameCounters>,
    last_plan: Option<Arc<ActuationPlan>>,
    last_confidence: Option<f64>,
    last_presented_frame: Option<u64>,
}

impl FrameScheduler {
    pub fn new(
        config: &HolowatchConfig,
        actuators: ActuatorSet,
        safety: Arc<SafetyManager>,
        board: Arc<TelemetryBoard>,
        power: Arc<dyn PowerTelemetrySource>,
        clock: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        let optimizer = ProjectionOptimizer::new(config);
        if actuators.laser.channel_count() != optimizer.channel_count() {
            return Err(FrameEngineError::Config(ConfigError::InvalidValue(format!(
                "laser drives {} channels, optimizer plans {}",
                actuators.laser.channel_count(),
                optimizer.channel_count()
            ))));
        }
        if actuators.meta_surface.dimensions() != optimizer.grid() {
            return Err(FrameEngineError::Config(ConfigError::InvalidValue(format!(
                "meta-surface is {:?}, optimizer plans {:?}",
                actuators.meta_surface.dimensions(),
                optimizer.grid()
            ))));
        }

        Ok(Self {
            frame: config.frame.clone(),
            settle: SettlePolicy::from_config(config),
            optimizer,
            actuators,
            safety,
            board,
            targets: TargetQueue::new(),
            power,
            clock,
            counters: Arc::new(FrameCounters::new()),
            last_plan: None,
            last_confidence: None,
            last_presented_frame: None,
        })
    }

    /// Producer handle for the content source
    pub fn targets(&self) -> TargetQueue {
        self.targets.clone()
    }

    pub fn safety(&self) -> Arc<SafetyManager> {
        self.safety.clone()
    }

    pub fn board(&self) -> Arc<TelemetryBoard> {
        self.board.clone()
    }

    pub fn counters(&self) -> Arc<FrameCounters> {
        self.counters.clone()
    }

    pub fn frame_config(&self) -> &FrameConfig {
        &self.frame
    }

    pub fn optimizer(&self) -> &ProjectionOptimizer {
        &self.optimizer
    }

    pub fn actuators(&self) -> &ActuatorSet {
        &self.actuators
    }

    /// Plan that the next cycle re-presents when no new target arrives
    pub fn last_plan(&self) -> Option<&ActuationPlan> {
        self.last_plan.as_deref()
    }

    // ------------------------------------------------------------------
    // Operator commands
    // ------------------------------------------------------------------

    /// Idle → Armed after prechecks on freshly read telemetry
    pub fn start(&mut self) -> std::result::Result<(), SafetyError> {
        let now = self.clock.get_time_us();
        self.publish_passive_telemetry();
        let sample = self.board.snapshot(now);
        self.safety.start(&sample, now)?;
        info!("[FRAME-LOOP] Armed; awaiting targets");
        Ok(())
    }

    /// Shutdown from any state; the laser is also commanded dark directly
    pub fn stop(&mut self) {
        let now = self.clock.get_time_us();
        self.safety.stop(now);
        if let Err(err) = self.actuators.laser.force_zero(now) {
            debug!("[FRAME-LOOP] Laser force-zero on stop: {}", err);
        }
    }

    pub fn acknowledge_fault(&self) -> std::result::Result<(), SafetyError> {
        self.safety.acknowledge_fault(self.clock.get_time_us())
    }

    /// Shutdown → Idle; forgets every plan made before the fault
    pub fn reset_fault(&mut self) -> std::result::Result<(), SafetyError> {
        self.safety.reset_fault(self.clock.get_time_us())?;
        self.discard_frame_history();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Frame cycle
    // ------------------------------------------------------------------

    pub fn run_cycle(&mut self) -> CycleOutcome {
        FrameCounters::bump(&self.counters.cycles);
        let outcome = self.cycle();
        self.safety.kick(self.clock.get_time_us());
        outcome
    }

    fn cycle(&mut self) -> CycleOutcome {
        let state = self.safety.state();
        if !state.permits_dispatch() {
            FrameCounters::bump(&self.counters.skipped);
            if state == SafetyState::Shutdown && self.last_plan.is_some() {
                self.discard_frame_history();
            }
            trace!("[FRAME-LOOP] Skipping cycle while {}", state);
            return CycleOutcome::Skipped(state);
        }

        self.board.publish_power(self.power.latest());
        let Some((plan, source)) = self.select_plan() else {
            return match self.collect_telemetry() {
                Some(cause) => CycleOutcome::Faulted(cause),
                None => CycleOutcome::NoTarget,
            };
        };

        let now = self.clock.get_time_us();
        if self.safety.begin_projection(now).is_err() {
            FrameCounters::bump(&self.counters.skipped);
            return CycleOutcome::Skipped(self.safety.state());
        }

        let dispatched = self.actuators.dispatch(
            &plan,
            self.clock.as_ref(),
            self.settle,
            self.safety.cell().as_ref(),
        );

        let outcome = match dispatched {
            Ok(DispatchOutcome::Presented(report)) => {
                match source {
                    PlanSource::Fresh => FrameCounters::bump(&self.counters.presented),
                    PlanSource::Repeat => FrameCounters::bump(&self.counters.re_presented),
                    PlanSource::Held => FrameCounters::bump(&self.counters.held),
                    PlanSource::Blank => FrameCounters::bump(&self.counters.blanked),
                }
                debug!(
                    frame_id = plan.frame_id(),
                    ?source,
                    power_w = report.laser.power_w,
                    settle_wait_us = report.settle_wait_us,
                    "[FRAME-LOOP] Frame presented"
                );
                self.last_confidence = Some(plan.quality_confidence());
                self.last_presented_frame = Some(plan.frame_id());
                CycleOutcome::Presented {
                    frame_id: plan.frame_id(),
                    source,
                }
            }
            Ok(DispatchOutcome::CoTimingSkew { skew_us, .. }) => {
                FrameCounters::bump(&self.counters.co_timing_skews);
                FrameCounters::bump(&self.counters.blanked);
                CycleOutcome::CoTimingSkew {
                    frame_id: plan.frame_id(),
                    skew_us,
                }
            }
            Err(DispatchError::Aborted(state)) => {
                FrameCounters::bump(&self.counters.skipped);
                info!("[FRAME-LOOP] Frame {} aborted: {}", plan.frame_id(), state);
                return CycleOutcome::Skipped(state);
            }
            Err(err) => {
                return self.dispatch_failed(plan.frame_id(), err);
            }
        };

        if let Some(cause) = self.collect_telemetry() {
            return CycleOutcome::Faulted(cause);
        }

        if matches!(outcome, CycleOutcome::Presented { .. }) {
            self.optimizer.accept_presented(&plan);
        }
        self.last_plan = Some(plan);

        if let Err(err) = self.safety.end_frame(self.clock.get_time_us()) {
            debug!("[FRAME-LOOP] Frame completion not recorded: {}", err);
        }
        outcome
    }

    /// Plan to dispatch this cycle, or `None` if there has never been one
    fn select_plan(&mut self) -> Option<(Arc<ActuationPlan>, PlanSource)> {
        let Some(target) = self.targets.take() else {
            return self
                .last_plan
                .clone()
                .map(|plan| (plan, PlanSource::Repeat));
        };

        let telemetry = self.board.snapshot(self.clock.get_time_us());
        let deadline = Instant::now() + self.optimizer.budget();
        let started = Instant::now();
        match self.optimizer.compute_plan_until(
            &target,
            &telemetry,
            self.safety.envelope(),
            deadline,
        ) {
            Ok(plan) => {
                trace!(
                    frame_id = plan.frame_id(),
                    iterations = plan.iterations(),
                    converged = plan.converged(),
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "[FRAME-LOOP] Plan ready"
                );
                Some((Arc::new(plan), PlanSource::Fresh))
            }
            Err(OptimizerError::InfeasibleTarget { frame_id, reason }) => {
                FrameCounters::bump(&self.counters.infeasible);
                warn!(
                    "[FRAME-LOOP] Frame {} infeasible ({}); applying {:?} policy",
                    frame_id, reason, self.frame.infeasible_frame_policy
                );
                Some(self.fallback_plan(frame_id))
            }
            Err(err) => {
                FrameCounters::bump(&self.counters.infeasible);
                warn!(
                    "[FRAME-LOOP] Frame {} rejected by optimizer: {}",
                    target.frame_id(),
                    err
                );
                Some(self.fallback_plan(target.frame_id()))
            }
        }
    }

    fn fallback_plan(&self, frame_id: u64) -> (Arc<ActuationPlan>, PlanSource) {
        match (self.frame.infeasible_frame_policy, &self.last_plan) {
            (InfeasibleFramePolicy::Hold, Some(previous)) => (previous.clone(), PlanSource::Held),
            _ => {
                let (rows, cols) = self.optimizer.grid();
                let blank =
                    ActuationPlan::blank(frame_id, self.optimizer.channel_count(), rows, cols);
                (Arc::new(blank), PlanSource::Blank)
            }
        }
    }

    fn dispatch_failed(&mut self, frame_id: u64, err: DispatchError) -> CycleOutcome {
        match &err {
            DispatchError::SettleTimeout { .. } => {
                FrameCounters::bump(&self.counters.not_settled)
            }
            _ => FrameCounters::bump(&self.counters.dispatch_failures),
        }
        let now = self.clock.get_time_us();
        match err.fault_cause() {
            Some(cause) => {
                error!("[FRAME-LOOP] Frame {} dispatch failed: {}", frame_id, err);
                self.safety.report_controller_fault(cause, now);
                self.collect_telemetry();
                CycleOutcome::Faulted(cause)
            }
            None => CycleOutcome::Skipped(self.safety.state()),
        }
    }

    /// Read every source, publish, and run the envelope check.
    ///
    /// Returns the fault raised by a controller or by the Safety Manager.
    fn collect_telemetry(&mut self) -> Option<FaultCause> {
        let now = self.clock.get_time_us();
        let mut fault = None;

        match self.actuators.laser.read_telemetry() {
            Ok(reading) => self.board.publish_laser(reading),
            Err(err) => fault = fault.or(Some(err.fault_cause())),
        }
        match self.actuators.meta_surface.read_telemetry() {
            Ok(reading) => self.board.publish_meta_surface(reading),
            Err(err) => fault = fault.or(Some(err.fault_cause())),
        }
        match self.actuators.mems.sample_tracking() {
            Ok(reading) => self.board.publish_mems(reading),
            Err(err) => {
                if let ControllerError::TrackingFault { .. } = err {
                    if let Ok(reading) = self.actuators.mems.read_telemetry() {
                        self.board.publish_mems(reading);
                    }
                }
                fault = fault.or(Some(err.fault_cause()));
            }
        }
        self.board.publish_power(self.power.latest());

        if let Some(cause) = fault {
            error!("[FRAME-LOOP] Controller fault: {}", cause);
            self.safety.report_controller_fault(cause, now);
        }
        let breach = self.safety.observe(&self.board.snapshot(now));
        fault.or(breach)
    }

    /// Telemetry reads that do not advance any per-frame tracking
    fn publish_passive_telemetry(&self) {
        if let Ok(reading) = self.actuators.laser.read_telemetry() {
            self.board.publish_laser(reading);
        }
        if let Ok(reading) = self.actuators.meta_surface.read_telemetry() {
            self.board.publish_meta_surface(reading);
        }
        if let Ok(reading) = self.actuators.mems.read_telemetry() {
            self.board.publish_mems(reading);
        }
        self.board.publish_power(self.power.latest());
    }

    fn discard_frame_history(&mut self) {
        self.last_plan = None;
        self.optimizer.clear_warm_start();
        self.actuators.mems.reset_tracking();
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    pub fn status(&self) -> StatusReport {
        StatusReport {
            safety: self.safety.status(),
            fault_acknowledged: self.safety.is_acknowledged(),
            counters: self.counters.snapshot(),
            last_quality_confidence: self.last_confidence,
            last_presented_frame: self.last_presented_frame,
            targets_submitted: self.targets.submitted(),
            targets_superseded: self.targets.superseded(),
            telemetry: self.board.snapshot(self.clock.get_time_us()),
            recent_events: self.safety.journal().recent(STATUS_EVENT_COUNT),
        }
    }
}

impl std::fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("state", &self.safety.state())
            .field("last_plan", &self.last_plan.as_ref().map(|p| p.frame_id()))
            .field("counters", &self.counters.snapshot())
            .finish()
    }
}
