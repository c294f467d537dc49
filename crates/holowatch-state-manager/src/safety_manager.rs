// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Safety interlock state machine
//!
//! ```text
//!   Idle ──start──▶ Armed ──begin──▶ Projecting
//!    ▲               ▲  ◀──frame complete──┘
//!    │               └───────┬─────────────┘
//!    │                    fault
//!    │                       ▼
//!  reset (after ack)      Fault ──immediate──▶ Shutdown ◀── stop (any state)
//!    └──────────────────────────────────────────┘
//! ```
//!
//! The manager is the only writer of [`SafetyCell`]. Every transition is
//! serialized by one short lock that never covers controller or optimizer
//! work. The fault path engages the kill switches before taking that lock, so
//! emission stops even if another thread is mid-transition.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use holowatch_config::SafetyEnvelope;
use holowatch_hal::KillSwitch;
use holowatch_structures::{FaultCause, SafetyState, SafetyStatus, TelemetrySample};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::core_state::SafetyCell;
use crate::events::{EventJournal, SafetyEvent, SafetyEventKind, SafetyQuantity};
use crate::{Result, SafetyError};

/// Input to the transition table
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SafetyTrigger {
    Start,
    BeginProjection,
    FrameComplete,
    Fault(FaultCause),
    /// Fault always escalates to Shutdown without operator input
    Escalate,
    Stop,
    Reset,
}

impl SafetyTrigger {
    fn name(&self) -> &'static str {
        match self {
            SafetyTrigger::Start => "start",
            SafetyTrigger::BeginProjection => "begin projection",
            SafetyTrigger::FrameComplete => "frame complete",
            SafetyTrigger::Fault(_) => "fault",
            SafetyTrigger::Escalate => "escalate",
            SafetyTrigger::Stop => "stop",
            SafetyTrigger::Reset => "reset",
        }
    }
}

/// Transition table. `None` means the trigger is not valid in `state`.
pub fn next_state(state: SafetyState, trigger: SafetyTrigger) -> Option<SafetyState> {
    use SafetyState::*;
    match (state, trigger) {
        (Idle, SafetyTrigger::Start) => Some(Armed),
        (Armed | Projecting, SafetyTrigger::BeginProjection) => Some(Projecting),
        (Armed | Projecting, SafetyTrigger::FrameComplete) => Some(Armed),
        (Armed | Projecting, SafetyTrigger::Fault(_)) => Some(Fault),
        (Fault, SafetyTrigger::Escalate) => Some(Shutdown),
        (_, SafetyTrigger::Stop) => Some(Shutdown),
        (Shutdown, SafetyTrigger::Reset) => Some(Idle),
        _ => None,
    }
}

/// Warning/recovery hysteresis per envelope quantity
#[derive(Debug, Default)]
struct WarningTracker {
    active: [bool; SafetyQuantity::ALL.len()],
}

/// The safety interlock.
///
/// Shared as `Arc<SafetyManager>` between the frame loop, the watchdog runner
/// and the operator surface; every method takes `&self`.
pub struct SafetyManager {
    envelope: SafetyEnvelope,
    cell: Arc<SafetyCell>,
    journal: Arc<EventJournal>,
    kill_switches: Vec<Arc<dyn KillSwitch>>,
    transition_lock: Mutex<WarningTracker>,
    heartbeat_us: AtomicU64,
    acknowledged: AtomicBool,
}

impl std::fmt::Debug for SafetyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyManager")
            .field("status", &self.cell.status())
            .field("kill_switches", &self.kill_switches.len())
            .finish()
    }
}

impl SafetyManager {
    /// Create an interlock for `envelope`.
    ///
    /// # Errors
    ///
    /// Returns [`SafetyError::InvalidEnvelope`] if the envelope is inconsistent.
    pub fn new(envelope: SafetyEnvelope) -> Result<Self> {
        envelope.validate()?;
        Ok(Self {
            envelope,
            cell: Arc::new(SafetyCell::new()),
            journal: Arc::new(EventJournal::default()),
            kill_switches: Vec::new(),
            transition_lock: Mutex::new(WarningTracker::default()),
            heartbeat_us: AtomicU64::new(0),
            acknowledged: AtomicBool::new(false),
        })
    }

    /// Register an actuator kill switch; call before sharing the manager
    pub fn with_kill_switch(mut self, switch: Arc<dyn KillSwitch>) -> Self {
        self.kill_switches.push(switch);
        self
    }

    pub fn with_journal(mut self, journal: Arc<EventJournal>) -> Self {
        self.journal = journal;
        self
    }

    pub fn envelope(&self) -> &SafetyEnvelope {
        &self.envelope
    }

    pub fn state(&self) -> SafetyState {
        self.cell.state()
    }

    pub fn status(&self) -> SafetyStatus {
        self.cell.status()
    }

    /// Read-only handle for other components
    pub fn cell(&self) -> Arc<SafetyCell> {
        self.cell.clone()
    }

    pub fn journal(&self) -> Arc<EventJournal> {
        self.journal.clone()
    }

    /// Most recent fault cause recorded in the journal, if any
    pub fn last_fault(&self) -> Option<FaultCause> {
        self.journal
            .events()
            .iter()
            .rev()
            .find(|e| {
                matches!(
                    e.kind,
                    SafetyEventKind::Transition {
                        to: SafetyState::Fault,
                        ..
                    }
                )
            })
            .and_then(|e| e.cause)
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Operator commands
    // ------------------------------------------------------------------

    /// Idle → Armed after prechecks on the latest telemetry.
    ///
    /// On a failed precheck the interlock stays Idle and the cause is stored
    /// in the status and journal.
    pub fn start(&self, sample: &TelemetrySample, now_us: u64) -> Result<()> {
        let _guard = self.transition_lock.lock();
        let state = self.cell.state();
        if state != SafetyState::Idle {
            return Err(self.reject("start", state, None, now_us));
        }

        if let Some(cause) = self.precheck(sample) {
            self.cell.store(SafetyStatus {
                state: SafetyState::Idle,
                cause: Some(cause),
                since_us: now_us,
            });
            self.journal.record(SafetyEvent {
                timestamp_us: now_us,
                kind: SafetyEventKind::CommandRejected {
                    command: "start",
                    state,
                },
                cause: Some(cause),
            });
            warn!("[SAFETY] Start refused: {}", cause);
            return Err(SafetyError::PrecheckFailed(cause));
        }

        self.heartbeat_us.store(now_us, Ordering::Release);
        self.apply(state, SafetyTrigger::Start, None, now_us);
        Ok(())
    }

    /// Any state → Shutdown; engages every kill switch
    pub fn stop(&self, now_us: u64) {
        self.engage_kill_switches();
        let _guard = self.transition_lock.lock();
        let state = self.cell.state();
        if state == SafetyState::Shutdown {
            return;
        }
        self.acknowledged.store(false, Ordering::Release);
        self.apply(state, SafetyTrigger::Stop, Some(FaultCause::OperatorStop), now_us);
    }

    /// Record the operator's acknowledgment of the current shutdown
    pub fn acknowledge_fault(&self, now_us: u64) -> Result<()> {
        let _guard = self.transition_lock.lock();
        let state = self.cell.state();
        if state != SafetyState::Shutdown {
            return Err(self.reject("acknowledge", state, None, now_us));
        }
        self.acknowledged.store(true, Ordering::Release);
        self.journal.record(SafetyEvent {
            timestamp_us: now_us,
            kind: SafetyEventKind::FaultAcknowledged,
            cause: self.cell.status().cause,
        });
        info!("[SAFETY] Fault acknowledged");
        Ok(())
    }

    /// Shutdown → Idle, only after [`Self::acknowledge_fault`]
    pub fn reset_fault(&self, now_us: u64) -> Result<()> {
        let _guard = self.transition_lock.lock();
        let state = self.cell.state();
        if state != SafetyState::Shutdown {
            return Err(self.reject("reset", state, None, now_us));
        }
        if !self.acknowledged.load(Ordering::Acquire) {
            self.journal.record(SafetyEvent {
                timestamp_us: now_us,
                kind: SafetyEventKind::CommandRejected {
                    command: "reset",
                    state,
                },
                cause: self.cell.status().cause,
            });
            warn!("[SAFETY] Reset refused: fault not acknowledged");
            return Err(SafetyError::NotAcknowledged);
        }

        for switch in &self.kill_switches {
            switch.release();
        }
        self.acknowledged.store(false, Ordering::Release);
        self.apply(state, SafetyTrigger::Reset, None, now_us);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Frame-cycle hooks
    // ------------------------------------------------------------------

    /// Armed → Projecting (Projecting stays Projecting)
    pub fn begin_projection(&self, now_us: u64) -> Result<()> {
        self.frame_transition(SafetyTrigger::BeginProjection, now_us)
    }

    /// Projecting → Armed once the frame is done
    pub fn end_frame(&self, now_us: u64) -> Result<()> {
        self.frame_transition(SafetyTrigger::FrameComplete, now_us)
    }

    fn frame_transition(&self, trigger: SafetyTrigger, now_us: u64) -> Result<()> {
        let _guard = self.transition_lock.lock();
        let state = self.cell.state();
        match next_state(state, trigger) {
            Some(to) if to == state => Ok(()),
            Some(_) => {
                self.apply(state, trigger, None, now_us);
                Ok(())
            }
            None => Err(SafetyError::InvalidTransition {
                from: state,
                trigger: trigger.name(),
            }),
        }
    }

    /// Frame-cycle heartbeat for the watchdog
    pub fn kick(&self, now_us: u64) {
        self.heartbeat_us.fetch_max(now_us, Ordering::AcqRel);
    }

    pub fn last_heartbeat_us(&self) -> u64 {
        self.heartbeat_us.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Fault detection
    // ------------------------------------------------------------------

    /// Check a telemetry sample against the envelope.
    ///
    /// Journals warnings/recoveries and faults on a breach while emission is
    /// permitted. Returns the breach, if any.
    pub fn observe(&self, sample: &TelemetrySample) -> Option<FaultCause> {
        let breach = self.envelope_breach(sample);
        if let Some(cause) = breach {
            if self.cell.state().permits_dispatch() {
                self.fault(cause, sample.timestamp_us);
            } else {
                debug!("[SAFETY] Envelope breach while {}: {}", self.cell.state(), cause);
            }
        }
        self.track_warnings(sample);
        breach
    }

    /// A controller could not reach or confirm its commanded state
    pub fn report_controller_fault(&self, cause: FaultCause, now_us: u64) -> bool {
        self.fault(cause, now_us)
    }

    /// Fault if the frame cycle has not kicked within the watchdog deadline
    pub fn check_watchdog(&self, now_us: u64) -> Option<FaultCause> {
        if !self.cell.state().permits_dispatch() {
            return None;
        }
        let last = self.heartbeat_us.load(Ordering::Acquire);
        let elapsed_us = now_us.saturating_sub(last);
        let deadline_us = (self.envelope.watchdog_deadline_ms * 1000.0) as u64;
        if elapsed_us <= deadline_us {
            return None;
        }
        let cause = FaultCause::WatchdogTimeout {
            elapsed_us,
            deadline_us,
        };
        self.fault(cause, now_us).then_some(cause)
    }

    /// {Armed, Projecting} → Fault → Shutdown.
    ///
    /// Returns true if this call performed the transition.
    fn fault(&self, cause: FaultCause, now_us: u64) -> bool {
        // Kill switches first: reachable even if a transition is in progress
        if self.cell.state().permits_dispatch() {
            self.engage_kill_switches();
        }

        let _guard = self.transition_lock.lock();
        let state = self.cell.state();
        if !state.permits_dispatch() {
            return false;
        }
        self.engage_kill_switches();
        self.acknowledged.store(false, Ordering::Release);
        self.apply(state, SafetyTrigger::Fault(cause), Some(cause), now_us);
        self.apply(SafetyState::Fault, SafetyTrigger::Escalate, Some(cause), now_us);
        true
    }

    fn engage_kill_switches(&self) {
        for switch in &self.kill_switches {
            switch.engage();
        }
    }

    // ------------------------------------------------------------------
    // Internals (transition lock held)
    // ------------------------------------------------------------------

    fn apply(
        &self,
        from: SafetyState,
        trigger: SafetyTrigger,
        cause: Option<FaultCause>,
        now_us: u64,
    ) {
        let Some(to) = next_state(from, trigger) else {
            return;
        };
        self.cell.store(SafetyStatus {
            state: to,
            cause,
            since_us: now_us,
        });
        self.journal.record(SafetyEvent {
            timestamp_us: now_us,
            kind: SafetyEventKind::Transition { from, to },
            cause,
        });

        match (to, cause) {
            (SafetyState::Fault, Some(cause)) => error!("[SAFETY] {} -> {}: {}", from, to, cause),
            (SafetyState::Shutdown, Some(cause)) => {
                error!("[SAFETY] {} -> {} (emission forced to zero): {}", from, to, cause)
            }
            (SafetyState::Armed, _) if from == SafetyState::Projecting => {
                debug!("[SAFETY] {} -> {}", from, to)
            }
            (SafetyState::Projecting, _) => debug!("[SAFETY] {} -> {}", from, to),
            _ => info!("[SAFETY] {} -> {}", from, to),
        }
    }

    fn reject(
        &self,
        command: &'static str,
        state: SafetyState,
        cause: Option<FaultCause>,
        now_us: u64,
    ) -> SafetyError {
        self.journal.record(SafetyEvent {
            timestamp_us: now_us,
            kind: SafetyEventKind::CommandRejected { command, state },
            cause,
        });
        warn!("[SAFETY] {} rejected while {}", command, state);
        SafetyError::InvalidTransition {
            from: state,
            trigger: command,
        }
    }

    fn precheck(&self, sample: &TelemetrySample) -> Option<FaultCause> {
        if let Some(cause) = self.envelope_breach(sample) {
            return Some(cause);
        }
        if !sample.power_reported
            || sample.available_power_w < self.envelope.min_start_power_budget_w
        {
            return Some(FaultCause::InsufficientPowerBudget {
                available_w: sample.available_power_w,
                required_w: self.envelope.min_start_power_budget_w,
            });
        }
        if sample.thermal_headroom_c.is_nan() || sample.thermal_headroom_c <= 0.0 {
            return Some(FaultCause::NoThermalHeadroom {
                headroom_c: sample.thermal_headroom_c,
            });
        }
        None
    }

    /// First envelope limit the sample exceeds
    pub fn envelope_breach(&self, sample: &TelemetrySample) -> Option<FaultCause> {
        let env = &self.envelope;
        if exceeds(sample.laser_power_w, env.max_aggregate_laser_power_w) {
            return Some(FaultCause::LaserPowerExceeded {
                measured_w: sample.laser_power_w,
                limit_w: env.max_aggregate_laser_power_w,
            });
        }
        if exceeds(sample.max_channel_power_w, env.max_channel_power_w) {
            return Some(FaultCause::ChannelPowerExceeded {
                measured_w: sample.max_channel_power_w,
                limit_w: env.max_channel_power_w,
            });
        }
        if exceeds(sample.junction_temp_c, env.max_junction_temp_c) {
            return Some(FaultCause::JunctionOverTemperature {
                measured_c: sample.junction_temp_c,
                limit_c: env.max_junction_temp_c,
            });
        }
        if exceeds(sample.meta_surface_temp_c, env.max_meta_surface_temp_c) {
            return Some(FaultCause::MetaSurfaceOverTemperature {
                measured_c: sample.meta_surface_temp_c,
                limit_c: env.max_meta_surface_temp_c,
            });
        }
        if exceeds(sample.mems_position_error_deg.abs(), env.max_mems_position_error_deg) {
            return Some(FaultCause::MemsPositionError {
                measured_deg: sample.mems_position_error_deg,
                limit_deg: env.max_mems_position_error_deg,
            });
        }
        None
    }

    fn track_warnings(&self, sample: &TelemetrySample) {
        let env = &self.envelope;
        let readings = [
            (SafetyQuantity::LaserPower, sample.laser_power_w, env.max_aggregate_laser_power_w),
            (SafetyQuantity::ChannelPower, sample.max_channel_power_w, env.max_channel_power_w),
            (SafetyQuantity::JunctionTemperature, sample.junction_temp_c, env.max_junction_temp_c),
            (
                SafetyQuantity::MetaSurfaceTemperature,
                sample.meta_surface_temp_c,
                env.max_meta_surface_temp_c,
            ),
            (
                SafetyQuantity::MemsPositionError,
                sample.mems_position_error_deg,
                env.max_mems_position_error_deg,
            ),
        ];

        let mut tracker = self.transition_lock.lock();
        for (quantity, value, limit) in readings {
            let slot = &mut tracker.active[quantity.index()];
            if !*slot && value >= limit * env.warning_fraction {
                *slot = true;
                self.journal.record(SafetyEvent {
                    timestamp_us: sample.timestamp_us,
                    kind: SafetyEventKind::Warning {
                        quantity,
                        value,
                        limit,
                    },
                    cause: None,
                });
                warn!(
                    "[SAFETY] {:?} at {:.3} approaching limit {:.3}",
                    quantity, value, limit
                );
            } else if *slot && value < limit * env.recovery_fraction {
                *slot = false;
                self.journal.record(SafetyEvent {
                    timestamp_us: sample.timestamp_us,
                    kind: SafetyEventKind::Recovered { quantity, value },
                    cause: None,
                });
                info!("[SAFETY] {:?} recovered at {:.3}", quantity, value);
            }
        }
    }
}

/// A reading that is not a number fails the limit rather than passing it
fn exceeds(value: f64, limit: f64) -> bool {
    value.is_nan() || value > limit
}

#[cfg(test)]
mod tests {
    use super::*;
    use holowatch_hal::AtomicKillSwitch;
    use holowatch_structures::PowerReading;

    fn nominal(ts: u64) -> TelemetrySample {
        TelemetrySample::from_readings(
            ts,
            None,
            None,
            None,
            Some(PowerReading {
                timestamp_us: ts,
                available_power_w: 3.0,
                thermal_headroom_c: 10.0,
            }),
        )
    }

    fn manager() -> (SafetyManager, Arc<AtomicKillSwitch>) {
        let switch = Arc::new(AtomicKillSwitch::new());
        let manager = SafetyManager::new(SafetyEnvelope::default())
            .unwrap()
            .with_kill_switch(switch.clone());
        (manager, switch)
    }

    #[test]
    fn test_transition_table() {
        use SafetyState::*;
        assert_eq!(next_state(Idle, SafetyTrigger::Start), Some(Armed));
        assert_eq!(next_state(Armed, SafetyTrigger::Start), None);
        assert_eq!(next_state(Idle, SafetyTrigger::Fault(FaultCause::OperatorStop)), None);
        assert_eq!(next_state(Fault, SafetyTrigger::Reset), None);
        assert_eq!(next_state(Fault, SafetyTrigger::Escalate), Some(Shutdown));
        for state in SafetyState::ALL {
            assert_eq!(next_state(state, SafetyTrigger::Stop), Some(Shutdown));
        }
    }

    #[test]
    fn test_invalid_envelope_refused() {
        let envelope = SafetyEnvelope {
            max_aggregate_laser_power_w: -1.0,
            ..SafetyEnvelope::default()
        };
        assert!(matches!(
            SafetyManager::new(envelope),
            Err(SafetyError::InvalidEnvelope(_))
        ));
    }

    #[test]
    fn test_start_without_power_telemetry_stays_idle() {
        let (manager, _) = manager();
        let err = manager.start(&TelemetrySample::worst_case(5), 5).unwrap_err();
        assert!(matches!(
            err,
            SafetyError::PrecheckFailed(FaultCause::InsufficientPowerBudget { .. })
        ));
        assert_eq!(manager.state(), SafetyState::Idle);
        assert!(manager.status().cause.is_some());
    }

    #[test]
    fn test_start_without_thermal_headroom_stays_idle() {
        let (manager, switch) = manager();
        let mut sample = nominal(5);
        sample.thermal_headroom_c = 0.0;

        let err = manager.start(&sample, 5).unwrap_err();
        assert!(matches!(
            err,
            SafetyError::PrecheckFailed(FaultCause::NoThermalHeadroom { .. })
        ));
        assert_eq!(manager.state(), SafetyState::Idle);
        assert!(!switch.is_engaged());

        sample.thermal_headroom_c = 2.0;
        manager.start(&sample, 6).unwrap();
        assert_eq!(manager.state(), SafetyState::Armed);
    }

    #[test]
    fn test_projection_cycle() {
        let (manager, _) = manager();
        manager.start(&nominal(0), 0).unwrap();
        manager.begin_projection(10).unwrap();
        assert_eq!(manager.state(), SafetyState::Projecting);
        manager.begin_projection(11).unwrap();
        manager.end_frame(20).unwrap();
        assert_eq!(manager.state(), SafetyState::Armed);
    }

    #[test]
    fn test_begin_projection_refused_when_idle() {
        let (manager, _) = manager();
        assert!(matches!(
            manager.begin_projection(0),
            Err(SafetyError::InvalidTransition { from: SafetyState::Idle, .. })
        ));
    }

    #[test]
    fn test_breach_faults_and_engages_kill_switch() {
        let (manager, switch) = manager();
        manager.start(&nominal(0), 0).unwrap();
        manager.begin_projection(1).unwrap();

        let mut sample = nominal(2);
        sample.laser_power_w = 2.4;
        let cause = manager.observe(&sample);

        assert!(matches!(cause, Some(FaultCause::LaserPowerExceeded { .. })));
        assert!(switch.is_engaged());
        assert_eq!(manager.state(), SafetyState::Shutdown);
        assert_eq!(
            manager.journal().transitions(),
            vec![
                (SafetyState::Idle, SafetyState::Armed),
                (SafetyState::Armed, SafetyState::Projecting),
                (SafetyState::Projecting, SafetyState::Fault),
                (SafetyState::Fault, SafetyState::Shutdown),
            ]
        );
        assert_eq!(manager.last_fault(), cause);
    }

    #[test]
    fn test_unreadable_sensor_value_is_a_breach() {
        let (manager, switch) = manager();
        manager.start(&nominal(0), 0).unwrap();

        let mut sample = nominal(2);
        sample.junction_temp_c = f64::NAN;
        sample.laser_power_w = f64::NAN;
        let cause = manager.observe(&sample);

        assert!(matches!(
            cause,
            Some(FaultCause::LaserPowerExceeded { measured_w, .. }) if measured_w.is_nan()
        ));
        assert!(switch.is_engaged());
        assert_eq!(manager.state(), SafetyState::Shutdown);

        let mut mems = nominal(3);
        mems.mems_position_error_deg = f64::NAN;
        assert!(matches!(
            manager.envelope_breach(&mems),
            Some(FaultCause::MemsPositionError { .. })
        ));
    }

    #[test]
    fn test_reset_requires_acknowledgment() {
        let (manager, switch) = manager();
        manager.start(&nominal(0), 0).unwrap();
        manager.stop(1);
        assert_eq!(manager.state(), SafetyState::Shutdown);

        assert!(matches!(manager.reset_fault(2), Err(SafetyError::NotAcknowledged)));
        assert!(switch.is_engaged());

        manager.acknowledge_fault(3).unwrap();
        manager.reset_fault(4).unwrap();
        assert_eq!(manager.state(), SafetyState::Idle);
        assert!(!switch.is_engaged());
        assert!(!manager.is_acknowledged());
    }

    #[test]
    fn test_watchdog_fires_after_deadline() {
        let (manager, switch) = manager();
        manager.start(&nominal(0), 0).unwrap();
        manager.kick(10_000);

        assert_eq!(manager.check_watchdog(60_000), None);
        let cause = manager.check_watchdog(60_001);
        assert!(matches!(cause, Some(FaultCause::WatchdogTimeout { .. })));
        assert!(switch.is_engaged());
        assert_eq!(manager.state(), SafetyState::Shutdown);
    }

    #[test]
    fn test_watchdog_idle_is_quiet() {
        let (manager, _) = manager();
        assert_eq!(manager.check_watchdog(10_000_000), None);
    }

    #[test]
    fn test_warning_and_recovery_journaled_without_state_change() {
        let (manager, _) = manager();
        manager.start(&nominal(0), 0).unwrap();

        let mut hot = nominal(1);
        hot.junction_temp_c = 40.0; // 0.89 of 45 C
        manager.observe(&hot);
        manager.observe(&hot);
        let mut cool = nominal(2);
        cool.junction_temp_c = 30.0;
        manager.observe(&cool);

        let kinds: Vec<_> = manager
            .journal()
            .events()
            .into_iter()
            .filter(|e| !matches!(e.kind, SafetyEventKind::Transition { .. }))
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds.len(), 2);
        assert!(matches!(
            kinds[0],
            SafetyEventKind::Warning { quantity: SafetyQuantity::JunctionTemperature, .. }
        ));
        assert!(matches!(kinds[1], SafetyEventKind::Recovered { .. }));
        assert_eq!(manager.state(), SafetyState::Armed);
    }
}
