// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Synchronized dispatch of one plan to the three controllers.
//!
//! ```text
//! laser dark (if the wavefront changes)
//!   │
//! meta-surface.apply(phase) ─┐
//! mems.apply(trajectory) ────┼─▶ join: both settled (bounded wait, state re-checked each poll)
//!                            │
//!                            └─▶ laser.apply(intensity, next pixel slot after the scan epoch)
//!                                 └─▶ co-timing check: |emission start - slot| <= dwell / 2
//! ```
//!
//! The laser is loaded last so it never lights an unsettled wavefront. When
//! the phase map or trajectory differs from what is loaded, the laser goes
//! dark before either is touched and stays dark until both have settled.

use std::time::Duration;

use holowatch_config::HolowatchConfig;
use holowatch_hal::{
    LaserInterface, MetaSurfaceInterface, MirrorInterface, ScanEpoch, TimeProvider,
};
use holowatch_projector::{
    ControllerResult, LaserAck, LaserController, MemsController, MetaSurfaceController,
    SettleStatus,
};
use holowatch_state_manager::SafetyCell;
use holowatch_structures::{ActuationPlan, ControllerKind, MirrorTrajectory, PhaseMap};
use tracing::{debug, trace, warn};

use crate::error::DispatchError;

/// The three controllers driven in lockstep
pub struct ActuatorSet {
    pub laser: LaserController,
    pub mems: MemsController,
    pub meta_surface: MetaSurfaceController,
    /// Wavefront last loaded into the meta-surface and mirror
    loaded: Option<(PhaseMap, MirrorTrajectory)>,
}

#[derive(Debug, Clone, Copy)]
pub struct SettlePolicy {
    pub timeout: Duration,
    pub poll: Duration,
}

impl SettlePolicy {
    pub fn from_config(config: &HolowatchConfig) -> Self {
        Self {
            timeout: config.frame.settle_timeout(),
            poll: Duration::from_micros(config.frame.settle_poll_us),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub laser: LaserAck,
    pub epoch: ScanEpoch,
    /// Pixel slot the laser was asked to start on
    pub slot_us: u64,
    pub skew_us: u64,
    pub settle_wait_us: u64,
    /// Measured mirror angle when the laser was loaded
    pub mirror_position_deg: (f64, f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// All three controllers completed and the laser started on its slot
    Presented(DispatchReport),
    /// Laser started too far from its slot; output was forced dark
    CoTimingSkew { skew_us: u64, tolerance_us: u64 },
}

/// First pixel slot at or after `now_us` on a scan starting at `epoch_us`
pub fn next_slot_us(epoch_us: u64, dwell_us: u64, now_us: u64) -> u64 {
    if now_us <= epoch_us {
        return epoch_us;
    }
    let dwell = dwell_us.max(1);
    epoch_us + (now_us - epoch_us).div_ceil(dwell) * dwell
}

impl ActuatorSet {
    /// Wrap the three device drivers in their controllers
    pub fn from_devices(
        laser: Box<dyn LaserInterface>,
        mirror: Box<dyn MirrorInterface>,
        meta_surface: Box<dyn MetaSurfaceInterface>,
        config: &HolowatchConfig,
    ) -> ControllerResult<Self> {
        Ok(Self {
            laser: LaserController::new(laser, &config.laser, &config.safety)?,
            mems: MemsController::new(mirror, &config.mems),
            meta_surface: MetaSurfaceController::new(
                meta_surface,
                &config.meta_surface,
                &config.safety,
            )?,
            loaded: None,
        })
    }

    /// Issue all three commands and wait for the combined completion
    pub fn dispatch(
        &mut self,
        plan: &ActuationPlan,
        clock: &dyn TimeProvider,
        settle: SettlePolicy,
        safety: &SafetyCell,
    ) -> Result<DispatchOutcome, DispatchError> {
        let changed = match &self.loaded {
            Some((phase, trajectory)) => {
                phase != plan.phase_map() || trajectory != plan.trajectory()
            }
            None => true,
        };
        if changed {
            self.go_dark(clock.get_time_us());
        }
        let epoch = match self.load_wavefront(plan, changed) {
            Ok(epoch) => epoch,
            Err(err) => {
                self.loaded = None;
                return Err(err);
            }
        };

        let settle_wait_us = match self.await_settled(clock, settle, safety, changed) {
            Ok(waited_us) => waited_us,
            Err(err) => {
                self.go_dark(clock.get_time_us());
                return Err(err);
            }
        };

        let dwell_us = plan.trajectory().dwell_us();
        let slot_us = next_slot_us(epoch.start_us, dwell_us, clock.get_time_us());
        let mirror_position_deg = self.mems.position();
        let ack = self.laser.apply(plan.intensity(), slot_us)?;

        let skew_us = ack.emission_start_us.abs_diff(slot_us);
        let tolerance_us = dwell_us / 2;
        if skew_us > tolerance_us && !plan.is_blank() {
            warn!(
                "[DISPATCH] Frame {}: laser started {} us off its slot (tolerance {} us); blanking",
                plan.frame_id(),
                skew_us,
                tolerance_us
            );
            self.go_dark(clock.get_time_us());
            return Ok(DispatchOutcome::CoTimingSkew {
                skew_us,
                tolerance_us,
            });
        }

        trace!(
            "[DISPATCH] Frame {}: slot {} us, mirror at ({:.3}, {:.3}) deg",
            plan.frame_id(),
            slot_us,
            mirror_position_deg.0,
            mirror_position_deg.1
        );
        Ok(DispatchOutcome::Presented(DispatchReport {
            laser: ack,
            epoch,
            slot_us,
            skew_us,
            settle_wait_us,
            mirror_position_deg,
        }))
    }

    fn load_wavefront(
        &mut self,
        plan: &ActuationPlan,
        changed: bool,
    ) -> Result<ScanEpoch, DispatchError> {
        self.meta_surface.apply(plan.phase_map())?;
        let epoch = self.mems.apply(plan.trajectory())?;
        if changed {
            self.loaded = Some((plan.phase_map().clone(), plan.trajectory().clone()));
        }
        Ok(epoch)
    }

    /// Bounded join on mirror lock and meta-surface settling
    fn await_settled(
        &mut self,
        clock: &dyn TimeProvider,
        settle: SettlePolicy,
        safety: &SafetyCell,
        already_dark: bool,
    ) -> Result<u64, DispatchError> {
        let start = clock.get_time_us();
        let timeout_us = settle.timeout.as_micros() as u64;
        let poll_us = (settle.poll.as_micros() as u64).max(1);
        let mut blanked = already_dark;

        loop {
            let mirror_ready = self.mems.is_settled();
            let surface_ready = self.meta_surface.poll_settled() == SettleStatus::Settled;
            let waited_us = clock.get_time_us().saturating_sub(start);
            if mirror_ready && surface_ready {
                if waited_us > 0 {
                    debug!("[DISPATCH] Settled after {} us", waited_us);
                }
                return Ok(waited_us);
            }

            let state = safety.state();
            if !state.permits_dispatch() {
                return Err(DispatchError::Aborted(state));
            }
            if waited_us >= timeout_us {
                let controller = if surface_ready {
                    ControllerKind::Mems
                } else {
                    ControllerKind::MetaSurface
                };
                warn!(
                    "[DISPATCH] {} not settled after {} us; blanking frame",
                    controller, waited_us
                );
                return Err(DispatchError::SettleTimeout {
                    controller,
                    waited_us,
                });
            }

            if !blanked {
                self.go_dark(clock.get_time_us());
                blanked = true;
            }
            clock.delay_us(poll_us);
        }
    }

    fn go_dark(&mut self, now_us: u64) {
        if let Err(err) = self.laser.force_zero(now_us) {
            // Kill switch engaged or device fault; either way nothing to add here
            debug!("[DISPATCH] Laser force-zero: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_slot_aligns_to_dwell() {
        assert_eq!(next_slot_us(1_000, 4, 900), 1_000);
        assert_eq!(next_slot_us(1_000, 4, 1_000), 1_000);
        assert_eq!(next_slot_us(1_000, 4, 1_001), 1_004);
        assert_eq!(next_slot_us(1_000, 4, 1_008), 1_008);
        assert_eq!(next_slot_us(1_000, 0, 1_003), 1_003);
    }
}
