// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Holowatch Frame Engine
//!
//! The fixed-rate frame loop and the safety watchdog that runs beside it.
//!
//! ## Architecture
//!
//! ```text
//! content source ──push──▶ TargetQueue (latest wins)
//!                               │ take
//!                               ▼
//! ┌──────────────────────── FrameScheduler::run_cycle ─────────────────────────┐
//! │ safety state? ─▶ optimize ─▶ ActuatorSet::dispatch ─▶ telemetry ─▶ observe │
//! └──────────────────────────────────┬─────────────────────────────────────────┘
//!          FrameLoopRunner thread    │ kick
//!                                    ▼
//!                              SafetyManager ◀── SafetyWatchdog (own thread)
//! ```
//!
//! The watchdog shares only the [`holowatch_state_manager::SafetyManager`] and
//! the telemetry board with the frame loop. It faults the interlock on a
//! missed heartbeat or an envelope breach without waiting for a cycle.

pub mod dispatch;
pub mod display_core;
pub mod error;
pub mod frame_loop_runner;
pub mod scheduler;
pub mod target_queue;
pub mod watchdog_runner;

pub use dispatch::{next_slot_us, ActuatorSet, DispatchOutcome, DispatchReport, SettlePolicy};
pub use display_core::{DeviceSet, DisplayCore};
pub use error::{DispatchError, FrameEngineError, Result};
pub use frame_loop_runner::FrameLoopRunner;
pub use scheduler::{CycleOutcome, FrameScheduler, PlanSource, StatusReport};
pub use target_queue::TargetQueue;
pub use watchdog_runner::{SafetyWatchdog, WatchdogRunner};
