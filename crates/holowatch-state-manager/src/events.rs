// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Safety event journal
//!
//! Bounded in-memory history of transitions, faults, warnings and rejected
//! commands. Subscribers get a copy of every event over a bounded channel;
//! a full or disconnected subscriber never blocks the recorder.

use std::collections::VecDeque;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use holowatch_structures::{FaultCause, SafetyState};
use parking_lot::Mutex;
use serde::Serialize;

/// Envelope quantity tracked for warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyQuantity {
    LaserPower,
    ChannelPower,
    JunctionTemperature,
    MetaSurfaceTemperature,
    MemsPositionError,
}

impl SafetyQuantity {
    pub const ALL: [SafetyQuantity; 5] = [
        SafetyQuantity::LaserPower,
        SafetyQuantity::ChannelPower,
        SafetyQuantity::JunctionTemperature,
        SafetyQuantity::MetaSurfaceTemperature,
        SafetyQuantity::MemsPositionError,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SafetyEventKind {
    Transition { from: SafetyState, to: SafetyState },
    Warning { quantity: SafetyQuantity, value: f64, limit: f64 },
    Recovered { quantity: SafetyQuantity, value: f64 },
    CommandRejected { command: &'static str, state: SafetyState },
    FaultAcknowledged,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SafetyEvent {
    pub timestamp_us: u64,
    #[serde(flatten)]
    pub kind: SafetyEventKind,
    pub cause: Option<FaultCause>,
}

#[derive(Debug)]
pub struct EventJournal {
    capacity: usize,
    events: Mutex<VecDeque<SafetyEvent>>,
    subscribers: Mutex<Vec<Sender<SafetyEvent>>>,
}

impl EventJournal {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self, event: SafetyEvent) {
        {
            let mut events = self.events.lock();
            if events.len() == self.capacity {
                events.pop_front();
            }
            events.push_back(event);
        }

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| !matches!(tx.try_send(event), Err(TrySendError::Disconnected(_))));
    }

    /// Receive every event recorded from now on; events beyond `buffer` unread are dropped
    pub fn subscribe(&self, buffer: usize) -> Receiver<SafetyEvent> {
        let (tx, rx) = channel::bounded(buffer.max(1));
        self.subscribers.lock().push(tx);
        rx
    }

    /// Oldest first
    pub fn events(&self) -> Vec<SafetyEvent> {
        self.events.lock().iter().copied().collect()
    }

    /// The `n` most recent events, oldest first
    pub fn recent(&self, n: usize) -> Vec<SafetyEvent> {
        let events = self.events.lock();
        let skip = events.len().saturating_sub(n);
        events.iter().skip(skip).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Every transition recorded, in order
    pub fn transitions(&self) -> Vec<(SafetyState, SafetyState)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e.kind {
                SafetyEventKind::Transition { from, to } => Some((from, to)),
                _ => None,
            })
            .collect()
    }
}

impl Default for EventJournal {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(ts: u64, from: SafetyState, to: SafetyState) -> SafetyEvent {
        SafetyEvent {
            timestamp_us: ts,
            kind: SafetyEventKind::Transition { from, to },
            cause: None,
        }
    }

    #[test]
    fn test_journal_is_bounded() {
        let journal = EventJournal::new(3);
        for ts in 0..5 {
            journal.record(transition(ts, SafetyState::Idle, SafetyState::Armed));
        }
        let events = journal.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].timestamp_us, 2);
        assert_eq!(journal.recent(1)[0].timestamp_us, 4);
    }

    #[test]
    fn test_subscriber_receives_events() {
        let journal = EventJournal::new(8);
        let rx = journal.subscribe(4);
        journal.record(transition(1, SafetyState::Idle, SafetyState::Armed));
        assert_eq!(rx.try_recv().unwrap().timestamp_us, 1);
    }

    #[test]
    fn test_full_or_dropped_subscriber_never_blocks() {
        let journal = EventJournal::new(8);
        let slow = journal.subscribe(1);
        let gone = journal.subscribe(1);
        drop(gone);

        for ts in 0..4 {
            journal.record(transition(ts, SafetyState::Armed, SafetyState::Projecting));
        }

        assert_eq!(journal.len(), 4);
        assert_eq!(slow.try_recv().unwrap().timestamp_us, 0);
        assert_eq!(journal.subscribers.lock().len(), 1);
    }

    #[test]
    fn test_event_serializes_flat() {
        let event = SafetyEvent {
            timestamp_us: 5,
            kind: SafetyEventKind::Transition {
                from: SafetyState::Armed,
                to: SafetyState::Fault,
            },
            cause: Some(FaultCause::OperatorStop),
        };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["event"], "transition");
        assert_eq!(json["to"], "Fault");
        assert_eq!(json["cause"]["kind"], "operator_stop");
    }
}
