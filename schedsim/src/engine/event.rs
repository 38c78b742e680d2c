/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Event records.

use std::cmp::Ordering;

use crate::machine::MachineId;
use crate::task::TaskId;

/// Total ordering key: timestamp first, then push sequence.
#[derive(Debug, Clone, Copy)]
pub struct EventKey {
    pub time: f64,
    pub seq: u64,
}

impl PartialEq for EventKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EventKey {}

impl PartialOrd for EventKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.seq.cmp(&other.seq))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Submit,
    EndRuntime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// The task becomes eligible for scheduling.
    Submit(TaskId),
    /// The task's runtime is over.  `epoch` identifies the placement that
    /// scheduled this event; a task that was evicted or re-placed since then
    /// carries a newer epoch and the event is ignored.
    EndRuntime {
        task: TaskId,
        machine: MachineId,
        epoch: u64,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Submit(_) => EventKind::Submit,
            EventPayload::EndRuntime { .. } => EventKind::EndRuntime,
        }
    }

    pub fn task(&self) -> TaskId {
        match self {
            EventPayload::Submit(task) | EventPayload::EndRuntime { task, .. } => *task,
        }
    }
}

/// A popped event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub time: f64,
    pub seq: u64,
    pub payload: EventPayload,
}

impl Event {
    pub fn key(&self) -> EventKey {
        EventKey {
            time: self.time,
            seq: self.seq,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}
