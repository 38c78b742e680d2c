/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Scheduler plugin contract and the four algorithms that implement it.
//!
//! Every algorithm is a [`Scheduler`]: once per tick the driver hands it the
//! pending tasks and a read-only view of the machines, and gets back a
//! [`SchedulePlan`].  The plan is a *request*; the driver re-validates every
//! placement against the committed machine state before reserving anything.
//!
//! | Kind | Module | State carried across ticks |
//! |---|---|---|
//! | `drf` | [`drf`] | per-tenant allocated totals |
//! | `tetris` | [`tetris`] | none |
//! | `flow` | [`flow`] | task → processing unit map |
//! | `admission` | [`admission`] | credits, risk EMAs, controller, bandit |
//!
//! Schedulers never mutate [`Machine`]s.  Each one works on a scratch copy
//! ([`ScratchMachine`]) so that several placements in the same tick see
//! each other's reservations.

pub mod admission;
pub mod drf;
pub mod error;
pub mod flow;
pub mod tetris;

pub use error::SchedulerError;

use std::str::FromStr;

use crate::config::{ConfigError, SimulationConfig};
use crate::machine::{Machine, MachineId};
use crate::resources::{Dimension, ResourceVector, ResourceView};
use crate::task::{Task, TaskId};

// ── Plan ──────────────────────────────────────────────────────────────────────

/// Request to reserve `task` on `machine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub task: TaskId,
    pub machine: MachineId,
}

/// Request to stop a running task and return it to the pending queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    pub task: TaskId,
    pub machine: MachineId,
}

/// Request to move a running task between machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub task: TaskId,
    pub from: MachineId,
    pub to: MachineId,
}

/// Output of one scheduling pass.
///
/// The driver applies evictions first, then placements, then migrations.
/// Pending tasks that appear in neither `placements` nor `rejected` stay
/// pending for the next tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulePlan {
    pub placements: Vec<Placement>,
    /// Tasks the algorithm gave up on; the driver's retry policy decides
    /// whether they come back.
    pub rejected: Vec<TaskId>,
    pub evictions: Vec<Eviction>,
    pub migrations: Vec<Migration>,
}

// ── Contract ──────────────────────────────────────────────────────────────────

pub trait Scheduler: Send {
    /// Short, stable identifier used in logs and reports.
    fn name(&self) -> &'static str;

    /// Decide placements for `pending` against the current `machines`.
    ///
    /// May update the scheduler's own state but must not assume any of the
    /// returned requests will be committed.
    fn schedule(
        &mut self,
        pending: &[Task],
        machines: &[Machine],
    ) -> Result<SchedulePlan, SchedulerError>;

    /// Called when a task's `END_RUNTIME` event fires, when the driver
    /// evicts it, and when a requested placement fails re-validation.
    /// Calling it twice for the same task is a no-op.
    fn on_task_completed(&mut self, _task: TaskId) {}
}

// ── Scratch occupancy ─────────────────────────────────────────────────────────

/// Per-tick working copy of one machine's counters.
#[derive(Debug, Clone, PartialEq)]
pub struct ScratchMachine {
    pub id: MachineId,
    pub capacity: ResourceVector,
    pub used: ResourceVector,
}

impl ScratchMachine {
    pub fn commit(&mut self, demand: &ResourceVector) {
        self.used = self.used.plus(demand).clamped_to(&self.capacity);
    }

    pub fn uncommit(&mut self, demand: &ResourceVector) {
        self.used = self.used.minus_floored(demand);
    }

    /// `Σ cpu_free + mem_free`, the slack measure used by first-fit-by-slack.
    pub fn primary_slack(&self) -> f64 {
        self.free(Dimension::Cpu) + self.free(Dimension::Mem)
    }
}

impl ResourceView for ScratchMachine {
    fn capacity(&self, dim: Dimension) -> f64 {
        self.capacity.get(dim)
    }

    fn used(&self, dim: Dimension) -> f64 {
        self.used.get(dim)
    }
}

/// Snapshot `machines` into scratch copies, preserving order.
pub fn scratch_view(machines: &[Machine]) -> Vec<ScratchMachine> {
    machines
        .iter()
        .map(|m| ScratchMachine {
            id: m.id(),
            capacity: *m.capacity_vector(),
            used: *m.used_vector(),
        })
        .collect()
}

// ── Factory ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedulerKind {
    Drf,
    Tetris,
    Flow,
    Admission,
}

impl SchedulerKind {
    pub const ALL: [SchedulerKind; 4] = [
        SchedulerKind::Drf,
        SchedulerKind::Tetris,
        SchedulerKind::Flow,
        SchedulerKind::Admission,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SchedulerKind::Drf => "drf",
            SchedulerKind::Tetris => "tetris",
            SchedulerKind::Flow => "flow",
            SchedulerKind::Admission => "admission",
        }
    }

    /// Instantiate the scheduler with its section of `config`.
    pub fn build(self, config: &SimulationConfig) -> Box<dyn Scheduler> {
        match self {
            SchedulerKind::Drf => Box::new(drf::DrfAllocator::new(config.drf.clone())),
            SchedulerKind::Tetris => Box::new(tetris::TetrisScheduler::new(config.tetris.clone())),
            SchedulerKind::Flow => Box::new(flow::FlowScheduler::new(
                config.flow.clone(),
                config.cluster.processing_units,
            )),
            SchedulerKind::Admission => Box::new(admission::RiskAwareScheduler::new(
                config.admission.clone(),
                config.simulation.seed,
            )),
        }
    }
}

impl std::fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "drf" | "mesos" => Ok(SchedulerKind::Drf),
            "tetris" => Ok(SchedulerKind::Tetris),
            "flow" | "firmament" => Ok(SchedulerKind::Flow),
            "admission" | "risk" => Ok(SchedulerKind::Admission),
            _ => Err(ConfigError::UnknownScheduler(s.to_string())),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
