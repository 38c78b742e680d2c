/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Task records.
//!
//! A [`Task`] is created once when the workload is loaded and is never
//! mutated afterwards.  Everything that changes during a run (where the task
//! is placed, how often it was retried, which pool it belongs to) lives on
//! the [`Machine`](crate::machine::Machine), the driver, or inside a
//! scheduler, keyed by [`TaskId`].

use serde::{Deserialize, Serialize};

use crate::resources::{Dimension, ResourceVector};

// ── Identity ──────────────────────────────────────────────────────────────────

/// Unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── SLO sensitivity ───────────────────────────────────────────────────────────

/// Latency sensitivity class.
///
/// `High` tasks are never chosen as eviction victims and are ordered ahead
/// of `Low` tasks when a scheduler interleaves the two classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SloClass {
    High,
    #[default]
    Low,
}

// ── Task ──────────────────────────────────────────────────────────────────────

/// One resource-consuming unit of work.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Requested amount per dimension.
    #[serde(default)]
    pub demand: ResourceVector,
    /// Fairness / credit unit.
    #[serde(default)]
    pub tenant: String,
    /// Submission time in simulated seconds.
    #[serde(default)]
    pub arrival: f64,
    /// Runtime in simulated seconds; `0` means unknown (stays resident).
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub sensitivity: SloClass,
    #[serde(default)]
    pub priority: i32,
}

impl Task {
    /// Convenience constructor for a cpu/mem task arriving at `t = 0`.
    pub fn new(id: u64, cpu: f64, mem: f64, tenant: impl Into<String>) -> Self {
        Self {
            id: TaskId(id),
            demand: ResourceVector::demand(cpu, mem),
            tenant: tenant.into(),
            ..Default::default()
        }
    }

    /// `true` when the task will produce an `END_RUNTIME` event once placed.
    pub fn has_known_duration(&self) -> bool {
        self.duration > 0.0
    }

    pub fn is_high_sensitivity(&self) -> bool {
        self.sensitivity == SloClass::High
    }

    /// First dimension whose demand is negative or not finite.
    pub fn invalid_demand(&self) -> Option<Dimension> {
        self.demand.invalid_demand_dim()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
