/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for scheduler plugins.
//!
//! A [`SchedulerError`] never aborts a simulation.  The driver logs it and
//! treats the tick as "zero placements", exactly like a caught panic.  The
//! variants exist so that log lines say *which* layer failed.

use thiserror::Error;

use super::flow::SolverError;
use crate::machine::MachineId;
use crate::task::TaskId;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The min-cost flow solver could not route every unit of supply.
    #[error("flow network could not be solved: {0}")]
    Solver(#[from] SolverError),

    /// The cluster handed to the scheduler is empty.
    #[error("no machines available to schedule onto")]
    NoMachines,

    /// A machine id read back from internal state is not part of the pool.
    #[error("task {task} resolved to unknown machine {machine}")]
    UnknownMachine { task: TaskId, machine: MachineId },

    /// Anything else that indicates a bug in the plugin's bookkeeping.
    #[error("internal scheduler fault: {0}")]
    Internal(String),
}
