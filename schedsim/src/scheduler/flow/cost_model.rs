/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Arc costs for the flow network.

use crate::config::FlowConfig;
use crate::task::Task;

/// Cost hooks, one per arc type that carries a non-trivial cost.
pub trait CostModel: Send {
    /// Task → unscheduled overflow.
    fn task_to_unscheduled(&self, task: &Task) -> i64;

    /// Cluster aggregator → machine.
    fn aggregator_to_machine(&self, running_on_machine: usize) -> i64;

    /// Machine → one of its processing units.
    fn machine_to_unit(&self, unit: usize, running_on_unit: usize) -> i64;

    /// Processing unit → sink.
    fn unit_to_sink(&self, unit: usize) -> i64;
}

/// Load-spreading costs.
///
/// `busy_unit_offset` is large enough that the core id only breaks ties
/// among equally loaded units.
#[derive(Debug, Clone)]
pub struct LoadSpreadingCostModel {
    busy_unit_offset: i64,
    unscheduled_cost: i64,
}

impl LoadSpreadingCostModel {
    pub fn new(config: &FlowConfig) -> Self {
        Self {
            busy_unit_offset: config.busy_unit_offset,
            unscheduled_cost: config.unscheduled_cost,
        }
    }
}

impl CostModel for LoadSpreadingCostModel {
    fn task_to_unscheduled(&self, _task: &Task) -> i64 {
        self.unscheduled_cost
    }

    fn aggregator_to_machine(&self, running_on_machine: usize) -> i64 {
        running_on_machine as i64 * self.busy_unit_offset
    }

    fn machine_to_unit(&self, unit: usize, running_on_unit: usize) -> i64 {
        unit as i64 + running_on_unit as i64 * self.busy_unit_offset
    }

    fn unit_to_sink(&self, _unit: usize) -> i64 {
        0
    }
}
