/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Min-cost max-flow network scheduler.
//!
//! Every tick the scheduler rebuilds a layered network from live state and
//! solves it:
//!
//! ```text
//!              ┌──────────────► Unscheduled ─────────────────────┐
//!              │ (unscheduled_cost)                              │
//!  Task (+1) ──┤                                                 ▼
//!              │          ┌► Machine 0 ─┬► PU 0 ──► ... ──►   Sink (−#tasks)
//!              └► Cluster ┤             └► PU 15 ─────────────►  ▲
//!                 agg.    └► Machine 1 ─┬► PU 0 ──────────────►  │
//!                                       └► ...                 ──┘
//! ```
//!
//! | Arc | Capacity | Cost |
//! |---|---|---|
//! | task → unscheduled | 1 | `unscheduled_cost` |
//! | task → aggregator | #units | 0 |
//! | aggregator → machine | #units | `running_on_machine × offset` |
//! | machine → unit | 1 | `unit + running_on_unit × offset` |
//! | unit → sink | 1 | 0 |
//!
//! Placements are read back by decomposing the solved flow: each task node
//! follows positive-flow arcs (consuming one unit of flow per hop) until it
//! reaches a processing unit or the overflow node.
//!
//! The network only counts slots, not resources, so each routed task is
//! checked against a scratch copy of the machine and deferred if it would
//! overflow.

pub mod cost_model;
pub mod graph;
pub mod solver;

pub use cost_model::{CostModel, LoadSpreadingCostModel};
pub use graph::{FlowGraph, NodeId, NodeKind};
pub use solver::SolverError;

use std::collections::BTreeMap;

use tracing::{debug, trace, warn};

use super::{scratch_view, Placement, SchedulePlan, Scheduler, SchedulerError};
use crate::config::FlowConfig;
use crate::machine::{Machine, MachineId};
use crate::resources::ResourceView;
use crate::task::{Task, TaskId};

/// A network built for one tick, plus the task node of each pending task.
pub struct TickNetwork {
    pub graph: FlowGraph,
    pub task_nodes: Vec<(TaskId, NodeId)>,
}

pub struct FlowScheduler {
    processing_units: usize,
    cost_model: Box<dyn CostModel>,
    /// Unit held by every task this scheduler placed and still believes live.
    assignments: BTreeMap<TaskId, (MachineId, usize)>,
}

impl FlowScheduler {
    pub fn new(config: FlowConfig, processing_units: usize) -> Self {
        Self::with_cost_model(processing_units, Box::new(LoadSpreadingCostModel::new(&config)))
    }

    pub fn with_cost_model(processing_units: usize, cost_model: Box<dyn CostModel>) -> Self {
        Self {
            processing_units,
            cost_model,
            assignments: BTreeMap::new(),
        }
    }

    /// Tasks currently tracked as occupying a processing unit.
    pub fn tracked_tasks(&self) -> usize {
        self.assignments.len()
    }

    /// Drop assignments whose reservation no longer exists.
    fn prune(&mut self, machines: &[Machine]) {
        self.assignments.retain(|task, (machine, _)| {
            machines.get(*machine).is_some_and(|m| m.holds(*task))
        });
    }

    fn unit_occupancy(&self, machines: &[Machine]) -> Vec<Vec<usize>> {
        let mut occupancy = vec![vec![0usize; self.processing_units]; machines.len()];
        for (machine, unit) in self.assignments.values() {
            if let Some(slot) = occupancy.get_mut(*machine).and_then(|m| m.get_mut(*unit)) {
                *slot += 1;
            }
        }
        occupancy
    }

    /// Build the layered network for `pending` against `machines`.
    ///
    /// Machines that cannot fit any pending task are left out.
    pub fn build_network(&self, pending: &[Task], machines: &[Machine]) -> TickNetwork {
        let units = self.processing_units as i64;
        let tasks = pending.len() as i64;
        let occupancy = self.unit_occupancy(machines);

        let mut graph = FlowGraph::new();
        let sink = graph.add_node(NodeKind::Sink, -tasks);
        let unscheduled = graph.add_node(NodeKind::Unscheduled, 0);
        graph.add_arc(unscheduled, sink, tasks, 0);
        let aggregator = graph.add_node(NodeKind::ClusterAggregator, 0);

        for (idx, machine) in machines.iter().enumerate() {
            if !pending.iter().any(|t| machine.fits(&t.demand)) {
                continue;
            }
            let node = graph.add_node(NodeKind::Machine(idx), 0);
            graph.add_arc(
                aggregator,
                node,
                units,
                self.cost_model.aggregator_to_machine(machine.task_count()),
            );
            for unit in 0..self.processing_units {
                let pu = graph.add_node(NodeKind::ProcessingUnit { machine: idx, unit }, 0);
                graph.add_arc(
                    node,
                    pu,
                    1,
                    self.cost_model.machine_to_unit(unit, occupancy[idx][unit]),
                );
                graph.add_arc(pu, sink, 1, self.cost_model.unit_to_sink(unit));
            }
        }

        let mut task_nodes = Vec::with_capacity(pending.len());
        for task in pending {
            let node = graph.add_node(NodeKind::Task(task.id), 1);
            graph.add_arc(node, unscheduled, 1, self.cost_model.task_to_unscheduled(task));
            graph.add_arc(node, aggregator, units, 0);
            task_nodes.push((task.id, node));
        }

        TickNetwork { graph, task_nodes }
    }
}

/// Walk one unit of flow out of every task node.
///
/// Returns, per task, the `(machine, unit)` it reached, or `None` if its
/// flow went to the overflow node.
pub fn decompose(network: &TickNetwork) -> Vec<(TaskId, Option<(MachineId, usize)>)> {
    let graph = &network.graph;
    let mut remaining: Vec<i64> = graph.arcs().iter().map(|a| a.flow).collect();
    let mut out = Vec::with_capacity(network.task_nodes.len());

    for &(task, start) in &network.task_nodes {
        let mut current = start;
        let mut reached = None;
        loop {
            let next = graph
                .outgoing(current)
                .iter()
                .copied()
                .find(|&a| remaining[a] > 0);
            let Some(arc) = next else {
                break;
            };
            remaining[arc] -= 1;
            current = graph.arc(arc).dst;
            match graph.node(current).kind {
                NodeKind::ProcessingUnit { machine, unit } => {
                    reached = Some((machine, unit));
                    break;
                }
                NodeKind::Unscheduled | NodeKind::Sink => break,
                _ => {}
            }
        }
        out.push((task, reached));
    }
    out
}

impl Scheduler for FlowScheduler {
    fn name(&self) -> &'static str {
        "flow"
    }

    fn schedule(
        &mut self,
        pending: &[Task],
        machines: &[Machine],
    ) -> Result<SchedulePlan, SchedulerError> {
        if machines.is_empty() {
            return Err(SchedulerError::NoMachines);
        }
        self.prune(machines);

        let mut network = self.build_network(pending, machines);
        debug!(
            nodes = network.graph.node_count(),
            arcs = network.graph.arc_count(),
            tasks = pending.len(),
            "flow network built"
        );

        match solver::solve(&mut network.graph) {
            Ok(cost) => trace!(cost = cost, "flow network solved"),
            Err(e @ SolverError::Infeasible { .. }) => {
                warn!(error = %e, "flow solver infeasible, no placements this tick");
                return Ok(SchedulePlan::default());
            }
            Err(e) => return Err(e.into()),
        }

        let by_id: BTreeMap<TaskId, &Task> = pending.iter().map(|t| (t.id, t)).collect();
        let mut scratch = scratch_view(machines);
        let mut plan = SchedulePlan::default();

        for (task_id, reached) in decompose(&network) {
            let Some((machine, unit)) = reached else {
                continue;
            };
            let task = by_id
                .get(&task_id)
                .ok_or_else(|| SchedulerError::Internal(format!("task {task_id} missing from pending set")))?;
            let slot = scratch
                .get_mut(machine)
                .ok_or(SchedulerError::UnknownMachine { task: task_id, machine })?;
            if !slot.fits(&task.demand) {
                trace!(task = %task_id, machine = machine, "routed machine lacks capacity, deferring");
                continue;
            }
            slot.commit(&task.demand);
            self.assignments.insert(task_id, (machine, unit));
            plan.placements.push(Placement {
                task: task_id,
                machine,
            });
        }

        debug!(
            placed = plan.placements.len(),
            deferred = pending.len() - plan.placements.len(),
            "flow round complete"
        );
        Ok(plan)
    }

    fn on_task_completed(&mut self, task: TaskId) {
        self.assignments.remove(&task);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::Reservation;
    use crate::resources::ResourceVector;
    use std::collections::HashSet;

    fn scheduler(units: usize) -> FlowScheduler {
        FlowScheduler::new(FlowConfig::default(), units)
    }

    fn small_tasks(n: u64) -> Vec<Task> {
        (0..n).map(|i| Task::new(i, 0.1, 0.1, "a")).collect()
    }

    /// Commit a plan the way the driver would.
    fn commit(machines: &mut [Machine], pending: &[Task], plan: &SchedulePlan) {
        for p in &plan.placements {
            let task = pending.iter().find(|t| t.id == p.task).unwrap();
            machines[p.machine]
                .reserve(Reservation::for_task(task, 0.0, 0))
                .unwrap();
        }
    }

    // ── Network shape ─────────────────────────────────────────────────────────

    #[test]
    fn network_has_expected_size() {
        let machines = Machine::pool(2, ResourceVector::capacity(4.0, 4.0));
        let s = scheduler(4);
        let net = s.build_network(&small_tasks(3), &machines);
        // sink + unscheduled + aggregator + 2 × (machine + 4 units) + 3 tasks
        assert_eq!(net.graph.node_count(), 3 + 2 * 5 + 3);
        // overflow→sink + 2 × (agg→m + 4 × (m→u + u→sink)) + 3 × 2
        assert_eq!(net.graph.arc_count(), 1 + 2 * (1 + 8) + 6);
    }

    #[test]
    fn solved_network_conserves_flow() {
        let machines = Machine::pool(3, ResourceVector::capacity(11.0, 11.0));
        let s = scheduler(16);
        let mut net = s.build_network(&small_tasks(20), &machines);
        solver::solve(&mut net.graph).unwrap();
        net.graph.check_conservation().unwrap();
        let to_units = decompose(&net).iter().filter(|(_, r)| r.is_some()).count();
        assert_eq!(to_units, 20);
    }

    #[test]
    fn full_machines_are_left_out() {
        let mut machines = Machine::pool(2, ResourceVector::capacity(1.0, 1.0));
        machines[0]
            .reserve(Reservation::for_task(&Task::new(99, 1.0, 1.0, "x"), 0.0, 0))
            .unwrap();
        let net = scheduler(2).build_network(&small_tasks(1), &machines);
        let machine_nodes: Vec<_> = net
            .graph
            .nodes()
            .iter()
            .filter_map(|n| match n.kind {
                NodeKind::Machine(m) => Some(m),
                _ => None,
            })
            .collect();
        assert_eq!(machine_nodes, vec![1]);
    }

    // ── Scheduling ────────────────────────────────────────────────────────────

    #[test]
    fn spreads_load_across_machines() {
        let machines = Machine::pool(3, ResourceVector::capacity(11.0, 11.0));
        let mut s = scheduler(16);
        let tasks = small_tasks(3);
        let plan = s.schedule(&tasks, &machines).unwrap();
        let used: HashSet<_> = plan.placements.iter().map(|p| p.machine).collect();
        assert_eq!(used.len(), 3, "three idle machines, three tasks");
    }

    #[test]
    fn at_most_one_task_per_unit_per_tick() {
        let machines = Machine::pool(1, ResourceVector::capacity(100.0, 100.0));
        let mut s = scheduler(4);
        let plan = s.schedule(&small_tasks(10), &machines).unwrap();
        assert_eq!(plan.placements.len(), 4);
        assert!(plan.rejected.is_empty());
    }

    #[test]
    fn capacity_post_check_defers_overflowing_tasks() {
        let machines = Machine::pool(1, ResourceVector::capacity(1.0, 1.0));
        let tasks = vec![Task::new(1, 0.6, 0.1, "a"), Task::new(2, 0.6, 0.1, "a")];
        let mut s = scheduler(16);
        let plan = s.schedule(&tasks, &machines).unwrap();
        assert_eq!(plan.placements.len(), 1);
        assert_eq!(s.tracked_tasks(), 1);
    }

    #[test]
    fn reference_tasks_all_fit() {
        let machines = Machine::pool(3, ResourceVector::capacity(11.0, 11.0));
        let tasks = vec![
            Task::new(1, 1.0, 1.0, "a"),
            Task::new(2, 2.0, 1.5, "a"),
            Task::new(3, 3.0, 3.0, "b"),
            Task::new(4, 0.5, 0.5, "b"),
            Task::new(5, 4.0, 4.0, "c"),
        ];
        let mut s = scheduler(16);
        let plan = s.schedule(&tasks, &machines).unwrap();
        assert_eq!(plan.placements.len(), 5);
    }

    #[test]
    fn busy_units_are_avoided_on_the_next_tick() {
        let mut machines = Machine::pool(1, ResourceVector::capacity(100.0, 100.0));
        let mut s = scheduler(2);
        let first = small_tasks(1);
        let plan = s.schedule(&first, &machines).unwrap();
        commit(&mut machines, &first, &plan);
        assert_eq!(s.assignments[&TaskId(0)], (0, 0));

        let second = vec![Task::new(1, 0.1, 0.1, "a")];
        s.schedule(&second, &machines).unwrap();
        assert_eq!(s.assignments[&TaskId(1)], (0, 1));
    }

    // ── Completion ────────────────────────────────────────────────────────────

    #[test]
    fn completion_forgets_task_and_is_idempotent() {
        let mut machines = Machine::pool(1, ResourceVector::capacity(10.0, 10.0));
        let mut s = scheduler(4);
        let tasks = small_tasks(2);
        let plan = s.schedule(&tasks, &machines).unwrap();
        commit(&mut machines, &tasks, &plan);
        assert_eq!(s.tracked_tasks(), 2);

        s.on_task_completed(TaskId(0));
        assert_eq!(s.tracked_tasks(), 1);
        s.on_task_completed(TaskId(0));
        assert_eq!(s.tracked_tasks(), 1);
    }

    #[test]
    fn uncommitted_placements_are_pruned() {
        let machines = Machine::pool(1, ResourceVector::capacity(10.0, 10.0));
        let mut s = scheduler(4);
        s.schedule(&small_tasks(2), &machines).unwrap();
        assert_eq!(s.tracked_tasks(), 2);
        // nothing was committed, so the next tick starts clean
        s.schedule(&[], &machines).unwrap();
        assert_eq!(s.tracked_tasks(), 0);
    }

    // ── Faults ────────────────────────────────────────────────────────────────

    struct BrokenCosts;

    impl CostModel for BrokenCosts {
        fn task_to_unscheduled(&self, _task: &Task) -> i64 {
            -1
        }
        fn aggregator_to_machine(&self, _running: usize) -> i64 {
            0
        }
        fn machine_to_unit(&self, _unit: usize, _running: usize) -> i64 {
            0
        }
        fn unit_to_sink(&self, _unit: usize) -> i64 {
            0
        }
    }

    #[test]
    fn solver_fault_surfaces_as_scheduler_error() {
        let machines = Machine::pool(1, ResourceVector::capacity(10.0, 10.0));
        let mut s = FlowScheduler::with_cost_model(2, Box::new(BrokenCosts));
        let err = s.schedule(&small_tasks(1), &machines).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Solver(SolverError::NegativeCost { .. })
        ));
    }
}
