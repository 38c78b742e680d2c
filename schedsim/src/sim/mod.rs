/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Simulation driver.
//!
//! Ties one [`Scheduler`] to the [`EventQueue`] and the machine pool and
//! advances simulated time in fixed batch steps:
//!
//! ```text
//!  ┌────────────────────── tick += batch_step ◄──────────────────────┐
//!  ▼                                                                 │
//! sample prior state ─► drain events ≤ tick ─► schedule pending ─► apply plan
//!                       (END_RUNTIME releases,   (catch_unwind)     evictions
//!                        SUBMIT queues)                             placements
//!                                                                   migrations
//! ```
//!
//! The driver is the only code that calls [`Machine::reserve`] and
//! [`Machine::release`].  Every placement a scheduler returns is re-checked
//! against the committed state first.
//!
//! Each committed placement receives a fresh epoch; an `END_RUNTIME` event
//! whose epoch no longer matches the task's current placement is stale (the
//! task was evicted and placed again) and is dropped.

pub mod sampler;

pub use sampler::{TimeWeightedAverages, UtilizationIntegral};

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::config::{ConfigError, SimulationConfig};
use crate::engine::{EventPayload, EventQueue};
use crate::machine::{Machine, MachineId, Reservation};
use crate::metrics::{cluster_utilization, UtilizationStats};
use crate::resources::{Dimension, ResourceView};
use crate::scheduler::{
    scratch_view, Eviction, Migration, Placement, SchedulePlan, Scheduler, SchedulerKind,
};
use crate::task::{Task, TaskId};

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("task {0} appears more than once in the workload")]
    DuplicateTask(TaskId),

    #[error("task {task} has a negative or non-finite {dimension} demand")]
    InvalidDemand { task: TaskId, dimension: Dimension },
}

// ── Report ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacementRecord {
    pub time: f64,
    pub task: TaskId,
    pub machine: MachineId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineUsage {
    pub id: MachineId,
    pub cpu_used: f64,
    pub mem_used: f64,
    pub utilization: f64,
    pub tasks: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub scheduler: String,
    pub total_tasks: usize,
    /// Tasks running or completed at the end of the run.
    pub scheduled: usize,
    pub failed: usize,
    /// Tasks still waiting when a round or time guard stopped the run.
    pub unfinished: usize,
    pub preempted: u64,
    pub migrated: u64,
    pub success_rate: f64,
    pub rounds: u64,
    pub end_time: f64,
    /// Scheduler calls that returned an error or panicked.
    pub scheduler_faults: u64,
    pub time_weighted: TimeWeightedAverages,
    pub final_state: UtilizationStats,
    pub machines: Vec<MachineUsage>,
    pub placements: Vec<PlacementRecord>,
}

// ── Task bookkeeping ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    /// Submitted or waiting for a retry; `queued` once in the pending buffer.
    Pending { queued: bool },
    Running { machine: MachineId, epoch: u64 },
    Completed,
    Failed,
}

#[derive(Debug)]
struct TaskEntry {
    task: Task,
    state: TaskState,
    rejections: u32,
}

// ── Simulation ────────────────────────────────────────────────────────────────

pub struct Simulation {
    config: SimulationConfig,
    machines: Vec<Machine>,
    entries: BTreeMap<TaskId, TaskEntry>,
    events: EventQueue,
    /// Queued tasks in submission order.
    pending: Vec<TaskId>,
    scheduler: Box<dyn Scheduler>,
    now: f64,
    rounds: u64,
    next_epoch: u64,
    /// Running tasks with an outstanding `END_RUNTIME` event.
    running_timed: usize,
    integral: UtilizationIntegral,
    placements: Vec<PlacementRecord>,
    preempted: u64,
    migrated: u64,
    scheduler_faults: u64,
}

/// Build the scheduler named by `kind` and run `tasks` to completion.
pub fn run_simulation(
    config: &SimulationConfig,
    tasks: Vec<Task>,
    kind: SchedulerKind,
) -> Result<SimulationReport, SimulationError> {
    Ok(Simulation::new(config.clone(), tasks, kind.build(config))?.run())
}

impl Simulation {
    /// Validate `config`, build the machine pool and seed one `SUBMIT`
    /// event per task at its arrival time.
    pub fn new(
        config: SimulationConfig,
        tasks: Vec<Task>,
        scheduler: Box<dyn Scheduler>,
    ) -> Result<Self, SimulationError> {
        config.validate()?;

        let mut events = EventQueue::new();
        let mut entries = BTreeMap::new();
        for task in tasks {
            if entries.contains_key(&task.id) {
                return Err(SimulationError::DuplicateTask(task.id));
            }
            if let Some(dimension) = task.invalid_demand() {
                return Err(SimulationError::InvalidDemand {
                    task: task.id,
                    dimension,
                });
            }
            events.push(task.arrival.max(0.0), EventPayload::Submit(task.id));
            entries.insert(
                task.id,
                TaskEntry {
                    task,
                    state: TaskState::Pending { queued: false },
                    rejections: 0,
                },
            );
        }

        Ok(Self {
            machines: config.build_machines(),
            entries,
            events,
            pending: Vec::new(),
            scheduler,
            now: 0.0,
            rounds: 0,
            next_epoch: 0,
            running_timed: 0,
            integral: UtilizationIntegral::new(),
            placements: Vec::new(),
            preempted: 0,
            migrated: 0,
            scheduler_faults: 0,
            config,
        })
    }

    pub fn machines(&self) -> &[Machine] {
        &self.machines
    }

    /// Run until nothing is left to do or a guard trips.
    pub fn run(mut self) -> SimulationReport {
        let step = self.config.simulation.batch_step_seconds;
        let max_rounds = self.config.simulation.max_scheduling_rounds;
        let max_time = self.config.simulation.max_sim_time;

        info!(
            scheduler = self.scheduler.name(),
            tasks = self.entries.len(),
            machines = self.machines.len(),
            batch_step = step,
            "simulation started"
        );

        let first = self.events.peek_time();
        let mut tick = if first.is_finite() { first } else { 0.0 };
        self.now = tick;

        loop {
            let in_flight = self.pending.len() + self.running_timed;
            if self
                .events
                .has_completed(self.rounds, max_rounds, tick, max_time, in_flight)
            {
                break;
            }

            // Idle skip: nothing can change before the next event.
            if self.pending.is_empty() && self.running_timed == 0 {
                let next = self.events.peek_time();
                if next.is_finite() && next > tick {
                    tick = next;
                }
            }

            self.integral.add(&self.machines, tick - self.now);
            self.now = tick;
            self.drain_events();

            let progressed = self.schedule_round();
            self.rounds += 1;

            if !progressed
                && !self.pending.is_empty()
                && self.events.is_empty()
                && self.running_timed == 0
            {
                self.fail_stalled();
                break;
            }
            tick += step;
        }

        if self.rounds > 0 {
            // The state left by the last round holds for one more step.
            self.integral.add(&self.machines, step);
        }
        self.finish()
    }

    // ── Events ────────────────────────────────────────────────────────────────

    fn drain_events(&mut self) {
        while let Some(event) = self.events.pop_ready(self.now) {
            match event.payload {
                EventPayload::Submit(task) => self.on_submit(task),
                EventPayload::EndRuntime { task, epoch, .. } => self.on_end(task, epoch),
            }
        }
    }

    fn on_submit(&mut self, task: TaskId) {
        let Some(entry) = self.entries.get_mut(&task) else {
            warn!(task = %task, "submit for unknown task");
            return;
        };
        if let TaskState::Pending { queued: false } = entry.state {
            entry.state = TaskState::Pending { queued: true };
            self.pending.push(task);
        }
    }

    fn on_end(&mut self, task: TaskId, epoch: u64) {
        let Some(entry) = self.entries.get_mut(&task) else {
            return;
        };
        let TaskState::Running { machine, epoch: current } = entry.state else {
            trace!(task = %task, "stale completion, task no longer running");
            return;
        };
        if current != epoch {
            trace!(task = %task, epoch = epoch, current = current, "stale completion");
            return;
        }
        entry.state = TaskState::Completed;
        self.running_timed = self.running_timed.saturating_sub(1);
        if let Some(m) = self.machines.get_mut(machine) {
            if let Err(e) = m.release(task) {
                warn!(task = %task, error = %e, "release on completion failed");
            }
        }
        self.scheduler.on_task_completed(task);
        trace!(task = %task, machine = machine, time = self.now, "task completed");
    }

    // ── Scheduling ────────────────────────────────────────────────────────────

    /// Invoke the scheduler on the pending buffer and apply its plan.
    /// Returns `true` when cluster state changed.
    fn schedule_round(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        let pending: Vec<Task> = self
            .pending
            .iter()
            .filter_map(|id| self.entries.get(id).map(|e| e.task.clone()))
            .collect();

        let plan = self.invoke_scheduler(&pending);

        let mut changed = false;
        let evict_on = self.eviction_targets(&plan);
        for eviction in &plan.evictions {
            if !evict_on.contains(&eviction.machine) {
                debug!(
                    task = %eviction.task,
                    machine = eviction.machine,
                    "eviction skipped, no placement on the machine would commit"
                );
                continue;
            }
            changed |= self.apply_eviction(*eviction);
        }
        for placement in &plan.placements {
            changed |= self.apply_placement(*placement);
        }
        for migration in &plan.migrations {
            changed |= self.apply_migration(*migration);
        }
        for task in &plan.rejected {
            self.apply_rejection(*task);
        }

        debug!(
            time = self.now,
            round = self.rounds,
            pending = self.pending.len(),
            placed = plan.placements.len(),
            rejected = plan.rejected.len(),
            evicted = plan.evictions.len(),
            migrated = plan.migrations.len(),
            "round complete"
        );
        changed
    }

    /// Call the scheduler; errors and panics become an empty plan.
    fn invoke_scheduler(&mut self, pending: &[Task]) -> SchedulePlan {
        let scheduler = &mut self.scheduler;
        let machines = &self.machines;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| scheduler.schedule(pending, machines)));
        match outcome {
            Ok(Ok(plan)) => plan,
            Ok(Err(e)) => {
                self.scheduler_faults += 1;
                warn!(
                    scheduler = self.scheduler.name(),
                    error = %e,
                    time = self.now,
                    "scheduler returned an error, no placements this round"
                );
                SchedulePlan::default()
            }
            Err(payload) => {
                self.scheduler_faults += 1;
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(
                    scheduler = self.scheduler.name(),
                    panic = %message,
                    time = self.now,
                    "scheduler panicked, no placements this round"
                );
                SchedulePlan::default()
            }
        }
    }

    /// Machines whose evictions may be applied.
    ///
    /// Replays the plan on a scratch copy of the cluster: evictions free
    /// capacity, then placements commit in order.  A machine the plan also
    /// places on keeps its evictions only if at least one of those
    /// placements would then commit.
    fn eviction_targets(&self, plan: &SchedulePlan) -> BTreeSet<MachineId> {
        let mut scratch = scratch_view(&self.machines);
        let mut evicted = BTreeSet::new();
        for eviction in &plan.evictions {
            let reservation = self
                .machines
                .get(eviction.machine)
                .and_then(|m| m.reservation(eviction.task));
            if let (Some(r), Some(m)) = (reservation, scratch.get_mut(eviction.machine)) {
                m.uncommit(&r.demand);
                evicted.insert(eviction.task);
            }
        }

        let mut targeted = BTreeSet::new();
        let mut committed = BTreeSet::new();
        let mut placed = BTreeSet::new();
        for placement in &plan.placements {
            let Some(m) = scratch.get_mut(placement.machine) else {
                continue;
            };
            targeted.insert(placement.machine);
            let Some(entry) = self.entries.get(&placement.task) else {
                continue;
            };
            let pending = entry.state == (TaskState::Pending { queued: true })
                || evicted.contains(&placement.task);
            if pending && !placed.contains(&placement.task) && m.fits(&entry.task.demand) {
                m.commit(&entry.task.demand);
                placed.insert(placement.task);
                committed.insert(placement.machine);
            }
        }

        plan.evictions
            .iter()
            .map(|e| e.machine)
            .filter(|m| !targeted.contains(m) || committed.contains(m))
            .collect()
    }

    fn dequeue(&mut self, task: TaskId) {
        self.pending.retain(|t| *t != task);
    }

    fn apply_placement(&mut self, placement: Placement) -> bool {
        let Placement { task, machine } = placement;
        let Some(entry) = self.entries.get_mut(&task) else {
            warn!(task = %task, "placement for unknown task ignored");
            return false;
        };
        if entry.state != (TaskState::Pending { queued: true }) {
            warn!(task = %task, state = ?entry.state, "placement for task that is not pending ignored");
            return false;
        }
        let Some(target) = self.machines.get_mut(machine) else {
            warn!(task = %task, machine = machine, "placement on unknown machine ignored");
            self.scheduler.on_task_completed(task);
            return false;
        };

        let epoch = self.next_epoch;
        let reservation = Reservation::for_task(&entry.task, self.now, epoch);
        let end = reservation.end;
        if let Err(e) = target.reserve(reservation) {
            warn!(task = %task, machine = machine, error = %e, "placement rejected on re-validation");
            self.scheduler.on_task_completed(task);
            return false;
        }

        self.next_epoch += 1;
        entry.state = TaskState::Running { machine, epoch };
        if let Some(end) = end {
            self.events.push(end, EventPayload::EndRuntime { task, machine, epoch });
            self.running_timed += 1;
        }
        self.placements.push(PlacementRecord {
            time: self.now,
            task,
            machine,
        });
        self.dequeue(task);
        trace!(task = %task, machine = machine, time = self.now, "placement committed");
        true
    }

    fn apply_eviction(&mut self, eviction: Eviction) -> bool {
        let Eviction { task, machine } = eviction;
        let Some(entry) = self.entries.get_mut(&task) else {
            return false;
        };
        let TaskState::Running { machine: current, .. } = entry.state else {
            warn!(task = %task, "eviction of task that is not running ignored");
            return false;
        };
        if current != machine {
            warn!(task = %task, machine = machine, current = current, "eviction names the wrong machine");
            return false;
        }
        let Some(host) = self.machines.get_mut(machine) else {
            return false;
        };
        match host.release(task) {
            Ok(r) => {
                if r.end.is_some() {
                    self.running_timed = self.running_timed.saturating_sub(1);
                }
            }
            Err(e) => {
                warn!(task = %task, error = %e, "eviction release failed");
                return false;
            }
        }

        entry.state = TaskState::Pending { queued: true };
        self.pending.push(task);
        self.preempted += 1;
        self.scheduler.on_task_completed(task);
        debug!(task = %task, machine = machine, time = self.now, "task evicted and requeued");
        true
    }

    fn apply_migration(&mut self, migration: Migration) -> bool {
        let Migration { task, from, to } = migration;
        let Some(entry) = self.entries.get_mut(&task) else {
            return false;
        };
        let TaskState::Running { machine, epoch } = entry.state else {
            warn!(task = %task, "migration of task that is not running ignored");
            return false;
        };
        if machine != from || from == to {
            warn!(task = %task, from = from, to = to, current = machine, "migration source mismatch");
            return false;
        }
        let Some(target) = self.machines.get(to) else {
            warn!(task = %task, machine = to, "migration to unknown machine ignored");
            return false;
        };
        if let Err(e) = target.check_fit(task, &entry.task.demand) {
            warn!(task = %task, error = %e, "migration rejected on re-validation");
            return false;
        }

        let reservation = match self.machines[from].release(task) {
            Ok(r) => r,
            Err(e) => {
                warn!(task = %task, error = %e, "migration release failed");
                return false;
            }
        };
        if let Err(e) = self.machines[to].reserve(reservation.clone()) {
            warn!(task = %task, error = %e, "migration reserve failed, restoring source");
            if let Err(e) = self.machines[from].reserve(reservation) {
                warn!(task = %task, error = %e, "could not restore reservation");
            }
            return false;
        }

        entry.state = TaskState::Running { machine: to, epoch };
        self.migrated += 1;
        debug!(task = %task, from = from, to = to, time = self.now, "task migrated");
        true
    }

    /// Apply the retry policy to a task the scheduler gave up on.
    fn apply_rejection(&mut self, task: TaskId) {
        let max_attempts = self.config.simulation.retry.max_attempts;
        let delay = self.config.simulation.retry_delay();
        let Some(entry) = self.entries.get_mut(&task) else {
            return;
        };
        if entry.state != (TaskState::Pending { queued: true }) {
            return;
        }
        entry.rejections += 1;
        if entry.rejections > max_attempts {
            entry.state = TaskState::Failed;
            debug!(task = %task, attempts = entry.rejections, "task failed");
        } else {
            entry.state = TaskState::Pending { queued: false };
            self.events.push(self.now + delay, EventPayload::Submit(task));
            trace!(task = %task, attempt = entry.rejections, "task resubmitted");
        }
        self.dequeue(task);
    }

    /// Nothing can free capacity any more; the queue is dead.
    fn fail_stalled(&mut self) {
        warn!(
            pending = self.pending.len(),
            time = self.now,
            "no running tasks and no events left, failing remaining pending tasks"
        );
        for task in std::mem::take(&mut self.pending) {
            if let Some(entry) = self.entries.get_mut(&task) {
                entry.state = TaskState::Failed;
            }
        }
    }

    // ── Report ────────────────────────────────────────────────────────────────

    fn finish(self) -> SimulationReport {
        let total = self.entries.len();
        let mut scheduled = 0;
        let mut failed = 0;
        let mut unfinished = 0;
        for entry in self.entries.values() {
            match entry.state {
                TaskState::Running { .. } | TaskState::Completed => scheduled += 1,
                TaskState::Failed => failed += 1,
                TaskState::Pending { .. } => unfinished += 1,
            }
        }
        let success_rate = if total == 0 {
            0.0
        } else {
            scheduled as f64 / total as f64
        };

        let machines = self
            .machines
            .iter()
            .map(|m| MachineUsage {
                id: m.id(),
                cpu_used: m.used(Dimension::Cpu),
                mem_used: m.used(Dimension::Mem),
                utilization: m.utilization(),
                tasks: m.task_count(),
            })
            .collect();

        let report = SimulationReport {
            scheduler: self.scheduler.name().to_string(),
            total_tasks: total,
            scheduled,
            failed,
            unfinished,
            preempted: self.preempted,
            migrated: self.migrated,
            success_rate,
            rounds: self.rounds,
            end_time: self.now,
            scheduler_faults: self.scheduler_faults,
            time_weighted: self.integral.averages(),
            final_state: cluster_utilization(&self.machines),
            machines,
            placements: self.placements,
        };

        info!(
            scheduler = %report.scheduler,
            scheduled = report.scheduled,
            failed = report.failed,
            unfinished = report.unfinished,
            rounds = report.rounds,
            end_time = report.end_time,
            avg_utilization = report.time_weighted.dominant,
            "simulation finished"
        );
        report
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{SchedulerError, SchedulePlan};

    fn config(machines: usize, cpu: f64, mem: f64) -> SimulationConfig {
        let mut cfg = SimulationConfig::default();
        cfg.cluster.machines = machines;
        cfg.cluster.capacity.cpu = cpu;
        cfg.cluster.capacity.mem = mem;
        cfg
    }

    fn timed(id: u64, cpu: f64, arrival: f64, duration: f64) -> Task {
        Task {
            arrival,
            duration,
            ..Task::new(id, cpu, 0.1, "a")
        }
    }

    /// Returns a fixed plan on its first call, then nothing.
    struct Scripted {
        plans: Vec<SchedulePlan>,
        completed: Vec<TaskId>,
    }

    impl Scheduler for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn schedule(&mut self, _: &[Task], _: &[Machine]) -> Result<SchedulePlan, SchedulerError> {
            Ok(if self.plans.is_empty() {
                SchedulePlan::default()
            } else {
                self.plans.remove(0)
            })
        }

        fn on_task_completed(&mut self, task: TaskId) {
            self.completed.push(task);
        }
    }

    struct Panicking;

    impl Scheduler for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn schedule(&mut self, _: &[Task], _: &[Machine]) -> Result<SchedulePlan, SchedulerError> {
            panic!("boom")
        }
    }

    fn place(task: u64, machine: MachineId) -> Placement {
        Placement {
            task: TaskId(task),
            machine,
        }
    }

    // ── Construction ──────────────────────────────────────────────────────────

    #[test]
    fn rejects_invalid_config_and_duplicates() {
        let tasks = vec![Task::new(1, 1.0, 1.0, "a")];
        let bad = config(0, 1.0, 1.0);
        assert!(matches!(
            Simulation::new(bad, tasks.clone(), Box::new(Panicking)),
            Err(SimulationError::Config(ConfigError::NoMachines))
        ));

        let dup = vec![Task::new(1, 1.0, 1.0, "a"), Task::new(1, 2.0, 1.0, "b")];
        assert!(matches!(
            Simulation::new(config(1, 4.0, 4.0), dup, Box::new(Panicking)),
            Err(SimulationError::DuplicateTask(TaskId(1)))
        ));
    }

    // ── Plan application ──────────────────────────────────────────────────────

    #[test]
    fn revalidation_drops_overcommitting_placement() {
        let tasks = vec![Task::new(1, 0.6, 0.1, "a"), Task::new(2, 0.6, 0.1, "a")];
        let scheduler = Scripted {
            plans: vec![SchedulePlan {
                placements: vec![place(1, 0), place(2, 0)],
                ..SchedulePlan::default()
            }],
            completed: Vec::new(),
        };
        let report = Simulation::new(config(1, 1.0, 1.0), tasks, Box::new(scheduler))
            .unwrap()
            .run();
        assert_eq!(report.scheduled, 1);
        assert_eq!(report.failed, 1);
        assert!(report.machines[0].cpu_used <= 1.0 + 1e-9);
    }

    #[test]
    fn completion_releases_and_notifies() {
        let mut sim = Simulation::new(
            config(1, 4.0, 4.0),
            vec![timed(1, 2.0, 0.0, 50.0)],
            Box::new(Scripted {
                plans: vec![SchedulePlan {
                    placements: vec![place(1, 0)],
                    ..SchedulePlan::default()
                }],
                completed: Vec::new(),
            }),
        )
        .unwrap();
        sim.drain_events();
        assert!(sim.schedule_round());
        assert_eq!(sim.machines()[0].task_count(), 1);

        sim.now = 300.0;
        sim.drain_events();
        assert!(sim.machines()[0].used_vector().is_zero());
        assert_eq!(sim.entries[&TaskId(1)].state, TaskState::Completed);
        assert_eq!(sim.running_timed, 0);
    }

    #[test]
    fn eviction_requeues_and_stale_end_is_ignored() {
        let mut sim = Simulation::new(
            config(2, 4.0, 4.0),
            vec![timed(1, 2.0, 0.0, 100.0), Task::new(2, 8.0, 0.1, "a")],
            Box::new(Scripted {
                plans: vec![
                    SchedulePlan {
                        placements: vec![place(1, 0)],
                        ..SchedulePlan::default()
                    },
                    SchedulePlan {
                        evictions: vec![Eviction {
                            task: TaskId(1),
                            machine: 0,
                        }],
                        ..SchedulePlan::default()
                    },
                ],
                completed: Vec::new(),
            }),
        )
        .unwrap();
        sim.drain_events();
        sim.schedule_round();
        assert_eq!(sim.running_timed, 1);

        // task 2 is still pending, so the scheduler runs again
        assert!(sim.schedule_round());
        assert_eq!(sim.preempted, 1);
        assert!(sim.machines()[0].used_vector().is_zero());
        assert_eq!(sim.pending, vec![TaskId(2), TaskId(1)]);
        assert_eq!(sim.running_timed, 0);

        // original END_RUNTIME at t=100 is now stale
        sim.now = 200.0;
        sim.drain_events();
        assert_eq!(sim.entries[&TaskId(1)].state, TaskState::Pending { queued: true });
    }

    fn evict_then_place(victim_cpu: f64, incoming_cpu: f64) -> Simulation {
        let mut sim = Simulation::new(
            config(1, 4.0, 4.0),
            vec![timed(1, victim_cpu, 0.0, 1000.0), Task::new(2, incoming_cpu, 0.1, "a")],
            Box::new(Scripted {
                plans: vec![
                    SchedulePlan {
                        placements: vec![place(1, 0)],
                        ..SchedulePlan::default()
                    },
                    SchedulePlan {
                        evictions: vec![Eviction {
                            task: TaskId(1),
                            machine: 0,
                        }],
                        placements: vec![place(2, 0)],
                        ..SchedulePlan::default()
                    },
                ],
                completed: Vec::new(),
            }),
        )
        .unwrap();
        sim.drain_events();
        sim.schedule_round();
        sim.schedule_round();
        sim
    }

    #[test]
    fn eviction_is_skipped_when_its_placement_cannot_commit() {
        // 8 cpu never fits a 4 cpu machine, even after the eviction
        let sim = evict_then_place(2.0, 8.0);
        assert_eq!(sim.preempted, 0);
        assert!(sim.machines()[0].holds(TaskId(1)));
        assert!(matches!(sim.entries[&TaskId(1)].state, TaskState::Running { machine: 0, .. }));
        assert_eq!(sim.pending, vec![TaskId(2)]);
    }

    #[test]
    fn eviction_makes_room_for_placement() {
        let sim = evict_then_place(2.0, 3.0);
        assert_eq!(sim.preempted, 1);
        assert!(sim.machines()[0].holds(TaskId(2)));
        assert!(!sim.machines()[0].holds(TaskId(1)));
        assert_eq!(sim.pending, vec![TaskId(1)]);
    }

    #[test]
    fn rejects_negative_and_non_finite_demand() {
        let negative = vec![Task::new(1, 1.0, 1.0, "a"), Task::new(2, -1.0, 0.1, "a")];
        assert!(matches!(
            Simulation::new(config(1, 1.0, 1.0), negative, Box::new(Panicking)),
            Err(SimulationError::InvalidDemand {
                task: TaskId(2),
                dimension: Dimension::Cpu
            })
        ));

        let nan = vec![Task::new(1, 0.5, f64::NAN, "a")];
        assert!(matches!(
            run_simulation(&config(1, 1.0, 1.0), nan, SchedulerKind::Tetris),
            Err(SimulationError::InvalidDemand {
                dimension: Dimension::Mem,
                ..
            })
        ));
    }

    #[test]
    fn migration_moves_reservation_and_keeps_end() {
        let mut sim = Simulation::new(
            config(2, 4.0, 4.0),
            vec![timed(1, 2.0, 0.0, 100.0), Task::new(2, 0.1, 0.1, "a")],
            Box::new(Scripted {
                plans: vec![SchedulePlan {
                    placements: vec![place(1, 0), place(2, 1)],
                    ..SchedulePlan::default()
                }],
                completed: Vec::new(),
            }),
        )
        .unwrap();
        sim.drain_events();
        sim.schedule_round();

        assert!(sim.apply_migration(Migration {
            task: TaskId(1),
            from: 0,
            to: 1
        }));
        assert!(sim.machines()[0].used_vector().is_zero());
        assert_eq!(sim.machines()[1].reservation(TaskId(1)).unwrap().end, Some(100.0));

        sim.now = 100.0;
        sim.drain_events();
        assert_eq!(sim.entries[&TaskId(1)].state, TaskState::Completed);
        assert!(!sim.machines()[1].holds(TaskId(1)));
    }

    // ── Faults and termination ────────────────────────────────────────────────

    #[test]
    fn panicking_scheduler_does_not_abort_the_run() {
        let report = Simulation::new(
            config(1, 4.0, 4.0),
            vec![Task::new(1, 1.0, 1.0, "a")],
            Box::new(Panicking),
        )
        .unwrap()
        .run();
        assert_eq!(report.scheduler_faults, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.rounds, 1);
    }

    #[test]
    fn rejected_task_is_retried_then_failed() {
        let mut cfg = config(1, 4.0, 4.0);
        cfg.simulation.retry.max_attempts = 2;
        let rejection = || SchedulePlan {
            rejected: vec![TaskId(1)],
            ..SchedulePlan::default()
        };
        let scheduler = Scripted {
            plans: vec![rejection(), rejection(), rejection()],
            completed: Vec::new(),
        };
        let report = Simulation::new(cfg, vec![Task::new(1, 1.0, 1.0, "a")], Box::new(scheduler))
            .unwrap()
            .run();
        assert_eq!(report.failed, 1);
        assert_eq!(report.rounds, 3);
        assert_eq!(report.end_time, 600.0);
    }

    #[test]
    fn round_guard_leaves_tasks_unfinished() {
        let mut cfg = config(1, 4.0, 4.0);
        cfg.simulation.max_scheduling_rounds = 1;
        let tasks = vec![timed(1, 4.0, 0.0, 1000.0), timed(2, 4.0, 0.0, 10.0)];
        let scheduler = Scripted {
            plans: vec![SchedulePlan {
                placements: vec![place(1, 0)],
                ..SchedulePlan::default()
            }],
            completed: Vec::new(),
        };
        let report = Simulation::new(cfg, tasks, Box::new(scheduler)).unwrap().run();
        assert_eq!(report.rounds, 1);
        assert_eq!(report.scheduled, 1);
        assert_eq!(report.unfinished, 1);
    }

    #[test]
    fn idle_gap_is_skipped() {
        let tasks = vec![timed(1, 1.0, 0.0, 10.0), timed(2, 1.0, 90_000.0, 10.0)];
        let report = run_simulation(&config(1, 4.0, 4.0), tasks, SchedulerKind::Tetris).unwrap();
        assert_eq!(report.scheduled, 2);
        // start, first completion, second arrival, second completion
        assert_eq!(report.rounds, 4);
    }
}
