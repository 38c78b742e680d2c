/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! End-to-end runs of every scheduler through the driver.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use proptest::prelude::*;

use schedsim::config::SimulationConfig;
use schedsim::machine::Machine;
use schedsim::resources::{Dimension, ResourceVector, ResourceView, EPS};
use schedsim::scheduler::{SchedulePlan, Scheduler, SchedulerError, SchedulerKind};
use schedsim::sim::{run_simulation, Simulation, SimulationReport};
use schedsim::task::{SloClass, Task, TaskId};
use schedsim::workload::SyntheticWorkload;

fn cluster(machines: usize, cpu: f64, mem: f64) -> SimulationConfig {
    let mut cfg = SimulationConfig::default();
    cfg.cluster.machines = machines;
    cfg.cluster.capacity.cpu = cpu;
    cfg.cluster.capacity.mem = mem;
    cfg
}

fn reference_tasks() -> Vec<Task> {
    vec![
        Task::new(1, 1.0, 1.0, "a"),
        Task::new(2, 2.0, 1.5, "a"),
        Task::new(3, 3.0, 3.0, "b"),
        Task::new(4, 0.5, 0.5, "b"),
        Task::new(5, 4.0, 4.0, "c"),
    ]
}

fn assert_within_capacity(report: &SimulationReport, cpu: f64, mem: f64) {
    for m in &report.machines {
        assert!(m.cpu_used <= cpu + EPS, "machine {} cpu {}", m.id, m.cpu_used);
        assert!(m.mem_used <= mem + EPS, "machine {} mem {}", m.id, m.mem_used);
    }
}

// ── Reference scenarios ───────────────────────────────────────────────────────

#[test]
fn reference_workload_fully_placed_by_every_scheduler() {
    let cfg = cluster(3, 11.0, 11.0);
    for kind in SchedulerKind::ALL {
        let report = run_simulation(&cfg, reference_tasks(), kind).unwrap();
        assert_eq!(report.scheduler, kind.as_str());
        assert_eq!(report.scheduled, 5, "{kind}");
        assert_eq!(report.failed, 0, "{kind}");
        assert_eq!(report.success_rate, 1.0);
        assert_within_capacity(&report, 11.0, 11.0);

        let tasks: BTreeSet<_> = report.placements.iter().map(|p| p.task).collect();
        assert_eq!(tasks.len(), 5, "{kind}: each task placed once");
        let cpu: f64 = report.machines.iter().map(|m| m.cpu_used).sum();
        assert!((cpu - 10.5).abs() < 1e-9);
    }
}

#[test]
fn flow_scheduler_spreads_reference_workload() {
    let report = run_simulation(&cluster(3, 11.0, 11.0), reference_tasks(), SchedulerKind::Flow).unwrap();
    let used: BTreeSet<_> = report.placements.iter().map(|p| p.machine).collect();
    assert!(used.len() >= 2);
}

#[test]
fn oversubscribed_machine_never_holds_both_tasks() {
    let cfg = cluster(1, 1.0, 1.0);
    let tasks = vec![Task::new(1, 0.6, 0.1, "a"), Task::new(2, 0.6, 0.1, "a")];
    for kind in SchedulerKind::ALL {
        let report = run_simulation(&cfg, tasks.clone(), kind).unwrap();
        assert_eq!(report.scheduled, 1, "{kind}");
        assert_eq!(report.failed, 1, "{kind}");
        assert_eq!(report.machines[0].tasks, 1);
        assert_within_capacity(&report, 1.0, 1.0);
    }
}

// ── Durations and sampling ────────────────────────────────────────────────────

#[test]
fn idle_gap_does_not_dilute_time_weighted_utilisation() {
    let cfg = cluster(1, 10.0, 10.0);
    let tasks = vec![
        Task {
            duration: 300.0,
            ..Task::new(1, 5.0, 1.0, "a")
        },
        Task {
            arrival: 10_000.0,
            duration: 300.0,
            ..Task::new(2, 5.0, 1.0, "a")
        },
    ];
    let report = run_simulation(&cfg, tasks, SchedulerKind::Tetris).unwrap();
    assert_eq!(report.scheduled, 2);
    assert!((report.time_weighted.dominant - 0.5).abs() < 1e-9);
    assert!((report.time_weighted.cpu - 0.5).abs() < 1e-9);
    assert_eq!(report.time_weighted.loaded_seconds, 600.0);
    // both tasks finished, nothing left resident
    assert_eq!(report.final_state.avg, 0.0);
    assert_eq!(report.end_time, 10_300.0);
}

#[test]
fn completions_free_capacity_for_queued_tasks() {
    // one slot; three tasks queue behind each other
    let cfg = cluster(1, 1.0, 1.0);
    let tasks: Vec<_> = (0..3)
        .map(|i| Task {
            duration: 100.0,
            ..Task::new(i, 1.0, 1.0, "a")
        })
        .collect();
    for kind in [SchedulerKind::Tetris, SchedulerKind::Flow] {
        let report = run_simulation(&cfg, tasks.clone(), kind).unwrap();
        assert_eq!(report.scheduled, 3, "{kind}");
        let times: Vec<f64> = report.placements.iter().map(|p| p.time).collect();
        assert_eq!(times, vec![0.0, 300.0, 600.0], "{kind}");
    }
}

// ── Determinism ───────────────────────────────────────────────────────────────

#[test]
fn identical_inputs_give_identical_placements() {
    let cfg = cluster(8, 11.0, 11.0);
    let tasks = SyntheticWorkload {
        tasks: 300,
        ..SyntheticWorkload::default()
    }
    .generate();
    for kind in SchedulerKind::ALL {
        let a = run_simulation(&cfg, tasks.clone(), kind).unwrap();
        let b = run_simulation(&cfg, tasks.clone(), kind).unwrap();
        assert_eq!(a.placements, b.placements, "{kind}");
        assert_eq!(a, b, "{kind}");
    }
}

// ── Capacity audit ────────────────────────────────────────────────────────────

/// Wraps a scheduler and records every capacity breach it is shown.
///
/// The driver hands the scheduler the committed machine state at the start
/// of every round, which is the state left by the previous round's plan and
/// the completions since.  A panic here would be swallowed by the driver, so
/// breaches are collected and asserted on afterwards.
struct CapacityAudit {
    inner: Box<dyn Scheduler>,
    breaches: Arc<Mutex<Vec<String>>>,
}

fn audit_machines(machines: &[Machine]) -> Vec<String> {
    let mut out = Vec::new();
    for m in machines {
        let reserved = m
            .reservations()
            .iter()
            .fold(ResourceVector::ZERO, |acc, r| acc.plus(&r.demand));
        for dim in Dimension::ALL {
            let (used, cap) = (m.used(dim), m.capacity(dim));
            if used < 0.0 || used > cap + EPS {
                out.push(format!("machine {} {dim}: used {used} of {cap}", m.id()));
            }
            if (reserved.get(dim) - used).abs() > 1e-6 {
                out.push(format!(
                    "machine {} {dim}: used {used} but reservations sum to {}",
                    m.id(),
                    reserved.get(dim)
                ));
            }
        }
    }
    out
}

impl Scheduler for CapacityAudit {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn schedule(
        &mut self,
        pending: &[Task],
        machines: &[Machine],
    ) -> Result<SchedulePlan, SchedulerError> {
        self.breaches
            .lock()
            .unwrap()
            .extend(audit_machines(machines));
        self.inner.schedule(pending, machines)
    }

    fn on_task_completed(&mut self, task: TaskId) {
        self.inner.on_task_completed(task);
    }
}

/// Run `tasks` under `kind`, checking capacity before every round and on the
/// final state.  Returns the report and the breaches found.
fn audited_run(cfg: &SimulationConfig, tasks: Vec<Task>, kind: SchedulerKind) -> (SimulationReport, Vec<String>) {
    let breaches = Arc::new(Mutex::new(Vec::new()));
    let audit = CapacityAudit {
        inner: kind.build(cfg),
        breaches: Arc::clone(&breaches),
    };
    let sim = Simulation::new(cfg.clone(), tasks, Box::new(audit)).unwrap();
    let report = sim.run();
    let mut found = breaches.lock().unwrap().clone();
    for m in &report.machines {
        if m.cpu_used > cfg.cluster.capacity.cpu + EPS || m.mem_used > cfg.cluster.capacity.mem + EPS {
            found.push(format!("final machine {}: cpu {} mem {}", m.id, m.cpu_used, m.mem_used));
        }
    }
    (report, found)
}

#[test]
fn capacity_holds_every_round_on_synthetic_workload() {
    let cfg = cluster(4, 8.0, 8.0);
    let tasks = SyntheticWorkload {
        tasks: 200,
        inter_arrival: (0.0, 20.0),
        duration: (100.0, 1500.0),
        ..SyntheticWorkload::default()
    }
    .generate();
    for kind in SchedulerKind::ALL {
        let (report, breaches) = audited_run(&cfg, tasks.clone(), kind);
        assert!(breaches.is_empty(), "{kind}: {breaches:?}");
        assert_eq!(report.scheduler_faults, 0, "{kind}");
    }
}

#[test]
fn negative_demand_cannot_inflate_machine_capacity() {
    let cfg = cluster(1, 1.0, 1.0);
    let tasks = vec![
        Task::new(1, 1.0, 0.1, "a"),
        Task {
            duration: 100.0,
            ..Task::new(2, -1.0, 0.1, "a")
        },
        Task::new(3, 1.0, 0.1, "a"),
    ];
    for kind in SchedulerKind::ALL {
        assert!(
            run_simulation(&cfg, tasks.clone(), kind).is_err(),
            "{kind}: workload with negative demand must be refused"
        );
    }
}

// ── Properties ────────────────────────────────────────────────────────────────

fn task_strategy() -> impl Strategy<Value = Vec<Task>> {
    prop::collection::vec(
        (0.1f64..3.0, 0.1f64..3.0, 0.0f64..2000.0, 0.0f64..1500.0, any::<bool>()),
        1..30,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (cpu, mem, arrival, duration, high))| Task {
                arrival,
                duration,
                sensitivity: if high { SloClass::High } else { SloClass::Low },
                ..Task::new(i as u64, cpu, mem, format!("t{}", i % 3))
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn every_task_is_accounted_for_and_capacity_holds(
        tasks in task_strategy(),
        machines in 1usize..4,
    ) {
        let cfg = cluster(machines, 4.0, 4.0);
        let total = tasks.len();
        for kind in SchedulerKind::ALL {
            let (report, breaches) = audited_run(&cfg, tasks.clone(), kind);
            prop_assert!(breaches.is_empty(), "{}: {:?}", kind, breaches);
            prop_assert_eq!(report.scheduled + report.failed + report.unfinished, total);
            prop_assert!(report.time_weighted.peak <= 1.0 + EPS);
        }
    }
}

#[test]
fn machine_view_matches_report() {
    let cfg = cluster(2, 11.0, 11.0);
    let sim = Simulation::new(
        cfg.clone(),
        reference_tasks(),
        SchedulerKind::Drf.build(&cfg),
    )
    .unwrap();
    assert_eq!(sim.machines().len(), 2);
    assert!(sim.machines().iter().all(|m| m.utilization() == 0.0));
    assert_eq!(sim.machines()[0].capacity(Dimension::Cpu), 11.0);
    let report = sim.run();
    assert_eq!(report.scheduled, 5);
}
