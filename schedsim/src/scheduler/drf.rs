/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Dominant-resource-fairness allocator.
//!
//! Each round hands the next task to the tenant with the smallest weighted
//! dominant share:
//!
//! ```text
//! share(t) = max(cpu_alloc(t) / cpu_total, mem_alloc(t) / mem_total) / weight(t)
//! ```
//!
//! The chosen tenant's oldest pending task goes to the fitting machine with
//! the largest `cpu_free + mem_free` (first-fit-by-slack, ties to the lower
//! machine id).  A task that fits nowhere is rejected and the round moves
//! on; it never blocks the other tenants.
//!
//! Allocated totals are kept across ticks and returned through
//! [`Scheduler::on_task_completed`], so the share of a tenant reflects what
//! it is *currently* running, not what it ever ran.
//!
//! With `credit_aware` set, each tenant's configured weight is multiplied by
//! a factor derived from its credit and the smoothed cluster risk:
//!
//! ```text
//! γ      = 1 + min(1, risk_gain · max(0, global_risk − initial_risk))
//! factor = clamp((0.5 + 0.5 · credit)^γ, 0.25, 2.0)
//! ```
//!
//! Credit and risk are updated after every allocation from the target
//! machine's utilisation, so a low-credit tenant loses ground as the cluster
//! heats up.

use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, trace};

use super::{scratch_view, Placement, SchedulePlan, Scheduler, SchedulerError};
use super::admission::credit::{TenantLedger, MAX_CREDIT, MIN_CREDIT};
use super::admission::risk::{predict_violation_risk, RiskState};
use crate::config::DrfConfig;
use crate::machine::{Machine, MachineId};
use crate::resources::{Dimension, ResourceVector, ResourceView};
use crate::task::{Task, TaskId};

// ── Tenant bookkeeping ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct TenantAccount {
    name: String,
    weight: f64,
    /// Currently allocated cpu/mem; never negative.
    allocated: ResourceVector,
}

impl TenantAccount {
    fn dominant_share(&self, totals: &ResourceVector) -> f64 {
        self.raw_share(totals) / self.weight
    }

    fn raw_share(&self, totals: &ResourceVector) -> f64 {
        let cpu = if totals.cpu > 0.0 {
            self.allocated.cpu / totals.cpu
        } else {
            0.0
        };
        let mem = if totals.mem > 0.0 {
            self.allocated.mem / totals.mem
        } else {
            0.0
        };
        cpu.max(mem)
    }
}

/// Insertion-ordered tenant table plus per-task allocation records.
#[derive(Debug, Default)]
pub struct DrfSorter {
    tenants: Vec<TenantAccount>,
    index: BTreeMap<String, usize>,
    /// Live allocations: task → (tenant slot, allocated amount).
    allocations: BTreeMap<TaskId, (usize, ResourceVector)>,
}

impl DrfSorter {
    /// Slot of `tenant`, registering it on first sight.
    fn slot(&mut self, tenant: &str, config: &DrfConfig) -> usize {
        if let Some(&slot) = self.index.get(tenant) {
            return slot;
        }
        let slot = self.tenants.len();
        self.tenants.push(TenantAccount {
            name: tenant.to_string(),
            weight: config.weight(tenant),
            allocated: ResourceVector::ZERO,
        });
        self.index.insert(tenant.to_string(), slot);
        slot
    }

    fn allocate(&mut self, slot: usize, task: TaskId, demand: ResourceVector) {
        let amount = ResourceVector::demand(demand.cpu, demand.mem);
        let account = &mut self.tenants[slot];
        account.allocated = account.allocated.plus(&amount);
        self.allocations.insert(task, (slot, amount));
    }

    /// Return a task's allocation to its tenant.  Unknown ids are ignored.
    pub fn unallocate(&mut self, task: TaskId) -> bool {
        let Some((slot, amount)) = self.allocations.remove(&task) else {
            return false;
        };
        let account = &mut self.tenants[slot];
        account.allocated = account.allocated.minus_floored(&amount);
        true
    }

    /// Weighted dominant share of `tenant`, or `None` if never seen.
    pub fn share(&self, tenant: &str, totals: &ResourceVector) -> Option<f64> {
        self.index
            .get(tenant)
            .map(|&slot| self.tenants[slot].dominant_share(totals))
    }

    pub fn allocated(&self, tenant: &str) -> Option<ResourceVector> {
        self.index.get(tenant).map(|&slot| self.tenants[slot].allocated)
    }
}

// ── Credit weighting ──────────────────────────────────────────────────────────

/// Tenant credit and cluster risk feeding the weight factor.
#[derive(Debug, Clone)]
pub struct CreditWeighting {
    ledger: TenantLedger,
    risk: RiskState,
    risk_gain: f64,
    initial_risk: f64,
}

impl CreditWeighting {
    pub fn new(config: &DrfConfig) -> Self {
        Self {
            ledger: TenantLedger::new(),
            risk: RiskState::new(config.risk_ema_alpha, config.initial_risk),
            risk_gain: config.risk_gain,
            initial_risk: config.initial_risk,
        }
    }

    /// Weight exponent in `[1, 2]`.
    pub fn gamma(&self) -> f64 {
        let excess = (self.risk.global() - self.initial_risk).max(0.0);
        1.0 + (self.risk_gain * excess).min(1.0)
    }

    pub fn factor(&self, tenant: &str) -> f64 {
        let credit = self.ledger.credit(tenant).clamp(MIN_CREDIT, MAX_CREDIT);
        (0.5 + 0.5 * credit).powf(self.gamma()).clamp(0.25, 2.0)
    }

    fn observe(&mut self, tenant: &str, machine: MachineId, util_after: f64) {
        self.risk.observe(machine, predict_violation_risk(util_after));
        self.ledger.record_standard_placement(tenant, util_after);
    }

    pub fn ledger(&self) -> &TenantLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut TenantLedger {
        &mut self.ledger
    }

    pub fn risk(&self) -> &RiskState {
        &self.risk
    }

    pub fn risk_mut(&mut self) -> &mut RiskState {
        &mut self.risk
    }
}

// ── DrfAllocator ──────────────────────────────────────────────────────────────

pub struct DrfAllocator {
    config: DrfConfig,
    sorter: DrfSorter,
    credit: Option<CreditWeighting>,
}

impl DrfAllocator {
    pub fn new(config: DrfConfig) -> Self {
        let credit = config.credit_aware.then(|| CreditWeighting::new(&config));
        Self {
            config,
            sorter: DrfSorter::default(),
            credit,
        }
    }

    pub fn sorter(&self) -> &DrfSorter {
        &self.sorter
    }

    /// `None` unless the allocator was built with `credit_aware`.
    pub fn credit(&self) -> Option<&CreditWeighting> {
        self.credit.as_ref()
    }

    pub fn credit_mut(&mut self) -> Option<&mut CreditWeighting> {
        self.credit.as_mut()
    }

    /// Share used for ordering: raw dominant share over the effective weight.
    fn ordering_share(&self, slot: usize, totals: &ResourceVector) -> f64 {
        let account = &self.sorter.tenants[slot];
        let factor = self
            .credit
            .as_ref()
            .map_or(1.0, |c| c.factor(&account.name));
        account.raw_share(totals) / (account.weight * factor)
    }
}

/// Cluster-wide cpu/mem totals used as the share denominator.
pub fn cluster_totals(machines: &[Machine]) -> ResourceVector {
    machines.iter().fold(ResourceVector::ZERO, |acc, m| {
        ResourceVector::demand(
            acc.cpu + m.capacity(Dimension::Cpu),
            acc.mem + m.capacity(Dimension::Mem),
        )
    })
}

impl Scheduler for DrfAllocator {
    fn name(&self) -> &'static str {
        "drf"
    }

    fn schedule(
        &mut self,
        pending: &[Task],
        machines: &[Machine],
    ) -> Result<SchedulePlan, SchedulerError> {
        if machines.is_empty() {
            return Err(SchedulerError::NoMachines);
        }
        let totals = cluster_totals(machines);
        let mut scratch = scratch_view(machines);
        let mut plan = SchedulePlan::default();

        // Per-tenant FIFO queues, indexed by tenant slot.
        let mut queues: Vec<VecDeque<&Task>> = Vec::new();
        for task in pending {
            let slot = self.sorter.slot(&task.tenant, &self.config);
            if queues.len() <= slot {
                queues.resize_with(slot + 1, VecDeque::new);
            }
            queues[slot].push_back(task);
        }

        loop {
            // Smallest weighted dominant share among tenants with work; strict
            // `<` keeps the earliest-registered tenant on ties.
            let mut chosen: Option<(usize, f64)> = None;
            for (slot, queue) in queues.iter().enumerate() {
                if queue.is_empty() {
                    continue;
                }
                let share = self.ordering_share(slot, &totals);
                if chosen.map_or(true, |(_, best)| share < best) {
                    chosen = Some((slot, share));
                }
            }
            let Some((slot, share)) = chosen else {
                break;
            };
            let Some(task) = queues[slot].pop_front() else {
                break;
            };

            let mut target: Option<usize> = None;
            for (i, m) in scratch.iter().enumerate() {
                if !m.fits(&task.demand) {
                    continue;
                }
                if target.map_or(true, |b| m.primary_slack() > scratch[b].primary_slack()) {
                    target = Some(i);
                }
            }

            match target.map(|i| &mut scratch[i]) {
                Some(machine) => {
                    machine.commit(&task.demand);
                    self.sorter.allocate(slot, task.id, task.demand);
                    if let Some(credit) = self.credit.as_mut() {
                        credit.observe(&task.tenant, machine.id, machine.utilization());
                    }
                    trace!(
                        task = %task.id,
                        tenant = %task.tenant,
                        share = share,
                        machine = machine.id,
                        "drf allocation"
                    );
                    plan.placements.push(Placement {
                        task: task.id,
                        machine: machine.id,
                    });
                }
                None => {
                    debug!(
                        task = %task.id,
                        tenant = %self.sorter.tenants[slot].name,
                        cpu = task.demand.cpu,
                        mem = task.demand.mem,
                        "no machine fits task, rejecting"
                    );
                    plan.rejected.push(task.id);
                }
            }
        }

        debug!(
            placed = plan.placements.len(),
            rejected = plan.rejected.len(),
            "drf round complete"
        );
        Ok(plan)
    }

    fn on_task_completed(&mut self, task: TaskId) {
        self.sorter.unallocate(task);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
