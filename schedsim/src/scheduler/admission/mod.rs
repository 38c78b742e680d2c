/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Risk-aware admission controller.
//!
//! Each pending task is scored against every machine that can hold it and
//! then walked through a fixed sequence of admission tiers; the first tier
//! that succeeds decides the placement:
//!
//! | Tier | Who | Condition |
//! |---|---|---|
//! | opportunity | tenants below the credit threshold | `util_after` under the soft, then the hard watermark, within the share cap |
//! | direct | everyone else | `util_after ≤` the machine's effective limit |
//! | preempt | | evict ≤ N small low-sensitivity tasks on a near-limit machine |
//! | spill | | `util_after ≤ effective limit + spill margin`, least risk wins |
//! | hard preempt | high-sensitivity tasks | evict low-sensitivity tasks on a saturated machine |
//! | reject | | tenant credit penalty |
//!
//! Opportunistic tenants never fall through to the standard tiers.  High
//! sensitivity tasks are never chosen as victims.
//!
//! Every placement feeds the [`controller::ProportionalController`] and,
//! when enabled, the [`bandit::BanditTuner`]; both write the shared
//! [`controller::Knobs`].  Every `defrag_period` placements a compaction
//! pass migrates one small task off each crowded machine.

pub mod bandit;
pub mod controller;
pub mod credit;
pub mod risk;

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, trace};

use self::bandit::{Arm, BanditTuner};
use self::controller::{Knobs, ProportionalController};
use self::credit::TenantLedger;
use self::risk::{effective_limit, predict_violation_risk, RiskState};
use super::tetris::{interleave, packing_delta};
use super::{
    scratch_view, Eviction, Migration, Placement, SchedulePlan, Scheduler, SchedulerError,
    ScratchMachine,
};
use crate::config::AdmissionConfig;
use crate::machine::{Machine, MachineId, Reservation};
use crate::resources::{Dimension, ResourceVector, ResourceView};
use crate::task::{SloClass, Task, TaskId};

/// Packing exponent used inside the candidate score.
const PACKING_EXPONENT: f64 = 2.0;

/// Tier a running task was admitted through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    Standard,
    Opportunity,
    Spill,
    Preempt,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    machine: usize,
    util_after: f64,
    risk: f64,
    score: f64,
}

/// Per-tick bookkeeping of tasks already touched by an eviction or move.
#[derive(Default)]
struct TickState {
    evicted: BTreeSet<TaskId>,
    moved: BTreeSet<TaskId>,
}

fn is_big(demand: &ResourceVector) -> bool {
    demand.cpu > 1.0 || demand.mem > 1.0
}

fn footprint(demand: &ResourceVector) -> f64 {
    demand.cpu + demand.mem
}

pub struct RiskAwareScheduler {
    config: AdmissionConfig,
    knobs: Knobs,
    risk: RiskState,
    ledger: TenantLedger,
    controller: ProportionalController,
    bandit: Option<BanditTuner>,
    /// Machine and admission tier of every task this scheduler placed.
    pools: BTreeMap<TaskId, (MachineId, Pool)>,
    placed: u64,
    since_defrag: usize,
}

impl RiskAwareScheduler {
    pub fn new(config: AdmissionConfig, seed: u64) -> Self {
        let mut knobs = Knobs::from_config(&config);
        let bandit = config.enable_bandit.then(|| {
            let tuner = BanditTuner::new(config.bandit_epsilon, config.bandit_window, seed);
            let arm = tuner.active();
            knobs.base_limit = arm.base_limit;
            knobs.top_k = arm.top_k;
            knobs.spill_margin = (arm.spill_margin + 0.05).min(0.18);
            tuner
        });
        Self {
            risk: RiskState::new(config.risk_ema_alpha, config.initial_risk),
            ledger: TenantLedger::new(),
            controller: ProportionalController::new(),
            bandit,
            pools: BTreeMap::new(),
            placed: 0,
            since_defrag: 0,
            knobs,
            config,
        }
    }

    pub fn knobs(&self) -> &Knobs {
        &self.knobs
    }

    pub fn ledger(&self) -> &TenantLedger {
        &self.ledger
    }

    pub fn risk_state(&self) -> &RiskState {
        &self.risk
    }

    pub fn pool_of(&self, task: TaskId) -> Option<Pool> {
        self.pools.get(&task).map(|(_, pool)| *pool)
    }

    fn opportunity_active(&self) -> usize {
        self.pools
            .values()
            .filter(|(_, pool)| *pool == Pool::Opportunity)
            .count()
    }

    fn limit_for(&self, machine: MachineId) -> f64 {
        effective_limit(
            self.knobs.base_limit,
            self.risk.machine(machine),
            self.config.k_machine,
            self.config.limit_bounds,
        )
    }

    /// Forget tasks whose reservation is gone (completed, evicted, or never
    /// committed by the driver).
    fn prune(&mut self, machines: &[Machine]) {
        self.pools.retain(|task, (machine, _)| {
            machines.get(*machine).is_some_and(|m| m.holds(*task))
        });
    }

    // ── Scoring ───────────────────────────────────────────────────────────────

    /// Feasible machines for `task`, best score first, capped at top-K.
    fn candidates(&self, task: &Task, scratch: &[ScratchMachine]) -> Vec<Candidate> {
        let cfg = &self.config;
        let mut out: Vec<Candidate> = scratch
            .iter()
            .enumerate()
            .filter(|(_, m)| m.fits(&task.demand))
            .map(|(i, m)| {
                let util_after = m.utilization_with(&task.demand);
                let risk = predict_violation_risk(util_after);
                let delta = packing_delta(m, &task.demand, PACKING_EXPONENT);
                Candidate {
                    machine: i,
                    util_after,
                    risk,
                    score: cfg.alpha * risk + cfg.beta * util_after + cfg.gamma * delta,
                }
            })
            .collect();
        out.sort_by(|a, b| a.score.total_cmp(&b.score));
        out.truncate(self.knobs.top_k.max(1));
        out
    }

    // ── Tiers ─────────────────────────────────────────────────────────────────

    fn try_opportunity(&self, candidates: &[Candidate]) -> Option<Candidate> {
        let active = self.opportunity_active() as f64;
        let next_share = (active + 1.0) / (self.placed as f64 + 1.0);
        if next_share > self.config.max_opportunity_share {
            return None;
        }
        [self.config.opportunity_soft_limit, self.knobs.opportunity_hard_limit]
            .into_iter()
            .find_map(|limit| candidates.iter().find(|c| c.util_after <= limit).copied())
    }

    fn try_direct(&self, candidates: &[Candidate], scratch: &[ScratchMachine]) -> Option<Candidate> {
        candidates
            .iter()
            .find(|c| c.util_after <= self.limit_for(scratch[c.machine].id))
            .copied()
    }

    /// Committed tasks on `machine` that may be evicted, in eviction order:
    /// opportunistic tasks first, then small standard ones, smallest first.
    fn victims<'m>(&self, machine: &'m Machine, tick: &TickState) -> Vec<&'m Reservation> {
        let mut opportunistic = Vec::new();
        let mut standard = Vec::new();
        for r in machine.reservations() {
            if r.sensitivity == SloClass::High
                || tick.evicted.contains(&r.task)
                || tick.moved.contains(&r.task)
            {
                continue;
            }
            match self.pool_of(r.task).unwrap_or(Pool::Standard) {
                Pool::Opportunity => opportunistic.push(r),
                Pool::Standard if r.demand.cpu <= self.config.victim_max_cpu => standard.push(r),
                _ => {}
            }
        }
        opportunistic.sort_by(|a, b| footprint(&a.demand).total_cmp(&footprint(&b.demand)));
        standard.sort_by(|a, b| footprint(&a.demand).total_cmp(&footprint(&b.demand)));
        opportunistic.extend(standard);
        opportunistic
    }

    /// Evict up to the cap of small low-sensitivity tasks on a near-limit
    /// machine so that `task` fits under the limit and within target risk.
    fn try_preempt(
        &self,
        task: &Task,
        scratch: &[ScratchMachine],
        machines: &[Machine],
        tick: &TickState,
    ) -> Option<(Candidate, Vec<TaskId>)> {
        let cap = if task.is_high_sensitivity() || is_big(&task.demand) {
            self.config.max_evictions
        } else {
            1
        };

        let mut near_limit: Vec<(usize, f64, f64)> = scratch
            .iter()
            .enumerate()
            .filter_map(|(i, m)| {
                let limit = self.limit_for(m.id);
                let util = m.utilization();
                let ceiling = self
                    .config
                    .rescue_util_ceiling
                    .min(limit + self.knobs.spill_margin);
                (util <= ceiling).then_some((i, util, limit))
            })
            .collect();
        near_limit.sort_by(|a, b| b.1.total_cmp(&a.1));

        for (i, _, limit) in near_limit {
            let Some(machine) = machines.get(i) else {
                continue;
            };
            let mut trial = scratch[i].clone();
            let mut chosen = Vec::new();
            for victim in self.victims(machine, tick).into_iter().take(cap) {
                trial.uncommit(&victim.demand);
                chosen.push(victim.task);
                if !trial.fits(&task.demand) {
                    continue;
                }
                let util_after = trial.utilization_with(&task.demand);
                let risk = predict_violation_risk(util_after);
                if util_after <= limit && risk <= self.config.slo_target_risk {
                    let candidate = Candidate {
                        machine: i,
                        util_after,
                        risk,
                        score: 0.0,
                    };
                    return Some((candidate, chosen));
                }
            }
        }
        None
    }

    fn try_spill(&self, task: &Task, scratch: &[ScratchMachine]) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;
        for (i, m) in scratch.iter().enumerate() {
            if !m.fits(&task.demand) {
                continue;
            }
            let ceiling = (self.limit_for(m.id) + self.knobs.spill_margin).min(self.config.limit_bounds.1);
            let util_after = m.utilization_with(&task.demand);
            if util_after > ceiling {
                continue;
            }
            let risk = predict_violation_risk(util_after);
            let better = best.map_or(true, |b| {
                (risk, util_after) < (b.risk, b.util_after)
            });
            if better {
                best = Some(Candidate {
                    machine: i,
                    util_after,
                    risk,
                    score: 0.0,
                });
            }
        }
        best
    }

    /// High-sensitivity tasks only: clear room on the busiest saturated
    /// machine by evicting low-sensitivity tasks, smallest first.
    fn try_hard_preempt(
        &self,
        task: &Task,
        scratch: &[ScratchMachine],
        machines: &[Machine],
        tick: &TickState,
    ) -> Option<(Candidate, Vec<TaskId>)> {
        if !task.is_high_sensitivity() {
            return None;
        }
        let (i, util) = scratch
            .iter()
            .enumerate()
            .map(|(i, m)| (i, m.utilization()))
            .fold(None, |best: Option<(usize, f64)>, (i, u)| match best {
                Some((_, bu)) if bu >= u => best,
                _ => Some((i, u)),
            })?;
        if util <= self.config.hard_preempt_util {
            return None;
        }

        let machine = machines.get(i)?;
        let mut victims: Vec<&Reservation> = machine
            .reservations()
            .iter()
            .filter(|r| {
                r.sensitivity == SloClass::Low
                    && !tick.evicted.contains(&r.task)
                    && !tick.moved.contains(&r.task)
            })
            .collect();
        victims.sort_by(|a, b| footprint(&a.demand).total_cmp(&footprint(&b.demand)));

        let mut trial = scratch[i].clone();
        let mut chosen = Vec::new();
        for victim in victims.into_iter().take(self.config.max_evictions) {
            trial.uncommit(&victim.demand);
            chosen.push(victim.task);
            if trial.fits(&task.demand) {
                let util_after = trial.utilization_with(&task.demand);
                let candidate = Candidate {
                    machine: i,
                    util_after,
                    risk: predict_violation_risk(util_after),
                    score: 0.0,
                };
                return Some((candidate, chosen));
            }
        }
        None
    }

    // ── Commit ────────────────────────────────────────────────────────────────

    fn evict(
        &mut self,
        machine: usize,
        victims: Vec<TaskId>,
        scratch: &mut [ScratchMachine],
        machines: &[Machine],
        plan: &mut SchedulePlan,
        tick: &mut TickState,
    ) {
        let machine_id = scratch[machine].id;
        for task in victims {
            if let Some(r) = machines.get(machine).and_then(|m| m.reservation(task)) {
                scratch[machine].uncommit(&r.demand);
            }
            self.pools.remove(&task);
            tick.evicted.insert(task);
            debug!(task = %task, machine = machine_id, "evicting task");
            plan.evictions.push(Eviction {
                task,
                machine: machine_id,
            });
        }
    }

    fn place(
        &mut self,
        task: &Task,
        candidate: Candidate,
        pool: Pool,
        scratch: &mut [ScratchMachine],
        plan: &mut SchedulePlan,
    ) {
        let slot = &mut scratch[candidate.machine];
        slot.commit(&task.demand);
        let machine = slot.id;
        trace!(
            task = %task.id,
            machine = machine,
            pool = ?pool,
            util_after = candidate.util_after,
            risk = candidate.risk,
            "admission placement"
        );
        plan.placements.push(Placement {
            task: task.id,
            machine,
        });

        let risk = candidate.risk;
        self.risk.observe(machine, risk);
        match pool {
            Pool::Opportunity => self.ledger.record_opportunity_placement(
                &task.tenant,
                candidate.util_after,
                self.config.opportunity_soft_limit,
                self.config.credit_threshold,
            ),
            _ => self
                .ledger
                .record_standard_placement(&task.tenant, candidate.util_after),
        }
        self.pools.insert(task.id, (machine, pool));
        self.placed += 1;
        self.since_defrag += 1;

        self.controller.record(risk, &mut self.knobs, &self.config);
        let reward = bandit::reward(candidate.util_after, risk, self.config.slo_target_risk);
        if let Some(arm) = self.bandit.as_mut().and_then(|b| b.record(reward)) {
            self.apply_arm(arm);
        }
    }

    /// Adopt a re-sampled bandit arm.  The base limit only rises while the
    /// cluster is comfortably under target.
    fn apply_arm(&mut self, arm: Arm) {
        let calm = self.risk.global() <= 0.8 * self.config.slo_target_risk;
        if arm.base_limit < self.knobs.base_limit || calm {
            self.knobs.base_limit = arm.base_limit;
        }
        self.knobs.top_k = arm.top_k;
        self.knobs.spill_margin = arm.spill_margin;
    }

    fn reject(&mut self, task: &Task, plan: &mut SchedulePlan) {
        self.ledger.penalize_failure(&task.tenant);
        debug!(
            task = %task.id,
            tenant = %task.tenant,
            credit = self.ledger.credit(&task.tenant),
            "admission rejected task"
        );
        plan.rejected.push(task.id);
    }

    fn admit(
        &mut self,
        task: &Task,
        scratch: &mut [ScratchMachine],
        machines: &[Machine],
        plan: &mut SchedulePlan,
        tick: &mut TickState,
    ) {
        let candidates = self.candidates(task, scratch);

        if self
            .ledger
            .is_opportunistic(&task.tenant, self.config.credit_threshold)
        {
            match self.try_opportunity(&candidates) {
                Some(c) => self.place(task, c, Pool::Opportunity, scratch, plan),
                None => self.reject(task, plan),
            }
            return;
        }

        if let Some(c) = self.try_direct(&candidates, scratch) {
            self.place(task, c, Pool::Standard, scratch, plan);
        } else if let Some((c, victims)) = self.try_preempt(task, scratch, machines, tick) {
            self.evict(c.machine, victims, scratch, machines, plan, tick);
            self.place(task, c, Pool::Preempt, scratch, plan);
        } else if let Some(c) = self.try_spill(task, scratch) {
            self.place(task, c, Pool::Spill, scratch, plan);
        } else if let Some((c, victims)) = self.try_hard_preempt(task, scratch, machines, tick) {
            self.evict(c.machine, victims, scratch, machines, plan, tick);
            self.place(task, c, Pool::Preempt, scratch, plan);
        } else {
            self.reject(task, plan);
        }
    }

    // ── Defragmentation ───────────────────────────────────────────────────────

    fn defragment(
        &mut self,
        scratch: &mut [ScratchMachine],
        machines: &[Machine],
        plan: &mut SchedulePlan,
        tick: &mut TickState,
    ) {
        for (i, machine) in machines.iter().enumerate() {
            let Some(source) = scratch.get(i) else {
                continue;
            };
            if source.utilization() <= self.config.defrag_util
                || source.free(Dimension::Cpu) <= self.config.defrag_min_free_cpu
            {
                continue;
            }

            let Some(r) = machine.reservations().iter().rev().find(|r| {
                r.sensitivity == SloClass::Low
                    && r.demand.cpu <= self.config.victim_max_cpu
                    && self.pool_of(r.task).unwrap_or(Pool::Standard) == Pool::Standard
                    && !tick.evicted.contains(&r.task)
                    && !tick.moved.contains(&r.task)
            }) else {
                continue;
            };

            let mut target: Option<(usize, f64)> = None;
            for (j, m) in scratch.iter().enumerate() {
                if j == i || !m.fits(&r.demand) {
                    continue;
                }
                let util = m.utilization();
                if target.map_or(true, |(_, u)| util < u) {
                    target = Some((j, util));
                }
            }
            let Some((j, _)) = target else {
                continue;
            };

            scratch[i].uncommit(&r.demand);
            scratch[j].commit(&r.demand);
            let (from, to) = (scratch[i].id, scratch[j].id);
            tick.moved.insert(r.task);
            self.pools.insert(r.task, (to, Pool::Standard));
            debug!(task = %r.task, from = from, to = to, "defragmentation move");
            plan.migrations.push(Migration {
                task: r.task,
                from,
                to,
            });
        }
    }
}

impl Scheduler for RiskAwareScheduler {
    fn name(&self) -> &'static str {
        "admission"
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

        let mut scratch = scratch_view(machines);
        let mut plan = SchedulePlan::default();
        let mut tick = TickState::default();

        for task in interleave(pending) {
            self.admit(task, &mut scratch, machines, &mut plan, &mut tick);
        }

        if self.since_defrag >= self.config.defrag_period {
            self.since_defrag = 0;
            self.defragment(&mut scratch, machines, &mut plan, &mut tick);
        }

        debug!(
            placed = plan.placements.len(),
            rejected = plan.rejected.len(),
            evicted = plan.evictions.len(),
            migrated = plan.migrations.len(),
            base_limit = self.knobs.base_limit,
            spill_margin = self.knobs.spill_margin,
            top_k = self.knobs.top_k,
            global_risk = self.risk.global(),
            "admission round complete"
        );
        Ok(plan)
    }

    fn on_task_completed(&mut self, task: TaskId) {
        self.pools.remove(&task);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
