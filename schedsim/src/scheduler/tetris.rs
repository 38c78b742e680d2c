/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Tetris-style multi-dimensional packing.
//!
//! For a task and a candidate machine the score is the tightness gain
//!
//! ```text
//! score = Σ_d (after_d / cap_d)^k − Σ_d (before_d / cap_d)^k
//! ```
//!
//! summed over the bounded dimensions.  The machine with the highest score
//! wins (ties to the first one seen); machines the task would overflow are
//! skipped.  Tasks that fit nowhere simply stay pending.

use tracing::{debug, trace};

use super::{scratch_view, Placement, SchedulePlan, Scheduler, SchedulerError};
use crate::config::TetrisConfig;
use crate::machine::Machine;
use crate::resources::{ResourceVector, ResourceView};
use crate::task::Task;

/// Tightness gain of adding `demand` to `machine` with exponent `k`.
pub fn packing_delta<V: ResourceView>(machine: &V, demand: &ResourceVector, k: f64) -> f64 {
    let mut before = 0.0;
    let mut after = 0.0;
    for dim in crate::resources::Dimension::ALL {
        let cap = machine.capacity(dim);
        if !cap.is_finite() || cap <= 0.0 {
            continue;
        }
        let used = machine.used(dim);
        before += (used / cap).powf(k);
        after += ((used + demand.get(dim)) / cap).powf(k);
    }
    after - before
}

/// Round-robin merge: high-sensitivity first, then alternate.
///
/// Relative order inside each class is preserved.  This is not a priority
/// sort; a long run of high-sensitivity tasks cannot starve the low class.
pub fn interleave(tasks: &[Task]) -> Vec<&Task> {
    let (high, low): (Vec<&Task>, Vec<&Task>) = tasks.iter().partition(|t| t.is_high_sensitivity());
    let mut out = Vec::with_capacity(tasks.len());
    let mut hi = high.into_iter();
    let mut lo = low.into_iter();
    loop {
        match (hi.next(), lo.next()) {
            (None, None) => break,
            (h, l) => {
                out.extend(h);
                out.extend(l);
            }
        }
    }
    out
}

pub struct TetrisScheduler {
    config: TetrisConfig,
}

impl TetrisScheduler {
    pub fn new(config: TetrisConfig) -> Self {
        Self { config }
    }
}

impl Scheduler for TetrisScheduler {
    fn name(&self) -> &'static str {
        "tetris"
    }

    fn schedule(
        &mut self,
        pending: &[Task],
        machines: &[Machine],
    ) -> Result<SchedulePlan, SchedulerError> {
        if machines.is_empty() {
            return Err(SchedulerError::NoMachines);
        }
        let mut scratch = scratch_view(machines);
        let mut plan = SchedulePlan::default();

        let order: Vec<&Task> = if self.config.interleave_sensitive {
            interleave(pending)
        } else {
            pending.iter().collect()
        };

        for task in order {
            let mut best: Option<(usize, f64)> = None;
            for (i, m) in scratch.iter().enumerate() {
                if !m.fits(&task.demand) {
                    continue;
                }
                let score = packing_delta(m, &task.demand, self.config.exponent);
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((i, score));
                }
            }

            let Some((i, score)) = best else {
                trace!(task = %task.id, "no machine fits, deferring");
                continue;
            };
            let machine = &mut scratch[i];
            machine.commit(&task.demand);
            trace!(task = %task.id, machine = machine.id, score = score, "tetris placement");
            plan.placements.push(Placement {
                task: task.id,
                machine: machine.id,
            });
        }

        debug!(
            placed = plan.placements.len(),
            deferred = pending.len() - plan.placements.len(),
            "tetris round complete"
        );
        Ok(plan)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
