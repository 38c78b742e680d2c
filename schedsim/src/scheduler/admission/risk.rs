/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Violation-risk prediction and smoothing.

use std::collections::BTreeMap;

use crate::machine::MachineId;

// ── Predictor ─────────────────────────────────────────────────────────────────

/// Step function from post-placement dominant utilisation to predicted SLO
/// violation risk.
///
/// | utilisation | risk |
/// |---|---|
/// | > 0.95 | 0.35 |
/// | > 0.90 | 0.22 |
/// | > 0.85 | 0.12 |
/// | > 0.80 | 0.05 |
/// | otherwise | 0.02 |
pub fn predict_violation_risk(util_after: f64) -> f64 {
    if util_after > 0.95 {
        0.35
    } else if util_after > 0.90 {
        0.22
    } else if util_after > 0.85 {
        0.12
    } else if util_after > 0.80 {
        0.05
    } else {
        0.02
    }
}

/// Per-machine admission ceiling.
///
/// Machines with a calm history get a small bonus above `base`; machines
/// whose smoothed risk exceeds 0.10 lose `k_machine` per unit of excess.
pub fn effective_limit(base: f64, machine_risk: f64, k_machine: f64, bounds: (f64, f64)) -> f64 {
    let bonus = 0.06 * (0.04 - machine_risk).max(0.0);
    let penalty = k_machine * (machine_risk - 0.10).max(0.0);
    (base + bonus - penalty).clamp(bounds.0, bounds.1)
}

// ── RiskState ─────────────────────────────────────────────────────────────────

/// Global and per-machine EMAs of predicted risk.
#[derive(Debug, Clone)]
pub struct RiskState {
    alpha: f64,
    initial: f64,
    global: f64,
    per_machine: BTreeMap<MachineId, f64>,
}

impl RiskState {
    pub fn new(alpha: f64, initial: f64) -> Self {
        Self {
            alpha,
            initial,
            global: initial,
            per_machine: BTreeMap::new(),
        }
    }

    /// Fold one placement's predicted risk into both averages.
    pub fn observe(&mut self, machine: MachineId, risk: f64) {
        let alpha = self.alpha;
        let initial = self.initial;
        let m = self.per_machine.entry(machine).or_insert(initial);
        *m = alpha * risk + (1.0 - alpha) * *m;
        self.global = alpha * risk + (1.0 - alpha) * self.global;
    }

    pub fn machine(&self, machine: MachineId) -> f64 {
        self.per_machine.get(&machine).copied().unwrap_or(self.initial)
    }

    pub fn global(&self) -> f64 {
        self.global
    }
}
