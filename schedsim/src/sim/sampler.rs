/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Time-weighted utilisation integral.
//!
//! Each tick contributes `value × dt` to the area under the curve.  Ticks
//! with an idle cluster are left out entirely, so a long quiet gap between
//! arrivals does not dilute the averages.

use serde::Serialize;

use crate::metrics::{cluster_utilization, dimension_utilization};
use crate::resources::{Dimension, ResourceView, EPS};
use crate::scheduler::admission::risk::predict_violation_risk;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimeWeightedAverages {
    pub dominant: f64,
    pub cpu: f64,
    pub mem: f64,
    /// Coefficient of variation across machines.
    pub imbalance: f64,
    /// Mean predicted violation risk of the machines.
    pub violation_risk: f64,
    pub peak: f64,
    /// Simulated seconds with load.
    pub loaded_seconds: f64,
}

#[derive(Debug, Clone, Default)]
pub struct UtilizationIntegral {
    weight: f64,
    dominant: f64,
    cpu: f64,
    mem: f64,
    imbalance: f64,
    risk: f64,
    peak: f64,
}

impl UtilizationIntegral {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a snapshot held for `dt` seconds.  Returns `false` when the
    /// snapshot was skipped (idle cluster or empty interval).
    pub fn add<V: ResourceView>(&mut self, machines: &[V], dt: f64) -> bool {
        let stats = cluster_utilization(machines);
        self.peak = self.peak.max(stats.max);
        if dt <= 0.0 || stats.avg <= EPS {
            return false;
        }
        let risk = if machines.is_empty() {
            0.0
        } else {
            machines
                .iter()
                .map(|m| predict_violation_risk(m.utilization()))
                .sum::<f64>()
                / machines.len() as f64
        };

        self.weight += dt;
        self.dominant += stats.avg * dt;
        self.cpu += dimension_utilization(machines, Dimension::Cpu) * dt;
        self.mem += dimension_utilization(machines, Dimension::Mem) * dt;
        self.imbalance += stats.imbalance * dt;
        self.risk += risk * dt;
        true
    }

    pub fn averages(&self) -> TimeWeightedAverages {
        if self.weight <= 0.0 {
            return TimeWeightedAverages {
                peak: self.peak,
                ..TimeWeightedAverages::default()
            };
        }
        TimeWeightedAverages {
            dominant: self.dominant / self.weight,
            cpu: self.cpu / self.weight,
            mem: self.mem / self.weight,
            imbalance: self.imbalance / self.weight,
            violation_risk: self.risk / self.weight,
            peak: self.peak,
            loaded_seconds: self.weight,
        }
    }
}
