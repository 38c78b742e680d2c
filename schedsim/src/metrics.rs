/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Read-only cluster statistics over any [`ResourceView`].

use serde::Serialize;

use crate::resources::{Dimension, ResourceView, EPS};

/// Snapshot statistics of per-machine dominant utilisation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct UtilizationStats {
    pub avg: f64,
    pub max: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    /// `1 − avg`.
    pub fragmentation: f64,
    /// Coefficient of variation, `std_dev / avg`; zero on an idle cluster.
    pub imbalance: f64,
}

pub fn cluster_utilization<V: ResourceView>(machines: &[V]) -> UtilizationStats {
    if machines.is_empty() {
        return UtilizationStats {
            fragmentation: 1.0,
            ..UtilizationStats::default()
        };
    }
    let n = machines.len() as f64;
    let utils: Vec<f64> = machines.iter().map(|m| m.utilization()).collect();
    let avg = utils.iter().sum::<f64>() / n;
    let max = utils.iter().copied().fold(0.0, f64::max);
    let variance = utils.iter().map(|u| (u - avg).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    UtilizationStats {
        avg,
        max,
        std_dev,
        fragmentation: 1.0 - avg,
        imbalance: if avg > EPS { std_dev / avg } else { 0.0 },
    }
}

/// Mean `used / capacity` of one dimension; zero when it is unbounded.
pub fn dimension_utilization<V: ResourceView>(machines: &[V], dim: Dimension) -> f64 {
    let shares: Vec<f64> = machines
        .iter()
        .filter_map(|m| {
            let cap = m.capacity(dim);
            (cap.is_finite() && cap > 0.0).then(|| m.used(dim) / cap)
        })
        .collect();
    if shares.is_empty() {
        0.0
    } else {
        shares.iter().sum::<f64>() / shares.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{Machine, Reservation};
    use crate::resources::ResourceVector;
    use crate::task::Task;

    fn loaded(utils: &[f64]) -> Vec<Machine> {
        let mut machines = Machine::pool(utils.len(), ResourceVector::capacity(10.0, 10.0));
        for (i, u) in utils.iter().enumerate() {
            if *u > 0.0 {
                let t = Task::new(i as u64, u * 10.0, 1.0, "a");
                machines[i].reserve(Reservation::for_task(&t, 0.0, 0)).unwrap();
            }
        }
        machines
    }

    #[test]
    fn idle_cluster() {
        let s = cluster_utilization(&loaded(&[0.0, 0.0]));
        assert_eq!(s.avg, 0.0);
        assert_eq!(s.imbalance, 0.0);
        assert_eq!(s.fragmentation, 1.0);
    }

    #[test]
    fn mixed_load() {
        let s = cluster_utilization(&loaded(&[0.2, 0.6]));
        assert!((s.avg - 0.4).abs() < 1e-9);
        assert!((s.max - 0.6).abs() < 1e-9);
        assert!((s.std_dev - 0.2).abs() < 1e-9);
        assert!((s.fragmentation - 0.6).abs() < 1e-9);
        assert!((s.imbalance - 0.5).abs() < 1e-9);
    }

    #[test]
    fn per_dimension_mean() {
        let machines = loaded(&[0.2, 0.6]);
        assert!((dimension_utilization(&machines, Dimension::Cpu) - 0.4).abs() < 1e-9);
        assert!((dimension_utilization(&machines, Dimension::Mem) - 0.1).abs() < 1e-9);
        assert_eq!(dimension_utilization(&machines, Dimension::DiskIo), 0.0);
    }
}
