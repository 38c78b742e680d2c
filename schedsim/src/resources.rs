/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Fixed, explicitly-typed resource vectors.
//!
//! Every task demand and machine capacity is a [`ResourceVector`] with five
//! named slots.  The two primary dimensions (`cpu`, `mem`) are always
//! present; the three secondary ones are optional:
//!
//! | Dimension | Demand when unused | Capacity when unused |
//! |---|---|---|
//! | `cpu`, `mem` | `0.0` | required |
//! | `mem_bandwidth`, `net_bandwidth`, `disk_io` | `0.0` | `f64::INFINITY` (unbounded) |
//!
//! Unbounded dimensions never constrain placement and never contribute to
//! utilisation.

use serde::{Deserialize, Serialize};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Tolerance used for every comparison against capacity.
pub const EPS: f64 = 1e-9;

// ── Dimension ─────────────────────────────────────────────────────────────────

/// One resource dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Cpu,
    Mem,
    MemBandwidth,
    NetBandwidth,
    DiskIo,
}

impl Dimension {
    /// All dimensions, in vector order.
    pub const ALL: [Dimension; 5] = [
        Dimension::Cpu,
        Dimension::Mem,
        Dimension::MemBandwidth,
        Dimension::NetBandwidth,
        Dimension::DiskIo,
    ];
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Dimension::Cpu => "cpu",
            Dimension::Mem => "mem",
            Dimension::MemBandwidth => "mem_bandwidth",
            Dimension::NetBandwidth => "net_bandwidth",
            Dimension::DiskIo => "disk_io",
        };
        f.write_str(s)
    }
}

// ── ResourceVector ────────────────────────────────────────────────────────────

/// A per-dimension amount: a demand, a capacity, or a used total.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceVector {
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub mem: f64,
    #[serde(default)]
    pub mem_bandwidth: f64,
    #[serde(default)]
    pub net_bandwidth: f64,
    #[serde(default)]
    pub disk_io: f64,
}

impl ResourceVector {
    /// The all-zero vector.
    pub const ZERO: ResourceVector = ResourceVector {
        cpu: 0.0,
        mem: 0.0,
        mem_bandwidth: 0.0,
        net_bandwidth: 0.0,
        disk_io: 0.0,
    };

    /// A demand on the two primary dimensions only.
    pub fn demand(cpu: f64, mem: f64) -> Self {
        Self {
            cpu,
            mem,
            ..Self::ZERO
        }
    }

    /// A machine capacity with the secondary dimensions left unbounded.
    pub fn capacity(cpu: f64, mem: f64) -> Self {
        Self {
            cpu,
            mem,
            mem_bandwidth: f64::INFINITY,
            net_bandwidth: f64::INFINITY,
            disk_io: f64::INFINITY,
        }
    }

    pub fn get(&self, dim: Dimension) -> f64 {
        match dim {
            Dimension::Cpu => self.cpu,
            Dimension::Mem => self.mem,
            Dimension::MemBandwidth => self.mem_bandwidth,
            Dimension::NetBandwidth => self.net_bandwidth,
            Dimension::DiskIo => self.disk_io,
        }
    }

    pub fn get_mut(&mut self, dim: Dimension) -> &mut f64 {
        match dim {
            Dimension::Cpu => &mut self.cpu,
            Dimension::Mem => &mut self.mem,
            Dimension::MemBandwidth => &mut self.mem_bandwidth,
            Dimension::NetBandwidth => &mut self.net_bandwidth,
            Dimension::DiskIo => &mut self.disk_io,
        }
    }

    /// Component-wise sum.
    pub fn plus(&self, other: &ResourceVector) -> ResourceVector {
        let mut out = *self;
        for dim in Dimension::ALL {
            *out.get_mut(dim) += other.get(dim);
        }
        out
    }

    /// Component-wise difference, floored at zero.
    pub fn minus_floored(&self, other: &ResourceVector) -> ResourceVector {
        let mut out = *self;
        for dim in Dimension::ALL {
            let v = out.get_mut(dim);
            *v = (*v - other.get(dim)).max(0.0);
        }
        out
    }

    /// Clamp every component into `[0, limit]` of the matching dimension.
    pub fn clamped_to(&self, limit: &ResourceVector) -> ResourceVector {
        let mut out = *self;
        for dim in Dimension::ALL {
            let v = out.get_mut(dim);
            *v = v.clamp(0.0, limit.get(dim).max(0.0));
        }
        out
    }

    /// First dimension holding a negative or non-finite amount.
    ///
    /// Demands must be finite and non-negative in every dimension; a
    /// capacity may be `f64::INFINITY` but never NaN or negative.
    pub fn invalid_demand_dim(&self) -> Option<Dimension> {
        Dimension::ALL
            .into_iter()
            .find(|d| !self.get(*d).is_finite() || self.get(*d) < 0.0)
    }

    /// `true` when every component is within [`EPS`] of zero.
    pub fn is_zero(&self) -> bool {
        Dimension::ALL.iter().all(|d| self.get(*d).abs() <= EPS)
    }

    /// Dimensions of `self` treated as a capacity that actually bound usage.
    pub fn bounded_dims(&self) -> impl Iterator<Item = Dimension> + '_ {
        Dimension::ALL
            .into_iter()
            .filter(move |d| self.get(*d).is_finite() && self.get(*d) > 0.0)
    }

    /// `max_dim (self / capacity)` over bounded dimensions of `capacity`.
    pub fn dominant_share(&self, capacity: &ResourceVector) -> f64 {
        capacity
            .bounded_dims()
            .map(|d| self.get(d) / capacity.get(d))
            .fold(0.0, f64::max)
    }
}

// ── ResourceView ──────────────────────────────────────────────────────────────

/// The one interface shared by every "machine-like" value.
///
/// [`Machine`](crate::machine::Machine) implements it for the committed
/// cluster state; schedulers implement it for their per-tick scratch copies.
/// Metrics are generic over it.
pub trait ResourceView {
    fn capacity(&self, dim: Dimension) -> f64;

    fn used(&self, dim: Dimension) -> f64;

    /// Dominant share: max over bounded dimensions of `used / capacity`.
    fn utilization(&self) -> f64 {
        Dimension::ALL
            .iter()
            .filter_map(|d| {
                let cap = self.capacity(*d);
                (cap.is_finite() && cap > 0.0).then(|| self.used(*d) / cap)
            })
            .fold(0.0, f64::max)
    }

    fn free(&self, dim: Dimension) -> f64 {
        (self.capacity(dim) - self.used(dim)).max(0.0)
    }

    /// `true` when `demand` fits into the free capacity of every dimension.
    /// A negative or non-finite demand never fits.
    fn fits(&self, demand: &ResourceVector) -> bool {
        if demand.invalid_demand_dim().is_some() {
            return false;
        }
        Dimension::ALL.iter().all(|d| {
            let want = demand.get(*d);
            want <= EPS || want <= self.free(*d) + EPS
        })
    }

    /// Dominant share the machine would have after adding `demand`.
    fn utilization_with(&self, demand: &ResourceVector) -> f64 {
        Dimension::ALL
            .iter()
            .filter_map(|d| {
                let cap = self.capacity(*d);
                (cap.is_finite() && cap > 0.0).then(|| (self.used(*d) + demand.get(*d)) / cap)
            })
            .fold(0.0, f64::max)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
