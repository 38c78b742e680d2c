/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! ε-greedy tuner over a discrete grid of controller configurations.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

const TOP_K_GRID: [usize; 4] = [12, 24, 32, 48];
const BASE_LIMIT_GRID: [f64; 4] = [0.86, 0.88, 0.90, 0.92];
const SPILL_GRID: [f64; 4] = [0.04, 0.06, 0.08, 0.10];

/// One candidate configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arm {
    pub top_k: usize,
    pub base_limit: f64,
    pub spill_margin: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct ArmStats {
    pulls: u64,
    mean_reward: f64,
}

/// Reward blend: favour utilisation while risk is on target, favour safety
/// once it is not.
pub fn reward(util: f64, risk: f64, target: f64) -> f64 {
    if risk <= target {
        0.8 * util + 0.2 * (1.0 - risk)
    } else {
        0.8 * (1.0 - risk) + 0.2 * util
    }
}

pub struct BanditTuner {
    arms: Vec<Arm>,
    stats: Vec<ArmStats>,
    epsilon: f64,
    window: usize,
    rng: StdRng,
    active: usize,
    since_switch: usize,
}

impl BanditTuner {
    /// Tuner over the standard 4 × 4 × 4 grid.
    pub fn new(epsilon: f64, window: usize, seed: u64) -> Self {
        let mut arms = Vec::with_capacity(64);
        for &top_k in &TOP_K_GRID {
            for &base_limit in &BASE_LIMIT_GRID {
                for &spill_margin in &SPILL_GRID {
                    arms.push(Arm {
                        top_k,
                        base_limit,
                        spill_margin,
                    });
                }
            }
        }
        Self::from_arms(arms, epsilon, window, seed)
    }

    /// Tuner over a custom arm list; `None` when `arms` is empty.
    pub fn with_arms(arms: Vec<Arm>, epsilon: f64, window: usize, seed: u64) -> Option<Self> {
        if arms.is_empty() {
            return None;
        }
        Some(Self::from_arms(arms, epsilon, window, seed))
    }

    /// `arms` must not be empty.
    fn from_arms(arms: Vec<Arm>, epsilon: f64, window: usize, seed: u64) -> Self {
        let stats = vec![ArmStats::default(); arms.len()];
        let mut tuner = Self {
            arms,
            stats,
            epsilon,
            window: window.max(1),
            rng: StdRng::seed_from_u64(seed),
            active: 0,
            since_switch: 0,
        };
        tuner.active = tuner.pick();
        tuner
    }

    fn pick(&mut self) -> usize {
        if self.arms.len() > 1 && self.rng.gen::<f64>() < self.epsilon {
            return self.rng.gen_range(0..self.arms.len());
        }
        let mut best = 0;
        for (i, s) in self.stats.iter().enumerate() {
            if s.mean_reward > self.stats[best].mean_reward {
                best = i;
            }
        }
        best
    }

    pub fn active(&self) -> Arm {
        self.arms[self.active]
    }

    pub fn mean_reward(&self, arm: usize) -> f64 {
        self.stats[arm].mean_reward
    }

    /// Credit `reward` to the active arm.  Every `window` calls a new arm is
    /// drawn and returned.
    pub fn record(&mut self, reward: f64) -> Option<Arm> {
        let s = &mut self.stats[self.active];
        s.pulls += 1;
        s.mean_reward += (reward - s.mean_reward) / s.pulls as f64;

        self.since_switch += 1;
        if self.since_switch < self.window {
            return None;
        }
        self.since_switch = 0;
        self.active = self.pick();
        let arm = self.active();
        debug!(
            arm = self.active,
            top_k = arm.top_k,
            base_limit = arm.base_limit,
            spill_margin = arm.spill_margin,
            "bandit re-sampled arm"
        );
        Some(arm)
    }
}
