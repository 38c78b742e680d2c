/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Windowed proportional controller.
//!
//! Every `window` placements the mean predicted risk of the window is
//! compared with the target.  The error moves the base limit and the spill
//! margin by one gain each; there is no integral or derivative term.

use tracing::info;

use crate::config::AdmissionConfig;

/// Tunable admission parameters shared by the controller and the bandit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Knobs {
    pub base_limit: f64,
    pub spill_margin: f64,
    pub top_k: usize,
    pub opportunity_hard_limit: f64,
}

impl Knobs {
    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self {
            base_limit: config.base_limit,
            spill_margin: config.spill_margin,
            top_k: config.top_k,
            opportunity_hard_limit: config.opportunity_hard_limit,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProportionalController {
    sum: f64,
    count: usize,
}

impl ProportionalController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one risk sample; adjusts `knobs` and returns the window mean when
    /// the window closes.
    pub fn record(&mut self, risk: f64, knobs: &mut Knobs, config: &AdmissionConfig) -> Option<f64> {
        self.sum += risk;
        self.count += 1;
        if self.count < config.control_window {
            return None;
        }
        let avg = self.sum / self.count as f64;
        self.sum = 0.0;
        self.count = 0;

        let error = avg - config.slo_target_risk;
        let (lim_lo, lim_hi) = config.limit_bounds;
        let (sp_lo, sp_hi) = config.spill_bounds;
        let (k_lo, k_hi) = config.top_k_bounds;

        knobs.base_limit = (knobs.base_limit - config.kp_limit * error).clamp(lim_lo, lim_hi);
        knobs.spill_margin = (knobs.spill_margin - config.kp_spill * error).clamp(sp_lo, sp_hi);
        if error > 0.0 {
            knobs.opportunity_hard_limit =
                (knobs.opportunity_hard_limit - 0.01).max(config.opportunity_soft_limit);
            knobs.top_k = (knobs.top_k + 2).min(k_hi);
        } else {
            knobs.top_k = knobs.top_k.saturating_sub(1).max(k_lo);
        }

        info!(
            window_risk = avg,
            target = config.slo_target_risk,
            base_limit = knobs.base_limit,
            spill_margin = knobs.spill_margin,
            top_k = knobs.top_k,
            "admission controller adjusted"
        );
        Some(avg)
    }
}
