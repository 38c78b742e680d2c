/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-tenant credit ledger.
//!
//! Credit lives in `[0.1, 1.0]` and starts at `1.0`.
//!
//! | Event | Change | Bound |
//! |---|---|---|
//! | task failed | −0.05 | floor 0.1 |
//! | standard placement, util > 0.85 | −0.01 | floor 0.3 |
//! | standard placement, util < 0.70 | +0.01 | cap 1.0 |
//! | opportunistic placement, util > soft watermark | −0.02 | floor 0.1 |
//! | opportunistic placement, util < 0.60 | +0.01 | cap at threshold |

use std::collections::BTreeMap;

pub const MIN_CREDIT: f64 = 0.1;
pub const MAX_CREDIT: f64 = 1.0;

#[derive(Debug, Clone, Default)]
pub struct TenantLedger {
    credits: BTreeMap<String, f64>,
}

impl TenantLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credit(&self, tenant: &str) -> f64 {
        self.credits.get(tenant).copied().unwrap_or(MAX_CREDIT)
    }

    /// `true` when the tenant's traffic belongs in the opportunity pool.
    pub fn is_opportunistic(&self, tenant: &str, threshold: f64) -> bool {
        self.credit(tenant) < threshold
    }

    fn entry(&mut self, tenant: &str) -> &mut f64 {
        self.credits.entry(tenant.to_string()).or_insert(MAX_CREDIT)
    }

    pub fn penalize_failure(&mut self, tenant: &str) {
        let c = self.entry(tenant);
        *c = (*c - 0.05).max(MIN_CREDIT);
    }

    pub fn record_standard_placement(&mut self, tenant: &str, util_after: f64) {
        let c = self.entry(tenant);
        if util_after > 0.85 {
            *c = (*c - 0.01).max(0.3_f64.min(*c));
        } else if util_after < 0.70 {
            *c = (*c + 0.01).min(MAX_CREDIT);
        }
    }

    pub fn record_opportunity_placement(
        &mut self,
        tenant: &str,
        util_after: f64,
        soft_limit: f64,
        threshold: f64,
    ) {
        let c = self.entry(tenant);
        if util_after > soft_limit {
            *c = (*c - 0.02).max(MIN_CREDIT);
        } else if util_after < 0.60 {
            *c = (*c + 0.01).min(threshold.max(*c));
        }
    }
}
