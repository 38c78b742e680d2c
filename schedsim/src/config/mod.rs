//! Simulation configuration loading and validation.
//!
//! One [`SimulationConfig`] is built per run and passed explicitly to the
//! driver and to every scheduler.  There are no environment-variable knobs
//! and no process-wide state.
//!
//! The expected YAML structure (every section and every field is optional):
//! ```yaml
//! cluster:
//!   machines: 114
//!   capacity: { cpu: 11.0, mem: 11.0 }
//!   processing_units: 16
//! simulation:
//!   batch_step_seconds: 300
//!   max_scheduling_rounds: 1000000
//!   seed: 1024
//!   retry: { max_attempts: 2 }
//! drf:
//!   tenant_weights: { batch: 1.0, online: 2.0 }
//!   credit_aware: false
//! tetris:
//!   exponent: 2.0
//! flow:
//!   busy_unit_offset: 100
//! admission:
//!   slo_target_risk: 0.06
//!   credit_threshold: 0.45
//!   bandit_epsilon: 0.5
//!   bandit_window: 1000
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::machine::Machine;
use crate::resources::{Dimension, ResourceVector};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Unrecoverable configuration problems.  These are the only errors a
/// simulation run surfaces to its caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("cluster must contain at least one machine")]
    NoMachines,

    #[error("machine capacity for {dim} must be positive, got {value}")]
    InvalidCapacity { dim: Dimension, value: f64 },

    #[error("batch step must be a positive number of seconds, got {0}")]
    InvalidBatchStep(f64),

    #[error("machines need at least one processing unit")]
    NoProcessingUnits,

    #[error("'{name}' bounds are inverted or out of range: [{low}, {high}]")]
    InvalidRange { name: &'static str, low: f64, high: f64 },

    #[error("'{name}' must lie in [0, 1], got {value}")]
    InvalidFraction { name: &'static str, value: f64 },

    #[error("tenant '{tenant}' has non-positive weight {weight}")]
    InvalidWeight { tenant: String, weight: f64 },

    #[error("'{name}' must be a finite non-negative number, got {value}")]
    InvalidCoefficient { name: &'static str, value: f64 },

    #[error("'{name}' must be at least 1")]
    ZeroWindow { name: &'static str },

    #[error("unknown scheduler: '{0}' (valid: drf, tetris, flow, admission)")]
    UnknownScheduler(String),
}

// ── Sections ──────────────────────────────────────────────────────────────────

/// Per-machine capacity.  Secondary dimensions are unbounded when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityConfig {
    pub cpu: f64,
    pub mem: f64,
    pub mem_bandwidth: Option<f64>,
    pub net_bandwidth: Option<f64>,
    pub disk_io: Option<f64>,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            cpu: 11.0,
            mem: 11.0,
            mem_bandwidth: None,
            net_bandwidth: None,
            disk_io: None,
        }
    }
}

impl CapacityConfig {
    pub fn to_vector(&self) -> ResourceVector {
        ResourceVector {
            mem_bandwidth: self.mem_bandwidth.unwrap_or(f64::INFINITY),
            net_bandwidth: self.net_bandwidth.unwrap_or(f64::INFINITY),
            disk_io: self.disk_io.unwrap_or(f64::INFINITY),
            ..ResourceVector::demand(self.cpu, self.mem)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Pool size.
    pub machines: usize,
    pub capacity: CapacityConfig,
    /// Processing units per machine, as modelled by the flow scheduler.
    pub processing_units: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            machines: 114,
            capacity: CapacityConfig::default(),
            processing_units: 16,
        }
    }
}

/// Driver-side retry policy for tasks a scheduler explicitly rejects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Resubmissions allowed before a rejected task counts as failed.
    pub max_attempts: u32,
    /// Delay before a resubmission; one batch step when absent.
    pub delay_seconds: Option<f64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            delay_seconds: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Tick granularity.
    pub batch_step_seconds: f64,
    pub max_scheduling_rounds: u64,
    /// Stop once simulated time passes this point.
    pub max_sim_time: Option<f64>,
    pub seed: u64,
    pub retry: RetryConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_step_seconds: 300.0,
            max_scheduling_rounds: 1_000_000,
            max_sim_time: None,
            seed: 1024,
            retry: RetryConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn retry_delay(&self) -> f64 {
        self.retry.delay_seconds.unwrap_or(self.batch_step_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrfConfig {
    /// Tenants absent from the map have weight `1.0`.
    pub tenant_weights: BTreeMap<String, f64>,
    /// Scale each tenant's weight by its credit, sharpened by cluster risk.
    pub credit_aware: bool,
    /// How strongly global risk above its seed sharpens credit weights.
    pub risk_gain: f64,
    pub risk_ema_alpha: f64,
    pub initial_risk: f64,
}

impl Default for DrfConfig {
    fn default() -> Self {
        Self {
            tenant_weights: BTreeMap::new(),
            credit_aware: false,
            risk_gain: 2.0,
            risk_ema_alpha: 0.2,
            initial_risk: 0.02,
        }
    }
}

impl DrfConfig {
    pub fn weight(&self, tenant: &str) -> f64 {
        self.tenant_weights.get(tenant).copied().unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TetrisConfig {
    /// Packing exponent `k`.
    pub exponent: f64,
    /// Round-robin merge of high- and low-sensitivity tasks within a tick.
    pub interleave_sensitive: bool,
}

impl Default for TetrisConfig {
    fn default() -> Self {
        Self {
            exponent: 2.0,
            interleave_sensitive: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Cost added per task already running on a unit or machine.
    pub busy_unit_offset: i64,
    /// Cost of leaving a task unscheduled for this tick.
    pub unscheduled_cost: i64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            busy_unit_offset: 100,
            unscheduled_cost: 1_000_000,
        }
    }
}

/// Knobs of the risk-aware admission controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    // Candidate scoring: α·risk + β·util_after + γ·packing delta.
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,

    pub slo_target_risk: f64,
    pub risk_ema_alpha: f64,
    pub initial_risk: f64,

    pub credit_threshold: f64,
    pub opportunity_soft_limit: f64,
    pub opportunity_hard_limit: f64,
    pub max_opportunity_share: f64,

    pub base_limit: f64,
    pub limit_bounds: (f64, f64),
    /// Per-machine limit penalty per unit of risk above 0.10.
    pub k_machine: f64,
    pub spill_margin: f64,
    pub spill_bounds: (f64, f64),
    pub top_k: usize,
    pub top_k_bounds: (usize, usize),

    pub control_window: usize,
    pub kp_limit: f64,
    pub kp_spill: f64,

    /// Eviction cap for high-sensitivity or big tasks; others get one.
    pub max_evictions: usize,
    pub victim_max_cpu: f64,
    pub rescue_util_ceiling: f64,
    pub hard_preempt_util: f64,

    pub defrag_period: usize,
    pub defrag_util: f64,
    pub defrag_min_free_cpu: f64,

    /// When off, the controller runs alone from `base_limit`,
    /// `spill_margin` and `top_k`.
    pub enable_bandit: bool,
    pub bandit_epsilon: f64,
    pub bandit_window: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            alpha: 0.7,
            beta: 0.2,
            gamma: 0.1,
            slo_target_risk: 0.06,
            risk_ema_alpha: 0.2,
            initial_risk: 0.02,
            credit_threshold: 0.45,
            opportunity_soft_limit: 0.88,
            opportunity_hard_limit: 0.90,
            max_opportunity_share: 0.35,
            base_limit: 0.90,
            limit_bounds: (0.75, 0.98),
            k_machine: 0.10,
            spill_margin: 0.06,
            spill_bounds: (0.0, 0.08),
            top_k: 24,
            top_k_bounds: (4, 48),
            control_window: 2000,
            kp_limit: 0.01,
            kp_spill: 0.01,
            max_evictions: 2,
            victim_max_cpu: 0.5,
            rescue_util_ceiling: 0.97,
            hard_preempt_util: 0.95,
            defrag_period: 1000,
            defrag_util: 0.90,
            defrag_min_free_cpu: 0.8,
            enable_bandit: true,
            bandit_epsilon: 0.5,
            bandit_window: 1000,
        }
    }
}

// ── SimulationConfig ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub cluster: ClusterConfig,
    pub simulation: RunConfig,
    pub drf: DrfConfig,
    pub tetris: TetrisConfig,
    pub flow: FlowConfig,
    pub admission: AdmissionConfig,
}

impl SimulationConfig {
    /// Parse and validate the YAML file at `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid YAML, or
    /// fails [`validate`](Self::validate).
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading simulation configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let config: SimulationConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;

        debug!(
            machines = config.cluster.machines,
            cpu = config.cluster.capacity.cpu,
            mem = config.cluster.capacity.mem,
            batch_step = config.simulation.batch_step_seconds,
            seed = config.simulation.seed,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Reject configurations no simulation can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cluster = &self.cluster;
        if cluster.machines == 0 {
            return Err(ConfigError::NoMachines);
        }
        if cluster.processing_units == 0 {
            return Err(ConfigError::NoProcessingUnits);
        }
        let capacity = cluster.capacity.to_vector();
        for dim in Dimension::ALL {
            let value = capacity.get(dim);
            if value.is_nan() || value <= 0.0 {
                return Err(ConfigError::InvalidCapacity { dim, value });
            }
        }

        let step = self.simulation.batch_step_seconds;
        if !step.is_finite() || step <= 0.0 {
            return Err(ConfigError::InvalidBatchStep(step));
        }

        for (tenant, weight) in &self.drf.tenant_weights {
            if *weight <= 0.0 || weight.is_nan() {
                return Err(ConfigError::InvalidWeight {
                    tenant: tenant.clone(),
                    weight: *weight,
                });
            }
        }

        let drf = &self.drf;
        check_coefficient("drf.risk_gain", drf.risk_gain)?;
        for (name, value) in [
            ("drf.risk_ema_alpha", drf.risk_ema_alpha),
            ("drf.initial_risk", drf.initial_risk),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidFraction { name, value });
            }
        }

        let exponent = self.tetris.exponent;
        if !exponent.is_finite() || exponent <= 0.0 {
            return Err(ConfigError::InvalidCoefficient {
                name: "tetris.exponent",
                value: exponent,
            });
        }

        let a = &self.admission;
        check_coefficient("alpha", a.alpha)?;
        check_coefficient("beta", a.beta)?;
        check_coefficient("gamma", a.gamma)?;
        check_range("limit_bounds", a.limit_bounds)?;
        check_range("spill_bounds", a.spill_bounds)?;
        let (k_lo, k_hi) = a.top_k_bounds;
        if k_lo == 0 || k_lo > k_hi {
            return Err(ConfigError::InvalidRange {
                name: "top_k_bounds",
                low: k_lo as f64,
                high: k_hi as f64,
            });
        }
        for (name, value) in [
            ("slo_target_risk", a.slo_target_risk),
            ("credit_threshold", a.credit_threshold),
            ("max_opportunity_share", a.max_opportunity_share),
            ("risk_ema_alpha", a.risk_ema_alpha),
            ("bandit_epsilon", a.bandit_epsilon),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidFraction { name, value });
            }
        }
        for (name, value) in [
            ("control_window", a.control_window),
            ("bandit_window", a.bandit_window),
            ("defrag_period", a.defrag_period),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroWindow { name });
            }
        }
        Ok(())
    }

    /// Fresh machine pool described by the `cluster` section.
    pub fn build_machines(&self) -> Vec<Machine> {
        Machine::pool(self.cluster.machines, self.cluster.capacity.to_vector())
    }
}

fn check_coefficient(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidCoefficient { name, value });
    }
    Ok(())
}

fn check_range(name: &'static str, (low, high): (f64, f64)) -> Result<(), ConfigError> {
    if low.is_nan() || high.is_nan() || low > high || low < 0.0 || high > 1.0 {
        return Err(ConfigError::InvalidRange { name, low, high });
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
