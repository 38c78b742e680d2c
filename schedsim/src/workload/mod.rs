/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Task sources for the simulator.
//!
//! The driver only needs an ordered `Vec<Task>`.  It comes either from a
//! YAML task file:
//!
//! ```yaml
//! tasks:
//!   - id: 1
//!     demand: { cpu: 1.0, mem: 1.0 }
//!     tenant: a
//!     arrival: 0.0
//!     duration: 600.0
//!     sensitivity: high
//! ```
//!
//! or from [`SyntheticWorkload`], a seeded random generator.

use std::path::Path;

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::resources::ResourceVector;
use crate::task::{SloClass, Task, TaskId};

#[derive(Debug, Default, Serialize, Deserialize)]
struct TaskFile {
    #[serde(default)]
    tasks: Vec<Task>,
}

/// Read a task list from `path`.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed, or if any task
/// carries a negative or non-finite demand.
pub fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot open workload file: {}", path.display()))?;
    let file: TaskFile = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse workload file: {}", path.display()))?;
    for task in &file.tasks {
        if let Some(dim) = task.invalid_demand() {
            bail!(
                "Task {} in {} has an invalid {} demand of {}",
                task.id,
                path.display(),
                dim,
                task.demand.get(dim)
            );
        }
    }
    info!(tasks = file.tasks.len(), "Loaded workload from: {}", path.display());
    Ok(file.tasks)
}

/// Write `tasks` to `path` in the format [`load_tasks`] reads.
pub fn write_tasks(path: &Path, tasks: &[Task]) -> Result<()> {
    let yaml = serde_yaml::to_string(&TaskFile {
        tasks: tasks.to_vec(),
    })
    .context("Failed to serialise workload")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Cannot write workload file: {}", path.display()))?;
    Ok(())
}

// ── Synthetic generator ───────────────────────────────────────────────────────

/// Parameters of a random workload.  Ranges are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticWorkload {
    pub tasks: usize,
    pub tenants: usize,
    pub cpu: (f64, f64),
    pub mem: (f64, f64),
    /// Gap between consecutive arrivals, in seconds.
    pub inter_arrival: (f64, f64),
    pub duration: (f64, f64),
    /// Fraction of tasks with unknown duration (`0`).
    pub unknown_duration_ratio: f64,
    pub high_sensitivity_ratio: f64,
    pub seed: u64,
}

impl Default for SyntheticWorkload {
    fn default() -> Self {
        Self {
            tasks: 1000,
            tenants: 4,
            cpu: (0.1, 4.0),
            mem: (0.1, 4.0),
            inter_arrival: (0.0, 60.0),
            duration: (300.0, 7200.0),
            unknown_duration_ratio: 0.0,
            high_sensitivity_ratio: 0.3,
            seed: 1024,
        }
    }
}

fn sample(rng: &mut StdRng, (lo, hi): (f64, f64)) -> f64 {
    if hi > lo {
        rng.gen_range(lo..=hi)
    } else {
        lo
    }
}

impl SyntheticWorkload {
    /// Reject ranges that would produce negative or non-finite values.
    pub fn validate(&self) -> Result<()> {
        for (name, (lo, hi)) in [
            ("cpu", self.cpu),
            ("mem", self.mem),
            ("inter_arrival", self.inter_arrival),
            ("duration", self.duration),
        ] {
            if !lo.is_finite() || !hi.is_finite() || lo < 0.0 || lo > hi {
                bail!("Synthetic workload range '{name}' is invalid: [{lo}, {hi}]");
            }
        }
        Ok(())
    }

    /// Generate the task list.  Same parameters, same output.
    pub fn generate(&self) -> Vec<Task> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let tenants = self.tenants.max(1);
        let mut time = 0.0;
        let mut out = Vec::with_capacity(self.tasks);

        for id in 0..self.tasks as u64 {
            let tenant = format!("tenant-{}", rng.gen_range(0..tenants));
            let duration = if rng.gen_bool(self.unknown_duration_ratio.clamp(0.0, 1.0)) {
                0.0
            } else {
                sample(&mut rng, self.duration)
            };
            let sensitivity = if rng.gen_bool(self.high_sensitivity_ratio.clamp(0.0, 1.0)) {
                SloClass::High
            } else {
                SloClass::Low
            };
            out.push(Task {
                id: TaskId(id),
                demand: ResourceVector::demand(sample(&mut rng, self.cpu), sample(&mut rng, self.mem)),
                tenant,
                arrival: time,
                duration,
                sensitivity,
                priority: 0,
            });
            time += sample(&mut rng, self.inter_arrival);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn load_partial_records() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            "tasks:\n  - id: 1\n    demand: {{ cpu: 1.0, mem: 2.0 }}\n    tenant: a\n  - id: 2\n    sensitivity: high\n    duration: 60"
        )
        .unwrap();
        let tasks = load_tasks(f.path()).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].demand.mem, 2.0);
        assert_eq!(tasks[1].sensitivity, SloClass::High);
        assert!(tasks[1].has_known_duration());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_tasks(Path::new("/nonexistent/tasks.yaml")).unwrap_err();
        assert!(format!("{err:#}").contains("Cannot open workload file"));
    }

    #[test]
    fn negative_demand_in_file_is_an_error() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            "tasks:\n  - id: 1\n    demand: {{ cpu: 1.0, mem: 1.0 }}\n  - id: 2\n    demand: {{ cpu: -1.0, mem: 0.1 }}"
        )
        .unwrap();
        let err = load_tasks(f.path()).unwrap_err();
        assert!(format!("{err:#}").contains("Task 2"), "{err:#}");
        assert!(format!("{err:#}").contains("invalid cpu demand"), "{err:#}");
    }

    #[test]
    fn invalid_generator_ranges_are_refused() {
        assert!(SyntheticWorkload::default().validate().is_ok());
        let negative = SyntheticWorkload {
            cpu: (-1.0, 2.0),
            ..SyntheticWorkload::default()
        };
        assert!(negative.validate().is_err());
        let inverted = SyntheticWorkload {
            mem: (3.0, 1.0),
            ..SyntheticWorkload::default()
        };
        assert!(inverted.validate().is_err());
        let infinite = SyntheticWorkload {
            duration: (0.0, f64::INFINITY),
            ..SyntheticWorkload::default()
        };
        assert!(infinite.validate().is_err());
    }

    #[test]
    fn generated_workload_survives_a_file() {
        let tasks = SyntheticWorkload {
            tasks: 20,
            ..SyntheticWorkload::default()
        }
        .generate();
        let f = NamedTempFile::new().unwrap();
        write_tasks(f.path(), &tasks).unwrap();
        assert_eq!(load_tasks(f.path()).unwrap(), tasks);
    }

    #[test]
    fn generator_is_seeded_and_bounded() {
        let w = SyntheticWorkload {
            tasks: 200,
            unknown_duration_ratio: 0.2,
            ..SyntheticWorkload::default()
        };
        let a = w.generate();
        assert_eq!(a, w.generate());
        assert!(a.windows(2).all(|p| p[0].arrival <= p[1].arrival));
        assert!(a.iter().all(|t| (0.1..=4.0).contains(&t.demand.cpu)));
        assert!(a.iter().any(|t| !t.has_known_duration()));
        assert!(a.iter().any(|t| t.is_high_sensitivity()));

        let other = SyntheticWorkload { seed: 7, ..w }.generate();
        assert_ne!(a, other);
    }
}
