/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Machine capacity accounting.
//!
//! A [`Machine`] is the single source of truth for what is running where.
//! Its `used` counters change only through [`Machine::reserve`] and
//! [`Machine::release`], and every release must name a task that currently
//! holds a [`Reservation`]:
//!
//! ```text
//! reserve(r)      used += r.demand     reservations.push(r)
//! release(task)   used -= r.demand     reservations.remove(task) → r
//! ```
//!
//! Invariant: `0 <= used[d] <= capacity[d]` for every dimension `d`, at all
//! times.

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::resources::{Dimension, ResourceVector, ResourceView, EPS};
use crate::task::{SloClass, Task, TaskId};

/// Index of a machine in the cluster pool.
pub type MachineId = usize;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Why a reserve/release request was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccountingError {
    #[error("task {task} needs {demand:.3} {dim} on machine {machine} but only {free:.3} is free")]
    CapacityExceeded {
        machine: MachineId,
        task: TaskId,
        dim: Dimension,
        demand: f64,
        free: f64,
    },

    #[error("task {task} has an invalid {dim} demand of {demand} for machine {machine}")]
    InvalidDemand {
        machine: MachineId,
        task: TaskId,
        dim: Dimension,
        demand: f64,
    },

    #[error("task {task} already holds a reservation on machine {machine}")]
    AlreadyReserved { machine: MachineId, task: TaskId },

    #[error("task {task} holds no reservation on machine {machine}")]
    NotReserved { machine: MachineId, task: TaskId },
}

// ── Reservation ───────────────────────────────────────────────────────────────

/// Everything needed to reverse one placement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reservation {
    pub task: TaskId,
    pub tenant: String,
    pub demand: ResourceVector,
    pub sensitivity: SloClass,
    /// Simulated time the placement was committed.
    pub start: f64,
    /// Scheduled completion time; `None` for tasks of unknown duration.
    pub end: Option<f64>,
    /// Placement generation, used to recognise stale completion events.
    pub epoch: u64,
}

impl Reservation {
    pub fn for_task(task: &Task, start: f64, epoch: u64) -> Self {
        Self {
            task: task.id,
            tenant: task.tenant.clone(),
            demand: task.demand,
            sensitivity: task.sensitivity,
            start,
            end: task.has_known_duration().then(|| start + task.duration),
            epoch,
        }
    }
}

// ── Machine ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Machine {
    id: MachineId,
    capacity: ResourceVector,
    used: ResourceVector,
    /// Active placements in commit order.
    reservations: Vec<Reservation>,
}

impl Machine {
    pub fn new(id: MachineId, capacity: ResourceVector) -> Self {
        Self {
            id,
            capacity,
            used: ResourceVector::ZERO,
            reservations: Vec::new(),
        }
    }

    /// `count` identical machines with ids `0..count`.
    pub fn pool(count: usize, capacity: ResourceVector) -> Vec<Machine> {
        (0..count).map(|id| Machine::new(id, capacity)).collect()
    }

    pub fn id(&self) -> MachineId {
        self.id
    }

    pub fn capacity_vector(&self) -> &ResourceVector {
        &self.capacity
    }

    pub fn used_vector(&self) -> &ResourceVector {
        &self.used
    }

    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    pub fn reservation(&self, task: TaskId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.task == task)
    }

    pub fn holds(&self, task: TaskId) -> bool {
        self.reservation(task).is_some()
    }

    pub fn task_count(&self) -> usize {
        self.reservations.len()
    }

    /// First dimension in which `demand` does not fit, as an error.
    /// Negative and non-finite amounts are refused outright.
    pub fn check_fit(&self, task: TaskId, demand: &ResourceVector) -> Result<(), AccountingError> {
        if let Some(dim) = demand.invalid_demand_dim() {
            return Err(AccountingError::InvalidDemand {
                machine: self.id,
                task,
                dim,
                demand: demand.get(dim),
            });
        }
        for dim in Dimension::ALL {
            let want = demand.get(dim);
            let free = self.free(dim);
            if want > EPS && want > free + EPS {
                return Err(AccountingError::CapacityExceeded {
                    machine: self.id,
                    task,
                    dim,
                    demand: want,
                    free,
                });
            }
        }
        Ok(())
    }

    /// Commit a reservation.  The machine is left untouched on error.
    pub fn reserve(&mut self, reservation: Reservation) -> Result<(), AccountingError> {
        if self.holds(reservation.task) {
            return Err(AccountingError::AlreadyReserved {
                machine: self.id,
                task: reservation.task,
            });
        }
        self.check_fit(reservation.task, &reservation.demand)?;

        // Within-EPS overshoot is absorbed by the clamp.
        self.used = self.used.plus(&reservation.demand).clamped_to(&self.capacity);
        self.reservations.push(reservation);
        Ok(())
    }

    /// Undo the reservation held by `task` and hand it back.
    pub fn release(&mut self, task: TaskId) -> Result<Reservation, AccountingError> {
        let pos = self
            .reservations
            .iter()
            .position(|r| r.task == task)
            .ok_or(AccountingError::NotReserved {
                machine: self.id,
                task,
            })?;
        let reservation = self.reservations.remove(pos);

        for dim in Dimension::ALL {
            let want = reservation.demand.get(dim);
            if want > self.used.get(dim) + EPS {
                warn!(
                    machine = self.id,
                    task = %task,
                    dim = %dim,
                    release = want,
                    used = self.used.get(dim),
                    "release exceeds reserved amount, clamping to zero"
                );
            }
        }
        self.used = self.used.minus_floored(&reservation.demand);
        if self.reservations.is_empty() {
            self.used = ResourceVector::ZERO;
        }
        Ok(reservation)
    }
}

impl ResourceView for Machine {
    fn capacity(&self, dim: Dimension) -> f64 {
        self.capacity.get(dim)
    }

    fn used(&self, dim: Dimension) -> f64 {
        self.used.get(dim)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
