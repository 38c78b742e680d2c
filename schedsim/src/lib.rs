/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! schedsim – discrete-event cluster scheduling simulator
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── config/      – YAML simulation configuration + validation
//! ├── resources    – Dimension / ResourceVector / ResourceView
//! ├── task         – immutable task records
//! ├── machine      – capacity accounting (paired reserve/release)
//! ├── engine/      – (timestamp, sequence) ordered event queue
//! ├── scheduler/   – plugin contract + four algorithms
//! │   ├── drf        – dominant-resource fairness allocator
//! │   ├── tetris     – multi-dimensional packing scorer
//! │   ├── flow/      – min-cost max-flow network scheduler
//! │   └── admission/ – risk-aware admission controller
//! ├── sim/         – simulation driver + time-weighted sampling
//! ├── metrics      – cluster utilisation statistics
//! └── workload/    – task file loader + synthetic generator
//! ```

pub mod config;
pub mod engine;
pub mod machine;
pub mod metrics;
pub mod resources;
pub mod scheduler;
pub mod sim;
pub mod task;
pub mod workload;
