/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Time-ordered event engine.
//!
//! [`EventQueue`] is a binary min-heap keyed by an explicit
//! [`EventKey`] `(timestamp, sequence)`.  Payloads never take part in the
//! ordering, so two events at the same timestamp always come back in the
//! order they were pushed.
//!
//! ```text
//! push(t=5, A)  seq 0 ─┐
//! push(t=3, B)  seq 1 ─┼─►  pop → B(3,1)  A(5,0)  C(5,2)
//! push(t=5, C)  seq 2 ─┘
//! ```
//!
//! Popping is destructive and monotonic: the queue remembers the latest
//! timestamp it handed out and clamps any later push that would land before
//! it.

pub mod event;

pub use event::{Event, EventKey, EventKind, EventPayload};

use std::collections::BinaryHeap;

use tracing::warn;

// ── Heap entry ────────────────────────────────────────────────────────────────

/// Heap wrapper whose ordering is the reversed [`EventKey`] only.
#[derive(Debug)]
struct Entry {
    key: EventKey,
    payload: EventPayload,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; reverse for earliest-first.
        other.key.cmp(&self.key)
    }
}

// ── EventQueue ────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct EventQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
    /// Timestamp of the most recently popped event.
    watermark: f64,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
            watermark: f64::NEG_INFINITY,
        }
    }
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `payload` at `time` and return the sequence number assigned.
    pub fn push(&mut self, time: f64, payload: EventPayload) -> u64 {
        let time = if time < self.watermark {
            warn!(
                requested = time,
                watermark = self.watermark,
                kind = ?payload.kind(),
                "event pushed into the past, clamping to current time"
            );
            self.watermark
        } else {
            time
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            key: EventKey { time, seq },
            payload,
        });
        seq
    }

    /// Pop the earliest event if its timestamp is `<= at_or_before`.
    pub fn pop_ready(&mut self, at_or_before: f64) -> Option<Event> {
        if self.heap.peek()?.key.time > at_or_before {
            return None;
        }
        let entry = self.heap.pop()?;
        self.watermark = self.watermark.max(entry.key.time);
        Some(Event {
            time: entry.key.time,
            seq: entry.key.seq,
            payload: entry.payload,
        })
    }

    /// Timestamp of the next event, or `+inf` when the queue is empty.
    pub fn peek_time(&self) -> f64 {
        self.heap.peek().map_or(f64::INFINITY, |e| e.key.time)
    }

    /// Termination check for the driver loop.
    ///
    /// `true` when the round guard or the time guard has tripped, or when
    /// there is nothing left to do: no queued events and nothing
    /// `in_flight` (running tasks with a known end plus pending tasks).
    pub fn has_completed(
        &self,
        tick: u64,
        max_ticks: u64,
        now: f64,
        max_time: Option<f64>,
        in_flight: usize,
    ) -> bool {
        if tick >= max_ticks {
            return true;
        }
        if max_time.is_some_and(|limit| now > limit) {
            return true;
        }
        self.heap.is_empty() && in_flight == 0
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
