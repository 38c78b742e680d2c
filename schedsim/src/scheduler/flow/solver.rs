/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Min-cost max-flow by successive shortest paths.
//!
//! Supplies are connected to a virtual super-source and demands to a
//! virtual super-sink; augmenting paths are found with Dijkstra on reduced
//! costs (Johnson potentials), which requires every arc cost to be
//! non-negative on input.  All arithmetic is integer.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use thiserror::Error;
use tracing::trace;

use super::graph::{ArcId, FlowGraph};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolverError {
    #[error("only {routed} of {required} units of supply could be routed")]
    Infeasible { routed: i64, required: i64 },

    #[error("supplies and demands do not cancel out (net {0})")]
    SupplyMismatch(i64),

    #[error("arc {arc} has negative cost {cost}")]
    NegativeCost { arc: ArcId, cost: i64 },

    #[error("node {node} violates flow conservation by {excess}")]
    Unbalanced { node: usize, excess: i64 },

    #[error("arc {arc} carries {flow} outside capacity {capacity}")]
    CapacityViolated { arc: ArcId, flow: i64, capacity: i64 },
}

// ── Residual network ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Edge {
    to: usize,
    cap: i64,
    cost: i64,
    /// Index of the paired reverse edge.
    rev: usize,
}

struct Residual {
    edges: Vec<Edge>,
    adj: Vec<Vec<usize>>,
}

impl Residual {
    fn with_nodes(n: usize) -> Self {
        Self {
            edges: Vec::new(),
            adj: vec![Vec::new(); n],
        }
    }

    /// Add `u → v` and its zero-capacity reverse; returns the forward index.
    fn add(&mut self, u: usize, v: usize, cap: i64, cost: i64) -> usize {
        let fwd = self.edges.len();
        self.edges.push(Edge {
            to: v,
            cap,
            cost,
            rev: fwd + 1,
        });
        self.edges.push(Edge {
            to: u,
            cap: 0,
            cost: -cost,
            rev: fwd,
        });
        self.adj[u].push(fwd);
        self.adj[v].push(fwd + 1);
        fwd
    }
}

// ── Solve ─────────────────────────────────────────────────────────────────────

/// Route every unit of supply at minimum cost and write the flows back into
/// `graph`.  Returns the total cost.
///
/// # Errors
/// [`SolverError::Infeasible`] when the network cannot carry all supply;
/// the graph's flows are left at zero in that case.
pub fn solve(graph: &mut FlowGraph) -> Result<i64, SolverError> {
    let n = graph.node_count();
    let source = n;
    let sink = n + 1;

    let net: i64 = graph.nodes().iter().map(|node| node.supply).sum();
    if net != 0 {
        return Err(SolverError::SupplyMismatch(net));
    }

    let mut res = Residual::with_nodes(n + 2);
    let mut forward = Vec::with_capacity(graph.arc_count());
    for (id, arc) in graph.arcs().iter().enumerate() {
        if arc.cost < 0 {
            return Err(SolverError::NegativeCost { arc: id, cost: arc.cost });
        }
        forward.push(res.add(arc.src, arc.dst, arc.capacity, arc.cost));
    }
    let mut required = 0;
    for (id, node) in graph.nodes().iter().enumerate() {
        if node.supply > 0 {
            res.add(source, id, node.supply, 0);
            required += node.supply;
        } else if node.supply < 0 {
            res.add(id, sink, -node.supply, 0);
        }
    }

    let mut potential = vec![0i64; n + 2];
    let mut dist = vec![i64::MAX; n + 2];
    let mut prev_edge = vec![usize::MAX; n + 2];
    let mut routed = 0;
    let mut cost = 0;

    while routed < required {
        // Dijkstra on reduced costs.
        dist.fill(i64::MAX);
        prev_edge.fill(usize::MAX);
        dist[source] = 0;
        let mut heap = BinaryHeap::new();
        heap.push(Reverse((0i64, source)));
        while let Some(Reverse((d, u))) = heap.pop() {
            if d > dist[u] {
                continue;
            }
            for &e in &res.adj[u] {
                let edge = &res.edges[e];
                if edge.cap <= 0 {
                    continue;
                }
                let reduced = edge.cost + potential[u] - potential[edge.to];
                let nd = d + reduced;
                if nd < dist[edge.to] {
                    dist[edge.to] = nd;
                    prev_edge[edge.to] = e;
                    heap.push(Reverse((nd, edge.to)));
                }
            }
        }
        if dist[sink] == i64::MAX {
            break;
        }
        for v in 0..n + 2 {
            if dist[v] != i64::MAX {
                potential[v] += dist[v];
            }
        }

        // Bottleneck along the path, then augment.
        let mut push = required - routed;
        let mut v = sink;
        while v != source {
            let e = prev_edge[v];
            push = push.min(res.edges[e].cap);
            v = res.edges[res.edges[e].rev].to;
        }
        let mut v = sink;
        while v != source {
            let e = prev_edge[v];
            let rev = res.edges[e].rev;
            res.edges[e].cap -= push;
            res.edges[rev].cap += push;
            cost += push * res.edges[e].cost;
            v = res.edges[rev].to;
        }
        routed += push;
    }

    if routed < required {
        return Err(SolverError::Infeasible { routed, required });
    }

    for (arc, &fwd) in forward.iter().enumerate() {
        let rev = res.edges[fwd].rev;
        graph.set_flow(arc, res.edges[rev].cap);
    }
    graph.check_conservation()?;
    trace!(routed = routed, cost = cost, "min-cost flow solved");
    Ok(cost)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::flow::graph::NodeKind;
    use crate::task::TaskId;
    use proptest::prelude::*;

    #[test]
    fn picks_cheaper_of_two_parallel_paths() {
        let mut g = FlowGraph::new();
        let s = g.add_node(NodeKind::Task(TaskId(1)), 1);
        let a = g.add_node(NodeKind::Machine(0), 0);
        let b = g.add_node(NodeKind::Machine(1), 0);
        let t = g.add_node(NodeKind::Sink, -1);
        let sa = g.add_arc(s, a, 1, 5);
        let sb = g.add_arc(s, b, 1, 2);
        g.add_arc(a, t, 1, 0);
        g.add_arc(b, t, 1, 0);

        assert_eq!(solve(&mut g).unwrap(), 2);
        assert_eq!(g.arc(sa).flow, 0);
        assert_eq!(g.arc(sb).flow, 1);
    }

    #[test]
    fn reroutes_through_reverse_edges_for_global_optimum() {
        // Greedy would send task 1 through the cheap shared unit and force
        // task 2 onto the expensive one; the optimum swaps them.
        let mut g = FlowGraph::new();
        let t1 = g.add_node(NodeKind::Task(TaskId(1)), 1);
        let t2 = g.add_node(NodeKind::Task(TaskId(2)), 1);
        let u1 = g.add_node(NodeKind::ProcessingUnit { machine: 0, unit: 0 }, 0);
        let u2 = g.add_node(NodeKind::ProcessingUnit { machine: 0, unit: 1 }, 0);
        let sink = g.add_node(NodeKind::Sink, -2);
        g.add_arc(t1, u1, 1, 1);
        g.add_arc(t1, u2, 1, 2);
        g.add_arc(t2, u1, 1, 1);
        g.add_arc(t2, u2, 1, 100);
        g.add_arc(u1, sink, 1, 0);
        g.add_arc(u2, sink, 1, 0);

        assert_eq!(solve(&mut g).unwrap(), 3);
        g.check_conservation().unwrap();
    }

    #[test]
    fn insufficient_capacity_is_infeasible() {
        let mut g = FlowGraph::new();
        let s = g.add_node(NodeKind::Task(TaskId(1)), 2);
        let t = g.add_node(NodeKind::Sink, -2);
        g.add_arc(s, t, 1, 0);
        assert_eq!(
            solve(&mut g),
            Err(SolverError::Infeasible {
                routed: 1,
                required: 2
            })
        );
        assert!(g.arcs().iter().all(|a| a.flow == 0));
    }

    #[test]
    fn unbalanced_supplies_are_refused() {
        let mut g = FlowGraph::new();
        g.add_node(NodeKind::Task(TaskId(1)), 1);
        g.add_node(NodeKind::Sink, -2);
        assert_eq!(solve(&mut g), Err(SolverError::SupplyMismatch(-1)));
    }

    #[test]
    fn negative_costs_are_refused() {
        let mut g = FlowGraph::new();
        let s = g.add_node(NodeKind::Task(TaskId(1)), 1);
        let t = g.add_node(NodeKind::Sink, -1);
        g.add_arc(s, t, 1, -1);
        assert!(matches!(solve(&mut g), Err(SolverError::NegativeCost { .. })));
    }

    proptest! {
        /// Random bipartite task → unit networks with an overflow path always
        /// solve and conserve flow at every node.
        #[test]
        fn solved_networks_conserve_flow(
            tasks in 1usize..12,
            units in 1usize..6,
            costs in proptest::collection::vec(0i64..50, 72),
            links in proptest::collection::vec(any::<bool>(), 72),
        ) {
            let mut g = FlowGraph::new();
            let sink = g.add_node(NodeKind::Sink, -(tasks as i64));
            let overflow = g.add_node(NodeKind::Unscheduled, 0);
            g.add_arc(overflow, sink, tasks as i64, 0);
            let unit_nodes: Vec<_> = (0..units)
                .map(|u| {
                    let n = g.add_node(NodeKind::ProcessingUnit { machine: 0, unit: u }, 0);
                    g.add_arc(n, sink, 1, 0);
                    n
                })
                .collect();
            for t in 0..tasks {
                let node = g.add_node(NodeKind::Task(TaskId(t as u64)), 1);
                g.add_arc(node, overflow, 1, 1_000);
                for (u, &unit) in unit_nodes.iter().enumerate() {
                    let k = t * 6 + u;
                    if links[k] {
                        g.add_arc(node, unit, 1, costs[k]);
                    }
                }
            }
            prop_assert!(solve(&mut g).is_ok());
            prop_assert!(g.check_conservation().is_ok());
        }
    }
}
