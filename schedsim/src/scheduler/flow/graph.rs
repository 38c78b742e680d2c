/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Flat-array flow network.
//!
//! Nodes and arcs live in two `Vec`s and refer to each other by index, so
//! the graph has no ownership cycles and can be rebuilt cheaply each tick.

use crate::machine::MachineId;
use crate::task::TaskId;

use super::SolverError;

pub type NodeId = usize;
pub type ArcId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Task(TaskId),
    /// Overflow path for tasks left out this tick.
    Unscheduled,
    /// Cluster-wide equivalence class every task can reach.
    ClusterAggregator,
    Machine(MachineId),
    ProcessingUnit { machine: MachineId, unit: usize },
    Sink,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    /// Positive for sources, negative for the sink, zero otherwise.
    pub supply: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arc {
    pub src: NodeId,
    pub dst: NodeId,
    pub capacity: i64,
    pub cost: i64,
    pub flow: i64,
}

#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    nodes: Vec<Node>,
    arcs: Vec<Arc>,
    outgoing: Vec<Vec<ArcId>>,
    incoming: Vec<Vec<ArcId>>,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, kind: NodeKind, supply: i64) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node { kind, supply });
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        id
    }

    pub fn add_arc(&mut self, src: NodeId, dst: NodeId, capacity: i64, cost: i64) -> ArcId {
        let id = self.arcs.len();
        self.arcs.push(Arc {
            src,
            dst,
            capacity,
            cost,
            flow: 0,
        });
        self.outgoing[src].push(id);
        self.incoming[dst].push(id);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn arc(&self, id: ArcId) -> &Arc {
        &self.arcs[id]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn arcs(&self) -> &[Arc] {
        &self.arcs
    }

    pub fn outgoing(&self, node: NodeId) -> &[ArcId] {
        &self.outgoing[node]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn arc_count(&self) -> usize {
        self.arcs.len()
    }

    pub(super) fn set_flow(&mut self, arc: ArcId, flow: i64) {
        self.arcs[arc].flow = flow;
    }

    /// `supply + inflow − outflow` must be zero at every node.
    pub fn check_conservation(&self) -> Result<(), SolverError> {
        for (id, node) in self.nodes.iter().enumerate() {
            let inflow: i64 = self.incoming[id].iter().map(|&a| self.arcs[a].flow).sum();
            let outflow: i64 = self.outgoing[id].iter().map(|&a| self.arcs[a].flow).sum();
            let excess = node.supply + inflow - outflow;
            if excess != 0 {
                return Err(SolverError::Unbalanced { node: id, excess });
            }
        }
        for (id, arc) in self.arcs.iter().enumerate() {
            if arc.flow < 0 || arc.flow > arc.capacity {
                return Err(SolverError::CapacityViolated {
                    arc: id,
                    flow: arc.flow,
                    capacity: arc.capacity,
                });
            }
        }
        Ok(())
    }
}
