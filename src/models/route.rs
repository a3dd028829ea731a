//! Route columns generated by pricing and owned by the column pool.

use serde::{Deserialize, Serialize};

use crate::config::StrategyKind;

use super::NodeId;

/// Which component produced a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnOrigin {
    /// Seeded from the initial solution.
    Initial,
    /// Injected as a locked or anchored preassignment.
    Preassigned,
    /// Produced by the greedy randomized generator.
    Greedy,
    /// Produced by a pricing strategy family.
    Strategy(StrategyKind),
}

/// A route proposed by pricing or a heuristic generator, not yet admitted
/// to the column pool.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRoute {
    /// Ordered nodes, Source first, Sink last.
    pub nodes: Vec<NodeId>,
    /// Raw cost under the working edge costs for `vehicle_type`.
    pub cost: f64,
    /// Reduced cost under the duals the candidate was priced against.
    pub reduced_cost: f64,
    /// Vehicle type the route is priced for.
    pub vehicle_type: usize,
    /// Producing component.
    pub origin: ColumnOrigin,
}

/// An admitted column: an immutable Source -> Sink route with a pool id.
///
/// Routes are created by the pricing engines or heuristic generators, owned
/// by the column pool and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    id: usize,
    nodes: Vec<NodeId>,
    cost: f64,
    vehicle_type: usize,
    origin: ColumnOrigin,
}

impl Route {
    pub(crate) fn new(
        id: usize,
        nodes: Vec<NodeId>,
        cost: f64,
        vehicle_type: usize,
        origin: ColumnOrigin,
    ) -> Self {
        Self {
            id,
            nodes,
            cost,
            vehicle_type,
            origin,
        }
    }

    /// Pool identifier, unique within one solve.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Ordered nodes from Source to Sink.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Customers visited (nodes without the Source/Sink endpoints).
    pub fn customers(&self) -> &[NodeId] {
        &self.nodes[1..self.nodes.len() - 1]
    }

    /// Route cost (working costs, fixed vehicle cost included).
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Vehicle type serving the route.
    pub fn vehicle_type(&self) -> usize {
        self.vehicle_type
    }

    /// Producing component.
    pub fn origin(&self) -> ColumnOrigin {
        self.origin
    }

    /// Returns `true` if the route visits the given customer.
    pub fn visits(&self, node: NodeId) -> bool {
        self.customers().contains(&node)
    }
}
