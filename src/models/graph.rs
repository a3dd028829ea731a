//! Directed routing network with a single Source and Sink.

use std::collections::HashMap;

use crate::error::{Result, SolverError};

use super::{Node, NodeId};

/// A directed edge of the network.
///
/// Costs are stored per vehicle type (a single entry for homogeneous
/// fleets); `time` is the traversal time.
#[derive(Debug, Clone)]
pub struct Edge {
    from: NodeId,
    to: NodeId,
    cost: Vec<f64>,
    time: f64,
}

impl Edge {
    /// Tail node.
    pub fn from(&self) -> NodeId {
        self.from
    }

    /// Head node.
    pub fn to(&self) -> NodeId {
        self.to
    }

    /// Cost for the given vehicle type.
    pub fn cost(&self, vehicle_type: usize) -> f64 {
        self.cost[vehicle_type]
    }

    /// Costs for all vehicle types.
    pub fn costs(&self) -> &[f64] {
        &self.cost
    }

    /// Traversal time.
    pub fn time(&self) -> f64 {
        self.time
    }
}

/// The routing network: nodes, edges, and adjacency.
///
/// The graph always contains the Source ([`VrpGraph::SOURCE`]) and the Sink
/// ([`VrpGraph::SINK`]); both are demand-free. Edges into the Source or out
/// of the Sink are rejected at insertion, so the structural invariants of
/// the network hold by construction.
///
/// # Examples
///
/// ```
/// use colgen_routing::models::{Node, VrpGraph};
///
/// let mut g = VrpGraph::new();
/// let c = g.add_customer(Node::new().with_demand(5));
/// g.add_edge(VrpGraph::SOURCE, c, 10.0, 0.0).unwrap();
/// g.add_edge(c, VrpGraph::SINK, 10.0, 0.0).unwrap();
/// assert_eq!(g.num_customers(), 1);
/// assert!(g.has_source_sink_path());
/// ```
#[derive(Debug, Clone)]
pub struct VrpGraph {
    nodes: Vec<Node>,
    node_active: Vec<bool>,
    edges: Vec<Edge>,
    edge_active: Vec<bool>,
    out: Vec<Vec<usize>>,
    inc: Vec<Vec<usize>>,
    index: HashMap<(NodeId, NodeId), usize>,
    vehicle_types: usize,
}

impl VrpGraph {
    /// The Source node (no incoming edges).
    pub const SOURCE: NodeId = NodeId(0);
    /// The Sink node (no outgoing edges).
    pub const SINK: NodeId = NodeId(1);

    /// Creates an empty network for a homogeneous fleet.
    pub fn new() -> Self {
        Self::with_vehicle_types(1)
    }

    /// Creates an empty network carrying one cost entry per vehicle type.
    pub fn with_vehicle_types(vehicle_types: usize) -> Self {
        let vehicle_types = vehicle_types.max(1);
        Self {
            nodes: vec![Node::new(), Node::new()],
            node_active: vec![true, true],
            edges: Vec::new(),
            edge_active: Vec::new(),
            out: vec![Vec::new(), Vec::new()],
            inc: vec![Vec::new(), Vec::new()],
            index: HashMap::new(),
            vehicle_types,
        }
    }

    /// Number of vehicle types the edge costs are dimensioned for.
    pub fn vehicle_types(&self) -> usize {
        self.vehicle_types
    }

    /// Adds a customer node and returns its identifier.
    pub fn add_customer(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        self.node_active.push(true);
        self.out.push(Vec::new());
        self.inc.push(Vec::new());
        id
    }

    /// Adds an edge with the same cost for every vehicle type.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, cost: f64, time: f64) -> Result<()> {
        let costs = vec![cost; self.vehicle_types];
        self.add_edge_typed(from, to, costs, time)
    }

    /// Adds an edge with one cost per vehicle type.
    pub fn add_edge_typed(
        &mut self,
        from: NodeId,
        to: NodeId,
        costs: Vec<f64>,
        time: f64,
    ) -> Result<()> {
        if from.0 >= self.nodes.len() || to.0 >= self.nodes.len() {
            return Err(SolverError::InvalidGraph(format!(
                "edge ({from},{to}) references an unknown node"
            )));
        }
        if to == Self::SOURCE {
            return Err(SolverError::InvalidGraph(
                "Source must have no incoming edges".into(),
            ));
        }
        if from == Self::SINK {
            return Err(SolverError::InvalidGraph(
                "Sink must have no outgoing edges".into(),
            ));
        }
        if from == to {
            return Err(SolverError::InvalidGraph(format!("self loop at {from}")));
        }
        if costs.len() != self.vehicle_types {
            return Err(SolverError::InvalidGraph(format!(
                "edge ({from},{to}) has {} cost entries, expected {}",
                costs.len(),
                self.vehicle_types
            )));
        }
        if self.index.contains_key(&(from, to)) {
            return Err(SolverError::InvalidGraph(format!(
                "duplicate edge ({from},{to})"
            )));
        }
        let idx = self.edges.len();
        self.edges.push(Edge {
            from,
            to,
            cost: costs,
            time,
        });
        self.edge_active.push(true);
        self.out[from.0].push(idx);
        self.inc[to.0].push(idx);
        self.index.insert((from, to), idx);
        Ok(())
    }

    /// Declares `delivery` as the paired delivery node of `pickup`.
    pub fn link_request(&mut self, pickup: NodeId, delivery: NodeId) -> Result<()> {
        if pickup.0 >= self.nodes.len() || delivery.0 >= self.nodes.len() {
            return Err(SolverError::InvalidGraph(
                "request references an unknown node".into(),
            ));
        }
        if pickup == delivery || pickup.0 < 2 || delivery.0 < 2 {
            return Err(SolverError::InvalidGraph(format!(
                "invalid request pair ({pickup},{delivery})"
            )));
        }
        self.nodes[pickup.0].set_request(delivery);
        Ok(())
    }

    /// Returns the node data.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    /// Total size of the node table (including removed nodes).
    pub fn node_bound(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the node has not been removed.
    pub fn is_active(&self, id: NodeId) -> bool {
        self.node_active[id.0]
    }

    /// Active customer nodes (everything except Source and Sink).
    pub fn customers(&self) -> impl Iterator<Item = NodeId> + '_ {
        (2..self.nodes.len())
            .filter(|&i| self.node_active[i])
            .map(NodeId)
    }

    /// Number of active customers.
    pub fn num_customers(&self) -> usize {
        self.customers().count()
    }

    /// Active outgoing edges of a node.
    pub fn out_edges(&self, id: NodeId) -> impl Iterator<Item = (usize, &Edge)> + '_ {
        self.out[id.0]
            .iter()
            .filter(|&&e| self.edge_active[e] && self.node_active[self.edges[e].to.0])
            .map(move |&e| (e, &self.edges[e]))
    }

    /// Active incoming edges of a node.
    pub fn in_edges(&self, id: NodeId) -> impl Iterator<Item = (usize, &Edge)> + '_ {
        self.inc[id.0]
            .iter()
            .filter(|&&e| self.edge_active[e] && self.node_active[self.edges[e].from.0])
            .map(move |&e| (e, &self.edges[e]))
    }

    /// All active edges with their indices.
    pub fn edges(&self) -> impl Iterator<Item = (usize, &Edge)> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter(|(i, e)| {
                self.edge_active[*i] && self.node_active[e.from.0] && self.node_active[e.to.0]
            })
    }

    /// Total size of the edge table (including removed edges).
    pub fn edge_bound(&self) -> usize {
        self.edges.len()
    }

    /// Edge data by index.
    pub fn edge_by_index(&self, idx: usize) -> &Edge {
        &self.edges[idx]
    }

    /// Looks up the active edge between two nodes.
    pub fn edge_between(&self, from: NodeId, to: NodeId) -> Option<(usize, &Edge)> {
        let &idx = self.index.get(&(from, to))?;
        if self.edge_active[idx] && self.node_active[from.0] && self.node_active[to.0] {
            Some((idx, &self.edges[idx]))
        } else {
            None
        }
    }

    /// Returns `true` if an edge between the nodes exists in the table,
    /// active or not.
    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.index.contains_key(&(from, to))
    }

    /// Overwrites the cost entries of an edge.
    pub(crate) fn set_edge_costs(&mut self, idx: usize, costs: Vec<f64>) {
        self.edges[idx].cost = costs;
    }

    pub(crate) fn scale_source_costs(&mut self, fixed_cost: &[f64]) {
        let source_edges: Vec<usize> = self.out[Self::SOURCE.0].clone();
        for e in source_edges {
            for (k, fc) in fixed_cost.iter().enumerate() {
                self.edges[e].cost[k] += fc;
            }
        }
    }

    /// Removes an edge from the active network.
    pub(crate) fn remove_edge(&mut self, idx: usize) {
        self.edge_active[idx] = false;
    }

    /// Removes a node (and implicitly its incident edges) from the active
    /// network.
    pub(crate) fn remove_node(&mut self, id: NodeId) {
        self.node_active[id.0] = false;
    }

    /// Returns `true` if an active path Source -> Sink exists.
    pub fn has_source_sink_path(&self) -> bool {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![Self::SOURCE];
        seen[Self::SOURCE.0] = true;
        while let Some(v) = stack.pop() {
            if v == Self::SINK {
                return true;
            }
            for (_, e) in self.out_edges(v) {
                if !seen[e.to().0] {
                    seen[e.to().0] = true;
                    stack.push(e.to());
                }
            }
        }
        false
    }

    /// Sum of edge costs along a node sequence for the given vehicle type,
    /// or an error naming the first missing edge.
    pub fn path_cost(&self, path: &[NodeId], vehicle_type: usize) -> Result<f64> {
        let mut total = 0.0;
        for pair in path.windows(2) {
            let (_, e) = self.edge_between(pair[0], pair[1]).ok_or_else(|| {
                SolverError::InvalidGraph(format!("edge ({},{}) missing", pair[0], pair[1]))
            })?;
            total += e.cost(vehicle_type);
        }
        Ok(total)
    }
}

impl Default for VrpGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_customer_graph() -> (VrpGraph, NodeId, NodeId) {
        let mut g = VrpGraph::new();
        let a = g.add_customer(Node::new().with_demand(5));
        let b = g.add_customer(Node::new().with_demand(4));
        g.add_edge(VrpGraph::SOURCE, a, 1.0, 0.0).expect("edge");
        g.add_edge(VrpGraph::SOURCE, b, 2.0, 0.0).expect("edge");
        g.add_edge(a, VrpGraph::SINK, 0.0, 0.0).expect("edge");
        g.add_edge(b, VrpGraph::SINK, 2.0, 0.0).expect("edge");
        g.add_edge(a, b, 1.0, 0.0).expect("edge");
        g.add_edge(b, a, 1.0, 0.0).expect("edge");
        (g, a, b)
    }

    #[test]
    fn test_structure_enforced() {
        let mut g = VrpGraph::new();
        let a = g.add_customer(Node::new());
        assert!(g.add_edge(a, VrpGraph::SOURCE, 1.0, 0.0).is_err());
        assert!(g.add_edge(VrpGraph::SINK, a, 1.0, 0.0).is_err());
        assert!(g.add_edge(a, a, 1.0, 0.0).is_err());
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let mut g = VrpGraph::new();
        let a = g.add_customer(Node::new());
        g.add_edge(VrpGraph::SOURCE, a, 1.0, 0.0).expect("edge");
        assert!(g.add_edge(VrpGraph::SOURCE, a, 2.0, 0.0).is_err());
    }

    #[test]
    fn test_cost_dimension_checked() {
        let mut g = VrpGraph::with_vehicle_types(2);
        let a = g.add_customer(Node::new());
        assert!(g.add_edge_typed(VrpGraph::SOURCE, a, vec![1.0], 0.0).is_err());
        assert!(g
            .add_edge_typed(VrpGraph::SOURCE, a, vec![1.0, 2.0], 0.0)
            .is_ok());
    }

    #[test]
    fn test_adjacency() {
        let (g, a, b) = two_customer_graph();
        let outs: Vec<NodeId> = g.out_edges(a).map(|(_, e)| e.to()).collect();
        assert_eq!(outs, vec![VrpGraph::SINK, b]);
        let ins: Vec<NodeId> = g.in_edges(a).map(|(_, e)| e.from()).collect();
        assert_eq!(ins, vec![VrpGraph::SOURCE, b]);
        assert_eq!(g.num_customers(), 2);
    }

    #[test]
    fn test_path_and_removal() {
        let (mut g, a, b) = two_customer_graph();
        assert!(g.has_source_sink_path());
        let cost = g
            .path_cost(&[VrpGraph::SOURCE, b, a, VrpGraph::SINK], 0)
            .expect("path");
        assert!((cost - 3.0).abs() < 1e-10);

        g.remove_node(a);
        assert_eq!(g.num_customers(), 1);
        assert!(g.edge_between(VrpGraph::SOURCE, a).is_none());
        assert!(g.has_source_sink_path());
    }

    #[test]
    fn test_missing_edge_in_path() {
        let (g, a, _) = two_customer_graph();
        let err = g.path_cost(&[VrpGraph::SINK, a], 0);
        assert!(err.is_err());
    }

    #[test]
    fn test_link_request() {
        let (mut g, a, b) = two_customer_graph();
        g.link_request(a, b).expect("request");
        assert_eq!(g.node(a).request(), Some(b));
        assert!(g.link_request(a, VrpGraph::SINK).is_err());
    }
}
