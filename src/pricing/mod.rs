//! Pricing subproblem: strategies, engines, and the adapter between them.
//!
//! Each iteration the solver builds a [`Subproblem`]: the working graph
//! with per-edge reduced costs under the current (smoothed) duals, an
//! edge mask chosen by the active strategy, and the resource model of the
//! vehicle type being priced. A [`PathEngine`] searches it for elementary
//! Source -> Sink paths; [`price`] validates every returned path against
//! the resource model and keeps those with reduced cost below
//! [`REDUCED_COST_TOL`].
//!
//! Engines:
//!
//! - [`labeling::LabelingEngine`] — monodirectional labeling with
//!   dominance; exact, or label-capped in heuristic mode.
//! - [`flow::FlowEngine`] — arc-flow MIP over the LP contract; the only
//!   engine supporting pickup-and-delivery pairing.

pub mod flow;
pub mod greedy;
pub mod labeling;
pub mod strategy;

use std::time::Instant;

use crate::error::Result;
use crate::master::DualPrices;
use crate::models::{CandidateRoute, ColumnOrigin, Edge, NodeId, VrpGraph};
use crate::resources::ResourceModel;

/// A route is useful only if its reduced cost is below this threshold.
pub const REDUCED_COST_TOL: f64 = 1e-5;

/// Search effort requested from an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Optimal search; an empty answer proves no negative column exists
    /// in the restricted subproblem.
    Exact,
    /// Bounded-effort search; an empty answer proves nothing.
    Heuristic,
}

/// The pricing subproblem handed to an engine: reduced costs, an edge
/// mask, and the resource model for one vehicle type.
pub struct Subproblem<'a> {
    graph: &'a VrpGraph,
    resources: ResourceModel,
    vehicle_type: usize,
    reduced: Vec<f64>,
    mask: Vec<bool>,
}

impl<'a> Subproblem<'a> {
    /// Builds the unrestricted subproblem for a vehicle type. The reduced
    /// cost of an edge is its cost minus the dual of its tail customer;
    /// the fleet-bound dual is charged on Source-outgoing edges.
    pub fn new(
        graph: &'a VrpGraph,
        duals: &DualPrices,
        vehicle_type: usize,
        resources: ResourceModel,
    ) -> Self {
        let mut reduced = vec![f64::INFINITY; graph.edge_bound()];
        let mut mask = vec![false; graph.edge_bound()];
        for (idx, edge) in graph.edges() {
            let tail_price = if edge.from() == VrpGraph::SOURCE {
                duals.vehicle_dual(vehicle_type)
            } else {
                duals.node_dual(edge.from())
            };
            reduced[idx] = edge.cost(vehicle_type) - tail_price;
            mask[idx] = true;
        }
        Self {
            graph,
            resources,
            vehicle_type,
            reduced,
            mask,
        }
    }

    /// The working graph.
    pub fn graph(&self) -> &VrpGraph {
        self.graph
    }

    /// The resource model of the priced vehicle type.
    pub fn resources(&self) -> &ResourceModel {
        &self.resources
    }

    /// The priced vehicle type.
    pub fn vehicle_type(&self) -> usize {
        self.vehicle_type
    }

    /// Reduced cost of an edge.
    pub fn reduced_cost(&self, edge_idx: usize) -> f64 {
        self.reduced[edge_idx]
    }

    /// Whether the edge survives the strategy's restriction.
    pub fn allows(&self, edge_idx: usize) -> bool {
        self.mask[edge_idx]
    }

    /// Number of edges surviving the restriction.
    pub fn num_allowed(&self) -> usize {
        self.graph.edges().filter(|(idx, _)| self.mask[*idx]).count()
    }

    /// Outgoing edges surviving the restriction.
    pub fn out_edges(&self, node: NodeId) -> impl Iterator<Item = (usize, &Edge)> + '_ {
        self.graph
            .out_edges(node)
            .filter(move |(idx, _)| self.mask[*idx])
    }

    /// Incoming edges surviving the restriction.
    pub fn in_edges(&self, node: NodeId) -> impl Iterator<Item = (usize, &Edge)> + '_ {
        self.graph
            .in_edges(node)
            .filter(move |(idx, _)| self.mask[*idx])
    }

    /// Restricts the mask to edges satisfying `keep`. Edges already
    /// masked out stay out.
    pub fn restrict(&mut self, keep: impl Fn(usize, &Edge) -> bool) {
        for (idx, edge) in self.graph.edges() {
            if self.mask[idx] && !keep(idx, edge) {
                self.mask[idx] = false;
            }
        }
    }

    /// Tightens the stop bound of the resource model.
    pub fn cap_stops(&mut self, cap: usize) {
        self.resources = self.resources.clone().with_stop_cap(cap);
    }

    /// Reduced cost of a complete node sequence, or `None` if it leaves
    /// the restricted subproblem.
    pub fn path_reduced_cost(&self, nodes: &[NodeId]) -> Option<f64> {
        let mut total = 0.0;
        for pair in nodes.windows(2) {
            let (idx, _) = self.graph.edge_between(pair[0], pair[1])?;
            if !self.mask[idx] {
                return None;
            }
            total += self.reduced[idx];
        }
        Some(total)
    }
}

/// The constrained shortest-path engine contract: find minimum
/// reduced-cost elementary Source -> Sink paths over a restricted
/// subproblem, or report that none with negative reduced cost exists.
///
/// Engines must only return paths that are resource-feasible; the adapter
/// re-validates and drops violations.
pub trait PathEngine {
    fn find_paths(
        &self,
        sub: &Subproblem<'_>,
        mode: SearchMode,
        deadline: Option<Instant>,
    ) -> Result<Vec<Vec<NodeId>>>;
}

/// Runs an engine over a subproblem and converts its answers into
/// validated candidate columns, worst reduced cost last.
///
/// With `exact` unset, the heuristic search runs first and the exact
/// search only when it comes back empty.
pub fn price(
    sub: &Subproblem<'_>,
    engine: &dyn PathEngine,
    exact: bool,
    origin: ColumnOrigin,
    deadline: Option<Instant>,
) -> Result<Vec<CandidateRoute>> {
    let mut paths = if exact {
        engine.find_paths(sub, SearchMode::Exact, deadline)?
    } else {
        let heuristic = engine.find_paths(sub, SearchMode::Heuristic, deadline)?;
        if heuristic.is_empty() {
            engine.find_paths(sub, SearchMode::Exact, deadline)?
        } else {
            heuristic
        }
    };
    paths.sort();
    paths.dedup();

    let mut candidates = Vec::new();
    for nodes in paths {
        let Some(reduced_cost) = sub.path_reduced_cost(&nodes) else {
            log::warn!("engine returned a path outside the restricted subproblem");
            continue;
        };
        if reduced_cost >= -REDUCED_COST_TOL {
            continue;
        }
        if sub.resources().trace(sub.graph(), &nodes).is_none() {
            log::warn!("engine returned a resource-infeasible path, discarding");
            continue;
        }
        let cost = match sub.graph().path_cost(&nodes, sub.vehicle_type()) {
            Ok(cost) => cost,
            Err(_) => continue,
        };
        candidates.push(CandidateRoute {
            nodes,
            cost,
            reduced_cost,
            vehicle_type: sub.vehicle_type(),
            origin,
        });
    }
    candidates.sort_by(|a, b| {
        a.reduced_cost
            .partial_cmp(&b.reduced_cost)
            .expect("reduced costs are finite")
    });
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProblemConfig;
    use crate::models::Node;

    fn toy() -> (VrpGraph, NodeId, NodeId) {
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

    fn duals(g: &VrpGraph, values: &[(NodeId, f64)]) -> DualPrices {
        let mut node = vec![0.0; g.node_bound()];
        for &(v, pi) in values {
            node[v.index()] = pi;
        }
        DualPrices::new(1, node, vec![0.0])
    }

    #[test]
    fn test_reduced_costs_subtract_tail_dual() {
        let (g, a, b) = toy();
        let config = ProblemConfig::new();
        let duals = duals(&g, &[(a, 2.0), (b, 3.0)]);
        let sub = Subproblem::new(&g, &duals, 0, ResourceModel::new(&config, 0));

        let (ab, _) = g.edge_between(a, b).expect("edge");
        assert!((sub.reduced_cost(ab) - (1.0 - 2.0)).abs() < 1e-12);
        let (sa, _) = g.edge_between(VrpGraph::SOURCE, a).expect("edge");
        assert!((sub.reduced_cost(sa) - 1.0).abs() < 1e-12);

        let rc = sub
            .path_reduced_cost(&[VrpGraph::SOURCE, b, a, VrpGraph::SINK])
            .expect("in subproblem");
        // 2 + (1 - 3) + (0 - 2) = -2.
        assert!((rc + 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_restrict_masks_edges() {
        let (g, a, b) = toy();
        let config = ProblemConfig::new();
        let duals = duals(&g, &[(a, 2.0), (b, 3.0)]);
        let mut sub = Subproblem::new(&g, &duals, 0, ResourceModel::new(&config, 0));
        assert_eq!(sub.num_allowed(), 6);
        sub.restrict(|_, e| e.from() == VrpGraph::SOURCE || e.to() == VrpGraph::SINK);
        assert_eq!(sub.num_allowed(), 4);
        assert!(sub
            .path_reduced_cost(&[VrpGraph::SOURCE, b, a, VrpGraph::SINK])
            .is_none());
    }

    struct FixedEngine(Vec<Vec<NodeId>>);

    impl PathEngine for FixedEngine {
        fn find_paths(
            &self,
            _sub: &Subproblem<'_>,
            _mode: SearchMode,
            _deadline: Option<Instant>,
        ) -> Result<Vec<Vec<NodeId>>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_price_filters_and_sorts() {
        let (g, a, b) = toy();
        let config = ProblemConfig::new();
        let duals = duals(&g, &[(a, 2.0), (b, 3.0)]);
        let sub = Subproblem::new(&g, &duals, 0, ResourceModel::new(&config, 0));
        let engine = FixedEngine(vec![
            // Reduced cost -2: kept.
            vec![VrpGraph::SOURCE, b, a, VrpGraph::SINK],
            // Reduced cost 1 - 2 + 0 = -1: kept.
            vec![VrpGraph::SOURCE, a, VrpGraph::SINK],
            // Reduced cost 2 - 3 + 2 = 1: filtered out.
            vec![VrpGraph::SOURCE, b, VrpGraph::SINK],
        ]);
        let candidates =
            price(&sub, &engine, true, ColumnOrigin::Greedy, None).expect("price");
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].reduced_cost <= candidates[1].reduced_cost);
        assert_eq!(
            candidates[0].nodes,
            vec![VrpGraph::SOURCE, b, a, VrpGraph::SINK]
        );
        assert!((candidates[0].cost - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_price_rejects_capacity_violation() {
        let (g, a, b) = toy();
        let config = ProblemConfig::new().with_load_capacity(vec![5]);
        let duals = duals(&g, &[(a, 10.0), (b, 10.0)]);
        let sub = Subproblem::new(&g, &duals, 0, ResourceModel::new(&config, 0));
        // The two-customer route has load 9 > 5 and must be discarded even
        // though its reduced cost is negative.
        let engine = FixedEngine(vec![vec![VrpGraph::SOURCE, b, a, VrpGraph::SINK]]);
        let candidates =
            price(&sub, &engine, true, ColumnOrigin::Greedy, None).expect("price");
        assert!(candidates.is_empty());
    }
}
