//! Final solution types and solve metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ProblemConfig;
use crate::hyper::HyperState;

use super::{NodeId, VrpGraph};

/// How the final integer solution was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishMethod {
    /// Branch-and-bound over the generated columns only (price-and-branch).
    /// This is a documented approximation: columns that branching would
    /// have priced out are never generated.
    RestrictedMip,
    /// Diving heuristic with backtracking.
    Diving,
    /// Every customer was covered by locked preassignments; nothing was
    /// optimized.
    LockedOnly,
}

/// Metadata describing how a solve terminated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveStats {
    /// Column generation iterations performed.
    pub iterations: usize,
    /// Objective of the last relaxation (lower bound on the restricted
    /// pool, valid bound for the full problem once pricing is exhausted).
    pub relaxation_objective: Option<f64>,
    /// `true` if no strategy, including the exact search under raw duals,
    /// found another negative-reduced-cost column.
    pub pricing_exhausted: bool,
    /// `true` if the wall-clock limit cut the solve short.
    pub time_limit_reached: bool,
    /// Which integer finisher produced the final routes.
    pub finish: FinishMethod,
    /// Columns in the pool at termination.
    pub columns: usize,
}

/// A route of the final solution, with its computed profiles.
///
/// Costs and profiles are computed against the pristine input network
/// (fixed vehicle costs included, preassignment anchoring excluded).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolvedRoute {
    id: usize,
    nodes: Vec<NodeId>,
    cost: f64,
    vehicle_type: usize,
    load: Option<i64>,
    node_load: Vec<(NodeId, i64)>,
    duration: Option<f64>,
    arrivals: Vec<(NodeId, f64)>,
    departures: Vec<(NodeId, f64)>,
}

impl SolvedRoute {
    /// Computes cost and profiles for a node sequence.
    pub(crate) fn build(
        id: usize,
        nodes: Vec<NodeId>,
        vehicle_type: usize,
        graph: &VrpGraph,
        config: &ProblemConfig,
    ) -> Self {
        let cost = graph
            .path_cost(&nodes, vehicle_type)
            .unwrap_or(f64::INFINITY);

        let track_load = !config.load_capacity().is_empty()
            || config.pickup_delivery()
            || config.distribution_collection();
        let track_time = config.duration().is_some() || config.time_windows();

        let load = if !config.load_capacity().is_empty()
            && !config.pickup_delivery()
            && !config.distribution_collection()
        {
            Some(nodes.iter().map(|&v| graph.node(v).demand()).sum())
        } else {
            None
        };

        let mut node_load = Vec::new();
        if track_load {
            let mut amount = 0;
            for &v in nodes.iter().skip(1) {
                amount += graph.node(v).demand();
                if config.distribution_collection() {
                    amount -= graph.node(v).collect();
                }
                node_load.push((v, amount));
            }
        }

        let mut duration = None;
        let mut arrivals = Vec::new();
        let mut departures = Vec::new();
        if track_time {
            let mut elapsed = 0.0;
            let mut clock = graph.node(VrpGraph::SOURCE).release();
            departures.push((VrpGraph::SOURCE, clock));
            for pair in nodes.windows(2) {
                let (tail, head) = (pair[0], pair[1]);
                let time = graph
                    .edge_between(tail, head)
                    .map_or(0.0, |(_, e)| e.time());
                elapsed += time + graph.node(head).service_time();
                clock = (clock + graph.node(tail).service_time() + time)
                    .max(graph.node(head).release());
                arrivals.push((head, clock));
                if head != VrpGraph::SINK {
                    departures.push((head, clock + graph.node(head).service_time()));
                }
            }
            duration = Some(elapsed);
        }

        Self {
            id,
            nodes,
            cost,
            vehicle_type,
            load,
            node_load,
            duration,
            arrivals,
            departures,
        }
    }

    /// Route identifier in the final solution.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Ordered nodes, Source first, Sink last.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Customers visited by this route.
    pub fn customers(&self) -> &[NodeId] {
        &self.nodes[1..self.nodes.len() - 1]
    }

    /// Route cost under the pristine input costs.
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Vehicle type serving the route.
    pub fn vehicle_type(&self) -> usize {
        self.vehicle_type
    }

    /// Total load, when a plain capacity constraint is active.
    pub fn load(&self) -> Option<i64> {
        self.load
    }

    /// Accumulated load after each visited node (collection subtracts when
    /// distribution/collection is active).
    pub fn node_load(&self) -> &[(NodeId, i64)] {
        &self.node_load
    }

    /// Travel plus service time (waiting excluded), when time matters.
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Service start time per node (arrival, delayed to the window opening
    /// when the vehicle waits).
    pub fn arrivals(&self) -> &[(NodeId, f64)] {
        &self.arrivals
    }

    /// Departure time per node (Sink excluded).
    pub fn departures(&self) -> &[(NodeId, f64)] {
        &self.departures
    }

    /// Service start at a specific node, if visited.
    pub fn arrival_at(&self, node: NodeId) -> Option<f64> {
        self.arrivals
            .iter()
            .find(|(v, _)| *v == node)
            .map(|(_, t)| *t)
    }

    /// Departure from a specific node, if visited.
    pub fn departure_at(&self, node: NodeId) -> Option<f64> {
        self.departures
            .iter()
            .find(|(v, _)| *v == node)
            .map(|(_, t)| *t)
    }
}

/// A complete solution: selected routes, dropped customers, objective
/// value, the optional periodic schedule and solve metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VrpSolution {
    value: f64,
    routes: Vec<SolvedRoute>,
    dropped: Vec<NodeId>,
    schedule: Option<BTreeMap<usize, Vec<usize>>>,
    stats: SolveStats,
    hyper_state: Option<HyperState>,
}

impl VrpSolution {
    pub(crate) fn new(
        value: f64,
        routes: Vec<SolvedRoute>,
        dropped: Vec<NodeId>,
        schedule: Option<BTreeMap<usize, Vec<usize>>>,
        stats: SolveStats,
        hyper_state: Option<HyperState>,
    ) -> Self {
        Self {
            value,
            routes,
            dropped,
            schedule,
            stats,
            hyper_state,
        }
    }

    /// Objective value: route costs plus drop penalties.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Selected routes.
    pub fn routes(&self) -> &[SolvedRoute] {
        &self.routes
    }

    /// Customers dropped under the drop-penalty variant.
    pub fn dropped(&self) -> &[NodeId] {
        &self.dropped
    }

    /// Periodic schedule: day index to route ids, when periodic.
    pub fn schedule(&self) -> Option<&BTreeMap<usize, Vec<usize>>> {
        self.schedule.as_ref()
    }

    /// Solve metadata.
    pub fn stats(&self) -> &SolveStats {
        &self.stats
    }

    /// Performance history of the adaptive controller, present only when
    /// the adaptive strategy ran. Feed it back through
    /// [`SolveOptions::with_hyper_state`](crate::config::SolveOptions::with_hyper_state)
    /// to carry learning across solves.
    pub fn hyper_state(&self) -> Option<&HyperState> {
        self.hyper_state.as_ref()
    }

    /// Number of selected routes visiting the given customer.
    pub fn coverage(&self, node: NodeId) -> usize {
        self.routes.iter().filter(|r| r.nodes.contains(&node)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Node, TimeWindow};

    fn line_graph() -> (VrpGraph, Vec<NodeId>) {
        let mut g = VrpGraph::new();
        let a = g.add_customer(
            Node::new()
                .with_demand(5)
                .with_service_time(1.0)
                .with_time_window(TimeWindow::new(5.0, 100.0).expect("tw")),
        );
        let b = g.add_customer(
            Node::new()
                .with_demand(5)
                .with_service_time(1.0)
                .with_time_window(TimeWindow::new(5.0, 100.0).expect("tw")),
        );
        g.add_edge(VrpGraph::SOURCE, a, 10.0, 20.0).expect("edge");
        g.add_edge(a, b, 10.0, 20.0).expect("edge");
        g.add_edge(b, VrpGraph::SINK, 10.0, 20.0).expect("edge");
        (g, vec![a, b])
    }

    #[test]
    fn test_route_profiles() {
        let (g, c) = line_graph();
        let config = ProblemConfig::new()
            .with_load_capacity(vec![10])
            .with_time_windows();
        let nodes = vec![VrpGraph::SOURCE, c[0], c[1], VrpGraph::SINK];
        let route = SolvedRoute::build(1, nodes, 0, &g, &config);

        assert!((route.cost() - 30.0).abs() < 1e-10);
        assert_eq!(route.load(), Some(10));
        assert_eq!(route.node_load(), &[(c[0], 5), (c[1], 10), (VrpGraph::SINK, 10)]);
        // 20 travel, wait none (window opens at 5), service 1 per customer.
        assert_eq!(route.arrival_at(c[0]), Some(20.0));
        assert_eq!(route.departure_at(c[0]), Some(21.0));
        assert_eq!(route.arrival_at(c[1]), Some(41.0));
        assert_eq!(route.arrival_at(VrpGraph::SINK), Some(62.0));
        assert_eq!(route.duration(), Some(62.0));
    }

    #[test]
    fn test_waiting_delays_service_start() {
        let (mut g, c) = line_graph();
        g.add_edge(c[0], VrpGraph::SINK, 10.0, 20.0).expect("edge");
        g.node_mut(c[0])
            .set_time_window(Some(TimeWindow::new(30.0, 100.0).expect("tw")));
        let config = ProblemConfig::new().with_time_windows();
        let nodes = vec![VrpGraph::SOURCE, c[0], VrpGraph::SINK];
        let route = SolvedRoute::build(1, nodes, 0, &g, &config);
        assert_eq!(route.arrival_at(c[0]), Some(30.0));
        // Duration counts raw travel and service, never waiting.
        assert_eq!(route.duration(), Some(41.0));
    }

    #[test]
    fn test_solution_coverage() {
        let (g, c) = line_graph();
        let config = ProblemConfig::new();
        let route = SolvedRoute::build(
            1,
            vec![VrpGraph::SOURCE, c[0], c[1], VrpGraph::SINK],
            0,
            &g,
            &config,
        );
        let stats = SolveStats {
            iterations: 1,
            relaxation_objective: Some(30.0),
            pricing_exhausted: true,
            time_limit_reached: false,
            finish: FinishMethod::RestrictedMip,
            columns: 1,
        };
        let sol = VrpSolution::new(30.0, vec![route], vec![], None, stats, None);
        assert_eq!(sol.coverage(c[0]), 1);
        assert_eq!(sol.coverage(VrpGraph::SOURCE), 1);
        assert!(sol.dropped().is_empty());
        assert!(sol.schedule().is_none());
    }
}
