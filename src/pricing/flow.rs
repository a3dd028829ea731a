//! Arc-flow pricing engine over the LP contract.
//!
//! Formulates the elementary shortest-path subproblem as a small MIP:
//! binary flow per edge, flow balance, rank variables against cycles
//! (big-M), optional time-window and load propagation chains, and the
//! pickup-and-delivery pairing constraints the labeling engine does not
//! support. Solved by branch-and-bound on the flow variables.

use std::time::Instant;

use crate::error::Result;
use crate::lp::{branch, InteriorPoint, LinearProgram, LpSolver, Sense};
use crate::models::{NodeId, VrpGraph};

use super::{PathEngine, SearchMode, Subproblem, REDUCED_COST_TOL};

/// The bundled arc-flow pricing engine.
pub struct FlowEngine {
    solver: Box<dyn LpSolver>,
    pickup_delivery: bool,
    distribution_collection: bool,
}

impl FlowEngine {
    pub fn new() -> Self {
        Self {
            solver: Box::new(InteriorPoint::new()),
            pickup_delivery: false,
            distribution_collection: false,
        }
    }

    /// Enables the pickup-and-delivery pairing constraints.
    pub fn with_pickup_delivery(mut self) -> Self {
        self.pickup_delivery = true;
        self
    }

    /// Enables the distribution/collection load chain.
    pub fn with_distribution_collection(mut self) -> Self {
        self.distribution_collection = true;
        self
    }

    /// Swaps in another LP backend.
    pub fn with_solver(mut self, solver: Box<dyn LpSolver>) -> Self {
        self.solver = solver;
        self
    }
}

impl Default for FlowEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PathEngine for FlowEngine {
    fn find_paths(
        &self,
        sub: &Subproblem<'_>,
        _mode: SearchMode,
        deadline: Option<Instant>,
    ) -> Result<Vec<Vec<NodeId>>> {
        let graph = sub.graph();
        let n = graph.node_bound();
        let mut lp = LinearProgram::new();

        // Flow variables, objective = reduced cost.
        let edges: Vec<usize> = graph
            .edges()
            .filter(|(idx, _)| sub.allows(*idx))
            .map(|(idx, _)| idx)
            .collect();
        if edges.is_empty() {
            return Ok(Vec::new());
        }
        let mut x = vec![usize::MAX; graph.edge_bound()];
        for &idx in &edges {
            x[idx] = lp.add_var(sub.reduced_cost(idx), 0.0, 1.0);
        }

        // Rank variables: Source fixed at 0, anything else below n.
        let mut rank = vec![usize::MAX; n];
        for v in 0..n {
            let id = NodeId(v);
            if id != VrpGraph::SOURCE && id != VrpGraph::SINK && !graph.is_active(id) {
                continue;
            }
            let upper = if id == VrpGraph::SOURCE { 0.0 } else { n as f64 };
            rank[v] = lp.add_var(0.0, 0.0, upper);
        }

        // Start at Source, end at Sink, conserve flow in between.
        let source_out: Vec<(usize, f64)> = sub
            .out_edges(VrpGraph::SOURCE)
            .map(|(idx, _)| (x[idx], 1.0))
            .collect();
        lp.add_row(source_out, Sense::Eq, 1.0);
        let sink_in: Vec<(usize, f64)> = sub
            .in_edges(VrpGraph::SINK)
            .map(|(idx, _)| (x[idx], 1.0))
            .collect();
        lp.add_row(sink_in, Sense::Eq, 1.0);
        for v in graph.customers() {
            let mut coeffs: Vec<(usize, f64)> =
                sub.in_edges(v).map(|(idx, _)| (x[idx], 1.0)).collect();
            coeffs.extend(sub.out_edges(v).map(|(idx, _)| (x[idx], -1.0)));
            if coeffs.is_empty() {
                continue;
            }
            lp.add_row(coeffs, Sense::Eq, 0.0);
        }
        // Rule out the empty Source -> Sink route.
        lp.add_row(edges.iter().map(|&e| (x[e], 1.0)).collect(), Sense::Ge, 2.0);

        // Ranks grow along selected edges (big-M), which forbids cycles.
        let m_rank = n as f64;
        for &idx in &edges {
            let edge = graph.edge_by_index(idx);
            lp.add_row(
                vec![
                    (rank[edge.from().index()], 1.0),
                    (rank[edge.to().index()], -1.0),
                    (x[idx], m_rank),
                ],
                Sense::Le,
                m_rank - 1.0,
            );
        }

        if let Some(num_stops) = sub.resources().num_stops() {
            lp.add_row(
                edges.iter().map(|&e| (x[e], 1.0)).collect(),
                Sense::Le,
                (num_stops + 1) as f64,
            );
        }

        if let Some(duration) = sub.resources().duration() {
            let coeffs: Vec<(usize, f64)> = edges
                .iter()
                .map(|&e| {
                    let edge = graph.edge_by_index(e);
                    let service = graph.node(edge.from()).service_time();
                    (x[e], edge.time() + service)
                })
                .collect();
            lp.add_row(coeffs, Sense::Le, duration);
        }

        if sub.resources().time_windows() {
            let horizon = time_horizon(graph);
            let mut clock = vec![usize::MAX; n];
            for v in 0..n {
                let id = NodeId(v);
                if rank[v] == usize::MAX {
                    continue;
                }
                let node = graph.node(id);
                let upper = if node.deadline().is_finite() {
                    node.deadline()
                } else {
                    horizon
                };
                clock[v] = lp.add_var(0.0, node.release(), upper);
            }
            for &idx in &edges {
                let edge = graph.edge_by_index(idx);
                let service = graph.node(edge.from()).service_time();
                // t_u + service + time <= t_v + horizon (1 - x).
                lp.add_row(
                    vec![
                        (clock[edge.from().index()], 1.0),
                        (clock[edge.to().index()], -1.0),
                        (x[idx], horizon),
                    ],
                    Sense::Le,
                    horizon - service - edge.time(),
                );
            }
        }

        if let Some(capacity) = sub.resources().capacity() {
            let big_m = load_big_m(graph, capacity);
            let mut load = vec![usize::MAX; n];
            for v in 0..n {
                if rank[v] != usize::MAX {
                    load[v] = lp.add_var(0.0, 0.0, capacity as f64);
                }
            }
            if self.distribution_collection {
                // The vehicle leaves the depot loaded with every delivery
                // of the selected route.
                let mut coeffs = vec![(load[VrpGraph::SOURCE.index()], 1.0)];
                for &idx in &edges {
                    let edge = graph.edge_by_index(idx);
                    let demand = graph.node(edge.to()).demand() as f64;
                    if demand != 0.0 {
                        coeffs.push((x[idx], -demand));
                    }
                }
                lp.add_row(coeffs, Sense::Eq, 0.0);
            } else {
                lp.set_bounds(load[VrpGraph::SOURCE.index()], 0.0, 0.0);
            }
            for &idx in &edges {
                let edge = graph.edge_by_index(idx);
                let head = graph.node(edge.to());
                let delta = if self.distribution_collection {
                    (head.collect() - head.demand()) as f64
                } else {
                    head.demand() as f64
                };
                // l_v >= l_u + delta - M (1 - x).
                lp.add_row(
                    vec![
                        (load[edge.from().index()], 1.0),
                        (load[edge.to().index()], -1.0),
                        (x[idx], big_m),
                    ],
                    Sense::Le,
                    big_m - delta,
                );
            }
        }

        if self.pickup_delivery {
            for p in graph.customers() {
                let Some(d) = graph.node(p).request() else {
                    continue;
                };
                if !graph.is_active(d) {
                    continue;
                }
                // Same vehicle serves the pair.
                let mut coeffs: Vec<(usize, f64)> =
                    sub.out_edges(p).map(|(idx, _)| (x[idx], 1.0)).collect();
                coeffs.extend(sub.out_edges(d).map(|(idx, _)| (x[idx], -1.0)));
                lp.add_row(coeffs, Sense::Eq, 0.0);
                // Pickup precedes delivery.
                lp.add_row(
                    vec![(rank[p.index()], 1.0), (rank[d.index()], -1.0)],
                    Sense::Le,
                    0.0,
                );
            }
        }

        let binaries: Vec<usize> = edges.iter().map(|&e| x[e]).collect();
        let result = branch::solve_binary(&lp, &binaries, self.solver.as_ref(), deadline)?;
        let Some(solution) = result.incumbent else {
            return Ok(Vec::new());
        };
        if solution.objective >= -REDUCED_COST_TOL {
            return Ok(Vec::new());
        }

        // Walk the selected edges from the Source.
        let mut path = vec![VrpGraph::SOURCE];
        let mut current = VrpGraph::SOURCE;
        while current != VrpGraph::SINK {
            let next = sub
                .out_edges(current)
                .find(|(idx, _)| solution.values[x[*idx]] > 0.5)
                .map(|(_, e)| e.to());
            match next {
                Some(next) => {
                    path.push(next);
                    current = next;
                }
                None => {
                    log::warn!("arc-flow solution does not form a path");
                    return Ok(Vec::new());
                }
            }
            if path.len() > n + 1 {
                log::warn!("arc-flow solution contains a cycle");
                return Ok(Vec::new());
            }
        }
        Ok(vec![path])
    }
}

/// A finite horizon dominating every feasible clock value.
fn time_horizon(graph: &VrpGraph) -> f64 {
    let mut horizon: f64 = 0.0;
    for v in 0..graph.node_bound() {
        let node = graph.node(NodeId(v));
        if node.deadline().is_finite() {
            horizon = horizon.max(node.deadline());
        }
        horizon = horizon.max(node.release());
        horizon += node.service_time();
    }
    for (_, edge) in graph.edges() {
        horizon += edge.time();
    }
    horizon + 1.0
}

/// A big-M dominating every feasible load change.
fn load_big_m(graph: &VrpGraph, capacity: i64) -> f64 {
    let mut total = capacity;
    for v in graph.customers() {
        total += graph.node(v).demand().abs() + graph.node(v).collect().abs();
    }
    total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProblemConfig;
    use crate::master::DualPrices;
    use crate::models::Node;
    use crate::resources::ResourceModel;

    fn duals(g: &VrpGraph, values: &[(NodeId, f64)]) -> DualPrices {
        let mut node = vec![0.0; g.node_bound()];
        for &(v, pi) in values {
            node[v.index()] = pi;
        }
        DualPrices::new(1, node, vec![0.0])
    }

    #[test]
    fn test_matches_labeling_on_plain_graph() {
        let mut g = VrpGraph::new();
        let a = g.add_customer(Node::new().with_demand(5));
        let b = g.add_customer(Node::new().with_demand(4));
        g.add_edge(VrpGraph::SOURCE, a, 1.0, 0.0).expect("edge");
        g.add_edge(VrpGraph::SOURCE, b, 2.0, 0.0).expect("edge");
        g.add_edge(a, VrpGraph::SINK, 0.0, 0.0).expect("edge");
        g.add_edge(b, VrpGraph::SINK, 2.0, 0.0).expect("edge");
        g.add_edge(a, b, 1.0, 0.0).expect("edge");
        g.add_edge(b, a, 1.0, 0.0).expect("edge");

        let config = ProblemConfig::new().with_load_capacity(vec![10]);
        let duals = duals(&g, &[(a, 2.0), (b, 4.0)]);
        let sub = Subproblem::new(&g, &duals, 0, ResourceModel::new(&config, 0));
        let paths = FlowEngine::new()
            .find_paths(&sub, SearchMode::Exact, None)
            .expect("search");
        assert_eq!(paths, vec![vec![VrpGraph::SOURCE, b, a, VrpGraph::SINK]]);
    }

    #[test]
    fn test_elementary_despite_negative_cycle() {
        let mut g = VrpGraph::new();
        let a = g.add_customer(Node::new());
        let b = g.add_customer(Node::new());
        g.add_edge(VrpGraph::SOURCE, a, 1.0, 0.0).expect("edge");
        g.add_edge(a, VrpGraph::SINK, 1.0, 0.0).expect("edge");
        g.add_edge(a, b, 1.0, 0.0).expect("edge");
        g.add_edge(b, a, 1.0, 0.0).expect("edge");
        g.add_edge(b, VrpGraph::SINK, 1.0, 0.0).expect("edge");

        let config = ProblemConfig::new();
        let duals = duals(&g, &[(a, 10.0), (b, 10.0)]);
        let sub = Subproblem::new(&g, &duals, 0, ResourceModel::new(&config, 0));
        let paths = FlowEngine::new()
            .find_paths(&sub, SearchMode::Exact, None)
            .expect("search");
        assert_eq!(paths.len(), 1);
        let path = &paths[0];
        let mut seen = path.clone();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), path.len());
    }

    #[test]
    fn test_pickup_before_delivery() {
        let mut g = VrpGraph::new();
        let pickup = g.add_customer(Node::new().with_demand(10));
        let delivery = g.add_customer(Node::new().with_demand(-10));
        g.link_request(pickup, delivery).expect("request");
        // The delivery-first order is cheaper, but precedence forbids it.
        g.add_edge(VrpGraph::SOURCE, pickup, 5.0, 0.0).expect("edge");
        g.add_edge(VrpGraph::SOURCE, delivery, 1.0, 0.0).expect("edge");
        g.add_edge(pickup, delivery, 5.0, 0.0).expect("edge");
        g.add_edge(delivery, pickup, 1.0, 0.0).expect("edge");
        g.add_edge(pickup, VrpGraph::SINK, 1.0, 0.0).expect("edge");
        g.add_edge(delivery, VrpGraph::SINK, 5.0, 0.0).expect("edge");

        let config = ProblemConfig::new()
            .with_load_capacity(vec![15])
            .with_pickup_delivery();
        let duals = duals(&g, &[(pickup, 20.0), (delivery, 20.0)]);
        let sub = Subproblem::new(&g, &duals, 0, ResourceModel::new(&config, 0));
        let paths = FlowEngine::new()
            .with_pickup_delivery()
            .find_paths(&sub, SearchMode::Exact, None)
            .expect("search");
        assert_eq!(
            paths,
            vec![vec![VrpGraph::SOURCE, pickup, delivery, VrpGraph::SINK]]
        );
    }

    #[test]
    fn test_no_negative_column() {
        let mut g = VrpGraph::new();
        let a = g.add_customer(Node::new());
        g.add_edge(VrpGraph::SOURCE, a, 10.0, 0.0).expect("edge");
        g.add_edge(a, VrpGraph::SINK, 10.0, 0.0).expect("edge");
        let config = ProblemConfig::new();
        let duals = duals(&g, &[(a, 1.0)]);
        let sub = Subproblem::new(&g, &duals, 0, ResourceModel::new(&config, 0));
        let paths = FlowEngine::new()
            .find_paths(&sub, SearchMode::Exact, None)
            .expect("search");
        assert!(paths.is_empty());
    }
}
