//! Pricing strategy families and their escalation ladders.
//!
//! A strategy restricts the pricing search space before the engine runs.
//! Each family walks its own ladder from most to least aggressive while it
//! fails to produce a column; when a ladder is exhausted the caller falls
//! through to the exact, unrestricted search. The closed set of families
//! lives in [`StrategyKind`](crate::config::StrategyKind); the adaptive
//! controller in [`hyper`](crate::hyper) only chooses among these
//! variants, it never adds new ones.

use std::collections::HashSet;
use std::time::Instant;

use crate::config::{ProblemConfig, StrategyKind};
use crate::error::Result;
use crate::master::DualPrices;
use crate::models::{CandidateRoute, ColumnOrigin, NodeId, VrpGraph};
use crate::resources::ResourceModel;

use super::{price, PathEngine, Subproblem};

/// Edge-cost sparsification thresholds, fraction of the largest dual.
const EDGE_COST_LADDER: [f64; 4] = [0.3, 0.5, 0.7, 0.9];
/// Fraction of interior edges dropped by reduced-cost pruning; fewer are
/// dropped after each failure.
const REDUCED_COST_LADDER: [f64; 3] = [0.3, 0.2, 0.1];
/// Number of shortest paths kept by the path restriction.
const K_SHORTEST_LADDER: [usize; 4] = [3, 5, 7, 9];
/// Stop caps tried by the bounded-stops restriction.
const BOUNDED_STOPS_LADDER: [usize; 4] = [2, 3, 5, 8];

/// Everything a strategy needs to run one pricing round.
pub struct PricingContext<'a> {
    pub graph: &'a VrpGraph,
    pub duals: &'a DualPrices,
    pub config: &'a ProblemConfig,
    pub vehicle_type: usize,
    pub engine: &'a dyn PathEngine,
    pub exact: bool,
    pub deadline: Option<Instant>,
}

impl<'a> PricingContext<'a> {
    fn subproblem(&self) -> Subproblem<'a> {
        Subproblem::new(
            self.graph,
            self.duals,
            self.vehicle_type,
            ResourceModel::new(self.config, self.vehicle_type),
        )
    }

    fn run(&self, sub: &Subproblem<'_>, kind: StrategyKind) -> Result<Vec<CandidateRoute>> {
        price(
            sub,
            self.engine,
            self.exact,
            ColumnOrigin::Strategy(kind),
            self.deadline,
        )
    }
}

/// Runs one strategy family, walking its ladder until a column appears.
/// An empty answer means the family is exhausted; it does not prove
/// pricing optimality unless the family is [`StrategyKind::Exact`].
pub fn attempt(kind: StrategyKind, ctx: &PricingContext<'_>) -> Result<Vec<CandidateRoute>> {
    match kind {
        StrategyKind::Exact => ctx.run(&ctx.subproblem(), kind),
        StrategyKind::EdgeCost => {
            let max_dual = ctx.duals.max_dual();
            for alpha in EDGE_COST_LADDER {
                let threshold = alpha * max_dual;
                let mut sub = ctx.subproblem();
                let vehicle_type = ctx.vehicle_type;
                sub.restrict(|_, e| {
                    e.from() == VrpGraph::SOURCE
                        || e.to() == VrpGraph::SINK
                        || e.cost(vehicle_type) <= threshold
                });
                log::debug!(
                    "edge-cost sparsification alpha={alpha}: {} edges",
                    sub.num_allowed()
                );
                let columns = ctx.run(&sub, kind)?;
                if !columns.is_empty() {
                    return Ok(columns);
                }
            }
            Ok(Vec::new())
        }
        StrategyKind::ReducedCost => {
            for beta in REDUCED_COST_LADDER {
                let mut sub = ctx.subproblem();
                let dropped = reduced_cost_cutoff(&sub, beta);
                sub.restrict(|idx, e| {
                    e.from() == VrpGraph::SOURCE
                        || e.to() == VrpGraph::SINK
                        || !dropped.contains(&idx)
                });
                log::debug!(
                    "reduced-cost pruning beta={beta}: {} edges",
                    sub.num_allowed()
                );
                let columns = ctx.run(&sub, kind)?;
                if !columns.is_empty() {
                    return Ok(columns);
                }
            }
            Ok(Vec::new())
        }
        StrategyKind::KShortest => {
            for k in K_SHORTEST_LADDER {
                let mut sub = ctx.subproblem();
                let keep = k_shortest_edge_union(ctx.graph, ctx.vehicle_type, k);
                sub.restrict(|idx, _| keep.contains(&idx));
                log::debug!("k-shortest restriction k={k}: {} edges", sub.num_allowed());
                let columns = ctx.run(&sub, kind)?;
                if !columns.is_empty() {
                    return Ok(columns);
                }
            }
            Ok(Vec::new())
        }
        StrategyKind::BoundedStops => {
            let configured = ctx.config.num_stops();
            for cap in BOUNDED_STOPS_LADDER {
                if configured.is_some_and(|n| cap >= n) {
                    break;
                }
                let mut sub = ctx.subproblem();
                sub.cap_stops(cap);
                log::debug!("bounded-stops restriction cap={cap}");
                let columns = ctx.run(&sub, kind)?;
                if !columns.is_empty() {
                    return Ok(columns);
                }
            }
            Ok(Vec::new())
        }
    }
}

/// Interior edges falling in the `beta` highest-reduced-cost share.
fn reduced_cost_cutoff(sub: &Subproblem<'_>, beta: f64) -> HashSet<usize> {
    let mut interior: Vec<(usize, f64)> = sub
        .graph()
        .edges()
        .filter(|(_, e)| e.from() != VrpGraph::SOURCE && e.to() != VrpGraph::SINK)
        .map(|(idx, _)| (idx, sub.reduced_cost(idx)))
        .collect();
    interior.sort_by(|a, b| b.1.partial_cmp(&a.1).expect("reduced costs are finite"));
    let drop_count = (interior.len() as f64 * beta).floor() as usize;
    interior
        .into_iter()
        .take(drop_count)
        .map(|(idx, _)| idx)
        .collect()
}

/// Union of the edges of the `k` cheapest Source -> Sink paths by raw
/// cost, ignoring resources (Yen's algorithm).
fn k_shortest_edge_union(graph: &VrpGraph, vehicle_type: usize, k: usize) -> HashSet<usize> {
    let mut union = HashSet::new();
    for path in k_shortest_paths(graph, vehicle_type, k, &HashSet::new(), &HashSet::new()) {
        for pair in path.windows(2) {
            if let Some((idx, _)) = graph.edge_between(pair[0], pair[1]) {
                union.insert(idx);
            }
        }
    }
    union
}

/// Cheapest Source -> Sink path by raw cost avoiding banned edges and
/// nodes. Costs are clamped at zero so user-supplied negative costs
/// cannot break the search; this only affects which edges the restriction
/// keeps, never correctness of pricing itself.
fn shortest_path(
    graph: &VrpGraph,
    vehicle_type: usize,
    banned_edges: &HashSet<usize>,
    banned_nodes: &HashSet<NodeId>,
) -> Option<Vec<NodeId>> {
    let bound = graph.node_bound();
    let mut dist = vec![f64::INFINITY; bound];
    let mut pred: Vec<Option<NodeId>> = vec![None; bound];
    let mut done = vec![false; bound];
    dist[VrpGraph::SOURCE.index()] = 0.0;

    loop {
        let mut current: Option<NodeId> = None;
        let mut best = f64::INFINITY;
        for i in 0..bound {
            if !done[i] && dist[i] < best {
                best = dist[i];
                current = Some(NodeId(i));
            }
        }
        let current = current?;
        if current == VrpGraph::SINK {
            break;
        }
        done[current.index()] = true;
        if banned_nodes.contains(&current) {
            continue;
        }
        for (idx, edge) in graph.out_edges(current) {
            if banned_edges.contains(&idx) || banned_nodes.contains(&edge.to()) {
                continue;
            }
            let weight = edge.cost(vehicle_type).max(0.0);
            let candidate = dist[current.index()] + weight;
            if candidate < dist[edge.to().index()] {
                dist[edge.to().index()] = candidate;
                pred[edge.to().index()] = Some(current);
            }
        }
    }

    let mut path = vec![VrpGraph::SINK];
    let mut cursor = VrpGraph::SINK;
    while cursor != VrpGraph::SOURCE {
        cursor = pred[cursor.index()]?;
        path.push(cursor);
    }
    path.reverse();
    Some(path)
}

/// Yen's k-shortest loopless paths.
fn k_shortest_paths(
    graph: &VrpGraph,
    vehicle_type: usize,
    k: usize,
    banned_edges: &HashSet<usize>,
    banned_nodes: &HashSet<NodeId>,
) -> Vec<Vec<NodeId>> {
    let mut found: Vec<Vec<NodeId>> = Vec::new();
    let Some(first) = shortest_path(graph, vehicle_type, banned_edges, banned_nodes) else {
        return found;
    };
    found.push(first);
    let mut candidates: Vec<Vec<NodeId>> = Vec::new();

    while found.len() < k {
        let last = found.last().expect("at least one path").clone();
        for spur_idx in 0..last.len() - 1 {
            let spur_node = last[spur_idx];
            let root: Vec<NodeId> = last[..=spur_idx].to_vec();

            let mut edges = banned_edges.clone();
            for path in &found {
                if path.len() > spur_idx && path[..=spur_idx] == root[..] {
                    if let Some((idx, _)) = graph.edge_between(path[spur_idx], path[spur_idx + 1])
                    {
                        edges.insert(idx);
                    }
                }
            }
            let mut nodes = banned_nodes.clone();
            for &v in &root[..spur_idx] {
                nodes.insert(v);
            }

            if let Some(spur) = shortest_path_from(graph, vehicle_type, spur_node, &edges, &nodes)
            {
                let mut total = root;
                total.extend_from_slice(&spur[1..]);
                if !found.contains(&total) && !candidates.contains(&total) {
                    candidates.push(total);
                }
            }
        }
        if candidates.is_empty() {
            break;
        }
        candidates.sort_by(|a, b| {
            let ca = graph.path_cost(a, vehicle_type).unwrap_or(f64::INFINITY);
            let cb = graph.path_cost(b, vehicle_type).unwrap_or(f64::INFINITY);
            ca.partial_cmp(&cb).expect("path costs are finite")
        });
        found.push(candidates.remove(0));
    }
    found
}

/// Dijkstra from an arbitrary start node to the Sink.
fn shortest_path_from(
    graph: &VrpGraph,
    vehicle_type: usize,
    start: NodeId,
    banned_edges: &HashSet<usize>,
    banned_nodes: &HashSet<NodeId>,
) -> Option<Vec<NodeId>> {
    if start == VrpGraph::SOURCE {
        return shortest_path(graph, vehicle_type, banned_edges, banned_nodes);
    }
    let bound = graph.node_bound();
    let mut dist = vec![f64::INFINITY; bound];
    let mut pred: Vec<Option<NodeId>> = vec![None; bound];
    let mut done = vec![false; bound];
    dist[start.index()] = 0.0;
    loop {
        let mut current: Option<NodeId> = None;
        let mut best = f64::INFINITY;
        for i in 0..bound {
            if !done[i] && dist[i] < best {
                best = dist[i];
                current = Some(NodeId(i));
            }
        }
        let current = current?;
        if current == VrpGraph::SINK {
            break;
        }
        done[current.index()] = true;
        for (idx, edge) in graph.out_edges(current) {
            if banned_edges.contains(&idx) || banned_nodes.contains(&edge.to()) {
                continue;
            }
            let weight = edge.cost(vehicle_type).max(0.0);
            let candidate = dist[current.index()] + weight;
            if candidate < dist[edge.to().index()] {
                dist[edge.to().index()] = candidate;
                pred[edge.to().index()] = Some(current);
            }
        }
    }
    let mut path = vec![VrpGraph::SINK];
    let mut cursor = VrpGraph::SINK;
    while cursor != start {
        cursor = pred[cursor.index()]?;
        path.push(cursor);
    }
    path.reverse();
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Node;
    use crate::pricing::labeling::LabelingEngine;

    fn chain_graph() -> (VrpGraph, Vec<NodeId>) {
        let mut g = VrpGraph::new();
        let customers: Vec<NodeId> = (0..5)
            .map(|_| g.add_customer(Node::new().with_demand(5)))
            .collect();
        for &c in &customers {
            g.add_edge(VrpGraph::SOURCE, c, 10.0, 20.0).expect("edge");
            g.add_edge(c, VrpGraph::SINK, 10.0, 20.0).expect("edge");
        }
        g.add_edge(customers[0], customers[1], 10.0, 20.0).expect("edge");
        g.add_edge(customers[1], customers[2], 10.0, 20.0).expect("edge");
        g.add_edge(customers[2], customers[3], 15.0, 20.0).expect("edge");
        g.add_edge(customers[3], customers[4], 10.0, 25.0).expect("edge");
        (g, customers)
    }

    fn uniform_duals(g: &VrpGraph, pi: f64) -> DualPrices {
        let mut node = vec![0.0; g.node_bound()];
        for v in g.customers() {
            node[v.index()] = pi;
        }
        DualPrices::new(1, node, vec![0.0])
    }

    #[test]
    fn test_shortest_path_prefers_cheap_route() {
        let (g, _) = chain_graph();
        let path = shortest_path(&g, 0, &HashSet::new(), &HashSet::new()).expect("path");
        // All round trips cost 20; the direct two-hop path wins.
        assert_eq!(path.len(), 3);
        let cost = g.path_cost(&path, 0).expect("cost");
        assert!((cost - 20.0).abs() < 1e-10);
    }

    #[test]
    fn test_k_shortest_distinct_paths() {
        let (g, _) = chain_graph();
        let paths = k_shortest_paths(&g, 0, 4, &HashSet::new(), &HashSet::new());
        assert_eq!(paths.len(), 4);
        let unique: HashSet<Vec<NodeId>> = paths.iter().cloned().collect();
        assert_eq!(unique.len(), 4);
        for path in &paths {
            assert_eq!(path[0], VrpGraph::SOURCE);
            assert_eq!(*path.last().expect("non-empty"), VrpGraph::SINK);
        }
    }

    #[test]
    fn test_every_family_finds_the_same_column_quality() {
        let (g, _) = chain_graph();
        let config = ProblemConfig::new().with_num_stops(4);
        // Uniform duals of 25 make multi-stop routes strongly negative.
        let duals = uniform_duals(&g, 25.0);
        let engine = LabelingEngine::new();
        for kind in StrategyKind::ALL {
            let ctx = PricingContext {
                graph: &g,
                duals: &duals,
                config: &config,
                vehicle_type: 0,
                engine: &engine,
                exact: true,
                deadline: None,
            };
            let columns = attempt(kind, &ctx).expect("attempt");
            assert!(!columns.is_empty(), "{kind:?} found nothing");
            for c in &columns {
                assert!(c.reduced_cost < 0.0);
                assert_eq!(c.origin, ColumnOrigin::Strategy(kind));
            }
        }
    }

    #[test]
    fn test_reduced_cost_cutoff_drops_worst_edges() {
        let (g, _) = chain_graph();
        let config = ProblemConfig::new();
        let duals = uniform_duals(&g, 5.0);
        let sub = Subproblem::new(&g, &duals, 0, ResourceModel::new(&config, 0));
        let interior = 4;
        let dropped = reduced_cost_cutoff(&sub, 0.3);
        assert_eq!(dropped.len(), (interior as f64 * 0.3).floor() as usize);
        // The dropped edge must carry the worst reduced cost among
        // interior edges: 2 -> 3 at 15 - 5 = 10.
        let (worst, _) = g
            .edge_between(NodeId(4), NodeId(5))
            .expect("interior edge");
        assert!(dropped.contains(&worst));
    }
}
