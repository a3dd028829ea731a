//! Greedy randomized column generator.
//!
//! Before exact pricing runs, forward paths from the Source and backward
//! paths from the Sink are grown by repeatedly choosing uniformly among
//! the few least-reduced-cost feasible extensions that do not close a
//! cycle. Each repetition is independent, so they are dispatched in
//! parallel; every repetition writes only to its own candidate list and
//! the lists are merged before anything reaches the column pool.
//!
//! The generator only understands load, duration and stop resources; the
//! solver skips it for time-window, pickup-delivery and
//! distribution/collection variants.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::models::{CandidateRoute, ColumnOrigin, NodeId, VrpGraph};

use super::{Subproblem, REDUCED_COST_TOL};

/// Candidate pool size at each extension step.
const POOL_SIZE: usize = 5;

/// The greedy randomized generator.
#[derive(Debug, Clone)]
pub struct GreedyGenerator {
    runs: usize,
}

impl GreedyGenerator {
    /// Creates a generator with the default 20 repetitions per direction.
    pub fn new() -> Self {
        Self { runs: 20 }
    }

    /// Overrides the number of repetitions per direction.
    pub fn with_runs(mut self, runs: usize) -> Self {
        self.runs = runs.max(1);
        self
    }

    /// Runs all repetitions and returns the merged, deduplicated list of
    /// negative-reduced-cost columns.
    pub fn generate(&self, sub: &Subproblem<'_>, seed: u64) -> Vec<CandidateRoute> {
        let mut candidates: Vec<Vec<NodeId>> = (0..2 * self.runs)
            .into_par_iter()
            .filter_map(|run| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(run as u64));
                if run < self.runs {
                    grow_forward(sub, &mut rng)
                } else {
                    grow_backward(sub, &mut rng)
                }
            })
            .collect();
        candidates.sort();
        candidates.dedup();

        let mut columns = Vec::new();
        for nodes in candidates {
            let Some(reduced_cost) = sub.path_reduced_cost(&nodes) else {
                continue;
            };
            if reduced_cost >= -REDUCED_COST_TOL {
                continue;
            }
            if sub.resources().trace(sub.graph(), &nodes).is_none() {
                continue;
            }
            let Ok(cost) = sub.graph().path_cost(&nodes, sub.vehicle_type()) else {
                continue;
            };
            log::debug!("greedy column with reduced cost {reduced_cost:.6}");
            columns.push(CandidateRoute {
                nodes,
                cost,
                reduced_cost,
                vehicle_type: sub.vehicle_type(),
                origin: ColumnOrigin::Greedy,
            });
        }
        columns
    }
}

impl Default for GreedyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Grows one path from the Source, returning it if it reaches the Sink.
fn grow_forward(sub: &Subproblem<'_>, rng: &mut StdRng) -> Option<Vec<NodeId>> {
    let graph = sub.graph();
    let mut path = vec![VrpGraph::SOURCE];
    let mut rv = sub.resources().initial(graph);

    loop {
        let last = *path.last().expect("path is never empty");
        // Feasible extensions with their reduced costs; the direct
        // Source -> Sink hop is excluded, an empty route prices nowhere.
        let mut extensions: Vec<(NodeId, f64)> = sub
            .out_edges(last)
            .filter(|(_, e)| !(last == VrpGraph::SOURCE && e.to() == VrpGraph::SINK))
            .filter(|(_, e)| !path.contains(&e.to()))
            .filter_map(|(idx, e)| {
                sub.resources()
                    .extend(&rv, graph, e)
                    .map(|_| (e.to(), sub.reduced_cost(idx)))
            })
            .collect();
        if extensions.is_empty() {
            return None;
        }
        extensions.sort_by(|a, b| a.1.partial_cmp(&b.1).expect("reduced costs are finite"));
        extensions.truncate(POOL_SIZE);
        let (next, _) = extensions[rng.random_range(0..extensions.len())];

        let (_, edge) = graph.edge_between(last, next).expect("extension edge exists");
        rv = sub
            .resources()
            .extend(&rv, graph, edge)
            .expect("extension was checked feasible");
        path.push(next);
        if next == VrpGraph::SINK {
            return Some(path);
        }
        if sub.resources().num_stops() == Some(rv.stops) {
            // Stop budget exhausted; close the route if the depot is
            // reachable, otherwise abandon the run.
            return match graph.edge_between(next, VrpGraph::SINK) {
                Some((idx, _)) if sub.allows(idx) => {
                    path.push(VrpGraph::SINK);
                    Some(path)
                }
                _ => None,
            };
        }
    }
}

/// Grows one path backward from the Sink, returning it if it reaches the
/// Source.
fn grow_backward(sub: &Subproblem<'_>, rng: &mut StdRng) -> Option<Vec<NodeId>> {
    let graph = sub.graph();
    let mut path = vec![VrpGraph::SINK];
    let mut load = 0i64;
    let mut elapsed = 0.0;
    let mut stops = 0usize;

    loop {
        let first = path[0];
        let mut extensions: Vec<(NodeId, f64)> = sub
            .in_edges(first)
            .filter(|(_, e)| !(first == VrpGraph::SINK && e.from() == VrpGraph::SOURCE))
            .filter(|(_, e)| !path.contains(&e.from()))
            .filter(|(_, e)| {
                let head = graph.node(e.from());
                let load_ok = sub
                    .resources()
                    .capacity()
                    .map_or(true, |cap| load + head.demand() <= cap);
                let time_ok = sub.resources().duration().map_or(true, |d| {
                    elapsed + e.time() + head.service_time() <= d + 1e-9
                });
                load_ok && time_ok
            })
            .map(|(idx, e)| (e.from(), sub.reduced_cost(idx)))
            .collect();
        if extensions.is_empty() {
            return None;
        }
        extensions.sort_by(|a, b| a.1.partial_cmp(&b.1).expect("reduced costs are finite"));
        extensions.truncate(POOL_SIZE);
        let (previous, _) = extensions[rng.random_range(0..extensions.len())];

        let (_, edge) = graph
            .edge_between(previous, first)
            .expect("extension edge exists");
        load += graph.node(previous).demand();
        elapsed += edge.time() + graph.node(previous).service_time();
        path.insert(0, previous);
        if previous == VrpGraph::SOURCE {
            return Some(path);
        }
        stops += 1;
        if sub.resources().num_stops() == Some(stops) {
            return match graph.edge_between(VrpGraph::SOURCE, previous) {
                Some((idx, _)) if sub.allows(idx) => {
                    path.insert(0, VrpGraph::SOURCE);
                    Some(path)
                }
                _ => None,
            };
        }
    }
}
