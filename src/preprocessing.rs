//! Preprocessing of the working graph before column generation.
//!
//! Mirrors the classic reductions: repair depot connectivity with
//! high-cost edges, guarantee the zero-cost Source -> Sink edge pricing
//! relies on, reject structurally infeasible inputs, remove arcs no
//! feasible route can use, tighten time windows against the depot
//! bounds, and tighten the stop limit with a knapsack bound on how many
//! customers fit into one vehicle.

use crate::config::ProblemConfig;
use crate::error::{Result, SolverError};
use crate::models::{NodeId, TimeWindow, VrpGraph};

/// Cost of the repair edges added for unreachable depot connections.
const REPAIR_COST: f64 = 1e10;

/// Capacities beyond this skip the knapsack bound (the DP table is
/// proportional to the capacity).
const KNAPSACK_CAPACITY_LIMIT: i64 = 10_000;

/// Runs every preprocessing step; mutates the working graph and may
/// tighten `num_stops` in the configuration.
pub fn prepare(graph: &mut VrpGraph, config: &mut ProblemConfig) -> Result<()> {
    repair_depot_connectivity(graph);
    ensure_source_sink_edge(graph)?;
    check_feasibility(graph, config)?;
    if let Some(max_capacity) = config.max_capacity() {
        prune_capacity_arcs(graph, max_capacity);
    }
    if config.time_windows() {
        strengthen_time_windows(graph);
        prune_time_window_arcs(graph);
    }
    if config.max_capacity().is_some() && !config.pickup_delivery() {
        if let Some(bound) = num_stops_upper_bound(graph, config) {
            let tightened = config.num_stops().map_or(bound, |n| n.min(bound));
            log::info!("new upper bound: max num stops = {tightened}");
            config.set_num_stops(tightened);
        }
    }
    if !graph.has_source_sink_path() {
        return Err(SolverError::InfeasibleInput(
            "Source and Sink are not connected".into(),
        ));
    }
    Ok(())
}

/// Adds fixed vehicle costs onto every Source-outgoing edge, so route
/// costs and reduced costs automatically include one fixed charge per
/// vehicle.
pub fn fold_fixed_costs(graph: &mut VrpGraph, config: &ProblemConfig) {
    if config.fixed_cost().iter().any(|&c| c != 0.0) {
        let mut per_type = config.fixed_cost().to_vec();
        per_type.resize(graph.vehicle_types(), 0.0);
        graph.scale_source_costs(&per_type);
    }
}

fn repair_depot_connectivity(graph: &mut VrpGraph) {
    let customers: Vec<NodeId> = graph.customers().collect();
    for v in customers {
        if graph.edge_between(VrpGraph::SOURCE, v).is_none()
            && !graph.has_edge(VrpGraph::SOURCE, v)
        {
            log::warn!("Source not connected to {v}, adding a high-cost edge");
            let _ = graph.add_edge(VrpGraph::SOURCE, v, REPAIR_COST, 0.0);
        }
        if graph.edge_between(v, VrpGraph::SINK).is_none() && !graph.has_edge(v, VrpGraph::SINK) {
            log::warn!("{v} not connected to Sink, adding a high-cost edge");
            let _ = graph.add_edge(v, VrpGraph::SINK, REPAIR_COST, 0.0);
        }
    }
}

fn ensure_source_sink_edge(graph: &mut VrpGraph) -> Result<()> {
    if !graph.has_edge(VrpGraph::SOURCE, VrpGraph::SINK) {
        graph.add_edge(VrpGraph::SOURCE, VrpGraph::SINK, 0.0, 0.0)?;
    }
    Ok(())
}

fn check_feasibility(graph: &VrpGraph, config: &ProblemConfig) -> Result<()> {
    if let Some(max_capacity) = config.max_capacity() {
        for v in graph.customers() {
            if graph.node(v).demand() > max_capacity {
                return Err(SolverError::InfeasibleInput(format!(
                    "demand {} at node {v} larger than max capacity {max_capacity}",
                    graph.node(v).demand()
                )));
            }
        }
    }
    if let Some(duration) = config.duration() {
        for v in graph.customers() {
            let out = graph
                .edge_between(VrpGraph::SOURCE, v)
                .map_or(0.0, |(_, e)| e.time());
            let back = graph
                .edge_between(v, VrpGraph::SINK)
                .map_or(0.0, |(_, e)| e.time());
            let round_trip = graph.node(v).service_time() + out + back;
            if round_trip > duration + 1e-9 {
                return Err(SolverError::InfeasibleInput(format!(
                    "node {v} not reachable: round trip takes {round_trip}, max duration is {duration}"
                )));
            }
        }
    }
    Ok(())
}

fn prune_capacity_arcs(graph: &mut VrpGraph, max_capacity: i64) {
    let doomed: Vec<usize> = graph
        .edges()
        .filter(|(_, e)| {
            graph.node(e.from()).demand() + graph.node(e.to()).demand() > max_capacity
        })
        .map(|(idx, _)| idx)
        .collect();
    for idx in doomed {
        graph.remove_edge(idx);
    }
}

fn strengthen_time_windows(graph: &mut VrpGraph) {
    // The Sink deadline falls back to the latest possible return.
    if !graph.node(VrpGraph::SINK).deadline().is_finite() {
        let mut latest: f64 = 0.0;
        let mut bounded = true;
        let preds: Vec<(NodeId, f64)> = graph
            .in_edges(VrpGraph::SINK)
            .map(|(_, e)| (e.from(), e.time()))
            .collect();
        for (u, time) in preds {
            let node = graph.node(u);
            // The Source departs at its release time, not its deadline.
            let limit = if u == VrpGraph::SOURCE {
                node.release()
            } else {
                node.deadline()
            };
            if !limit.is_finite() {
                bounded = false;
                break;
            }
            latest = latest.max(limit + node.service_time() + time);
        }
        if bounded {
            let release = graph.node(VrpGraph::SINK).release();
            graph
                .node_mut(VrpGraph::SINK)
                .set_time_window(TimeWindow::new(release, latest));
        }
    }

    let source_release = graph.node(VrpGraph::SOURCE).release();
    let sink_deadline = graph.node(VrpGraph::SINK).deadline();
    let customers: Vec<NodeId> = graph.customers().collect();
    for v in customers {
        // Earliest service comes straight from the depot, latest leaves
        // straight for it.
        let from_depot = graph
            .edge_between(VrpGraph::SOURCE, v)
            .map(|(_, e)| source_release + e.time());
        let to_depot = graph
            .edge_between(v, VrpGraph::SINK)
            .map(|(_, e)| sink_deadline - e.time());
        let node = graph.node(v);
        let lower = from_depot.map_or(node.release(), |t| node.release().max(t));
        let upper = to_depot.map_or(node.deadline(), |t| node.deadline().min(t));
        if let Some(tw) = TimeWindow::new(lower, upper) {
            graph.node_mut(v).set_time_window(Some(tw));
        }
    }
}

fn prune_time_window_arcs(graph: &mut VrpGraph) {
    let doomed: Vec<usize> = graph
        .edges()
        .filter(|(_, e)| {
            let tail = graph.node(e.from());
            let head = graph.node(e.to());
            tail.release() + tail.service_time() + e.time() > head.deadline() + 1e-9
        })
        .map(|(idx, _)| idx)
        .collect();
    for idx in doomed {
        graph.remove_edge(idx);
    }
}

/// Maximum number of customers a single vehicle can serve, from a
/// knapsack relaxation of the capacity constraint.
fn num_stops_upper_bound(graph: &VrpGraph, config: &ProblemConfig) -> Option<usize> {
    let max_capacity = config.max_capacity()?;
    if max_capacity > KNAPSACK_CAPACITY_LIMIT {
        log::debug!("capacity {max_capacity} too large for the knapsack stop bound");
        return None;
    }
    let demands: Vec<i64> = graph
        .customers()
        .map(|v| graph.node(v).demand().max(0))
        .collect();
    let mut bound = knapsack_count(&demands, max_capacity);
    if config.distribution_collection() {
        let collects: Vec<i64> = graph
            .customers()
            .map(|v| graph.node(v).collect().max(0))
            .collect();
        bound = bound.min(knapsack_count(&collects, max_capacity));
    }
    Some(bound)
}

/// Knapsack with unit profits: how many of the weights fit in capacity.
/// With non-negative weights this is just greedy over the sorted list.
fn knapsack_count(weights: &[i64], capacity: i64) -> usize {
    let mut sorted = weights.to_vec();
    sorted.sort_unstable();
    let mut total = 0i64;
    let mut count = 0usize;
    for w in sorted {
        if total + w > capacity {
            break;
        }
        total += w;
        count += 1;
    }
    count
}
