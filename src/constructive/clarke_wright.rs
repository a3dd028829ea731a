//! Clarke-Wright savings algorithm on the routing network.
//!
//! # Algorithm
//!
//! Starts with one round trip per customer (Source -> customer -> Sink)
//! and merges routes in order of decreasing savings:
//!
//! ```text
//! s(i, j) = c(i, Sink) + c(Source, j) - alpha * c(i, j)
//! ```
//!
//! A merge either appends `j` to a route ending in `i` or prepends `i`
//! to a route starting with `j`, subject to capacity, duration and stop
//! constraints. The `alpha` shape parameter trades route length against
//! radial distance; the caller sweeps it and keeps every route as a
//! candidate column.
//!
//! # Reference
//!
//! Clarke, G. & Wright, J.W. (1964). "Scheduling of Vehicles from a
//! Central Depot to a Number of Delivery Points", *Operations Research*
//! 12(4), 568-581.

use crate::models::{NodeId, VrpGraph};

/// A savings value for merging two customers' routes.
#[derive(Debug)]
struct Saving {
    i: NodeId,
    j: NodeId,
    value: f64,
}

struct RouteState {
    members: Vec<NodeId>,
    load: i64,
    time: f64,
    cost: f64,
}

/// Constructs routes with the Clarke-Wright savings algorithm, using
/// vehicle type 0 costs.
///
/// Returns the routes as node sequences (Source and Sink included) and
/// their total cost.
pub fn clarke_wright_savings(
    graph: &VrpGraph,
    load_capacity: Option<i64>,
    duration: Option<f64>,
    num_stops: Option<usize>,
    alpha: f64,
) -> (Vec<Vec<NodeId>>, f64) {
    let customers: Vec<NodeId> = graph.customers().collect();
    let mut route_of: Vec<Option<usize>> = vec![None; graph.node_bound()];
    let mut routes: Vec<RouteState> = Vec::new();

    // One round trip per customer.
    for &v in &customers {
        let (Some((_, to)), Some((_, back))) = (
            graph.edge_between(VrpGraph::SOURCE, v),
            graph.edge_between(v, VrpGraph::SINK),
        ) else {
            log::warn!("customer {v} is not connected to the depot, skipping");
            continue;
        };
        route_of[v.index()] = Some(routes.len());
        routes.push(RouteState {
            members: vec![v],
            load: graph.node(v).demand(),
            time: graph.node(v).service_time() + to.time() + back.time(),
            cost: to.cost(0) + back.cost(0),
        });
    }

    // Savings over interior edges, best first.
    let mut savings: Vec<Saving> = Vec::new();
    for (_, edge) in graph.edges() {
        let (i, j) = (edge.from(), edge.to());
        if i == VrpGraph::SOURCE || j == VrpGraph::SINK {
            continue;
        }
        let (Some((_, i_sink)), Some((_, source_j))) = (
            graph.edge_between(i, VrpGraph::SINK),
            graph.edge_between(VrpGraph::SOURCE, j),
        ) else {
            continue;
        };
        savings.push(Saving {
            i,
            j,
            value: i_sink.cost(0) + source_j.cost(0) - alpha * edge.cost(0),
        });
    }
    savings.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .expect("savings should not be NaN")
    });

    let mut processed: Vec<bool> = vec![false; graph.node_bound()];
    for saving in &savings {
        let (Some(ri), Some(rj)) = (route_of[saving.i.index()], route_of[saving.j.index()])
        else {
            continue;
        };
        if ri == rj {
            continue;
        }
        // Append j to a route ending in i.
        if !processed[saving.j.index()]
            && routes[ri].members.last() == Some(&saving.i)
            && merge_feasible(graph, &routes[ri], saving.j, saving.i, load_capacity, duration, num_stops)
        {
            let delta = merge_cost_delta(graph, saving.i, saving.j);
            let extra_time = merge_time_delta(graph, saving.i, saving.j);
            let load_j = graph.node(saving.j).demand();
            routes[ri].members.push(saving.j);
            routes[ri].load += load_j;
            routes[ri].time += extra_time;
            routes[ri].cost += delta;
            route_of[saving.j.index()] = Some(ri);
            routes[rj].members.clear();
            processed[saving.i.index()] = true;
            processed[saving.j.index()] = true;
            continue;
        }
        // Prepend i to a route starting with j.
        if !processed[saving.i.index()]
            && routes[rj].members.first() == Some(&saving.j)
            && graph.edge_between(VrpGraph::SOURCE, saving.i).is_some()
            && prepend_feasible(graph, &routes[rj], saving.i, load_capacity, duration, num_stops)
        {
            let source_i = graph
                .edge_between(VrpGraph::SOURCE, saving.i)
                .map(|(_, e)| e.cost(0))
                .unwrap_or(0.0);
            let source_j = graph
                .edge_between(VrpGraph::SOURCE, saving.j)
                .map(|(_, e)| e.cost(0))
                .unwrap_or(0.0);
            let edge_ij = graph
                .edge_between(saving.i, saving.j)
                .map(|(_, e)| (e.cost(0), e.time()))
                .unwrap_or((0.0, 0.0));
            routes[rj].members.insert(0, saving.i);
            routes[rj].load += graph.node(saving.i).demand();
            routes[rj].time += graph
                .edge_between(VrpGraph::SOURCE, saving.i)
                .map(|(_, e)| e.time())
                .unwrap_or(0.0)
                + edge_ij.1
                + graph.node(saving.i).service_time()
                - graph
                    .edge_between(VrpGraph::SOURCE, saving.j)
                    .map(|(_, e)| e.time())
                    .unwrap_or(0.0);
            routes[rj].cost += source_i + edge_ij.0 - source_j;
            route_of[saving.i.index()] = Some(rj);
            routes[ri].members.clear();
            processed[saving.i.index()] = true;
            processed[saving.j.index()] = true;
        }
    }

    let mut result = Vec::new();
    let mut total = 0.0;
    for route in &routes {
        if route.members.is_empty() {
            continue;
        }
        let mut nodes = vec![VrpGraph::SOURCE];
        nodes.extend_from_slice(&route.members);
        nodes.push(VrpGraph::SINK);
        total += route.cost;
        result.push(nodes);
    }
    (result, total)
}

fn merge_cost_delta(graph: &VrpGraph, tail: NodeId, appended: NodeId) -> f64 {
    let edge = graph
        .edge_between(tail, appended)
        .map(|(_, e)| e.cost(0))
        .unwrap_or(0.0);
    let to_sink = graph
        .edge_between(appended, VrpGraph::SINK)
        .map(|(_, e)| e.cost(0))
        .unwrap_or(0.0);
    let old_to_sink = graph
        .edge_between(tail, VrpGraph::SINK)
        .map(|(_, e)| e.cost(0))
        .unwrap_or(0.0);
    edge + to_sink - old_to_sink
}

fn merge_time_delta(graph: &VrpGraph, tail: NodeId, appended: NodeId) -> f64 {
    let edge = graph
        .edge_between(tail, appended)
        .map(|(_, e)| e.time())
        .unwrap_or(0.0);
    let to_sink = graph
        .edge_between(appended, VrpGraph::SINK)
        .map(|(_, e)| e.time())
        .unwrap_or(0.0);
    let old_to_sink = graph
        .edge_between(tail, VrpGraph::SINK)
        .map(|(_, e)| e.time())
        .unwrap_or(0.0);
    edge + to_sink - old_to_sink + graph.node(appended).service_time()
}

fn merge_feasible(
    graph: &VrpGraph,
    route: &RouteState,
    new_node: NodeId,
    tail: NodeId,
    load_capacity: Option<i64>,
    duration: Option<f64>,
    num_stops: Option<usize>,
) -> bool {
    if route.members.contains(&new_node) {
        return false;
    }
    if graph.edge_between(new_node, VrpGraph::SINK).is_none() {
        return false;
    }
    if let Some(cap) = load_capacity {
        if route.load + graph.node(new_node).demand() > cap {
            return false;
        }
    }
    if let Some(max) = duration {
        if route.time + merge_time_delta(graph, tail, new_node) > max + 1e-9 {
            return false;
        }
    }
    if let Some(max) = num_stops {
        if route.members.len() + 1 > max {
            return false;
        }
    }
    true
}

fn prepend_feasible(
    graph: &VrpGraph,
    route: &RouteState,
    new_node: NodeId,
    load_capacity: Option<i64>,
    duration: Option<f64>,
    num_stops: Option<usize>,
) -> bool {
    if route.members.contains(&new_node) {
        return false;
    }
    if let Some(cap) = load_capacity {
        if route.load + graph.node(new_node).demand() > cap {
            return false;
        }
    }
    if let Some(max) = num_stops {
        if route.members.len() + 1 > max {
            return false;
        }
    }
    if let Some(max) = duration {
        let head = route.members[0];
        let extra = graph
            .edge_between(VrpGraph::SOURCE, new_node)
            .map(|(_, e)| e.time())
            .unwrap_or(0.0)
            + graph
                .edge_between(new_node, head)
                .map(|(_, e)| e.time())
                .unwrap_or(f64::INFINITY)
            + graph.node(new_node).service_time()
            - graph
                .edge_between(VrpGraph::SOURCE, head)
                .map(|(_, e)| e.time())
                .unwrap_or(0.0);
        if route.time + extra > max + 1e-9 {
            return false;
        }
    }
    graph.edge_between(new_node, route.members[0]).is_some()
}
