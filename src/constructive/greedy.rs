//! Greedy route construction.
//!
//! Iteratively grows a route from the Source by always visiting the
//! cheapest unserved feasible customer, closing at the Sink when nothing
//! fits; repeats until every customer is served or unreachable. Used to
//! diversify the initial column set next to Clarke-Wright.

use crate::models::{NodeId, VrpGraph};

/// Builds routes by nearest-feasible extension, using vehicle type 0
/// costs. Customers that cannot be placed are simply left out; the
/// caller backfills round trips for them.
pub fn greedy_construction(
    graph: &VrpGraph,
    load_capacity: Option<i64>,
    num_stops: Option<usize>,
    duration: Option<f64>,
) -> Vec<Vec<NodeId>> {
    let mut unserved: Vec<NodeId> = graph.customers().collect();
    let mut routes = Vec::new();

    while !unserved.is_empty() {
        let mut path = vec![VrpGraph::SOURCE];
        let mut load = 0i64;
        let mut elapsed = 0.0;
        let mut stops = 0usize;

        loop {
            let last = *path.last().expect("path is never empty");
            let next = graph
                .out_edges(last)
                .filter(|(_, e)| e.to() != VrpGraph::SINK)
                .filter(|(_, e)| unserved.contains(&e.to()))
                .filter(|(_, e)| {
                    let head = graph.node(e.to());
                    let load_ok =
                        load_capacity.map_or(true, |cap| load + head.demand() <= cap);
                    let return_time = graph
                        .edge_between(e.to(), VrpGraph::SINK)
                        .map_or(f64::INFINITY, |(_, back)| back.time());
                    let time_ok = duration.map_or(true, |max| {
                        elapsed + e.time() + head.service_time() + return_time <= max + 1e-9
                    });
                    load_ok && time_ok
                })
                .min_by(|(_, a), (_, b)| {
                    a.cost(0)
                        .partial_cmp(&b.cost(0))
                        .expect("costs should not be NaN")
                });
            let Some((_, edge)) = next else {
                break;
            };
            let to = edge.to();
            load += graph.node(to).demand();
            elapsed += edge.time() + graph.node(to).service_time();
            stops += 1;
            path.push(to);
            unserved.retain(|&v| v != to);
            if num_stops == Some(stops) {
                break;
            }
        }

        if path.len() == 1 {
            // No customer could start a route; the rest stay unserved.
            break;
        }
        let last = *path.last().expect("path is never empty");
        if graph.edge_between(last, VrpGraph::SINK).is_none() {
            log::debug!("greedy route ending at {last} cannot reach the Sink, dropped");
            continue;
        }
        path.push(VrpGraph::SINK);
        routes.push(path);
    }
    routes
}
