//! Initial solution constructors.
//!
//! The column pool needs a feasible seed before pricing can start. For
//! plain capacity/duration/stop variants this comes from a Clarke-Wright
//! sweep over the shape parameter plus a greedy pass; pickup-and-delivery
//! instances start from one Source -> pickup -> delivery -> Sink route per
//! request; everything else starts from round trips.

mod clarke_wright;
mod greedy;

pub use clarke_wright::clarke_wright_savings;
pub use greedy::greedy_construction;

use crate::config::ProblemConfig;
use crate::models::{NodeId, VrpGraph};

/// One round trip per customer.
pub fn round_trips(graph: &VrpGraph) -> Vec<Vec<NodeId>> {
    graph
        .customers()
        .map(|v| vec![VrpGraph::SOURCE, v, VrpGraph::SINK])
        .collect()
}

/// One Source -> pickup -> delivery -> Sink route per request.
pub fn pickup_delivery_seeds(graph: &VrpGraph) -> Vec<Vec<NodeId>> {
    graph
        .customers()
        .filter_map(|v| {
            graph
                .node(v)
                .request()
                .map(|d| vec![VrpGraph::SOURCE, v, d, VrpGraph::SINK])
        })
        .collect()
}

/// Builds the initial route set for the active variant.
pub fn initial_routes(graph: &VrpGraph, config: &ProblemConfig) -> Vec<Vec<NodeId>> {
    let mut routes: Vec<Vec<NodeId>> = Vec::new();
    let plain = !config.time_windows()
        && !config.pickup_delivery()
        && !config.distribution_collection()
        && !config.mixed_fleet()
        && config.periodic().is_none();

    if plain {
        let capacity = config.max_capacity();
        let mut best_value = f64::INFINITY;
        let mut best_count = usize::MAX;
        for tenths in 1..20 {
            let alpha = tenths as f64 / 10.0;
            let (found, value) = clarke_wright_savings(
                graph,
                capacity,
                config.duration(),
                config.num_stops(),
                alpha,
            );
            if value < best_value {
                best_value = value;
                best_count = found.len();
            }
            routes.extend(found);
        }
        log::info!(
            "Clarke-Wright solution found with value {best_value} and {best_count} vehicles"
        );
        routes.extend(greedy_construction(
            graph,
            capacity,
            config.num_stops(),
            config.duration(),
        ));
    } else if config.pickup_delivery() {
        routes = pickup_delivery_seeds(graph);
    } else {
        routes = round_trips(graph);
    }

    // Any customer the constructors missed still needs a seed column,
    // provided the depot edges exist at all.
    for v in graph.customers() {
        if !routes.iter().any(|r| r.contains(&v))
            && graph.edge_between(VrpGraph::SOURCE, v).is_some()
            && graph.edge_between(v, VrpGraph::SINK).is_some()
        {
            routes.push(vec![VrpGraph::SOURCE, v, VrpGraph::SINK]);
        }
    }
    routes.sort();
    routes.dedup();
    routes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Node;

    #[test]
    fn test_initial_routes_cover_all_customers() {
        let mut g = VrpGraph::new();
        let customers: Vec<NodeId> = (0..4)
            .map(|_| g.add_customer(Node::new().with_demand(5)))
            .collect();
        for &c in &customers {
            g.add_edge(VrpGraph::SOURCE, c, 10.0, 0.0).expect("edge");
            g.add_edge(c, VrpGraph::SINK, 10.0, 0.0).expect("edge");
        }
        let config = ProblemConfig::new().with_load_capacity(vec![10]);
        let routes = initial_routes(&g, &config);
        for &c in &customers {
            assert!(routes.iter().any(|r| r.contains(&c)));
        }
    }

    #[test]
    fn test_pickup_delivery_seeds() {
        let mut g = VrpGraph::new();
        let p = g.add_customer(Node::new().with_demand(5));
        let d = g.add_customer(Node::new().with_demand(-5));
        g.link_request(p, d).expect("request");
        g.add_edge(VrpGraph::SOURCE, p, 1.0, 0.0).expect("edge");
        g.add_edge(p, d, 1.0, 0.0).expect("edge");
        g.add_edge(d, VrpGraph::SINK, 1.0, 0.0).expect("edge");
        let config = ProblemConfig::new().with_pickup_delivery();
        let routes = initial_routes(&g, &config);
        assert!(routes.contains(&vec![VrpGraph::SOURCE, p, d, VrpGraph::SINK]));
    }

    #[test]
    fn test_round_trips_for_time_windows() {
        let mut g = VrpGraph::new();
        let c = g.add_customer(Node::new().with_demand(5));
        g.add_edge(VrpGraph::SOURCE, c, 1.0, 0.0).expect("edge");
        g.add_edge(c, VrpGraph::SINK, 1.0, 0.0).expect("edge");
        let config = ProblemConfig::new().with_time_windows();
        let routes = initial_routes(&g, &config);
        assert_eq!(routes, vec![vec![VrpGraph::SOURCE, c, VrpGraph::SINK]]);
    }
}
