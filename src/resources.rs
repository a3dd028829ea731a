//! Resource vectors and their extension rules.
//!
//! A [`ResourceModel`] encodes, for the active VRP variant and one vehicle
//! type, which resources are carried along a partial path and how they
//! grow when an edge is appended. The pricing engines never look at the
//! constraint set directly; they only call [`extend`](ResourceModel::extend)
//! and [`is_feasible`](ResourceModel::is_feasible).
//!
//! Resources:
//!
//! - `stops` — customers visited, bounded by the stop limit.
//! - `load` — accumulated demand; under distribution/collection this is
//!   the peak on-board load `m` of the monotone recursion
//!   `m' = max(m + demand, c + collect)`, which equals the maximum load of
//!   a vehicle that leaves the depot with all deliveries and accumulates
//!   collections.
//! - `elapsed` — travel plus service time, bounded by the duration limit;
//!   waiting never counts.
//! - `clock` — service start time including waiting, bounded per node by
//!   the time window upper bound.

use crate::config::ProblemConfig;
use crate::models::{Edge, NodeId, VrpGraph};

/// Accumulated resource values of a partial path.
///
/// Created at the Source and extended edge by edge within a single pricing
/// call; never shared across calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceVector {
    /// Customers visited so far.
    pub stops: usize,
    /// Accumulated load (peak load under distribution/collection).
    pub load: i64,
    /// Amount collected so far (distribution/collection only).
    pub collected: i64,
    /// Travel plus service time.
    pub elapsed: f64,
    /// Service start time at the last node, waiting included.
    pub clock: f64,
}

impl ResourceVector {
    /// Componentwise comparison used for label dominance: `true` if `self`
    /// is at most `other` in every resource.
    pub fn dominates(&self, other: &ResourceVector) -> bool {
        self.stops <= other.stops
            && self.load <= other.load
            && self.collected <= other.collected
            && self.elapsed <= other.elapsed + 1e-9
            && self.clock <= other.clock + 1e-9
    }
}

/// Resource bounds and extension rules for one vehicle type.
#[derive(Debug, Clone)]
pub struct ResourceModel {
    num_stops: Option<usize>,
    capacity: Option<i64>,
    duration: Option<f64>,
    time_windows: bool,
    distribution_collection: bool,
}

impl ResourceModel {
    /// Builds the model for a vehicle type from the constraint set.
    pub fn new(config: &ProblemConfig, vehicle_type: usize) -> Self {
        let capacity = match config.load_capacity() {
            [] => None,
            caps => Some(caps[vehicle_type.min(caps.len() - 1)]),
        };
        Self {
            num_stops: config.num_stops(),
            capacity,
            duration: config.duration(),
            time_windows: config.time_windows(),
            distribution_collection: config.distribution_collection(),
        }
    }

    /// Tightens the stop bound (strategy restriction); the configured
    /// bound still applies if smaller.
    pub fn with_stop_cap(mut self, cap: usize) -> Self {
        self.num_stops = Some(self.num_stops.map_or(cap, |n| n.min(cap)));
        self
    }

    /// Stop bound, if any.
    pub fn num_stops(&self) -> Option<usize> {
        self.num_stops
    }

    /// Load capacity of this vehicle type, if constrained.
    pub fn capacity(&self) -> Option<i64> {
        self.capacity
    }

    /// Duration bound, if any.
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Whether node time windows are enforced.
    pub fn time_windows(&self) -> bool {
        self.time_windows
    }

    /// The empty path at the Source.
    pub fn initial(&self, graph: &VrpGraph) -> ResourceVector {
        ResourceVector {
            stops: 0,
            load: 0,
            collected: 0,
            elapsed: 0.0,
            clock: graph.node(VrpGraph::SOURCE).release(),
        }
    }

    /// Extends a partial path along `edge`, returning `None` when any
    /// resource bound is violated. Waiting for a time window to open is
    /// not a violation; it only advances the clock.
    pub fn extend(
        &self,
        rv: &ResourceVector,
        graph: &VrpGraph,
        edge: &Edge,
    ) -> Option<ResourceVector> {
        let tail = graph.node(edge.from());
        let head_id = edge.to();
        let head = graph.node(head_id);

        let stops = rv.stops + usize::from(head_id != VrpGraph::SINK);
        if let Some(max_stops) = self.num_stops {
            if stops > max_stops {
                return None;
            }
        }

        let (load, collected) = if self.distribution_collection {
            let load = (rv.load + head.demand()).max(rv.collected + head.collect());
            (load, rv.collected + head.collect())
        } else {
            (rv.load + head.demand(), 0)
        };
        if let Some(capacity) = self.capacity {
            if load > capacity {
                return None;
            }
        }

        let elapsed = rv.elapsed + edge.time() + head.service_time();
        if let Some(duration) = self.duration {
            if elapsed > duration + 1e-9 {
                return None;
            }
        }

        let clock = (rv.clock + tail.service_time() + edge.time()).max(head.release());
        if self.time_windows && clock > head.deadline() + 1e-9 {
            return None;
        }

        Some(ResourceVector {
            stops,
            load,
            collected,
            elapsed,
            clock,
        })
    }

    /// Feasibility predicate over a completed resource vector.
    pub fn is_feasible(&self, rv: &ResourceVector) -> bool {
        self.num_stops.map_or(true, |n| rv.stops <= n)
            && self.capacity.map_or(true, |c| rv.load <= c)
            && self.duration.map_or(true, |d| rv.elapsed <= d + 1e-9)
    }

    /// Folds [`extend`](Self::extend) over a complete node sequence,
    /// returning the final resource vector if every step is feasible.
    pub fn trace(&self, graph: &VrpGraph, nodes: &[NodeId]) -> Option<ResourceVector> {
        let mut rv = self.initial(graph);
        for pair in nodes.windows(2) {
            let (_, edge) = graph.edge_between(pair[0], pair[1])?;
            rv = self.extend(&rv, graph, edge)?;
        }
        Some(rv)
    }
}
