//! Node, node identifier, and time window types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a node in a [`VrpGraph`](super::VrpGraph).
///
/// Index 0 is always the Source and index 1 the Sink; customers start at 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Raw index into the graph's node table.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0 => write!(f, "Source"),
            1 => write!(f, "Sink"),
            n => write!(f, "{n}"),
        }
    }
}

/// A service time window at a node.
///
/// The vehicle may arrive before `lower` and wait; arriving after `upper`
/// is infeasible.
///
/// # Examples
///
/// ```
/// use colgen_routing::models::TimeWindow;
///
/// let tw = TimeWindow::new(100.0, 200.0).unwrap();
/// assert_eq!(tw.lower(), 100.0);
/// assert_eq!(tw.waiting_time(80.0), 20.0);
/// assert!(!tw.is_violated(200.0));
/// assert!(tw.is_violated(200.1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    lower: f64,
    upper: f64,
}

impl TimeWindow {
    /// Creates a new time window.
    ///
    /// Returns `None` if `lower > upper`, either bound is NaN, or `lower`
    /// is not finite (an unbounded `upper` is allowed).
    pub fn new(lower: f64, upper: f64) -> Option<Self> {
        if !lower.is_finite() || upper.is_nan() || lower > upper {
            return None;
        }
        Some(Self { lower, upper })
    }

    /// Earliest service start time.
    pub fn lower(&self) -> f64 {
        self.lower
    }

    /// Latest allowable arrival time.
    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// Waiting time incurred when arriving at the given time (zero if the
    /// arrival falls inside or after the window).
    pub fn waiting_time(&self, arrival: f64) -> f64 {
        (self.lower - arrival).max(0.0)
    }

    /// Returns `true` if arriving at the given time violates this window.
    pub fn is_violated(&self, arrival: f64) -> bool {
        arrival > self.upper
    }
}

/// A node of the routing network.
///
/// Customers carry a demand (signed for pickup/delivery variants), a
/// collection amount (simultaneous distribution/collection), a service
/// time, an optional time window, and a visit frequency (periodic
/// variants). Source and Sink are created with the graph and stay
/// demand-free.
///
/// # Examples
///
/// ```
/// use colgen_routing::models::{Node, TimeWindow};
///
/// let n = Node::new()
///     .with_demand(5)
///     .with_service_time(1.0)
///     .with_time_window(TimeWindow::new(5.0, 100.0).unwrap());
/// assert_eq!(n.demand(), 5);
/// assert_eq!(n.frequency(), 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    demand: i64,
    collect: i64,
    service_time: f64,
    time_window: Option<TimeWindow>,
    frequency: u32,
    request: Option<NodeId>,
}

impl Node {
    /// Creates a node with zero demand, zero service time, no window and
    /// frequency 1.
    pub fn new() -> Self {
        Self {
            demand: 0,
            collect: 0,
            service_time: 0.0,
            time_window: None,
            frequency: 1,
            request: None,
        }
    }

    /// Sets the demand (negative for delivery nodes of a pickup/delivery
    /// pair).
    pub fn with_demand(mut self, demand: i64) -> Self {
        self.demand = demand;
        self
    }

    /// Sets the amount collected at this node (distribution/collection).
    pub fn with_collect(mut self, collect: i64) -> Self {
        self.collect = collect;
        self
    }

    /// Sets the service time.
    pub fn with_service_time(mut self, service_time: f64) -> Self {
        self.service_time = service_time;
        self
    }

    /// Sets the time window.
    pub fn with_time_window(mut self, tw: TimeWindow) -> Self {
        self.time_window = Some(tw);
        self
    }

    /// Sets the visit frequency over the periodic time span.
    pub fn with_frequency(mut self, frequency: u32) -> Self {
        self.frequency = frequency;
        self
    }

    /// Demand at this node.
    pub fn demand(&self) -> i64 {
        self.demand
    }

    /// Amount collected at this node.
    pub fn collect(&self) -> i64 {
        self.collect
    }

    /// Service time at this node.
    pub fn service_time(&self) -> f64 {
        self.service_time
    }

    /// Time window, if any.
    pub fn time_window(&self) -> Option<&TimeWindow> {
        self.time_window.as_ref()
    }

    /// Earliest service time (window lower bound, or 0).
    pub fn release(&self) -> f64 {
        self.time_window.map_or(0.0, |tw| tw.lower())
    }

    /// Latest arrival time (window upper bound, or +inf).
    pub fn deadline(&self) -> f64 {
        self.time_window.map_or(f64::INFINITY, |tw| tw.upper())
    }

    /// Visit frequency over the periodic time span.
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Paired delivery node, if this node is a pickup of a request.
    pub fn request(&self) -> Option<NodeId> {
        self.request
    }

    pub(crate) fn set_request(&mut self, delivery: NodeId) {
        self.request = Some(delivery);
    }

    pub(crate) fn set_demand(&mut self, demand: i64) {
        self.demand = demand;
    }

    pub(crate) fn set_collect(&mut self, collect: i64) {
        self.collect = collect;
    }

    pub(crate) fn set_time_window(&mut self, tw: Option<TimeWindow>) {
        self.time_window = tw;
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_window_valid() {
        let tw = TimeWindow::new(10.0, 20.0).expect("valid");
        assert_eq!(tw.lower(), 10.0);
        assert_eq!(tw.upper(), 20.0);
    }

    #[test]
    fn test_time_window_invalid() {
        assert!(TimeWindow::new(20.0, 10.0).is_none());
        assert!(TimeWindow::new(f64::NAN, 10.0).is_none());
        assert!(TimeWindow::new(f64::INFINITY, f64::INFINITY).is_none());
    }

    #[test]
    fn test_time_window_unbounded_upper() {
        let tw = TimeWindow::new(0.0, f64::INFINITY).expect("valid");
        assert!(!tw.is_violated(1e12));
    }

    #[test]
    fn test_waiting_time() {
        let tw = TimeWindow::new(10.0, 20.0).expect("valid");
        assert!((tw.waiting_time(5.0) - 5.0).abs() < 1e-10);
        assert_eq!(tw.waiting_time(10.0), 0.0);
        assert_eq!(tw.waiting_time(15.0), 0.0);
    }

    #[test]
    fn test_node_builder() {
        let n = Node::new()
            .with_demand(5)
            .with_collect(2)
            .with_service_time(1.5)
            .with_frequency(2)
            .with_time_window(TimeWindow::new(0.0, 50.0).expect("valid"));
        assert_eq!(n.demand(), 5);
        assert_eq!(n.collect(), 2);
        assert_eq!(n.service_time(), 1.5);
        assert_eq!(n.frequency(), 2);
        assert_eq!(n.release(), 0.0);
        assert_eq!(n.deadline(), 50.0);
        assert!(n.request().is_none());
    }

    #[test]
    fn test_node_defaults() {
        let n = Node::default();
        assert_eq!(n.demand(), 0);
        assert_eq!(n.frequency(), 1);
        assert_eq!(n.release(), 0.0);
        assert_eq!(n.deadline(), f64::INFINITY);
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId(0).to_string(), "Source");
        assert_eq!(NodeId(1).to_string(), "Sink");
        assert_eq!(NodeId(7).to_string(), "7");
    }
}
