//! Problem constraints and solve options.
//!
//! [`ProblemConfig`] describes the active VRP variant (which resources are
//! constrained, fleet shape, penalties, periodicity). [`SolveOptions`]
//! controls a single `solve` call (pricing strategy, engines, heuristics,
//! limits). Both are validated eagerly: inconsistent combinations are
//! rejected before any solving begins.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};
use crate::hyper::HyperState;
use crate::models::NodeId;

/// A concrete pricing strategy family.
///
/// Each family restricts the pricing search space in its own way and walks
/// an escalation ladder on failure; [`Exact`](StrategyKind::Exact) is the
/// unrestricted final fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    /// Drop interior edges whose raw cost exceeds `alpha * max_dual`.
    EdgeCost,
    /// Drop the highest-reduced-cost fraction of interior edges.
    ReducedCost,
    /// Restrict the search to the union of the k cheapest Source->Sink paths.
    KShortest,
    /// Tighten the stop-count resource below the configured bound.
    BoundedStops,
    /// Unrestricted search.
    Exact,
}

impl StrategyKind {
    /// All families, in default escalation order.
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::KShortest,
        StrategyKind::EdgeCost,
        StrategyKind::ReducedCost,
        StrategyKind::BoundedStops,
        StrategyKind::Exact,
    ];
}

/// How the pricing strategy is chosen each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingStrategy {
    /// Always start from the given family.
    Fixed(StrategyKind),
    /// Let the hyper-heuristic controller rank and pick families.
    Adaptive,
}

impl Default for PricingStrategy {
    fn default() -> Self {
        PricingStrategy::Fixed(StrategyKind::EdgeCost)
    }
}

/// Which bundled engine solves the pricing subproblem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingBackend {
    /// Monodirectional labeling with dominance (exact or label-capped).
    Labeling,
    /// Arc-flow MIP formulation; the only backend supporting
    /// pickup-and-delivery.
    ArcFlow,
}

impl Default for PricingBackend {
    fn default() -> Self {
        PricingBackend::Labeling
    }
}

/// The constraint set defining the active VRP variant.
///
/// Empty vectors mean "unconstrained" (no capacities, no fleet bound, no
/// fixed costs). With `mixed_fleet`, the non-empty vectors must agree on
/// their length, which defines the number of vehicle types.
///
/// # Examples
///
/// ```
/// use colgen_routing::config::ProblemConfig;
///
/// let config = ProblemConfig::new()
///     .with_num_stops(3)
///     .with_load_capacity(vec![10]);
/// assert_eq!(config.vehicle_types(), 1);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProblemConfig {
    num_stops: Option<usize>,
    load_capacity: Vec<i64>,
    duration: Option<f64>,
    time_windows: bool,
    pickup_delivery: bool,
    distribution_collection: bool,
    drop_penalty: Option<f64>,
    fixed_cost: Vec<f64>,
    num_vehicles: Vec<usize>,
    use_all_vehicles: bool,
    periodic: Option<usize>,
    mixed_fleet: bool,
}

impl ProblemConfig {
    /// Creates an unconstrained configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum number of stops per route.
    pub fn with_num_stops(mut self, num_stops: usize) -> Self {
        self.num_stops = Some(num_stops);
        self
    }

    /// Maximum load per vehicle, one entry per vehicle type.
    pub fn with_load_capacity(mut self, load_capacity: Vec<i64>) -> Self {
        self.load_capacity = load_capacity;
        self
    }

    /// Maximum route duration (travel plus service, waiting excluded).
    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Enables time-window feasibility on nodes.
    pub fn with_time_windows(mut self) -> Self {
        self.time_windows = true;
        self
    }

    /// Enables pickup-and-delivery precedence constraints.
    pub fn with_pickup_delivery(mut self) -> Self {
        self.pickup_delivery = true;
        self
    }

    /// Enables simultaneous distribution and collection.
    pub fn with_distribution_collection(mut self) -> Self {
        self.distribution_collection = true;
        self
    }

    /// Allows dropping customers at the given penalty.
    pub fn with_drop_penalty(mut self, penalty: f64) -> Self {
        self.drop_penalty = Some(penalty);
        self
    }

    /// Fixed cost per vehicle, one entry per vehicle type.
    pub fn with_fixed_cost(mut self, fixed_cost: Vec<f64>) -> Self {
        self.fixed_cost = fixed_cost;
        self
    }

    /// Bounds the number of vehicles, one entry per vehicle type.
    pub fn with_num_vehicles(mut self, num_vehicles: Vec<usize>) -> Self {
        self.num_vehicles = num_vehicles;
        self
    }

    /// Requires every available vehicle to be used.
    pub fn with_use_all_vehicles(mut self) -> Self {
        self.use_all_vehicles = true;
        self
    }

    /// Enables periodic scheduling over the given time span (days).
    pub fn with_periodic(mut self, time_span: usize) -> Self {
        self.periodic = Some(time_span);
        self
    }

    /// Declares a heterogeneous fleet (vectorized attributes).
    pub fn with_mixed_fleet(mut self) -> Self {
        self.mixed_fleet = true;
        self
    }

    pub fn num_stops(&self) -> Option<usize> {
        self.num_stops
    }

    pub fn load_capacity(&self) -> &[i64] {
        &self.load_capacity
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn time_windows(&self) -> bool {
        self.time_windows
    }

    pub fn pickup_delivery(&self) -> bool {
        self.pickup_delivery
    }

    pub fn distribution_collection(&self) -> bool {
        self.distribution_collection
    }

    pub fn drop_penalty(&self) -> Option<f64> {
        self.drop_penalty
    }

    pub fn fixed_cost(&self) -> &[f64] {
        &self.fixed_cost
    }

    pub fn num_vehicles(&self) -> &[usize] {
        &self.num_vehicles
    }

    pub fn use_all_vehicles(&self) -> bool {
        self.use_all_vehicles
    }

    pub fn periodic(&self) -> Option<usize> {
        self.periodic
    }

    pub fn mixed_fleet(&self) -> bool {
        self.mixed_fleet
    }

    /// Number of vehicle types implied by the vectorized attributes
    /// (1 for a homogeneous fleet).
    pub fn vehicle_types(&self) -> usize {
        if !self.mixed_fleet {
            return 1;
        }
        [
            self.load_capacity.len(),
            self.fixed_cost.len(),
            self.num_vehicles.len(),
        ]
        .into_iter()
        .find(|&len| len > 0)
        .unwrap_or(1)
    }

    /// Largest configured capacity, if capacities are active.
    pub fn max_capacity(&self) -> Option<i64> {
        self.load_capacity.iter().copied().max()
    }

    pub(crate) fn set_num_stops(&mut self, num_stops: usize) {
        self.num_stops = Some(num_stops);
    }

    /// The fleet bound that applies during column generation. While solving
    /// a periodic instance, fleet bounds are deferred to the day-assignment
    /// stage, where they hold per day.
    pub fn column_generation_num_vehicles(&self) -> &[usize] {
        if self.periodic.is_some() {
            &[]
        } else {
            &self.num_vehicles
        }
    }

    /// Checks internal consistency of the constraint parameters.
    pub fn validate(&self) -> Result<()> {
        if let Some(num_stops) = self.num_stops {
            if num_stops == 0 {
                return Err(SolverError::InvalidConfig(
                    "maximum number of stops must be positive".into(),
                ));
            }
        }
        for &cap in &self.load_capacity {
            if cap <= 0 {
                return Err(SolverError::InvalidConfig(
                    "load capacity must be positive".into(),
                ));
            }
        }
        if let Some(duration) = self.duration {
            if !(duration >= 0.0) {
                return Err(SolverError::InvalidConfig(
                    "maximum duration must be non-negative".into(),
                ));
            }
        }
        if let Some(penalty) = self.drop_penalty {
            if !(penalty >= 0.0) {
                return Err(SolverError::InvalidConfig(
                    "drop penalty must be non-negative".into(),
                ));
            }
        }
        if let Some(span) = self.periodic {
            if span == 0 {
                return Err(SolverError::InvalidConfig(
                    "periodic time span must be positive".into(),
                ));
            }
        }
        if self.mixed_fleet {
            let types = self.vehicle_types();
            for (name, len) in [
                ("load_capacity", self.load_capacity.len()),
                ("fixed_cost", self.fixed_cost.len()),
                ("num_vehicles", self.num_vehicles.len()),
            ] {
                if len > 0 && len != types {
                    return Err(SolverError::InvalidConfig(format!(
                        "{name} has dimension {len}, expected {types}"
                    )));
                }
            }
        } else {
            for (name, len) in [
                ("load_capacity", self.load_capacity.len()),
                ("fixed_cost", self.fixed_cost.len()),
                ("num_vehicles", self.num_vehicles.len()),
            ] {
                if len > 1 {
                    return Err(SolverError::InvalidConfig(format!(
                        "{name} has {len} entries but mixed_fleet is not set"
                    )));
                }
            }
        }
        if self.use_all_vehicles && self.num_vehicles.is_empty() {
            log::warn!("num_vehicles not set, use_all_vehicles ignored");
        }
        if self.pickup_delivery && self.distribution_collection {
            return Err(SolverError::InvalidConfig(
                "pickup_delivery and distribution_collection are mutually exclusive".into(),
            ));
        }
        Ok(())
    }
}

/// Options for a single `solve` call.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use colgen_routing::config::{PricingStrategy, SolveOptions, StrategyKind};
///
/// let options = SolveOptions::new()
///     .with_pricing_strategy(PricingStrategy::Fixed(StrategyKind::Exact))
///     .with_time_limit(Duration::from_secs(30))
///     .with_greedy();
/// assert!(options.greedy());
/// ```
#[derive(Debug, Clone)]
pub struct SolveOptions {
    pricing_strategy: PricingStrategy,
    backend: PricingBackend,
    exact: bool,
    greedy: bool,
    dive: bool,
    time_limit: Option<Duration>,
    max_iter: Option<usize>,
    run_exact: usize,
    smoothing: f64,
    seed: u64,
    initial_routes: Vec<Vec<NodeId>>,
    preassignments: Vec<Vec<NodeId>>,
    hyper_state: Option<HyperState>,
}

impl SolveOptions {
    /// Creates the default options: edge-cost sparsification, labeling
    /// backend, exact search, no greedy generator, no diving, smoothing
    /// factor 0.5, seed 1.
    pub fn new() -> Self {
        Self {
            pricing_strategy: PricingStrategy::default(),
            backend: PricingBackend::default(),
            exact: true,
            greedy: false,
            dive: false,
            time_limit: None,
            max_iter: None,
            run_exact: 1,
            smoothing: 0.5,
            seed: 1,
            initial_routes: Vec::new(),
            preassignments: Vec::new(),
            hyper_state: None,
        }
    }

    /// Sets the pricing strategy.
    pub fn with_pricing_strategy(mut self, strategy: PricingStrategy) -> Self {
        self.pricing_strategy = strategy;
        self
    }

    /// Selects the pricing backend.
    pub fn with_backend(mut self, backend: PricingBackend) -> Self {
        self.backend = backend;
        self
    }

    /// `false` runs the label-capped heuristic search first, falling back
    /// to the exact search only when it fails.
    pub fn with_exact(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }

    /// Enables the greedy randomized column generator.
    pub fn with_greedy(mut self) -> Self {
        self.greedy = true;
        self
    }

    /// Finishes with the diving heuristic instead of the restricted MIP.
    pub fn with_dive(mut self) -> Self {
        self.dive = true;
        self
    }

    /// Wall-clock limit for the whole solve.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    /// Caps the number of column generation iterations.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = Some(max_iter);
        self
    }

    /// Number of consecutive non-improving iterations after which the exact
    /// strategy is forced.
    pub fn with_run_exact(mut self, run_exact: usize) -> Self {
        self.run_exact = run_exact.max(1);
        self
    }

    /// Dual smoothing factor in [0, 1); 0 disables stabilization.
    pub fn with_smoothing(mut self, alpha: f64) -> Self {
        self.smoothing = alpha;
        self
    }

    /// Seed for the randomized components.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Supplies an initial feasible route set instead of the built-in
    /// constructors.
    pub fn with_initial_routes(mut self, routes: Vec<Vec<NodeId>>) -> Self {
        self.initial_routes = routes;
        self
    }

    /// Locks or anchors routes. A preassignment running Source -> Sink is
    /// locked (excluded from pricing); any other node sequence is anchored
    /// as a mandatory partial path.
    pub fn with_preassignments(mut self, preassignments: Vec<Vec<NodeId>>) -> Self {
        self.preassignments = preassignments;
        self
    }

    /// Reloads hyper-heuristic performance history from a previous solve.
    pub fn with_hyper_state(mut self, state: HyperState) -> Self {
        self.hyper_state = Some(state);
        self
    }

    pub fn pricing_strategy(&self) -> PricingStrategy {
        self.pricing_strategy
    }

    pub fn backend(&self) -> PricingBackend {
        self.backend
    }

    pub fn exact(&self) -> bool {
        self.exact
    }

    pub fn greedy(&self) -> bool {
        self.greedy
    }

    pub fn dive(&self) -> bool {
        self.dive
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    pub fn max_iter(&self) -> Option<usize> {
        self.max_iter
    }

    pub fn run_exact(&self) -> usize {
        self.run_exact
    }

    pub fn smoothing(&self) -> f64 {
        self.smoothing
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn initial_routes(&self) -> &[Vec<NodeId>] {
        &self.initial_routes
    }

    pub fn preassignments(&self) -> &[Vec<NodeId>] {
        &self.preassignments
    }

    pub fn hyper_state(&self) -> Option<&HyperState> {
        self.hyper_state.as_ref()
    }

    /// Checks the options against the constraint set.
    pub fn validate(&self, config: &ProblemConfig) -> Result<()> {
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(SolverError::InvalidConfig(
                "smoothing factor must lie in [0, 1)".into(),
            ));
        }
        if config.pickup_delivery() && self.backend == PricingBackend::Labeling {
            return Err(SolverError::InvalidConfig(
                "pickup_delivery requires the arc-flow pricing backend".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self::new()
    }
}
