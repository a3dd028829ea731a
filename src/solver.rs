//! The column generation engine.
//!
//! [`VehicleRoutingProblem`] owns the input network and constraint set
//! and drives the iteration loop:
//!
//! ```text
//! INIT -> PRICE -> (IMPROVED        -> PRICE
//!                 | EXHAUSTED_STRATEGY -> ESCALATE -> PRICE
//!                 | EXHAUSTED_ALL      -> TERMINATE)
//! ```
//!
//! Each iteration solves the relaxed master, smooths the duals, lets the
//! selected strategy (or the adaptive controller) restrict the search
//! space, and prices one vehicle type after another until a column
//! appears. A strategy that comes up empty escalates to the exact search
//! within the same iteration; an empty exact round under smoothed duals
//! only decays the smoothing, while an empty exact round under raw duals
//! terminates the relaxation. `TERMINATE` branches to the restricted MIP
//! or the diving heuristic, and the terminal states surface as
//! [`SolveStats`]: solved, time limit reached, or infeasible (as an
//! error).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::{PricingBackend, PricingStrategy, ProblemConfig, SolveOptions, StrategyKind};
use crate::constructive;
use crate::diving::DivingHeuristic;
use crate::error::{Result, SolverError};
use crate::hyper::HyperHeuristic;
use crate::lp::InteriorPoint;
use crate::master::MasterProblem;
use crate::models::{
    CandidateRoute, ColumnOrigin, FinishMethod, NodeId, Route, SolveStats, SolvedRoute,
    VrpGraph, VrpSolution,
};
use crate::preprocessing;
use crate::pricing::flow::FlowEngine;
use crate::pricing::greedy::GreedyGenerator;
use crate::pricing::labeling::LabelingEngine;
use crate::pricing::strategy::{self, PricingContext};
use crate::pricing::{PathEngine, Subproblem};
use crate::resources::ResourceModel;
use crate::stabilization::DualStabilization;

/// Consecutive non-improving iterations after which the loop gives up.
const NO_IMPROVEMENT_LIMIT: usize = 1000;

/// Minimum budget handed to the final integer solve, even past the
/// deadline.
const MIN_MIP_BUDGET: Duration = Duration::from_secs(5);

/// A vehicle routing problem solved by column generation.
///
/// # Examples
///
/// ```
/// use colgen_routing::config::{ProblemConfig, SolveOptions};
/// use colgen_routing::models::{Node, VrpGraph};
/// use colgen_routing::solver::VehicleRoutingProblem;
///
/// let mut g = VrpGraph::new();
/// let a = g.add_customer(Node::new().with_demand(5));
/// let b = g.add_customer(Node::new().with_demand(4));
/// g.add_edge(VrpGraph::SOURCE, a, 1.0, 0.0).unwrap();
/// g.add_edge(VrpGraph::SOURCE, b, 2.0, 0.0).unwrap();
/// g.add_edge(a, VrpGraph::SINK, 0.0, 0.0).unwrap();
/// g.add_edge(b, VrpGraph::SINK, 2.0, 0.0).unwrap();
/// g.add_edge(a, b, 1.0, 0.0).unwrap();
/// g.add_edge(b, a, 1.0, 0.0).unwrap();
///
/// let config = ProblemConfig::new().with_load_capacity(vec![10]);
/// let problem = VehicleRoutingProblem::new(g, config).unwrap();
/// let solution = problem.solve(&SolveOptions::new()).unwrap();
/// assert!((solution.value() - 3.0).abs() < 1e-4);
/// ```
pub struct VehicleRoutingProblem {
    graph: VrpGraph,
    config: ProblemConfig,
}

impl VehicleRoutingProblem {
    /// Validates the constraint set against the network.
    pub fn new(graph: VrpGraph, config: ProblemConfig) -> Result<Self> {
        config.validate()?;
        if config.mixed_fleet() && graph.vehicle_types() != config.vehicle_types() {
            return Err(SolverError::InvalidConfig(format!(
                "graph carries {} cost entries per edge, configuration implies {}",
                graph.vehicle_types(),
                config.vehicle_types()
            )));
        }
        if !config.mixed_fleet() && graph.vehicle_types() != 1 {
            return Err(SolverError::InvalidConfig(
                "per-type edge costs require mixed_fleet".into(),
            ));
        }
        if config.pickup_delivery() && !graph.customers().any(|v| graph.node(v).request().is_some())
        {
            return Err(SolverError::InvalidConfig(
                "pickup_delivery expects at least one request".into(),
            ));
        }
        Ok(Self { graph, config })
    }

    /// The input network.
    pub fn graph(&self) -> &VrpGraph {
        &self.graph
    }

    /// The constraint set.
    pub fn config(&self) -> &ProblemConfig {
        &self.config
    }

    /// Runs column generation and returns the best solution found.
    pub fn solve(&self, options: &SolveOptions) -> Result<VrpSolution> {
        options.validate(&self.config)?;
        let start = Instant::now();
        let deadline = options.time_limit().map(|limit| start + limit);

        let mut config = self.config.clone();
        let mut working = self.graph.clone();
        preprocessing::fold_fixed_costs(&mut working, &config);
        // Reported costs come from this snapshot: fixed costs included,
        // preassignment anchoring and pruning excluded.
        let pristine = working.clone();

        let locked = apply_preassignments(&mut working, &config, options.preassignments())?;
        preprocessing::prepare(&mut working, &mut config)?;

        let mut master = MasterProblem::new(&working, &config, Box::new(InteriorPoint::new()));
        if working.num_customers() > 0 {
            let initial = if options.initial_routes().is_empty() {
                constructive::initial_routes(&working, &config)
            } else {
                check_initial_routes(&working, options.initial_routes())?;
                options.initial_routes().to_vec()
            };
            for nodes in initial {
                let cost = working.path_cost(&nodes, 0)?;
                master.add_column(CandidateRoute {
                    nodes,
                    cost,
                    reduced_cost: 0.0,
                    vehicle_type: 0,
                    origin: ColumnOrigin::Initial,
                });
            }
        }

        let mut state = ColumnGeneration::new(&working, &config, options);
        if working.num_customers() > 0 {
            state.run(&mut master, deadline)?;
        }

        let (chosen, dropped, finish, finish_hit_deadline) = if working.num_customers() == 0 {
            (Vec::new(), Vec::new(), FinishMethod::LockedOnly, false)
        } else if options.dive() {
            let outcome = DivingHeuristic::new()
                .run(&mut master)?
                .ok_or(SolverError::Infeasible)?;
            let chosen: Vec<Route> = master
                .columns()
                .iter()
                .zip(&outcome.values)
                .filter(|(_, &value)| value > 0.5)
                .map(|(route, _)| route.clone())
                .collect();
            let dropped = uncovered_customers(&working, &config, &chosen);
            (chosen, dropped, FinishMethod::Diving, false)
        } else {
            let now = Instant::now();
            let mip_deadline = deadline.map(|d| d.max(now + MIN_MIP_BUDGET));
            let integer = master.solve_integer(mip_deadline)?;
            (
                integer.routes,
                integer.dropped,
                FinishMethod::RestrictedMip,
                integer.time_limit_reached,
            )
        };

        let mut solved = Vec::new();
        let mut route_id = 1;
        for route in &chosen {
            if route.customers().is_empty() {
                continue;
            }
            solved.push(SolvedRoute::build(
                route_id,
                route.nodes().to_vec(),
                route.vehicle_type(),
                &pristine,
                &self.config,
            ));
            route_id += 1;
        }
        for nodes in &locked {
            let vehicle_type = cheapest_feasible_type(&pristine, &self.config, nodes);
            solved.push(SolvedRoute::build(
                route_id,
                nodes.clone(),
                vehicle_type,
                &pristine,
                &self.config,
            ));
            route_id += 1;
        }

        let penalty = self.config.drop_penalty().unwrap_or(0.0) * dropped.len() as f64;
        let value = solved.iter().map(SolvedRoute::cost).sum::<f64>() + penalty;
        log::info!("total cost = {value:.6}");

        let schedule = match self.config.periodic() {
            Some(span) => {
                match crate::schedule::assign_days(
                    &solved,
                    &pristine,
                    span,
                    self.config.num_vehicles(),
                    &InteriorPoint::new(),
                    deadline.map(|d| d.max(Instant::now() + MIN_MIP_BUDGET)),
                )? {
                    Some(days) => Some(days),
                    None => {
                        log::warn!("no feasible day assignment for the periodic schedule");
                        None
                    }
                }
            }
            None => None,
        };

        let stats = SolveStats {
            iterations: state.iteration,
            relaxation_objective: state.lower_bound,
            pricing_exhausted: state.pricing_exhausted,
            time_limit_reached: state.time_limit_reached || finish_hit_deadline,
            finish,
            columns: master.num_columns(),
        };
        let hyper_state = state.hyper.as_ref().map(|hyper| hyper.state().clone());
        Ok(VrpSolution::new(
            value,
            solved,
            dropped,
            schedule,
            stats,
            hyper_state,
        ))
    }
}

/// Mutable state of the column generation loop.
struct ColumnGeneration<'a> {
    working: &'a VrpGraph,
    config: &'a ProblemConfig,
    options: &'a SolveOptions,
    labeling: LabelingEngine,
    flow: FlowEngine,
    greedy: Option<GreedyGenerator>,
    stabilization: DualStabilization,
    hyper: Option<HyperHeuristic>,
    fixed_strategy: StrategyKind,
    iteration: usize,
    no_improvement: usize,
    no_improvement_iteration: usize,
    last_objective: Option<f64>,
    produced_last: bool,
    lower_bound: Option<f64>,
    pricing_exhausted: bool,
    time_limit_reached: bool,
}

impl<'a> ColumnGeneration<'a> {
    fn new(working: &'a VrpGraph, config: &'a ProblemConfig, options: &'a SolveOptions) -> Self {
        let mut flow = FlowEngine::new();
        if config.pickup_delivery() {
            flow = flow.with_pickup_delivery();
        }
        if config.distribution_collection() {
            flow = flow.with_distribution_collection();
        }

        let greedy_applicable = options.greedy()
            && !config.time_windows()
            && !config.pickup_delivery()
            && !config.distribution_collection();
        if options.greedy() && !greedy_applicable {
            log::debug!("greedy generator not applicable to this variant, skipped");
        }

        let mut fixed_strategy = match options.pricing_strategy() {
            PricingStrategy::Fixed(kind) => kind,
            PricingStrategy::Adaptive => StrategyKind::KShortest,
        };
        let mut hyper = match options.pricing_strategy() {
            PricingStrategy::Adaptive => Some(match options.hyper_state() {
                Some(hyper_state) => {
                    HyperHeuristic::with_state(options.seed(), hyper_state.clone())
                }
                None => HyperHeuristic::new(options.seed()),
            }),
            PricingStrategy::Fixed(_) => None,
        };
        if config.pickup_delivery() && fixed_strategy != StrategyKind::Exact {
            log::warn!("pricing strategy changed to the exact search for pickup and delivery");
            fixed_strategy = StrategyKind::Exact;
            hyper = None;
        }

        Self {
            working,
            config,
            options,
            labeling: LabelingEngine::new(),
            flow,
            greedy: greedy_applicable.then(GreedyGenerator::new),
            stabilization: DualStabilization::new(options.smoothing()),
            hyper,
            fixed_strategy,
            iteration: 0,
            no_improvement: 0,
            no_improvement_iteration: 0,
            last_objective: None,
            produced_last: false,
            lower_bound: None,
            pricing_exhausted: false,
            time_limit_reached: false,
        }
    }

    fn engine(&self) -> &dyn PathEngine {
        match self.options.backend() {
            PricingBackend::Labeling => &self.labeling,
            PricingBackend::ArcFlow => &self.flow,
        }
    }

    fn run(&mut self, master: &mut MasterProblem, deadline: Option<Instant>) -> Result<()> {
        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                log::info!("time up!");
                self.time_limit_reached = true;
                return Ok(());
            }
            if self.no_improvement > NO_IMPROVEMENT_LIMIT {
                return Ok(());
            }
            if self
                .options
                .max_iter()
                .is_some_and(|max| self.iteration >= max)
            {
                return Ok(());
            }

            let (raw_duals, objective) = match master.solve_relaxation() {
                Ok(result) => result,
                Err(SolverError::SolverFailure(msg)) => {
                    log::warn!("master solve failed ({msg}), keeping the incumbent pool");
                    return Ok(());
                }
                Err(other) => return Err(other),
            };
            log::info!("iteration {}, {:.6}", self.iteration, objective);
            if self
                .last_objective
                .is_some_and(|prev| (objective - prev).abs() < 1e-10)
            {
                self.no_improvement += 1;
            } else {
                self.no_improvement = 0;
                self.no_improvement_iteration = self.iteration;
            }
            self.last_objective = Some(objective);
            self.lower_bound = Some(objective);

            let duals = self.stabilization.smooth(&raw_duals);
            let strategy = self.next_strategy(master, objective);

            let mut candidates: Vec<CandidateRoute> = Vec::new();
            let mut failed = false;
            for vehicle_type in 0..self.config.vehicle_types() {
                if let Some(generator) = &self.greedy {
                    let sub = Subproblem::new(
                        self.working,
                        &duals,
                        vehicle_type,
                        ResourceModel::new(self.config, vehicle_type),
                    );
                    let seed = self
                        .options
                        .seed()
                        .wrapping_add(self.iteration as u64)
                        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
                        .wrapping_add(vehicle_type as u64);
                    candidates.extend(generator.generate(&sub, seed));
                }
                let ctx = PricingContext {
                    graph: self.working,
                    duals: &duals,
                    config: self.config,
                    vehicle_type,
                    engine: self.engine(),
                    exact: self.options.exact(),
                    deadline,
                };
                let found = match strategy::attempt(strategy, &ctx) {
                    Ok(found) => found,
                    Err(SolverError::SolverFailure(msg)) => {
                        log::warn!("pricing failed ({msg}), abandoning the iteration");
                        failed = true;
                        break;
                    }
                    Err(other) => return Err(other),
                };
                // Escalate to the exact search before giving up on this
                // vehicle type.
                let found = if found.is_empty() && strategy != StrategyKind::Exact {
                    log::debug!("{strategy:?} exhausted, escalating to the exact search");
                    match strategy::attempt(StrategyKind::Exact, &ctx) {
                        Ok(found) => found,
                        Err(SolverError::SolverFailure(msg)) => {
                            log::warn!("pricing failed ({msg}), abandoning the iteration");
                            failed = true;
                            break;
                        }
                        Err(other) => return Err(other),
                    }
                } else {
                    found
                };
                if !found.is_empty() {
                    candidates.extend(found);
                    break;
                }
            }
            if failed {
                return Ok(());
            }

            let mut added = 0;
            for candidate in candidates {
                if master.add_column(candidate).is_some() {
                    added += 1;
                }
            }
            self.produced_last = added > 0;
            self.iteration += 1;

            if added == 0 {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    // The engines may have been cut short; an empty answer
                    // proves nothing now.
                    self.time_limit_reached = true;
                    return Ok(());
                }
                if self.stabilization.notify_misprice() {
                    continue;
                }
                self.pricing_exhausted = true;
                return Ok(());
            }
        }
    }

    /// Chooses the strategy for this iteration: the adaptive controller
    /// when configured, the exact search when the search stagnated for
    /// `run_exact` iterations, the fixed family otherwise.
    fn next_strategy(&mut self, master: &MasterProblem, objective: f64) -> StrategyKind {
        if let Some(hyper) = self.hyper.as_mut() {
            if self.no_improvement != self.options.run_exact() {
                if self.iteration == 0 {
                    hyper.init(objective);
                    return StrategyKind::KShortest;
                }
                let active: HashMap<StrategyKind, usize> = master
                    .active_by_origin()
                    .into_iter()
                    .filter_map(|(origin, count)| match origin {
                        ColumnOrigin::Strategy(kind) => Some((kind, count)),
                        _ => None,
                    })
                    .collect();
                hyper.observe(objective, self.produced_last, active);
                hyper.accept_move();
                hyper.update_parameters(
                    self.iteration,
                    self.no_improvement,
                    self.no_improvement_iteration,
                );
                return hyper.pick();
            }
        }
        if self.no_improvement == self.options.run_exact() {
            self.no_improvement = 0;
            return StrategyKind::Exact;
        }
        self.fixed_strategy
    }
}

/// Splits preassignments into locked complete routes (their customers
/// leave the working graph) and anchored partial paths (their edges
/// become free so pricing keeps the sequence together).
fn apply_preassignments(
    working: &mut VrpGraph,
    config: &ProblemConfig,
    preassignments: &[Vec<NodeId>],
) -> Result<Vec<Vec<NodeId>>> {
    let mut locked = Vec::new();
    for route in preassignments {
        if route.len() < 2 {
            return Err(SolverError::InvalidGraph(format!(
                "preassignment {route:?} is too short"
            )));
        }
        for pair in route.windows(2) {
            if working.edge_between(pair[0], pair[1]).is_none() {
                return Err(SolverError::InvalidGraph(format!(
                    "edge ({},{}) in preassignment missing in graph",
                    pair[0], pair[1]
                )));
            }
        }
        let is_locked = route[0] == VrpGraph::SOURCE
            && *route.last().expect("checked length") == VrpGraph::SINK;
        if is_locked {
            log::info!("locking {route:?}");
            for &v in &route[1..route.len() - 1] {
                working.remove_node(v);
            }
            locked.push(route.clone());
        } else {
            for pair in route.windows(2) {
                let (idx, _) = working
                    .edge_between(pair[0], pair[1])
                    .expect("checked above");
                working.set_edge_costs(idx, vec![0.0; config.vehicle_types().max(1)]);
            }
        }
    }
    Ok(locked)
}

/// Validates caller-supplied initial routes against the working graph.
fn check_initial_routes(working: &VrpGraph, routes: &[Vec<NodeId>]) -> Result<()> {
    for route in routes {
        if route.first() != Some(&VrpGraph::SOURCE)
            || route.last() != Some(&VrpGraph::SINK)
            || route.len() < 2
        {
            return Err(SolverError::InvalidGraph(format!(
                "initial route {route:?} must run from Source to Sink"
            )));
        }
        working.path_cost(route, 0)?;
    }
    for v in working.customers() {
        if !routes.iter().any(|route| route.contains(&v)) {
            return Err(SolverError::InvalidGraph(format!(
                "node {v} missing from initial solution"
            )));
        }
    }
    Ok(())
}

/// Customers no chosen route covers (diving reports drops this way).
fn uncovered_customers(
    working: &VrpGraph,
    config: &ProblemConfig,
    chosen: &[Route],
) -> Vec<NodeId> {
    if config.drop_penalty().is_none() {
        return Vec::new();
    }
    working
        .customers()
        .filter(|&v| !chosen.iter().any(|route| route.visits(v)))
        .collect()
}

/// The cheapest vehicle type that can feasibly serve a locked route.
fn cheapest_feasible_type(graph: &VrpGraph, config: &ProblemConfig, nodes: &[NodeId]) -> usize {
    let load: i64 = nodes.iter().map(|&v| graph.node(v).demand()).sum();
    let mut best = 0;
    let mut best_cost = f64::INFINITY;
    for k in 0..config.vehicle_types() {
        if let Some(&capacity) = config.load_capacity().get(k) {
            if load > capacity {
                continue;
            }
        }
        let cost = graph.path_cost(nodes, k).unwrap_or(f64::INFINITY);
        if cost < best_cost {
            best_cost = cost;
            best = k;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Node, TimeWindow};

    /// Five customers in a chain: depot edges cost 10, chain edges 10
    /// except one 15, uniform travel times, service time 1, one tight
    /// window on the second customer.
    fn toy() -> (VrpGraph, Vec<NodeId>) {
        let mut g = VrpGraph::new();
        let customers: Vec<NodeId> = (0..5)
            .map(|_| {
                g.add_customer(
                    Node::new()
                        .with_demand(5)
                        .with_service_time(1.0)
                        .with_time_window(TimeWindow::new(5.0, 100.0).expect("tw")),
                )
            })
            .collect();
        for &c in &customers {
            g.add_edge(VrpGraph::SOURCE, c, 10.0, 20.0).expect("edge");
            g.add_edge(c, VrpGraph::SINK, 10.0, 20.0).expect("edge");
        }
        g.node_mut(customers[1])
            .set_time_window(Some(TimeWindow::new(5.0, 20.0).expect("tw")));
        g.add_edge(customers[0], customers[1], 10.0, 20.0).expect("edge");
        g.add_edge(customers[1], customers[2], 10.0, 20.0).expect("edge");
        g.add_edge(customers[2], customers[3], 15.0, 20.0).expect("edge");
        g.add_edge(customers[3], customers[4], 10.0, 25.0).expect("edge");
        (g, customers)
    }

    fn solve(config: ProblemConfig, options: SolveOptions) -> VrpSolution {
        let _ = env_logger::builder().is_test(true).try_init();
        let (g, _) = toy();
        VehicleRoutingProblem::new(g, config)
            .expect("problem")
            .solve(&options)
            .expect("solve")
    }

    fn assert_each_customer_covered_once(solution: &VrpSolution, graph: &VrpGraph) {
        for v in graph.customers() {
            let covered = solution.coverage(v) + usize::from(solution.dropped().contains(&v));
            assert_eq!(covered, 1, "customer {v} covered {covered} times");
        }
    }

    #[test]
    fn test_two_customer_network() {
        let mut g = VrpGraph::new();
        let a = g.add_customer(Node::new().with_demand(5));
        let b = g.add_customer(Node::new().with_demand(4));
        g.add_edge(VrpGraph::SOURCE, a, 1.0, 0.0).expect("edge");
        g.add_edge(VrpGraph::SOURCE, b, 2.0, 0.0).expect("edge");
        g.add_edge(a, VrpGraph::SINK, 0.0, 0.0).expect("edge");
        g.add_edge(b, VrpGraph::SINK, 2.0, 0.0).expect("edge");
        g.add_edge(a, b, 1.0, 0.0).expect("edge");
        g.add_edge(b, a, 1.0, 0.0).expect("edge");

        let problem = VehicleRoutingProblem::new(
            g,
            ProblemConfig::new().with_load_capacity(vec![10]),
        )
        .expect("problem");
        let solution = problem.solve(&SolveOptions::new()).expect("solve");
        assert!((solution.value() - 3.0).abs() < 1e-4);
        assert_eq!(solution.routes().len(), 1);
        assert_eq!(
            solution.routes()[0].nodes(),
            &[VrpGraph::SOURCE, b, a, VrpGraph::SINK]
        );
    }

    #[test]
    fn test_stops() {
        let solution = solve(ProblemConfig::new().with_num_stops(3), SolveOptions::new());
        assert!((solution.value() - 70.0).abs() < 1e-4);
        assert_eq!(solution.routes().len(), 2);
        for route in solution.routes() {
            assert!(route.customers().len() <= 3);
        }
        assert!(solution.stats().pricing_exhausted);
    }

    #[test]
    fn test_stops_capacity() {
        let solution = solve(
            ProblemConfig::new()
                .with_num_stops(3)
                .with_load_capacity(vec![10]),
            SolveOptions::new(),
        );
        assert!((solution.value() - 80.0).abs() < 1e-4);
        let mut loads: Vec<i64> = solution
            .routes()
            .iter()
            .map(|r| r.load().expect("capacity tracked"))
            .collect();
        loads.sort_unstable();
        loads.dedup();
        assert_eq!(loads, vec![5, 10]);
    }

    #[test]
    fn test_stops_capacity_duration() {
        let solution = solve(
            ProblemConfig::new()
                .with_num_stops(3)
                .with_load_capacity(vec![10])
                .with_duration(62.0),
            SolveOptions::new(),
        );
        assert!((solution.value() - 85.0).abs() < 1e-4);
        for route in solution.routes() {
            assert!(route.duration().expect("duration tracked") <= 62.0 + 1e-9);
        }
    }

    #[test]
    fn test_stops_time_windows() {
        let (g, _) = toy();
        let solution = solve(
            ProblemConfig::new().with_num_stops(3).with_time_windows(),
            SolveOptions::new(),
        );
        assert!((solution.value() - 80.0).abs() < 1e-4);
        for route in solution.routes() {
            assert_eq!(route.departure_at(VrpGraph::SOURCE), Some(0.0));
            for &(v, arrival) in route.arrivals() {
                if v != VrpGraph::SINK {
                    assert!(
                        arrival <= g.node(v).deadline() + 1e-9,
                        "arrival {arrival} after deadline at {v}"
                    );
                }
            }
        }
        assert_each_customer_covered_once(&solution, &g);
    }

    #[test]
    fn test_time_windows_duration() {
        let solution = solve(
            ProblemConfig::new()
                .with_num_stops(3)
                .with_time_windows()
                .with_duration(64.0),
            SolveOptions::new(),
        );
        assert!((solution.value() - 90.0).abs() < 1e-4);
        assert_eq!(solution.routes().len(), 4);
        for route in solution.routes() {
            assert!(route.customers().len() <= 2);
            assert!(route.duration().expect("duration tracked") <= 64.0 + 1e-9);
        }
    }

    #[test]
    fn test_elementarity_with_cheap_return_edge() {
        let (mut g, customers) = toy();
        g.add_edge(customers[1], customers[0], 2.0, 0.0).expect("edge");
        let problem =
            VehicleRoutingProblem::new(g, ProblemConfig::new().with_num_stops(3)).expect("problem");
        let solution = problem.solve(&SolveOptions::new()).expect("solve");
        assert!((solution.value() - 67.0).abs() < 1e-4);
        for route in solution.routes() {
            let mut seen = route.customers().to_vec();
            seen.sort();
            seen.dedup();
            assert_eq!(seen.len(), route.customers().len());
        }
    }

    #[test]
    fn test_initial_routes_injection() {
        let (g, customers) = toy();
        let routes = vec![
            vec![VrpGraph::SOURCE, customers[0], VrpGraph::SINK],
            vec![VrpGraph::SOURCE, customers[1], customers[2], VrpGraph::SINK],
            vec![VrpGraph::SOURCE, customers[3], customers[4], VrpGraph::SINK],
        ];
        let problem =
            VehicleRoutingProblem::new(g, ProblemConfig::new().with_num_stops(4)).expect("problem");
        let solution = problem
            .solve(&SolveOptions::new().with_initial_routes(routes))
            .expect("solve");
        assert!((solution.value() - 70.0).abs() < 1e-4);
    }

    #[test]
    fn test_missing_node_in_initial_routes_rejected() {
        let (g, customers) = toy();
        let routes = vec![vec![VrpGraph::SOURCE, customers[0], VrpGraph::SINK]];
        let problem =
            VehicleRoutingProblem::new(g, ProblemConfig::new().with_num_stops(4)).expect("problem");
        assert!(matches!(
            problem.solve(&SolveOptions::new().with_initial_routes(routes)),
            Err(SolverError::InvalidGraph(_))
        ));
    }

    #[test]
    fn test_locked_route() {
        let (g, customers) = toy();
        let locked = vec![VrpGraph::SOURCE, customers[2], VrpGraph::SINK];
        let problem =
            VehicleRoutingProblem::new(g, ProblemConfig::new().with_num_stops(4)).expect("problem");
        let solution = problem
            .solve(&SolveOptions::new().with_preassignments(vec![locked.clone()]))
            .expect("solve");
        assert!((solution.value() - 80.0).abs() < 1e-4);
        assert!(solution
            .routes()
            .iter()
            .any(|route| route.nodes() == locked.as_slice()));
    }

    #[test]
    fn test_partial_lock() {
        let (g, customers) = toy();
        let problem =
            VehicleRoutingProblem::new(g, ProblemConfig::new().with_num_stops(4)).expect("problem");
        let solution = problem
            .solve(
                &SolveOptions::new()
                    .with_preassignments(vec![vec![VrpGraph::SOURCE, customers[2]]]),
            )
            .expect("solve");
        // The anchored edge prices as free but reports at full cost.
        assert!((solution.value() - 75.0).abs() < 1e-4);
    }

    #[test]
    fn test_extend_preassignment() {
        let (g, customers) = toy();
        let problem =
            VehicleRoutingProblem::new(g, ProblemConfig::new().with_num_stops(4)).expect("problem");
        let solution = problem
            .solve(&SolveOptions::new().with_preassignments(vec![vec![
                customers[1],
                customers[2],
            ]]))
            .expect("solve");
        assert!((solution.value() - 70.0).abs() < 1e-4);
    }

    #[test]
    fn test_fixed_cost() {
        let solution = solve(
            ProblemConfig::new()
                .with_num_stops(3)
                .with_fixed_cost(vec![100.0]),
            SolveOptions::new(),
        );
        assert!((solution.value() - 270.0).abs() < 1e-4);
        let mut costs: Vec<i64> = solution
            .routes()
            .iter()
            .map(|r| r.cost().round() as i64)
            .collect();
        costs.sort_unstable();
        assert_eq!(costs, vec![130, 140]);
    }

    #[test]
    fn test_drop_nodes_with_single_vehicle() {
        let (g, _) = toy();
        let solution = solve(
            ProblemConfig::new()
                .with_num_stops(3)
                .with_num_vehicles(vec![1])
                .with_drop_penalty(100.0),
            SolveOptions::new(),
        );
        assert!((solution.value() - 240.0).abs() < 1e-4);
        assert_eq!(solution.routes().len(), 1);
        assert_eq!(solution.routes()[0].customers().len(), 3);
        assert!((solution.routes()[0].cost() - 40.0).abs() < 1e-4);
        assert_eq!(solution.dropped().len(), 2);
        assert_each_customer_covered_once(&solution, &g);
    }

    #[test]
    fn test_limited_fleet_drops_minimal_subset() {
        let mut g = VrpGraph::new();
        let customers: Vec<NodeId> = (0..5)
            .map(|_| g.add_customer(Node::new().with_demand(14)))
            .collect();
        for &c in &customers {
            g.add_edge(VrpGraph::SOURCE, c, 10.0, 0.0).expect("edge");
            g.add_edge(c, VrpGraph::SINK, 10.0, 0.0).expect("edge");
        }
        for pair in customers.windows(2) {
            g.add_edge(pair[0], pair[1], 10.0, 0.0).expect("edge");
        }
        // Total demand 70 against 4 vehicles of capacity 15: exactly one
        // customer has to be dropped.
        let problem = VehicleRoutingProblem::new(
            g,
            ProblemConfig::new()
                .with_load_capacity(vec![15])
                .with_num_vehicles(vec![4])
                .with_drop_penalty(1000.0),
        )
        .expect("problem");
        let solution = problem.solve(&SolveOptions::new()).expect("solve");
        assert_eq!(solution.dropped().len(), 1);
        let route_cost: f64 = solution.routes().iter().map(SolvedRoute::cost).sum();
        assert!((solution.value() - (route_cost + 1000.0)).abs() < 1e-4);
        assert!((solution.value() - 1080.0).abs() < 1e-4);
    }

    #[test]
    fn test_periodic_frequency() {
        let (mut g, customers) = toy();
        *g.node_mut(customers[1]) = Node::new()
            .with_demand(5)
            .with_service_time(1.0)
            .with_frequency(2);
        let problem = VehicleRoutingProblem::new(
            g,
            ProblemConfig::new().with_num_stops(2).with_periodic(2),
        )
        .expect("problem");
        let solution = problem.solve(&SolveOptions::new()).expect("solve");
        assert!((solution.value() - 90.0).abs() < 1e-4);
        assert_eq!(solution.coverage(customers[1]), 2);

        let schedule = solution.schedule().expect("periodic schedule");
        let scheduled: usize = schedule.values().map(Vec::len).sum();
        assert_eq!(scheduled, solution.routes().len());
        // The two visits of the frequency-2 customer land on different
        // days.
        let visiting: Vec<usize> = solution
            .routes()
            .iter()
            .filter(|r| r.nodes().contains(&customers[1]))
            .map(SolvedRoute::id)
            .collect();
        assert_eq!(visiting.len(), 2);
        for routes in schedule.values() {
            assert!(!(routes.contains(&visiting[0]) && routes.contains(&visiting[1])));
        }
    }

    #[test]
    fn test_mixed_fleet() {
        let mut g = VrpGraph::with_vehicle_types(2);
        let customers: Vec<NodeId> = (0..5)
            .map(|_| g.add_customer(Node::new().with_demand(5).with_service_time(1.0)))
            .collect();
        for &c in &customers {
            g.add_edge_typed(VrpGraph::SOURCE, c, vec![10.0, 10.0], 20.0)
                .expect("edge");
            g.add_edge_typed(c, VrpGraph::SINK, vec![10.0, 10.0], 20.0)
                .expect("edge");
        }
        g.add_edge_typed(customers[0], customers[1], vec![10.0, 10.0], 20.0)
            .expect("edge");
        g.add_edge_typed(customers[1], customers[2], vec![10.0, 10.0], 20.0)
            .expect("edge");
        g.add_edge_typed(customers[2], customers[3], vec![15.0, 15.0], 20.0)
            .expect("edge");
        g.add_edge_typed(customers[3], customers[4], vec![10.0, 10.0], 25.0)
            .expect("edge");

        let problem = VehicleRoutingProblem::new(
            g,
            ProblemConfig::new()
                .with_mixed_fleet()
                .with_load_capacity(vec![10, 15])
                .with_fixed_cost(vec![10.0, 0.0])
                .with_num_vehicles(vec![5, 1]),
        )
        .expect("problem");
        let solution = problem.solve(&SolveOptions::new()).expect("solve");
        assert!((solution.value() - 80.0).abs() < 1e-4);
        let mut types: Vec<usize> = solution
            .routes()
            .iter()
            .map(SolvedRoute::vehicle_type)
            .collect();
        types.sort_unstable();
        types.dedup();
        assert_eq!(types, vec![0, 1]);
    }

    #[test]
    fn test_distribution_collection() {
        let (mut g, customers) = toy();
        g.node_mut(customers[0]).set_collect(12);
        g.node_mut(customers[3]).set_collect(1);
        let problem = VehicleRoutingProblem::new(
            g,
            ProblemConfig::new()
                .with_load_capacity(vec![15])
                .with_distribution_collection(),
        )
        .expect("problem");
        let solution = problem.solve(&SolveOptions::new()).expect("solve");
        assert!((solution.value() - 80.0).abs() < 1e-4);
    }

    #[test]
    fn test_pickup_delivery() {
        let mut g = VrpGraph::new();
        let c2 = g.add_customer(Node::new().with_demand(10).with_service_time(1.0));
        let c3 = g.add_customer(Node::new().with_demand(10).with_service_time(1.0));
        let c4 = g.add_customer(Node::new().with_demand(-10).with_service_time(1.0));
        let c5 = g.add_customer(Node::new().with_demand(-10).with_service_time(1.0));
        for &c in &[c2, c3, c4, c5] {
            g.add_edge(VrpGraph::SOURCE, c, 10.0, 20.0).expect("edge");
            g.add_edge(c, VrpGraph::SINK, 10.0, 20.0).expect("edge");
        }
        g.add_edge(c2, c3, 10.0, 20.0).expect("edge");
        g.add_edge(c3, c4, 15.0, 20.0).expect("edge");
        g.add_edge(c4, c5, 10.0, 25.0).expect("edge");
        g.add_edge(c2, c5, 10.0, 0.0).expect("edge");
        g.link_request(c2, c5).expect("request");
        g.link_request(c3, c4).expect("request");

        let problem = VehicleRoutingProblem::new(
            g,
            ProblemConfig::new()
                .with_load_capacity(vec![15])
                .with_pickup_delivery(),
        )
        .expect("problem");
        let solution = problem
            .solve(
                &SolveOptions::new()
                    .with_backend(PricingBackend::ArcFlow)
                    .with_pricing_strategy(PricingStrategy::Fixed(StrategyKind::Exact)),
            )
            .expect("solve");
        assert!((solution.value() - 65.0).abs() < 1e-4);
        // Every pickup precedes its paired delivery within its route.
        for route in solution.routes() {
            for (position, &v) in route.nodes().iter().enumerate() {
                if let Some(delivery) = problem.graph().node(v).request() {
                    let delivery_position = route
                        .nodes()
                        .iter()
                        .position(|&u| u == delivery)
                        .expect("pair rides together");
                    assert!(position < delivery_position);
                }
            }
        }
    }

    #[test]
    fn test_dive_finish() {
        let solution = solve(
            ProblemConfig::new().with_num_stops(3),
            SolveOptions::new().with_dive(),
        );
        assert!((solution.value() - 70.0).abs() < 1e-4);
        assert_eq!(solution.stats().finish, FinishMethod::Diving);
    }

    #[test]
    fn test_greedy_option_matches_exact() {
        let solution = solve(
            ProblemConfig::new().with_num_stops(3),
            SolveOptions::new().with_greedy(),
        );
        assert!((solution.value() - 70.0).abs() < 1e-4);
    }

    #[test]
    fn test_adaptive_strategy_matches_exact() {
        let solution = solve(
            ProblemConfig::new().with_num_stops(3),
            SolveOptions::new().with_pricing_strategy(PricingStrategy::Adaptive),
        );
        assert!((solution.value() - 70.0).abs() < 1e-4);

        // Reloading the learned history is an explicit opt-in and keeps
        // the result intact.
        let state = solution.hyper_state().expect("adaptive history").clone();
        let resumed = solve(
            ProblemConfig::new().with_num_stops(3),
            SolveOptions::new()
                .with_pricing_strategy(PricingStrategy::Adaptive)
                .with_hyper_state(state),
        );
        assert!((resumed.value() - 70.0).abs() < 1e-4);
        assert!(resumed.hyper_state().is_some());
    }

    #[test]
    fn test_every_fixed_strategy_agrees() {
        for kind in StrategyKind::ALL {
            let solution = solve(
                ProblemConfig::new().with_num_stops(4),
                SolveOptions::new().with_pricing_strategy(PricingStrategy::Fixed(kind)),
            );
            assert!(
                (solution.value() - 70.0).abs() < 1e-4,
                "{kind:?} found {}",
                solution.value()
            );
        }
    }

    #[test]
    fn test_idempotent_without_randomness() {
        let options = SolveOptions::new().with_smoothing(0.0);
        let first = solve(ProblemConfig::new().with_num_stops(3), options.clone());
        let second = solve(ProblemConfig::new().with_num_stops(3), options);
        assert!((first.value() - second.value()).abs() < 1e-9);
    }

    #[test]
    fn test_tiny_time_limit_still_returns_incumbent() {
        let solution = solve(
            ProblemConfig::new().with_num_stops(3),
            SolveOptions::new().with_time_limit(Duration::from_millis(1)),
        );
        assert!((solution.value() - 70.0).abs() < 1e-4);
        assert!(solution.stats().time_limit_reached);
    }

    #[test]
    fn test_unreachable_customer_rejected() {
        let mut g = VrpGraph::new();
        let a = g.add_customer(Node::new().with_demand(50));
        g.add_edge(VrpGraph::SOURCE, a, 1.0, 0.0).expect("edge");
        g.add_edge(a, VrpGraph::SINK, 1.0, 0.0).expect("edge");
        let problem =
            VehicleRoutingProblem::new(g, ProblemConfig::new().with_load_capacity(vec![10]))
                .expect("problem");
        assert!(matches!(
            problem.solve(&SolveOptions::new()),
            Err(SolverError::InfeasibleInput(_))
        ));
    }

    #[test]
    fn test_pickup_delivery_without_requests_rejected() {
        let mut g = VrpGraph::new();
        let a = g.add_customer(Node::new().with_demand(5));
        g.add_edge(VrpGraph::SOURCE, a, 1.0, 0.0).expect("edge");
        g.add_edge(a, VrpGraph::SINK, 1.0, 0.0).expect("edge");
        assert!(matches!(
            VehicleRoutingProblem::new(g, ProblemConfig::new().with_pickup_delivery()),
            Err(SolverError::InvalidConfig(_))
        ));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(8))]

            /// Random chain instances: every customer is served exactly
            /// once and no route exceeds the capacity.
            #[test]
            fn prop_coverage_and_capacity(
                demands in prop::collection::vec(1i64..8, 3..6),
                capacity in 8i64..20,
            ) {
                let mut g = VrpGraph::new();
                let customers: Vec<NodeId> = demands
                    .iter()
                    .map(|&d| g.add_customer(Node::new().with_demand(d)))
                    .collect();
                for &c in &customers {
                    g.add_edge(VrpGraph::SOURCE, c, 10.0, 10.0).expect("edge");
                    g.add_edge(c, VrpGraph::SINK, 10.0, 10.0).expect("edge");
                }
                for pair in customers.windows(2) {
                    g.add_edge(pair[0], pair[1], 5.0, 5.0).expect("edge");
                }
                let problem = VehicleRoutingProblem::new(
                    g,
                    ProblemConfig::new().with_load_capacity(vec![capacity]),
                )
                .expect("problem");
                let solution = problem.solve(&SolveOptions::new()).expect("solve");
                for &c in &customers {
                    prop_assert_eq!(solution.coverage(c), 1);
                }
                for route in solution.routes() {
                    prop_assert!(route.load().expect("capacity tracked") <= capacity);
                }
            }

            /// Stop limits hold on every returned route.
            #[test]
            fn prop_stop_limit(num_stops in 1usize..4) {
                let mut g = VrpGraph::new();
                let customers: Vec<NodeId> = (0..4)
                    .map(|_| g.add_customer(Node::new().with_demand(1)))
                    .collect();
                for &c in &customers {
                    g.add_edge(VrpGraph::SOURCE, c, 10.0, 10.0).expect("edge");
                    g.add_edge(c, VrpGraph::SINK, 10.0, 10.0).expect("edge");
                }
                for pair in customers.windows(2) {
                    g.add_edge(pair[0], pair[1], 5.0, 5.0).expect("edge");
                }
                let problem = VehicleRoutingProblem::new(
                    g,
                    ProblemConfig::new().with_num_stops(num_stops),
                )
                .expect("problem");
                let solution = problem.solve(&SolveOptions::new()).expect("solve");
                for route in solution.routes() {
                    prop_assert!(route.customers().len() <= num_stops);
                }
            }
        }
    }
}
