//! Column pool and restricted master problem.
//!
//! Owns the relaxed set-covering LP over all generated route columns: one
//! selection variable per route in [0,1], one coverage row per customer
//! (`>= frequency`), plus the variant-specific extras:
//!
//! - drop variables at the configured penalty (drop-penalty variant),
//! - artificial coverage variables for customers with frequency > 1 so
//!   the restricted pool is always feasible (periodic variant),
//! - per-type fleet rows with high-cost slacks (bounded fleets), pinned
//!   to zero in integer solves.
//!
//! `solve_relaxation` reports versioned dual prices; `solve_integer`
//! finishes over the generated pool with branch-and-bound, which is the
//! price-and-branch approximation surfaced in
//! [`FinishMethod::RestrictedMip`](crate::models::FinishMethod).

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::config::ProblemConfig;
use crate::error::{Result, SolverError};
use crate::lp::{branch, LinearProgram, LpOutcome, LpSolver, Sense, INT_FEAS_TOL};
use crate::models::{CandidateRoute, ColumnOrigin, NodeId, Route, VrpGraph};

/// Objective coefficient of artificial and slack variables. Large enough
/// to dominate any real route cost, small enough to keep the
/// interior-point scaling healthy.
const ARTIFICIAL_COST: f64 = 1e7;

/// A variable's value must exceed this to count as selected.
const SELECTED_TOL: f64 = 0.5;

/// Dual prices of one relaxation solve.
///
/// An explicit, versioned value: the master produces a fresh vector each
/// iteration and pricing components read it without ever mutating it.
#[derive(Debug, Clone, PartialEq)]
pub struct DualPrices {
    version: usize,
    node: Vec<f64>,
    vehicle: Vec<f64>,
}

impl DualPrices {
    pub(crate) fn new(version: usize, node: Vec<f64>, vehicle: Vec<f64>) -> Self {
        Self {
            version,
            node,
            vehicle,
        }
    }

    /// Monotonically increasing per master solve.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Dual price of a customer's coverage constraint.
    pub fn node_dual(&self, node: NodeId) -> f64 {
        self.node.get(node.index()).copied().unwrap_or(0.0)
    }

    /// Dual price of the fleet bound for a vehicle type (0 when unbounded).
    pub fn vehicle_dual(&self, vehicle_type: usize) -> f64 {
        self.vehicle.get(vehicle_type).copied().unwrap_or(0.0)
    }

    /// Largest customer dual, used by the edge-cost sparsification.
    pub fn max_dual(&self) -> f64 {
        self.node.iter().copied().fold(0.0, f64::max)
    }

    pub(crate) fn node_duals(&self) -> &[f64] {
        &self.node
    }

    pub(crate) fn vehicle_duals(&self) -> &[f64] {
        &self.vehicle
    }
}

/// Result of the integer finish over the pool.
#[derive(Debug, Clone)]
pub struct IntegerSolution {
    /// Selected columns (pool ids).
    pub routes: Vec<Route>,
    /// Customers whose drop variable is active.
    pub dropped: Vec<NodeId>,
    /// Objective value, penalties included.
    pub objective: f64,
    /// `true` if branch-and-bound hit the deadline.
    pub time_limit_reached: bool,
}

/// Variable/row layout of one LP build.
struct Layout {
    lp: LinearProgram,
    y: Vec<usize>,
    drop: Vec<(NodeId, usize)>,
    cover: Vec<(NodeId, usize)>,
    fleet: Vec<usize>,
    slack: Vec<usize>,
}

/// The restricted master problem and its column pool.
pub struct MasterProblem {
    columns: Vec<Route>,
    keys: HashSet<(usize, Vec<NodeId>)>,
    customers: Vec<NodeId>,
    frequency: HashMap<NodeId, u32>,
    droppable: HashSet<NodeId>,
    drop_penalty: Option<f64>,
    num_vehicles: Vec<usize>,
    use_all_vehicles: bool,
    vehicle_types: usize,
    node_bound: usize,
    version: usize,
    last_values: Vec<f64>,
    solver: Box<dyn LpSolver>,
}

impl MasterProblem {
    /// Builds an empty pool for the active customers of the working graph.
    pub fn new(graph: &VrpGraph, config: &ProblemConfig, solver: Box<dyn LpSolver>) -> Self {
        let customers: Vec<NodeId> = graph.customers().collect();
        let mut frequency = HashMap::new();
        let mut droppable = HashSet::new();
        for &v in &customers {
            let node = graph.node(v);
            let freq = if config.periodic().is_some() {
                node.frequency().max(1)
            } else {
                1
            };
            frequency.insert(v, freq);
            if node.demand() > 0 {
                droppable.insert(v);
            }
        }
        Self {
            columns: Vec::new(),
            keys: HashSet::new(),
            customers,
            frequency,
            droppable,
            drop_penalty: config.drop_penalty(),
            num_vehicles: config.column_generation_num_vehicles().to_vec(),
            use_all_vehicles: config.use_all_vehicles(),
            vehicle_types: config.vehicle_types(),
            node_bound: graph.node_bound(),
            version: 0,
            last_values: Vec::new(),
            solver,
        }
    }

    /// Admits a candidate to the pool, assigning its id. Returns `None`
    /// for a duplicate (same vehicle type and node sequence).
    pub fn add_column(&mut self, candidate: CandidateRoute) -> Option<&Route> {
        let key = (candidate.vehicle_type, candidate.nodes.clone());
        if !self.keys.insert(key) {
            return None;
        }
        let id = self.columns.len() + 1;
        let route = Route::new(
            id,
            candidate.nodes,
            candidate.cost,
            candidate.vehicle_type,
            candidate.origin,
        );
        self.columns.push(route);
        self.columns.last()
    }

    /// Admitted columns.
    pub fn columns(&self) -> &[Route] {
        &self.columns
    }

    /// Number of admitted columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Route values of the last relaxation solve, aligned with
    /// [`columns`](Self::columns).
    pub fn relaxation_values(&self) -> &[f64] {
        &self.last_values
    }

    /// Count of columns active in the last relaxation, keyed by origin.
    pub fn active_by_origin(&self) -> HashMap<ColumnOrigin, usize> {
        let mut counts = HashMap::new();
        for (route, &value) in self.columns.iter().zip(&self.last_values) {
            if value > INT_FEAS_TOL {
                *counts.entry(route.origin()).or_insert(0) += 1;
            }
        }
        counts
    }

    fn build(&self, relax: bool, fixes: &[(usize, f64)]) -> Layout {
        let mut lp = LinearProgram::new();

        let y: Vec<usize> = self
            .columns
            .iter()
            .map(|route| lp.add_var(route.cost(), 0.0, 1.0))
            .collect();

        let mut drop = Vec::new();
        if let Some(penalty) = self.drop_penalty {
            for &v in &self.customers {
                if self.droppable.contains(&v) {
                    drop.push((v, lp.add_var(penalty, 0.0, 1.0)));
                }
            }
        }

        // Artificial coverage for frequency > 1: keeps the restricted pool
        // feasible before enough distinct routes exist.
        let mut artificial = Vec::new();
        for &v in &self.customers {
            if self.frequency[&v] > 1 {
                artificial.push((v, lp.add_var(ARTIFICIAL_COST, 0.0, f64::INFINITY)));
            }
        }

        let mut slack = Vec::new();
        for _ in 0..self.num_vehicles.len() {
            let upper = if relax { f64::INFINITY } else { 0.0 };
            slack.push(lp.add_var(ARTIFICIAL_COST, 0.0, upper));
        }

        let mut cover = Vec::new();
        for &v in &self.customers {
            let mut coeffs: Vec<(usize, f64)> = Vec::new();
            for (idx, route) in self.columns.iter().enumerate() {
                if route.visits(v) {
                    coeffs.push((y[idx], 1.0));
                }
            }
            if let Some(&(_, var)) = drop.iter().find(|(node, _)| *node == v) {
                coeffs.push((var, 1.0));
            }
            if let Some(&(_, var)) = artificial.iter().find(|(node, _)| *node == v) {
                coeffs.push((var, 1.0));
            }
            let row = lp.add_row(coeffs, Sense::Ge, self.frequency[&v] as f64);
            cover.push((v, row));
        }

        let mut fleet = Vec::new();
        for (k, &bound) in self.num_vehicles.iter().enumerate() {
            let mut coeffs: Vec<(usize, f64)> = self
                .columns
                .iter()
                .enumerate()
                .filter(|(_, route)| route.vehicle_type() == k)
                .map(|(idx, _)| (y[idx], 1.0))
                .collect();
            let sense = if self.use_all_vehicles {
                // Slack absorbs a shortfall of columns at high cost.
                coeffs.push((slack[k], 1.0));
                Sense::Ge
            } else {
                // Slack buys extra vehicles at high cost in the relaxation.
                coeffs.push((slack[k], -1.0));
                Sense::Le
            };
            fleet.push(lp.add_row(coeffs, sense, bound as f64));
        }

        for &(idx, value) in fixes {
            lp.set_bounds(y[idx], value, value);
        }

        Layout {
            lp,
            y,
            drop,
            cover,
            fleet,
            slack,
        }
    }

    /// Solves the relaxation and returns fresh dual prices plus the
    /// relaxed objective.
    pub fn solve_relaxation(&mut self) -> Result<(DualPrices, f64)> {
        let layout = self.build(true, &[]);
        let solution = match self.solver.solve(&layout.lp)? {
            LpOutcome::Optimal(solution) => solution,
            LpOutcome::Infeasible => {
                return Err(SolverError::Infeasible);
            }
        };
        self.last_values = layout.y.iter().map(|&v| solution.values[v]).collect();
        self.version += 1;

        let mut node = vec![0.0; self.node_bound];
        for &(v, row) in &layout.cover {
            node[v.index()] = solution.duals[row];
        }
        let mut vehicle = vec![0.0; self.vehicle_types];
        for (k, &row) in layout.fleet.iter().enumerate() {
            vehicle[k] = solution.duals[row];
        }
        Ok((
            DualPrices::new(self.version, node, vehicle),
            solution.objective,
        ))
    }

    /// Solves the relaxation with route variables fixed (diving support).
    /// Returns `None` when the fixings are infeasible.
    pub fn solve_relaxation_with_fixes(
        &mut self,
        fixes: &[(usize, f64)],
    ) -> Result<Option<(Vec<f64>, f64)>> {
        let layout = self.build(true, fixes);
        match self.solver.solve(&layout.lp)? {
            LpOutcome::Optimal(solution) => {
                let values: Vec<f64> = layout.y.iter().map(|&v| solution.values[v]).collect();
                self.last_values = values.clone();
                Ok(Some((values, solution.objective)))
            }
            LpOutcome::Infeasible => Ok(None),
        }
    }

    /// Finishes the problem as an integer program over the generated pool.
    pub fn solve_integer(&mut self, deadline: Option<Instant>) -> Result<IntegerSolution> {
        let layout = self.build(false, &[]);
        let mut binaries = layout.y.clone();
        binaries.extend(layout.drop.iter().map(|&(_, var)| var));
        let result = branch::solve_binary(&layout.lp, &binaries, self.solver.as_ref(), deadline)?;
        let solution = result.incumbent.ok_or(SolverError::Infeasible)?;

        let routes: Vec<Route> = layout
            .y
            .iter()
            .enumerate()
            .filter(|&(_, &var)| solution.values[var] > SELECTED_TOL)
            .map(|(idx, _)| self.columns[idx].clone())
            .collect();
        let dropped: Vec<NodeId> = layout
            .drop
            .iter()
            .filter(|&&(_, var)| solution.values[var] > SELECTED_TOL)
            .map(|&(v, _)| v)
            .collect();
        if !dropped.is_empty() {
            log::info!("dropped nodes: {:?}", dropped);
        }
        for &var in &layout.slack {
            debug_assert!(solution.values[var] <= INT_FEAS_TOL);
        }
        log::info!("total cost = {:.6}", solution.objective);
        Ok(IntegerSolution {
            routes,
            dropped,
            objective: solution.objective,
            time_limit_reached: result.time_limit_reached,
        })
    }

    /// Columns whose value is integral in the given relaxation values.
    pub fn is_integral(values: &[f64]) -> bool {
        values
            .iter()
            .all(|v| (v - v.round()).abs() <= INT_FEAS_TOL)
    }
}
