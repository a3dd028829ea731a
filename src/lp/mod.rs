//! Linear programming layer.
//!
//! The master problem and the arc-flow pricer describe their models as a
//! solver-agnostic [`LinearProgram`] and solve them through the
//! [`LpSolver`] contract. The bundled backend is [`InteriorPoint`], a thin
//! wrapper over the pure-Rust Clarabel solver. Integrality is obtained by
//! [`branch::solve_binary`], a depth-first branch-and-bound driven by any
//! [`LpSolver`].

pub mod branch;
mod interior;

pub use interior::InteriorPoint;

use crate::error::Result;

/// Integrality tolerance for branching and rounding decisions.
pub const INT_FEAS_TOL: f64 = 1e-5;

/// Row sense of a linear constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Le,
    Ge,
    Eq,
}

/// A linear constraint `coeffs * x (sense) rhs`.
#[derive(Debug, Clone)]
pub struct Row {
    pub coeffs: Vec<(usize, f64)>,
    pub sense: Sense,
    pub rhs: f64,
}

/// A linear program in minimization form: variables with bounds and
/// objective coefficients, plus constraint rows.
///
/// # Examples
///
/// ```
/// use colgen_routing::lp::{LinearProgram, Sense};
///
/// let mut lp = LinearProgram::new();
/// let x = lp.add_var(1.0, 0.0, f64::INFINITY);
/// let y = lp.add_var(2.0, 0.0, f64::INFINITY);
/// lp.add_row(vec![(x, 1.0), (y, 1.0)], Sense::Ge, 3.0);
/// assert_eq!(lp.num_vars(), 2);
/// assert_eq!(lp.num_rows(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct LinearProgram {
    objective: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    rows: Vec<Row>,
}

impl LinearProgram {
    /// Creates an empty program.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a variable with objective coefficient and bounds, returning
    /// its index.
    pub fn add_var(&mut self, objective: f64, lower: f64, upper: f64) -> usize {
        self.objective.push(objective);
        self.lower.push(lower);
        self.upper.push(upper);
        self.objective.len() - 1
    }

    /// Adds a constraint row, returning its index.
    pub fn add_row(&mut self, coeffs: Vec<(usize, f64)>, sense: Sense, rhs: f64) -> usize {
        self.rows.push(Row { coeffs, sense, rhs });
        self.rows.len() - 1
    }

    /// Overwrites the bounds of a variable (used for fixing).
    pub fn set_bounds(&mut self, var: usize, lower: f64, upper: f64) {
        self.lower[var] = lower;
        self.upper[var] = upper;
    }

    /// Number of variables.
    pub fn num_vars(&self) -> usize {
        self.objective.len()
    }

    /// Number of constraint rows.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Objective coefficients.
    pub fn objective(&self) -> &[f64] {
        &self.objective
    }

    /// Variable lower bounds.
    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    /// Variable upper bounds.
    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// Constraint rows.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Objective value of a point (no feasibility check).
    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective
            .iter()
            .zip(values)
            .map(|(c, v)| c * v)
            .sum()
    }
}

/// An optimal solution of a [`LinearProgram`].
#[derive(Debug, Clone)]
pub struct LpSolution {
    /// Primal values, one per variable.
    pub values: Vec<f64>,
    /// Dual values, one per constraint row. Signs follow the usual
    /// shadow-price convention for minimization: `Ge` rows price
    /// non-negative, `Le` rows non-positive.
    pub duals: Vec<f64>,
    /// Objective value.
    pub objective: f64,
}

/// Outcome of an LP solve.
#[derive(Debug, Clone)]
pub enum LpOutcome {
    Optimal(LpSolution),
    Infeasible,
}

/// The LP engine contract consumed by the master problem, the arc-flow
/// pricer and the periodic scheduler. Implementations solve the
/// relaxation to optimality and report duals; they are free to fail with
/// [`SolverError::SolverFailure`](crate::error::SolverError::SolverFailure),
/// which callers treat as a recoverable, iteration-level condition.
pub trait LpSolver {
    fn solve(&self, lp: &LinearProgram) -> Result<LpOutcome>;
}
