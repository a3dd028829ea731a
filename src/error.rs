//! Error types for the column generation solver.

use std::error::Error;
use std::fmt;

/// Errors surfaced by problem construction and solving.
///
/// Pricing exhaustion is deliberately *not* an error: finding no further
/// negative-reduced-cost column signals relaxation optimality and is
/// reported through [`SolveStats`](crate::models::SolveStats).
#[derive(Debug, Clone, PartialEq)]
pub enum SolverError {
    /// Options or constraint parameters are inconsistent or unsupported.
    InvalidConfig(String),
    /// The input network is malformed (structure, missing edges or costs).
    InvalidGraph(String),
    /// The instance cannot be solved at all: some customer is unreachable
    /// under the configured resource bounds, or Source and Sink are
    /// disconnected.
    InfeasibleInput(String),
    /// No integer-feasible selection of columns exists (for example a
    /// bounded fleet without a drop penalty, or diving exhausted every
    /// fixing without an incumbent).
    Infeasible,
    /// The underlying LP engine failed or gave up.
    SolverFailure(String),
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverError::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            SolverError::InvalidGraph(msg) => write!(f, "invalid graph: {msg}"),
            SolverError::InfeasibleInput(msg) => write!(f, "infeasible input: {msg}"),
            SolverError::Infeasible => write!(f, "no integer feasible solution exists"),
            SolverError::SolverFailure(msg) => write!(f, "solver failure: {msg}"),
        }
    }
}

impl Error for SolverError {}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SolverError>;
