//! Diving heuristic over the restricted master.
//!
//! Approximates the integer solve by repeatedly fixing the
//! highest-valued fractional route variable to 1 and re-optimizing the
//! relaxation. An infeasible re-optimization backtracks one fixing and
//! marks the variable tabu; the backtrack budget bounds how much of the
//! tree is explored (limited discrepancy, not full branch-and-bound).
//! The dive stops at the first integral relaxation, which becomes the
//! incumbent.

use std::collections::HashSet;

use crate::error::Result;
use crate::lp::INT_FEAS_TOL;
use crate::master::MasterProblem;

/// Outcome of a dive: the integral relaxation it landed on.
#[derive(Debug, Clone)]
pub struct DiveOutcome {
    /// Route values, aligned with the master's columns.
    pub values: Vec<f64>,
    /// Objective of the integral relaxation.
    pub objective: f64,
    /// Number of variables fixed on the accepted path.
    pub depth: usize,
}

/// The diving heuristic.
#[derive(Debug, Clone)]
pub struct DivingHeuristic {
    max_backtracks: usize,
}

impl DivingHeuristic {
    pub fn new() -> Self {
        Self { max_backtracks: 16 }
    }

    /// Overrides the backtrack budget.
    pub fn with_max_backtracks(mut self, max_backtracks: usize) -> Self {
        self.max_backtracks = max_backtracks;
        self
    }

    /// Dives on the master problem. Returns `None` when every option is
    /// exhausted without reaching an integral relaxation.
    pub fn run(&self, master: &mut MasterProblem) -> Result<Option<DiveOutcome>> {
        let mut fixes: Vec<(usize, f64)> = Vec::new();
        let mut tabu: HashSet<usize> = HashSet::new();
        let mut backtracks = 0usize;

        loop {
            match master.solve_relaxation_with_fixes(&fixes)? {
                None => {
                    // Infeasible under the current fixings: undo the last
                    // one and forbid it.
                    let Some((var, _)) = fixes.pop() else {
                        return Ok(None);
                    };
                    tabu.insert(var);
                    backtracks += 1;
                    log::debug!("dive backtracked on column {var}");
                    if backtracks > self.max_backtracks {
                        return Ok(None);
                    }
                }
                Some((values, objective)) => {
                    if MasterProblem::is_integral(&values) {
                        log::info!(
                            "dive reached an integral relaxation at depth {} with objective {:.6}",
                            fixes.len(),
                            objective
                        );
                        return Ok(Some(DiveOutcome {
                            values,
                            objective,
                            depth: fixes.len(),
                        }));
                    }
                    let fixed: HashSet<usize> = fixes.iter().map(|&(var, _)| var).collect();
                    let candidate = values
                        .iter()
                        .enumerate()
                        .filter(|&(var, &value)| {
                            (value - value.round()).abs() > INT_FEAS_TOL
                                && !tabu.contains(&var)
                                && !fixed.contains(&var)
                        })
                        .max_by(|a, b| a.1.partial_cmp(b.1).expect("values are finite"))
                        .map(|(var, _)| var);
                    let Some(var) = candidate else {
                        return Ok(None);
                    };
                    log::debug!("dive fixed column {var} with previous value {:.4}", values[var]);
                    fixes.push((var, 1.0));
                }
            }
        }
    }
}

impl Default for DivingHeuristic {
    fn default() -> Self {
        Self::new()
    }
}
