//! Interior-point backend for the [`LpSolver`] contract.
//!
//! Wraps the pure-Rust Clarabel conic solver. The program is assembled in
//! Clarabel's `Ax + s = b, s in K` form: equality rows land in the zero
//! cone, inequality rows (and finite variable bounds) in the nonnegative
//! cone. Duals are mapped back to the usual shadow-price convention for
//! minimization.
//!
//! Barrier methods return an interior point of the optimal face, so
//! degenerate relaxations yield well-centered duals rather than a vertex,
//! which is the behavior column generation wants from its master solves.

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettings, DefaultSolver, IPSolver, SolverStatus, SupportedConeT,
};

use crate::error::{Result, SolverError};

use super::{LinearProgram, LpOutcome, LpSolution, LpSolver, Sense};

/// The bundled interior-point LP engine.
#[derive(Debug, Clone, Default)]
pub struct InteriorPoint;

impl InteriorPoint {
    pub fn new() -> Self {
        Self
    }
}

/// How one assembled inequality/equality row maps back to an original row.
struct RowRef {
    original: usize,
    negated: bool,
}

impl LpSolver for InteriorPoint {
    fn solve(&self, lp: &LinearProgram) -> Result<LpOutcome> {
        let n = lp.num_vars();
        if n == 0 {
            return Ok(LpOutcome::Optimal(LpSolution {
                values: Vec::new(),
                duals: vec![0.0; lp.num_rows()],
                objective: 0.0,
            }));
        }

        // Equality rows first (zero cone), then inequalities and bounds
        // (nonnegative cone), as Clarabel consumes cones in row order.
        let mut cols: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        let mut b = Vec::new();
        let mut refs = Vec::new();
        let mut push_row = |coeffs: &[(usize, f64)],
                            rhs: f64,
                            negated: bool,
                            refer: Option<RowRef>,
                            cols: &mut Vec<Vec<(usize, f64)>>,
                            b: &mut Vec<f64>,
                            refs: &mut Vec<Option<RowRef>>| {
            let row = b.len();
            let sign = if negated { -1.0 } else { 1.0 };
            for &(var, coef) in coeffs {
                cols[var].push((row, sign * coef));
            }
            b.push(sign * rhs);
            refs.push(refer);
        };

        for (i, row) in lp.rows().iter().enumerate() {
            if row.sense == Sense::Eq {
                push_row(
                    &row.coeffs,
                    row.rhs,
                    false,
                    Some(RowRef {
                        original: i,
                        negated: false,
                    }),
                    &mut cols,
                    &mut b,
                    &mut refs,
                );
            }
        }
        let n_eq = b.len();
        for (i, row) in lp.rows().iter().enumerate() {
            match row.sense {
                Sense::Eq => {}
                Sense::Le => push_row(
                    &row.coeffs,
                    row.rhs,
                    false,
                    Some(RowRef {
                        original: i,
                        negated: false,
                    }),
                    &mut cols,
                    &mut b,
                    &mut refs,
                ),
                Sense::Ge => push_row(
                    &row.coeffs,
                    row.rhs,
                    true,
                    Some(RowRef {
                        original: i,
                        negated: true,
                    }),
                    &mut cols,
                    &mut b,
                    &mut refs,
                ),
            }
        }
        for var in 0..n {
            let lower = lp.lower()[var];
            let upper = lp.upper()[var];
            if lower.is_finite() {
                // -x <= -lower
                push_row(&[(var, 1.0)], lower, true, None, &mut cols, &mut b, &mut refs);
            }
            if upper.is_finite() {
                push_row(&[(var, 1.0)], upper, false, None, &mut cols, &mut b, &mut refs);
            }
        }
        let m = b.len();
        let n_ineq = m - n_eq;

        let mut colptr = Vec::with_capacity(n + 1);
        let mut rowval = Vec::new();
        let mut nzval = Vec::new();
        colptr.push(0);
        for col in &mut cols {
            col.sort_by_key(|&(row, _)| row);
            for &(row, val) in col.iter() {
                rowval.push(row);
                nzval.push(val);
            }
            colptr.push(rowval.len());
        }
        let a = CscMatrix::new(m, n, colptr, rowval, nzval);
        let p = CscMatrix::zeros((n, n));
        let q = lp.objective().to_vec();

        let mut cones: Vec<SupportedConeT<f64>> = Vec::new();
        if n_eq > 0 {
            cones.push(SupportedConeT::ZeroConeT(n_eq));
        }
        if n_ineq > 0 {
            cones.push(SupportedConeT::NonnegativeConeT(n_ineq));
        }

        let mut settings = DefaultSettings::default();
        settings.verbose = false;
        let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, settings);
        solver.solve();

        match solver.solution.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => {
                let values = solver.solution.x.clone();
                let mut duals = vec![0.0; lp.num_rows()];
                for (row, refer) in refs.iter().enumerate() {
                    if let Some(refer) = refer {
                        let z = solver.solution.z[row];
                        // d(obj)/d(rhs): -z for rows stored as-is, +z for
                        // rows stored negated.
                        duals[refer.original] = if refer.negated { z } else { -z };
                    }
                }
                let objective = lp.objective_value(&values);
                Ok(LpOutcome::Optimal(LpSolution {
                    values,
                    duals,
                    objective,
                }))
            }
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                Ok(LpOutcome::Infeasible)
            }
            status => Err(SolverError::SolverFailure(format!(
                "interior point terminated with status {status:?}"
            ))),
        }
    }
}
