//! Day assignment for the periodic variant.
//!
//! After the routes are chosen, each one is assigned to a day of the
//! time span so that the number of routes per day is balanced (the
//! objective minimizes the spread between the busiest and the quietest
//! day), no customer is visited twice on the same day, and per-day fleet
//! bounds hold. Solved as a small binary program over the LP contract.
//!
//! A customer with frequency f over the span simply appears in f routes
//! scheduled on f distinct days; no constraint forces those days into a
//! particular pattern (adjacent days, even spacing or similar).

use std::collections::BTreeMap;
use std::time::Instant;

use crate::error::Result;
use crate::lp::{branch, LinearProgram, LpSolver, Sense};
use crate::models::{SolvedRoute, VrpGraph};

/// Assigns routes to days. Returns `None` when no feasible assignment
/// exists (or the deadline struck first).
pub fn assign_days(
    routes: &[SolvedRoute],
    graph: &VrpGraph,
    time_span: usize,
    num_vehicles: &[usize],
    solver: &dyn LpSolver,
    deadline: Option<Instant>,
) -> Result<Option<BTreeMap<usize, Vec<usize>>>> {
    if routes.is_empty() || time_span == 0 {
        return Ok(Some(BTreeMap::new()));
    }
    let mut lp = LinearProgram::new();

    // y[r][t] = 1 when route r runs on day t.
    let y: Vec<Vec<usize>> = routes
        .iter()
        .map(|_| (0..time_span).map(|_| lp.add_var(0.0, 0.0, 1.0)).collect())
        .collect();
    let load_max = lp.add_var(1.0, 0.0, f64::INFINITY);
    let load_min = lp.add_var(-1.0, 0.0, f64::INFINITY);

    for t in 0..time_span {
        let mut up: Vec<(usize, f64)> = y.iter().map(|vars| (vars[t], 1.0)).collect();
        up.push((load_max, -1.0));
        lp.add_row(up, Sense::Le, 0.0);

        let mut down: Vec<(usize, f64)> = y.iter().map(|vars| (vars[t], 1.0)).collect();
        down.push((load_min, -1.0));
        lp.add_row(down, Sense::Ge, 0.0);
    }

    // Exactly one day per route.
    for vars in &y {
        lp.add_row(vars.iter().map(|&v| (v, 1.0)).collect(), Sense::Eq, 1.0);
    }

    // At most one visit per customer per day.
    for v in graph.customers() {
        if graph.node(v).demand() <= 0 {
            continue;
        }
        for t in 0..time_span {
            let coeffs: Vec<(usize, f64)> = routes
                .iter()
                .enumerate()
                .filter(|(_, route)| route.nodes().contains(&v))
                .map(|(r, _)| (y[r][t], 1.0))
                .collect();
            if coeffs.len() > 1 {
                lp.add_row(coeffs, Sense::Le, 1.0);
            }
        }
    }

    // Per-day fleet bounds.
    for (k, &bound) in num_vehicles.iter().enumerate() {
        for t in 0..time_span {
            let coeffs: Vec<(usize, f64)> = routes
                .iter()
                .enumerate()
                .filter(|(_, route)| route.vehicle_type() == k)
                .map(|(r, _)| (y[r][t], 1.0))
                .collect();
            if !coeffs.is_empty() {
                lp.add_row(coeffs, Sense::Le, bound as f64);
            }
        }
    }

    let binaries: Vec<usize> = y.iter().flatten().copied().collect();
    let result = branch::solve_binary(&lp, &binaries, solver, deadline)?;
    let Some(solution) = result.incumbent else {
        return Ok(None);
    };

    let mut days: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (r, route) in routes.iter().enumerate() {
        for (t, &var) in y[r].iter().enumerate() {
            if solution.values[var] > 0.9 {
                days.entry(t).or_default().push(route.id());
            }
        }
    }
    Ok(Some(days))
}
