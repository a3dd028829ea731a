//! # colgen-routing
//!
//! Vehicle routing by column generation: a set-covering master problem
//! over route columns, priced by resource-constrained shortest-path
//! engines, for CVRP, VRPTW, pickup-and-delivery, simultaneous
//! distribution/collection, periodic and heterogeneous-fleet variants.
//!
//! ## Modules
//!
//! - [`models`] — Domain types (network, nodes, route columns, solution)
//! - [`config`] — Constraint set and solve options
//! - [`resources`] — Resource vectors and extension rules
//! - [`lp`] — LP contract, interior-point backend, branch-and-bound
//! - [`master`] — Column pool and restricted master problem
//! - [`pricing`] — Strategies, labeling and arc-flow engines, greedy generator
//! - [`stabilization`] — Dual price smoothing
//! - [`hyper`] — Adaptive strategy selection
//! - [`diving`] — Diving heuristic
//! - [`schedule`] — Periodic day assignment
//! - [`constructive`] — Initial solutions (Clarke-Wright, greedy, round trips)
//! - [`preprocessing`] — Graph pruning and bound tightening
//! - [`solver`] — The column generation engine ([`solver::VehicleRoutingProblem`])

pub mod config;
pub mod constructive;
pub mod diving;
pub mod error;
pub mod hyper;
pub mod lp;
pub mod master;
pub mod models;
pub mod preprocessing;
pub mod pricing;
pub mod resources;
pub mod schedule;
pub mod solver;
pub mod stabilization;
