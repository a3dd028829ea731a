//! Adaptive strategy selection (hyper-heuristic).
//!
//! Ranks the pricing strategy families by observed performance (produced
//! and active columns, runtime percentile, share of the objective
//! decrease) and picks the best-scoring family each iteration, with a
//! UCB-style exploration term and an adaptivity factor `theta` that
//! relaxes toward exploration when the search stagnates.
//!
//! The controller is a policy over the closed set of
//! [`StrategyKind`](crate::config::StrategyKind) variants; it never
//! introduces search behavior of its own. Its performance history is an
//! explicit, serializable [`HyperState`] with an opt-in reload boundary:
//! nothing persists between solves unless the caller passes a state back
//! in.

use std::collections::HashMap;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::StrategyKind;

/// Initial selection score, large enough that every family is tried
/// before scores start to matter.
const UNTRIED_POINTS: f64 = 1e10;

/// How strategy performance is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerformanceMeasure {
    /// Weighted mix of active columns, runtime percentile and objective
    /// decrease share.
    WeightedAverage,
    /// Runtime improvement relative to the running average.
    RelativeImprovement,
}

/// Move acceptance rule applied after each observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveAcceptance {
    /// Every move is accepted.
    AcceptAll,
    /// Non-improving moves are accepted with a probability scaled by the
    /// recent improvement.
    Table,
    /// Improving moves are always accepted, others with probability
    /// `exp(d)`.
    ObjectiveThreshold,
}

/// Serializable performance history of the controller.
///
/// The explicit load/save boundary for cross-run learning: obtain it via
/// [`HyperHeuristic::state`], persist it however you like (it is plain
/// serde data), and hand it to
/// [`SolveOptions::with_hyper_state`](crate::config::SolveOptions::with_hyper_state)
/// to resume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HyperState {
    pub iterations: HashMap<StrategyKind, usize>,
    pub added_columns: HashMap<StrategyKind, usize>,
    pub quality: HashMap<StrategyKind, f64>,
    pub reward_average: HashMap<StrategyKind, f64>,
    pub objective_decrease: HashMap<StrategyKind, f64>,
    pub total_objective_decrease: f64,
}

/// The adaptive strategy selector.
pub struct HyperHeuristic {
    options: Vec<StrategyKind>,
    measure: PerformanceMeasure,
    acceptance: MoveAcceptance,
    scaling_factor: f64,
    step: f64,
    start_computing_average: usize,

    state: HyperState,
    points: HashMap<StrategyKind, f64>,
    exploration: HashMap<StrategyKind, f64>,
    norm_runtime: HashMap<StrategyKind, f64>,
    norm_objective_decrease: HashMap<StrategyKind, f64>,
    last_runtime: HashMap<StrategyKind, f64>,
    runtime_dist: Vec<f64>,
    active_columns: HashMap<StrategyKind, usize>,

    current: StrategyKind,
    current_objective: f64,
    produced_column: bool,
    obj_has_decreased: bool,
    theta: f64,
    d: f64,
    d_max: f64,
    iteration: usize,
    average_runtime: f64,
    tick: Option<Instant>,
    rng: StdRng,
}

impl HyperHeuristic {
    /// Creates a fresh controller over all strategy families.
    pub fn new(seed: u64) -> Self {
        Self::with_state(seed, HyperState::default())
    }

    /// Creates a controller resuming from persisted history.
    pub fn with_state(seed: u64, state: HyperState) -> Self {
        let options: Vec<StrategyKind> = StrategyKind::ALL.to_vec();
        let points = options.iter().map(|&k| (k, UNTRIED_POINTS)).collect();
        Self {
            measure: PerformanceMeasure::WeightedAverage,
            acceptance: MoveAcceptance::AcceptAll,
            scaling_factor: 0.5,
            step: 0.1,
            start_computing_average: 1,
            state,
            points,
            exploration: options.iter().map(|&k| (k, 0.0)).collect(),
            norm_runtime: options.iter().map(|&k| (k, 0.0)).collect(),
            norm_objective_decrease: options.iter().map(|&k| (k, 0.0)).collect(),
            last_runtime: options.iter().map(|&k| (k, 0.0)).collect(),
            runtime_dist: Vec::new(),
            active_columns: HashMap::new(),
            current: StrategyKind::KShortest,
            current_objective: f64::INFINITY,
            produced_column: false,
            obj_has_decreased: false,
            theta: 1.0,
            d: 0.0,
            d_max: 0.0,
            iteration: 0,
            average_runtime: 0.0,
            options,
            tick: None,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Overrides the performance measure.
    pub fn with_measure(mut self, measure: PerformanceMeasure) -> Self {
        self.measure = measure;
        self
    }

    /// Overrides the move acceptance rule.
    pub fn with_acceptance(mut self, acceptance: MoveAcceptance) -> Self {
        self.acceptance = acceptance;
        self
    }

    /// Snapshot of the performance history for persistence.
    pub fn state(&self) -> &HyperState {
        &self.state
    }

    /// Sets the reference objective and starts the runtime clock.
    pub fn init(&mut self, objective: f64) {
        self.current = StrategyKind::KShortest;
        self.current_objective = objective;
        self.tick = Some(Instant::now());
    }

    /// Chooses the strategy for the coming iteration.
    pub fn pick(&mut self) -> StrategyKind {
        if self.measure == PerformanceMeasure::RelativeImprovement
            && self.iteration < self.start_computing_average
        {
            let index = self.rng.random_range(0..2.min(self.options.len()));
            self.current = self.options[index];
            return self.current;
        }
        let best = self
            .points
            .values()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let tied: Vec<StrategyKind> = self
            .options
            .iter()
            .copied()
            .filter(|k| (self.points[k] - best).abs() < 1e-12)
            .collect();
        self.current = if tied.len() == 1 {
            tied[0]
        } else {
            tied[self.rng.random_range(0..tied.len())]
        };
        self.current
    }

    /// Records the outcome of the iteration priced with the current
    /// strategy.
    pub fn observe(
        &mut self,
        new_objective: f64,
        produced_column: bool,
        active_columns: HashMap<StrategyKind, usize>,
    ) {
        let now = Instant::now();
        let elapsed = self
            .tick
            .map_or(0.0, |tick| now.duration_since(tick).as_secs_f64());
        self.tick = Some(now);
        self.last_runtime.insert(self.current, elapsed);

        *self.state.iterations.entry(self.current).or_insert(0) += 1;
        self.produced_column = produced_column;
        if produced_column {
            *self.state.added_columns.entry(self.current).or_insert(0) += 1;
        }
        self.obj_has_decreased = self.current_objective - new_objective > 0.0;

        match self.measure {
            PerformanceMeasure::RelativeImprovement => {
                if self.iteration > self.start_computing_average + 1 && self.average_runtime > 0.0 {
                    self.d = ((self.average_runtime - elapsed) / self.average_runtime * 100.0)
                        .max(0.0);
                    if self.d > self.d_max {
                        self.d_max = self.d;
                    } else {
                        self.d = 0.0;
                    }
                }
            }
            PerformanceMeasure::WeightedAverage => {
                self.active_columns = active_columns;
                let position = self
                    .runtime_dist
                    .binary_search_by(|probe| {
                        probe.partial_cmp(&elapsed).expect("runtimes are finite")
                    })
                    .unwrap_or_else(|e| e);
                self.runtime_dist.insert(position, elapsed);
                let decrease = (self.current_objective - new_objective).max(0.0);
                *self
                    .state
                    .objective_decrease
                    .entry(self.current)
                    .or_insert(0.0) += decrease;
                self.state.total_objective_decrease += decrease;
                let options = self.options.clone();
                for kind in options {
                    if self.state.iterations.get(&kind).copied().unwrap_or(0) == 0 {
                        continue;
                    }
                    self.update_exploration(kind);
                    let last = self.last_runtime[&kind];
                    let rank = self
                        .runtime_dist
                        .partition_point(|&probe| probe <= last);
                    self.norm_runtime.insert(
                        kind,
                        (self.runtime_dist.len() - rank) as f64 / self.runtime_dist.len() as f64,
                    );
                    if self.state.total_objective_decrease > 0.0 {
                        self.norm_objective_decrease.insert(
                            kind,
                            self.state.objective_decrease.get(&kind).copied().unwrap_or(0.0)
                                / self.state.total_objective_decrease,
                        );
                    }
                }
            }
        }
        self.current_objective = new_objective;
    }

    /// Applies the move acceptance rule.
    pub fn accept_move(&mut self) -> bool {
        match self.acceptance {
            MoveAcceptance::AcceptAll => true,
            MoveAcceptance::Table => {
                if self.obj_has_decreased {
                    true
                } else {
                    self.rng.random_range(0.0..1.0) < 0.5 * self.d.exp()
                }
            }
            MoveAcceptance::ObjectiveThreshold => {
                self.obj_has_decreased || self.rng.random_range(0.0..1.0) < self.d.exp()
            }
        }
    }

    /// Updates the high-level parameters after an observation.
    pub fn update_parameters(
        &mut self,
        iteration: usize,
        no_improvement_count: usize,
        no_improvement_iteration: usize,
    ) {
        self.iteration = iteration;
        let _ = (no_improvement_count, no_improvement_iteration);
        if self.obj_has_decreased && self.produced_column {
            self.theta = 0.99;
        } else {
            // Stagnation shrinks theta, boosting the exploration share.
            self.theta = (self.theta - self.step).max(self.step);
        }
        match self.measure {
            PerformanceMeasure::RelativeImprovement => self.update_relative_improvement(),
            PerformanceMeasure::WeightedAverage => self.update_weighted_average(),
        }
    }

    fn update_exploration(&mut self, kind: StrategyKind) {
        let total: usize = self.state.iterations.values().sum();
        let own = self.state.iterations.get(&kind).copied().unwrap_or(0);
        if total == 0 || own == 0 {
            return;
        }
        self.exploration
            .insert(kind, (2.0 * (total as f64).ln() / own as f64).sqrt());
    }

    fn reward(&self, improvement: f64, stagnated: bool) -> f64 {
        let mut x = if stagnated {
            improvement.min(0.1 * self.d_max)
        } else {
            improvement
        };
        if self.obj_has_decreased && self.produced_column && improvement > 0.0 {
            x *= 1.5;
        } else if improvement <= 0.0 {
            // No scaling for a non-improvement.
        } else if self.obj_has_decreased || self.produced_column {
            x *= 1.2;
        } else {
            x *= 0.9;
        }
        x
    }

    fn update_relative_improvement(&mut self) {
        if self.iteration <= self.start_computing_average {
            return;
        }
        let reduced_n = (self.iteration - self.start_computing_average) % 10;
        let last = self.last_runtime[&self.current];
        if reduced_n == 0 {
            self.average_runtime = last;
        } else {
            let n = reduced_n as f64;
            self.average_runtime = self.average_runtime * (n - 1.0) / n + last / n;
        }
        let kind = self.current;
        let old_q = self.state.quality.get(&kind).copied().unwrap_or(0.0);
        let old_n = self
            .state
            .iterations
            .get(&kind)
            .copied()
            .unwrap_or(1)
            .saturating_sub(1);
        let stagnated = old_q == 0.0 && old_n > 3;
        let reward = self.reward(self.d, stagnated);
        let r_old = self.state.reward_average.get(&kind).copied().unwrap_or(0.0);
        let r_new = r_old * old_n as f64 / (old_n + 1) as f64 + reward / (old_n + 1) as f64;
        self.state.reward_average.insert(kind, r_new);
        self.state
            .quality
            .insert(kind, (old_q + r_new) / (old_n + 1) as f64);

        let options = self.options.clone();
        for kind in options {
            if self.state.iterations.get(&kind).copied().unwrap_or(0) == 0 {
                continue;
            }
            self.update_exploration(kind);
            let q = self.state.quality.get(&kind).copied().unwrap_or(0.0);
            self.points
                .insert(kind, self.theta * q + self.scaling_factor * self.exploration[&kind]);
        }
    }

    fn update_weighted_average(&mut self) {
        const WEIGHT_COL_BASIC: f64 = 0.5;
        const WEIGHT_RUNTIME: f64 = 0.1;
        const WEIGHT_SPREAD: f64 = 0.3;
        const WEIGHT_OBJ: f64 = 0.05;
        const WEIGHT_COL_TOTAL: f64 = 0.05;

        let sum_exploration: f64 = self.exploration.values().sum();
        let active_total: usize = self.active_columns.values().sum();
        for &kind in &self.options {
            if self.state.iterations.get(&kind).copied().unwrap_or(0) == 0 {
                continue;
            }
            let active = self.active_columns.get(&kind).copied().unwrap_or(0) as f64;
            let total_added = self.state.added_columns.get(&kind).copied().unwrap_or(0) as f64;
            let active_share = if active_total > 0 {
                active / active_total as f64
            } else {
                0.0
            };
            let added_share = if total_added > 0.0 {
                active / total_added
            } else {
                0.0
            };
            let spread = if sum_exploration > 0.0 {
                self.exploration[&kind] / sum_exploration
            } else {
                0.0
            };
            let q = WEIGHT_COL_BASIC * active_share
                + WEIGHT_RUNTIME * self.norm_runtime[&kind]
                + WEIGHT_OBJ * self.norm_objective_decrease[&kind]
                + WEIGHT_COL_TOTAL * added_share;
            self.state.quality.insert(kind, q);
            self.points
                .insert(kind, self.theta * q + WEIGHT_SPREAD * spread * (1.0 - self.theta));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observe_round(
        hh: &mut HyperHeuristic,
        objective: f64,
        produced: bool,
        iteration: usize,
    ) -> StrategyKind {
        let picked = hh.pick();
        let mut active = HashMap::new();
        if produced {
            active.insert(picked, 1);
        }
        hh.observe(objective, produced, active);
        assert!(hh.accept_move());
        hh.update_parameters(iteration, 0, iteration);
        picked
    }

    #[test]
    fn test_tries_every_family_before_reusing_scores() {
        let mut hh = HyperHeuristic::new(42);
        hh.init(100.0);
        let mut seen = Vec::new();
        for i in 0..StrategyKind::ALL.len() {
            let picked = observe_round(&mut hh, 100.0 - i as f64, true, i + 1);
            if !seen.contains(&picked) {
                seen.push(picked);
            }
        }
        // Untried options keep the sentinel score, so all five families
        // get selected during the first rounds.
        assert_eq!(seen.len(), StrategyKind::ALL.len());
    }

    #[test]
    fn test_productive_family_outranks_unproductive() {
        let mut hh = HyperHeuristic::new(7);
        hh.init(100.0);
        let mut objective = 100.0;
        let mut productive_wins = 0;
        for i in 0..40 {
            let picked = hh.pick();
            let produced = picked == StrategyKind::EdgeCost;
            if produced {
                objective -= 1.0;
                productive_wins += 1;
            }
            let mut active = HashMap::new();
            if produced {
                active.insert(picked, 2);
            }
            hh.observe(objective, produced, active);
            hh.update_parameters(i + 1, 0, i + 1);
        }
        // After burn-in the controller should lean on the only family
        // that ever produced columns.
        assert!(productive_wins > 10, "only {productive_wins} productive picks");
    }

    #[test]
    fn test_state_round_trip() {
        let mut hh = HyperHeuristic::new(3);
        hh.init(50.0);
        for i in 0..6 {
            observe_round(&mut hh, 50.0 - i as f64, i % 2 == 0, i + 1);
        }
        let json = serde_json::to_string(hh.state()).expect("serialize");
        let state: HyperState = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(state.iterations, hh.state().iterations);
        let resumed = HyperHeuristic::with_state(3, state);
        let total: usize = resumed.state().iterations.values().sum();
        assert_eq!(total, 6);
    }

    #[test]
    fn test_theta_decays_on_stagnation() {
        let mut hh = HyperHeuristic::new(11);
        hh.init(10.0);
        hh.pick();
        hh.observe(10.0, false, HashMap::new());
        hh.update_parameters(1, 1, 0);
        let theta_after_one = hh.theta;
        assert!(theta_after_one < 1.0);
        hh.pick();
        hh.observe(10.0, false, HashMap::new());
        hh.update_parameters(2, 2, 0);
        assert!(hh.theta <= theta_after_one);
        // The floor is the step itself.
        for i in 3..30 {
            hh.pick();
            hh.observe(10.0, false, HashMap::new());
            hh.update_parameters(i, i, 0);
        }
        assert!((hh.theta - hh.step).abs() < 1e-9);
    }
}
