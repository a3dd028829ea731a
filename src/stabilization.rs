//! Dual price stabilization.
//!
//! Naive column generation lets the duals oscillate between extreme
//! vertices of the master's dual polyhedron, which slows convergence.
//! This module applies convex smoothing toward a stability center:
//! `smoothed = alpha * center + (1 - alpha) * raw`, the center tracking
//! the previously used vector. Smoothed duals are used only for pricing;
//! the master's own objective and optimality reasoning always see raw
//! values.
//!
//! When pricing finds nothing under smoothed duals (a misprice), the
//! smoothing factor halves and the search continues; once the factor
//! reaches zero the stabilization is bypassed entirely, so the final
//! termination check always runs against the true duals.

use crate::master::DualPrices;

/// Smoothing factor below which stabilization switches itself off.
const MIN_ALPHA: f64 = 1e-3;

/// Wentges-style dual smoothing state.
#[derive(Debug, Clone)]
pub struct DualStabilization {
    alpha: f64,
    center: Option<(Vec<f64>, Vec<f64>)>,
}

impl DualStabilization {
    /// Creates the stabilizer; `alpha` in [0, 1), 0 disables smoothing.
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0 - f64::EPSILON),
            center: None,
        }
    }

    /// `true` while smoothing still applies; termination must not be
    /// decided from a failed pricing round while this holds.
    pub fn is_active(&self) -> bool {
        self.alpha > 0.0
    }

    /// Current smoothing factor.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Produces the dual vector pricing should use and advances the
    /// stability center.
    pub fn smooth(&mut self, raw: &DualPrices) -> DualPrices {
        if self.alpha == 0.0 {
            return raw.clone();
        }
        let Some((center_node, center_vehicle)) = &self.center else {
            self.center = Some((raw.node_duals().to_vec(), raw.vehicle_duals().to_vec()));
            return raw.clone();
        };
        let alpha = self.alpha;
        let blend = |center: &[f64], raw: &[f64]| -> Vec<f64> {
            center
                .iter()
                .zip(raw)
                .map(|(c, r)| alpha * c + (1.0 - alpha) * r)
                .collect()
        };
        let node = blend(center_node, raw.node_duals());
        let vehicle = blend(center_vehicle, raw.vehicle_duals());
        self.center = Some((node.clone(), vehicle.clone()));
        DualPrices::new(raw.version(), node, vehicle)
    }

    /// Records a pricing round that found nothing under smoothed duals.
    /// Returns `true` if stabilization absorbed the failure (the caller
    /// should re-price instead of terminating).
    pub fn notify_misprice(&mut self) -> bool {
        if self.alpha == 0.0 {
            return false;
        }
        self.alpha /= 2.0;
        if self.alpha < MIN_ALPHA {
            self.alpha = 0.0;
            log::debug!("stabilization bypassed, pricing against raw duals");
        } else {
            log::debug!("misprice, smoothing factor reduced to {:.4}", self.alpha);
        }
        true
    }
}
