// Estimation accuracy
// RMSE against ground truth and NIS consistency per sensor

use nalgebra::Vector4;
use tracing::warn;

use crate::constants::{CHI2_95_DOF2, CHI2_95_DOF3};
use crate::kalman::CtrvState;
use crate::measurement::{GroundTruth, SensorKind};

/// Convert a CTRV estimate into the (px, py, vx, vy) space of the ground truth
pub fn estimate_to_cartesian(state: &CtrvState) -> Vector4<f64> {
    let (vx, vy) = state.velocity();
    Vector4::new(state.px, state.py, vx, vy)
}

pub fn truth_to_vector(truth: &GroundTruth) -> Vector4<f64> {
    Vector4::from(truth.to_array())
}

/// Root mean squared error per component
///
/// # Arguments
/// * `estimations` - Estimated (px, py, vx, vy), one per record
/// * `ground_truth` - True (px, py, vx, vy), same length and order
///
/// # Returns
/// Component-wise RMSE, or zeros if the inputs are empty or of different lengths
pub fn calculate_rmse(estimations: &[Vector4<f64>], ground_truth: &[Vector4<f64>]) -> Vector4<f64> {
    if estimations.is_empty() || estimations.len() != ground_truth.len() {
        warn!(
            estimations = estimations.len(),
            ground_truth = ground_truth.len(),
            "invalid estimation or ground truth data"
        );
        return Vector4::zeros();
    }

    let mut sum = Vector4::zeros();
    for (estimate, truth) in estimations.iter().zip(ground_truth) {
        let residual = estimate - truth;
        sum += residual.component_mul(&residual);
    }

    (sum / estimations.len() as f64).map(f64::sqrt)
}

/// 95% chi-square bound for the NIS of a sensor's observation
pub fn nis_bound(sensor: SensorKind) -> f64 {
    match sensor {
        SensorKind::Lidar => CHI2_95_DOF2,
        SensorKind::Radar => CHI2_95_DOF3,
    }
}

/// Running NIS statistics for one sensor
///
/// A consistent filter keeps roughly 5% of its NIS values above the bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NisSummary {
    sensor: SensorKind,
    count: usize,
    sum: f64,
    above_bound: usize,
}

impl NisSummary {
    pub fn new(sensor: SensorKind) -> Self {
        NisSummary {
            sensor,
            count: 0,
            sum: 0.0,
            above_bound: 0,
        }
    }

    pub fn record(&mut self, nis: f64) {
        self.count += 1;
        self.sum += nis;
        if nis > nis_bound(self.sensor) {
            self.above_bound += 1;
        }
    }

    pub fn sensor(&self) -> SensorKind {
        self.sensor
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    /// Fraction of updates whose NIS exceeded the 95% bound
    pub fn fraction_above_bound(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.above_bound as f64 / self.count as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rmse_known_values() {
        let estimations = vec![
            Vector4::new(1.0, 1.0, 0.2, 0.1),
            Vector4::new(2.0, 2.0, 0.3, 0.2),
            Vector4::new(3.0, 3.0, 0.4, 0.3),
        ];
        let ground_truth = vec![
            Vector4::new(1.1, 1.1, 0.3, 0.2),
            Vector4::new(2.1, 2.1, 0.4, 0.3),
            Vector4::new(3.1, 3.1, 0.5, 0.4),
        ];
        let rmse = calculate_rmse(&estimations, &ground_truth);
        for i in 0..4 {
            assert!((rmse[i] - 0.1).abs() < 1e-9, "component {}: {}", i, rmse[i]);
        }
    }

    #[test]
    fn test_rmse_invalid_input_is_zero() {
        let one = vec![Vector4::new(1.0, 2.0, 3.0, 4.0)];
        assert_eq!(calculate_rmse(&[], &[]), Vector4::zeros());
        assert_eq!(calculate_rmse(&one, &[]), Vector4::zeros());
    }

    #[test]
    fn test_estimate_to_cartesian() {
        let state = CtrvState {
            px: 1.0,
            py: 2.0,
            v: 2.0,
            yaw: std::f64::consts::FRAC_PI_2,
            yaw_rate: 0.3,
        };
        let v = estimate_to_cartesian(&state);
        assert_eq!(v[0], 1.0);
        assert_eq!(v[1], 2.0);
        assert!(v[2].abs() < 1e-12);
        assert!((v[3] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_nis_summary() {
        let mut summary = NisSummary::new(SensorKind::Radar);
        assert_eq!(summary.mean(), 0.0);
        assert_eq!(summary.fraction_above_bound(), 0.0);

        for nis in [1.0, 2.0, 9.0, 4.0] {
            summary.record(nis);
        }
        assert_eq!(summary.count(), 4);
        assert!((summary.mean() - 4.0).abs() < 1e-12);
        assert!((summary.fraction_above_bound() - 0.25).abs() < 1e-12);

        let mut lidar = NisSummary::new(SensorKind::Lidar);
        lidar.record(6.5);
        assert_eq!(lidar.fraction_above_bound(), 1.0);
        assert_eq!(nis_bound(lidar.sensor()), CHI2_95_DOF2);
    }
}
