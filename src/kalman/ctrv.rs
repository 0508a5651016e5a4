// Constant turn rate and velocity (CTRV) motion model
//
// State is [px, py, v, yaw, yaw_rate]; the augmented state appends the
// longitudinal acceleration noise nu_a and the yaw acceleration noise nu_yawdd.

use nalgebra as na;
use na::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::unscented::{moments2points, points2moments, Moments, SigmaPoints, SigmaWeights};
use crate::constants::{
    DEFAULT_STD_A, DEFAULT_STD_YAWDD, LAMBDA, N_AUG, N_X, YAW_INDEX, YAW_RATE_EPSILON,
};
use crate::geometry::{heading_to_velocity, normalize_angle};

/// Kinematic state of the tracked object
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CtrvState {
    /// Position x (m)
    pub px: f64,
    /// Position y (m)
    pub py: f64,
    /// Speed along the heading (m/s)
    pub v: f64,
    /// Heading (rad), in (-pi, pi]
    pub yaw: f64,
    /// Heading rate (rad/s)
    pub yaw_rate: f64,
}

impl CtrvState {
    pub fn from_vector(x: &DVector<f64>) -> Self {
        CtrvState {
            px: x[0],
            py: x[1],
            v: x[2],
            yaw: x[3],
            yaw_rate: x[4],
        }
    }

    pub fn to_vector(&self) -> DVector<f64> {
        DVector::from_vec(vec![self.px, self.py, self.v, self.yaw, self.yaw_rate])
    }

    /// Index-based view, in [px, py, v, yaw, yaw_rate] order
    pub fn to_array(&self) -> [f64; N_X] {
        [self.px, self.py, self.v, self.yaw, self.yaw_rate]
    }

    /// Cartesian velocity (vx, vy)
    pub fn velocity(&self) -> (f64, f64) {
        heading_to_velocity(self.v, self.yaw)
    }

    /// Advance the state by `dt` seconds under the given noise sample
    ///
    /// Speed and yaw rate are constant apart from the noise contribution.
    pub fn propagate(&self, nu_a: f64, nu_yawdd: f64, dt: f64) -> CtrvState {
        let CtrvState { px, py, v, yaw, yaw_rate } = *self;
        let (sin_yaw, cos_yaw) = yaw.sin_cos();

        // Deterministic part
        let (mut px_p, mut py_p) = if yaw_rate.abs() > YAW_RATE_EPSILON {
            let yaw_end = yaw + yaw_rate * dt;
            (
                px + v / yaw_rate * (yaw_end.sin() - sin_yaw),
                py + v / yaw_rate * (cos_yaw - yaw_end.cos()),
            )
        } else {
            (px + v * dt * cos_yaw, py + v * dt * sin_yaw)
        };
        let mut v_p = v;
        let mut yaw_p = yaw + yaw_rate * dt;
        let mut yaw_rate_p = yaw_rate;

        // Noise
        let half_dt2 = 0.5 * dt * dt;
        px_p += half_dt2 * nu_a * cos_yaw;
        py_p += half_dt2 * nu_a * sin_yaw;
        v_p += nu_a * dt;
        yaw_p += half_dt2 * nu_yawdd;
        yaw_rate_p += nu_yawdd * dt;

        CtrvState {
            px: px_p,
            py: py_p,
            v: v_p,
            yaw: normalize_angle(yaw_p),
            yaw_rate: yaw_rate_p,
        }
    }
}

/// Process noise standard deviations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessNoise {
    /// Longitudinal acceleration (m/s^2)
    pub std_a: f64,
    /// Yaw acceleration (rad/s^2)
    pub std_yawdd: f64,
}

impl Default for ProcessNoise {
    fn default() -> Self {
        ProcessNoise {
            std_a: DEFAULT_STD_A,
            std_yawdd: DEFAULT_STD_YAWDD,
        }
    }
}

/// Build the augmented mean and covariance
///
/// The state covariance occupies the top-left block, the two noise variances
/// the bottom-right diagonal.
pub fn augment(x: &DVector<f64>, p: &DMatrix<f64>, noise: &ProcessNoise) -> Moments {
    let mut mean = DVector::zeros(N_AUG);
    mean.rows_mut(0, N_X).copy_from(x);

    let mut covariance = DMatrix::zeros(N_AUG, N_AUG);
    covariance.view_mut((0, 0), (N_X, N_X)).copy_from(p);
    covariance[(N_X, N_X)] = noise.std_a * noise.std_a;
    covariance[(N_X + 1, N_X + 1)] = noise.std_yawdd * noise.std_yawdd;

    Moments { mean, covariance }
}

/// Propagate augmented sigma points through the CTRV model
pub fn predict_sigma_points(sigma_aug: &SigmaPoints, dt: f64) -> SigmaPoints {
    let mut points = DMatrix::zeros(sigma_aug.len(), N_X);
    for i in 0..sigma_aug.len() {
        let row = sigma_aug.points.row(i);
        let state = CtrvState {
            px: row[0],
            py: row[1],
            v: row[2],
            yaw: row[3],
            yaw_rate: row[4],
        };
        let predicted = state.propagate(row[5], row[6], dt);
        points.row_mut(i).copy_from_slice(&predicted.to_array());
    }
    SigmaPoints { points }
}

/// Output of one prediction step
///
/// The sigma points are handed straight to the measurement update of the
/// same cycle and dropped afterwards.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub sigma_points: SigmaPoints,
    pub moments: Moments,
}

/// Predict the state distribution `dt` seconds ahead
///
/// # Arguments
/// * `x` - Current state mean
/// * `p` - Current state covariance
/// * `noise` - Process noise standard deviations
/// * `weights` - Recombination weights for the augmented dimension
/// * `dt` - Elapsed time in seconds, negative values are treated as zero
pub fn predict(
    x: &DVector<f64>,
    p: &DMatrix<f64>,
    noise: &ProcessNoise,
    weights: &SigmaWeights,
    dt: f64,
) -> Prediction {
    let dt = dt.max(0.0);
    let augmented = augment(x, p, noise);
    let sigma_aug = moments2points(&augmented, LAMBDA);
    let sigma_points = predict_sigma_points(&sigma_aug, dt);
    let (moments, _) = points2moments(&sigma_points, weights, &[YAW_INDEX], None);

    Prediction {
        sigma_points,
        moments,
    }
}
