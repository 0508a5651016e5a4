// Measurement models for the two sensors
//
// Each model maps a CTRV sigma point into the sensor's observation space and
// carries the sensor's fixed noise covariance.

use nalgebra as na;
use na::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::unscented::{unscented_filter_correct, Correction, SigmaWeights};
use super::ctrv::Prediction;
use crate::constants::{
    DEFAULT_STD_LASPX, DEFAULT_STD_LASPY, DEFAULT_STD_RADPHI, DEFAULT_STD_RADR,
    DEFAULT_STD_RADRD, RANGE_EPSILON, YAW_INDEX,
};
use crate::geometry::heading_to_velocity;

/// Sensor noise standard deviations, fixed by the sensor specifications
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorNoise {
    /// Lidar x position (m)
    pub std_laspx: f64,
    /// Lidar y position (m)
    pub std_laspy: f64,
    /// Radar range (m)
    pub std_radr: f64,
    /// Radar bearing (rad)
    pub std_radphi: f64,
    /// Radar range rate (m/s)
    pub std_radrd: f64,
}

impl Default for SensorNoise {
    fn default() -> Self {
        SensorNoise {
            std_laspx: DEFAULT_STD_LASPX,
            std_laspy: DEFAULT_STD_LASPY,
            std_radr: DEFAULT_STD_RADR,
            std_radphi: DEFAULT_STD_RADPHI,
            std_radrd: DEFAULT_STD_RADRD,
        }
    }
}

/// A sensor's view of the CTRV state
pub trait MeasurementModel {
    /// Dimension of the observation space
    fn dim(&self) -> usize;

    /// Observation components that are angles
    fn angle_components(&self) -> &[usize];

    /// Additive measurement noise covariance
    fn noise_covariance(&self) -> &DMatrix<f64>;

    /// Map one state vector into observation space
    fn observe(&self, state: &DVector<f64>) -> DVector<f64>;

    /// Fuse an observation into the predicted state
    ///
    /// Returns `None` if the innovation covariance is degenerate, in which case
    /// the prediction should be kept as is.
    fn update(
        &self,
        prediction: &Prediction,
        weights: &SigmaWeights,
        observation: &DVector<f64>,
    ) -> Option<Correction> {
        unscented_filter_correct(
            |x| self.observe(x),
            &prediction.moments,
            &prediction.sigma_points,
            weights,
            &[YAW_INDEX],
            observation,
            self.angle_components(),
            self.noise_covariance(),
        )
    }
}

/// Lidar: direct (px, py) readings
#[derive(Debug, Clone)]
pub struct LidarModel {
    r: DMatrix<f64>,
}

impl LidarModel {
    pub fn new(noise: &SensorNoise) -> Self {
        LidarModel {
            r: DMatrix::from_diagonal(&DVector::from_vec(vec![
                noise.std_laspx * noise.std_laspx,
                noise.std_laspy * noise.std_laspy,
            ])),
        }
    }
}

impl MeasurementModel for LidarModel {
    fn dim(&self) -> usize {
        2
    }

    fn angle_components(&self) -> &[usize] {
        &[]
    }

    fn noise_covariance(&self) -> &DMatrix<f64> {
        &self.r
    }

    fn observe(&self, state: &DVector<f64>) -> DVector<f64> {
        state.rows(0, 2).into_owned()
    }
}

const RADAR_ANGLES: [usize; 1] = [RadarModel::BEARING_INDEX];

/// Radar: range, bearing and range rate relative to the sensor origin
#[derive(Debug, Clone)]
pub struct RadarModel {
    r: DMatrix<f64>,
}

impl RadarModel {
    /// Index of the bearing in the radar observation
    pub const BEARING_INDEX: usize = 1;

    pub fn new(noise: &SensorNoise) -> Self {
        RadarModel {
            r: DMatrix::from_diagonal(&DVector::from_vec(vec![
                noise.std_radr * noise.std_radr,
                noise.std_radphi * noise.std_radphi,
                noise.std_radrd * noise.std_radrd,
            ])),
        }
    }
}

impl MeasurementModel for RadarModel {
    fn dim(&self) -> usize {
        3
    }

    fn angle_components(&self) -> &[usize] {
        &RADAR_ANGLES
    }

    fn noise_covariance(&self) -> &DMatrix<f64> {
        &self.r
    }

    fn observe(&self, state: &DVector<f64>) -> DVector<f64> {
        let px = state[0];
        let py = state[1];
        let (vx, vy) = heading_to_velocity(state[2], state[3]);

        let rho = px.hypot(py);
        let phi = py.atan2(px);
        // Object at the sensor origin: range rate is undefined, divide by the floor
        let rho_dot = (px * vx + py * vy) / rho.max(RANGE_EPSILON);

        DVector::from_vec(vec![rho, phi, rho_dot])
    }
}
