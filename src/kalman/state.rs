// Filter state for a single tracked object
//
// Owns the CTRV mean/covariance and runs one predict + update cycle per
// measurement. The first measurement only seeds the state.

use nalgebra as na;
use na::{DMatrix, DVector};
use tracing::{debug, warn};

use super::ctrv::{predict, CtrvState, Prediction, ProcessNoise};
use super::sensor::{LidarModel, MeasurementModel, RadarModel};
use super::unscented::SigmaWeights;
use crate::config::FilterConfig;
use crate::constants::{LAMBDA, MICROS_PER_SECOND, N_AUG, N_X};
use crate::error::Result;
use crate::geometry::polar_to_cartesian;
use crate::measurement::{Measurement, SensorKind, SensorReading};

/// Lifecycle of the filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackPhase {
    /// No measurement seen yet
    Uninitialized,
    /// Seeded; holds the timestamp of the last processed measurement (us)
    Tracking { last_timestamp: i64 },
}

/// Unscented Kalman filter fusing lidar and radar readings
///
/// One instance tracks one object.
#[derive(Debug, Clone)]
pub struct KalmanState {
    config: FilterConfig,
    weights: SigmaWeights,
    lidar: LidarModel,
    radar: RadarModel,

    phase: TrackPhase,
    x: DVector<f64>,  // [px, py, v, yaw, yaw_rate]
    p: DMatrix<f64>,  // 5x5

    nis_laser: f64,
    nis_radar: f64,
    /// NIS of the update run for the most recent measurement, if one ran
    last_nis: Option<f64>,
}

impl KalmanState {
    /// Create a filter from a configuration
    ///
    /// Fails only if the configuration does not validate.
    pub fn new(config: FilterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            weights: SigmaWeights::new(N_AUG, LAMBDA),
            lidar: LidarModel::new(&config.sensor_noise),
            radar: RadarModel::new(&config.sensor_noise),
            config,
            phase: TrackPhase::Uninitialized,
            x: DVector::zeros(N_X),
            p: DMatrix::identity(N_X, N_X),
            nis_laser: 0.0,
            nis_radar: 0.0,
            last_nis: None,
        })
    }

    pub fn process_noise(&self) -> &ProcessNoise {
        &self.config.process_noise
    }

    pub fn phase(&self) -> TrackPhase {
        self.phase
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.phase, TrackPhase::Tracking { .. })
    }

    /// Current state estimate
    pub fn state(&self) -> CtrvState {
        CtrvState::from_vector(&self.x)
    }

    /// State mean in [px, py, v, yaw, yaw_rate] order
    pub fn mean(&self) -> &DVector<f64> {
        &self.x
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.p
    }

    /// NIS of the most recent lidar update
    pub fn nis_laser(&self) -> f64 {
        self.nis_laser
    }

    /// NIS of the most recent radar update
    pub fn nis_radar(&self) -> f64 {
        self.nis_radar
    }

    /// NIS of the most recent update from the given sensor
    pub fn nis(&self, kind: SensorKind) -> f64 {
        match kind {
            SensorKind::Lidar => self.nis_laser,
            SensorKind::Radar => self.nis_radar,
        }
    }

    /// NIS produced by the most recent `process_measurement` call
    ///
    /// `None` after the initializing measurement and after an update that was
    /// skipped because the innovation covariance was degenerate.
    pub fn last_nis(&self) -> Option<f64> {
        self.last_nis
    }

    /// Seed mean and covariance from the first measurement
    ///
    /// Only the position is observable from a single reading; speed, heading
    /// and yaw rate start at zero.
    fn set_initial_state(&mut self, reading: &SensorReading) {
        let (px, py) = match *reading {
            SensorReading::Lidar { px, py } => (px, py),
            SensorReading::Radar { rho, phi, rho_dot } => {
                let (px, py, _, _) = polar_to_cartesian(rho, phi, rho_dot);
                (px, py)
            }
        };
        self.x = DVector::from_vec(vec![px, py, 0.0, 0.0, 0.0]);

        let init = &self.config.initial_uncertainty;
        self.p = DMatrix::from_diagonal(&DVector::from_vec(vec![
            init.position,
            init.position,
            init.speed,
            init.yaw,
            init.yaw_rate,
        ]));
    }

    /// Run the motion model `dt` seconds forward from the current estimate
    fn predict(&self, dt: f64) -> Prediction {
        predict(&self.x, &self.p, &self.config.process_noise, &self.weights, dt)
    }

    /// Fuse one reading into a prediction and store the result
    fn update(&mut self, prediction: Prediction, reading: &SensorReading) {
        let observation = reading.to_vector();
        let model: &dyn MeasurementModel = match reading {
            SensorReading::Lidar { .. } => &self.lidar,
            SensorReading::Radar { .. } => &self.radar,
        };

        match model.update(&prediction, &self.weights, &observation) {
            Some(correction) => {
                match reading.kind() {
                    SensorKind::Lidar => self.nis_laser = correction.nis,
                    SensorKind::Radar => self.nis_radar = correction.nis,
                }
                self.last_nis = Some(correction.nis);
                self.x = correction.moments.mean;
                self.p = correction.moments.covariance;
            }
            None => {
                warn!(sensor = %reading.kind(), "innovation covariance degenerate, keeping prediction");
                self.last_nis = None;
                self.x = prediction.moments.mean;
                self.p = prediction.moments.covariance;
            }
        }
    }

    /// Process one measurement
    ///
    /// The first call seeds the state. Every later call predicts to the
    /// measurement's timestamp and updates with the matching sensor model.
    /// A timestamp that does not advance is treated as zero elapsed time.
    pub fn process_measurement(&mut self, measurement: &Measurement) {
        let last_timestamp = match self.phase {
            TrackPhase::Uninitialized => {
                self.set_initial_state(&measurement.reading);
                self.last_nis = None;
                self.phase = TrackPhase::Tracking {
                    last_timestamp: measurement.timestamp,
                };
                debug!(sensor = %measurement.kind(), "filter initialized");
                return;
            }
            TrackPhase::Tracking { last_timestamp } => last_timestamp,
        };

        let elapsed_us = measurement.timestamp.saturating_sub(last_timestamp);
        if elapsed_us < 0 {
            debug!(
                timestamp = measurement.timestamp,
                last_timestamp, "measurement out of order, predicting zero elapsed time"
            );
        }
        let dt = elapsed_us.max(0) as f64 / MICROS_PER_SECOND;

        let prediction = self.predict(dt);
        self.update(prediction, &measurement.reading);

        self.phase = TrackPhase::Tracking {
            last_timestamp: measurement.timestamp,
        };

        debug!(
            sensor = %measurement.kind(),
            dt,
            nis = self.last_nis,
            "measurement processed"
        );
    }
}
