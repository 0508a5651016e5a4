// Kalman filter module
// Unscented estimation of a CTRV target from lidar and radar readings

pub mod unscented;
pub mod ctrv;
pub mod sensor;
pub mod state;

pub use unscented::{
    moments2points, points2moments, unscented_transform, unscented_filter_correct, Correction,
    CovarianceForm, Moments, SigmaPoints, SigmaWeights,
};
pub use ctrv::{CtrvState, Prediction, ProcessNoise};
pub use sensor::{LidarModel, MeasurementModel, RadarModel, SensorNoise};
pub use state::{KalmanState, TrackPhase};
