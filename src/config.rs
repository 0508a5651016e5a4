use std::path::Path;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_INIT_POSITION_VARIANCE, DEFAULT_INIT_SPEED_VARIANCE, DEFAULT_INIT_YAW_RATE_VARIANCE,
    DEFAULT_INIT_YAW_VARIANCE,
};
use crate::error::{Error, Result};
use crate::kalman::{ProcessNoise, SensorNoise};
use crate::tuning::{ScoreWeights, TuningParams};

/// Lidar/radar fusion with an unscented Kalman filter
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Measurement file ("L px py t ..." / "R rho phi rho_dot t ..." lines).
    #[arg(value_name = "INPUT")]
    pub input: String,

    /// Tab-separated estimates are written here.
    #[arg(value_name = "OUTPUT")]
    pub output: String,

    /// Also write estimates as JSON lines to a file.
    #[arg(long, value_name = "FILE")]
    pub json_output: Option<String>,

    /// Filter configuration (JSON); missing fields take their defaults.
    #[arg(long, value_name = "FILE")]
    pub filter_config: Option<String>,

    /// Override the longitudinal acceleration noise std-dev (m/s^2).
    #[arg(long)]
    pub std_a: Option<f64>,

    /// Override the yaw acceleration noise std-dev (rad/s^2).
    #[arg(long)]
    pub std_yawdd: Option<f64>,

    /// Search the process noise parameters before the final run.
    #[arg(long, default_value_t = false)]
    pub tune: bool,

    /// Datasets scored during tuning (defaults to INPUT).
    #[arg(long, value_name = "FILE")]
    pub tune_input: Vec<String>,

    /// Initial tuning step for both parameters.
    #[arg(long, default_value_t = 0.2)]
    pub tune_step: f64,

    /// Tuning stops once the summed step sizes fall below this.
    #[arg(long, default_value_t = 0.001)]
    pub tune_tolerance: f64,

    /// Upper bound on tuning epochs.
    #[arg(long, default_value_t = 1000)]
    pub tune_max_epochs: usize,

    /// Tuning score weight of the px RMSE.
    #[arg(long, default_value_t = 5.0)]
    pub weight_px: f64,

    /// Tuning score weight of the py RMSE.
    #[arg(long, default_value_t = 5.0)]
    pub weight_py: f64,

    /// Tuning score weight of the vx RMSE.
    #[arg(long, default_value_t = 1.0)]
    pub weight_vx: f64,

    /// Tuning score weight of the vy RMSE.
    #[arg(long, default_value_t = 1.0)]
    pub weight_vy: f64,

    /// Verbose logging (DEBUG level)
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Filter configuration from the optional file plus command-line overrides
    pub fn filter_config(&self) -> Result<FilterConfig> {
        let mut filter = match &self.filter_config {
            Some(path) => FilterConfig::load(path)?,
            None => FilterConfig::default(),
        };
        if let Some(std_a) = self.std_a {
            filter.process_noise.std_a = std_a;
        }
        if let Some(std_yawdd) = self.std_yawdd {
            filter.process_noise.std_yawdd = std_yawdd;
        }
        filter.validate()?;
        Ok(filter)
    }

    pub fn tuning_params(&self) -> TuningParams {
        TuningParams {
            step: self.tune_step,
            tolerance: self.tune_tolerance,
            max_epochs: self.tune_max_epochs,
        }
    }

    pub fn score_weights(&self) -> ScoreWeights {
        ScoreWeights {
            px: self.weight_px,
            py: self.weight_py,
            vx: self.weight_vx,
            vy: self.weight_vy,
        }
    }
}

/// Variances placed on the diagonal of the covariance at initialization
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialUncertainty {
    pub position: f64,
    pub speed: f64,
    pub yaw: f64,
    pub yaw_rate: f64,
}

impl Default for InitialUncertainty {
    fn default() -> Self {
        InitialUncertainty {
            position: DEFAULT_INIT_POSITION_VARIANCE,
            speed: DEFAULT_INIT_SPEED_VARIANCE,
            yaw: DEFAULT_INIT_YAW_VARIANCE,
            yaw_rate: DEFAULT_INIT_YAW_RATE_VARIANCE,
        }
    }
}

/// Everything a filter instance is built from; fixed for its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub process_noise: ProcessNoise,
    pub sensor_noise: SensorNoise,
    pub initial_uncertainty: InitialUncertainty,
}

impl FilterConfig {
    pub fn with_process_noise(mut self, process_noise: ProcessNoise) -> Self {
        self.process_noise = process_noise;
        self
    }

    /// Read a JSON filter configuration
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: FilterConfig = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// All standard deviations and variances must be finite and positive
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("process_noise.std_a", self.process_noise.std_a),
            ("process_noise.std_yawdd", self.process_noise.std_yawdd),
            ("sensor_noise.std_laspx", self.sensor_noise.std_laspx),
            ("sensor_noise.std_laspy", self.sensor_noise.std_laspy),
            ("sensor_noise.std_radr", self.sensor_noise.std_radr),
            ("sensor_noise.std_radphi", self.sensor_noise.std_radphi),
            ("sensor_noise.std_radrd", self.sensor_noise.std_radrd),
            ("initial_uncertainty.position", self.initial_uncertainty.position),
            ("initial_uncertainty.speed", self.initial_uncertainty.speed),
            ("initial_uncertainty.yaw", self.initial_uncertainty.yaw),
            ("initial_uncertainty.yaw_rate", self.initial_uncertainty.yaw_rate),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Config(format!(
                    "{} must be finite and positive, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = FilterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.process_noise.std_a, 2.0);
        assert_eq!(config.process_noise.std_yawdd, 1.0);
        assert_eq!(config.sensor_noise.std_radphi, 0.03);
    }

    #[test]
    fn test_validate_rejects_non_positive() {
        let config = FilterConfig::default().with_process_noise(ProcessNoise {
            std_a: 0.0,
            std_yawdd: 1.0,
        });
        match config.validate() {
            Err(Error::Config(message)) => assert!(message.contains("std_a")),
            other => panic!("unexpected {:?}", other),
        }

        let mut config = FilterConfig::default();
        config.sensor_noise.std_radr = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "process_noise": { "std_a": 0.9, "std_yawdd": 0.55 },
            "sensor_noise": { "std_radr": 0.25 }
        }"#;
        let config: FilterConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.process_noise.std_a, 0.9);
        assert_eq!(config.process_noise.std_yawdd, 0.55);
        assert_eq!(config.sensor_noise.std_radr, 0.25);
        assert_eq!(config.sensor_noise.std_laspx, 0.15);
        assert_eq!(config.initial_uncertainty, InitialUncertainty::default());
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::parse_from([
            "ukf-fusion",
            "in.txt",
            "out.txt",
            "--std-a",
            "1.5",
            "--weight-px",
            "2",
        ]);
        let filter = config.filter_config().unwrap();
        assert_eq!(filter.process_noise.std_a, 1.5);
        assert_eq!(filter.process_noise.std_yawdd, 1.0);
        assert_eq!(config.score_weights().px, 2.0);
        assert_eq!(config.score_weights().vx, 1.0);
        assert!(!config.tune);
        assert_eq!(config.tuning_params(), TuningParams::default());
    }

    #[test]
    fn test_cli_rejects_invalid_override() {
        let config = Config::parse_from(["ukf-fusion", "in.txt", "out.txt", "--std-yawdd", "0"]);
        assert!(config.filter_config().is_err());
    }
}
