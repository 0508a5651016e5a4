// Process noise tuning
//
// Coordinate-wise hill climbing ("twiddle") over (std_a, std_yawdd). Each
// candidate is scored by running the filter over every tuning dataset and
// summing the weighted RMSE.

use nalgebra::Vector4;
use tracing::{debug, info};

use crate::config::FilterConfig;
use crate::error::Result;
use crate::kalman::ProcessNoise;
use crate::measurement::Dataset;
use crate::pipeline::evaluate;

const STEP_GROWTH: f64 = 1.2;
const STEP_SHRINK: f64 = 0.9;

/// Weights of the RMSE components in the tuning score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreWeights {
    pub px: f64,
    pub py: f64,
    pub vx: f64,
    pub vy: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights {
            px: 5.0,
            py: 5.0,
            vx: 1.0,
            vy: 1.0,
        }
    }
}

impl ScoreWeights {
    pub fn score(&self, rmse: &Vector4<f64>) -> f64 {
        self.px * rmse[0] + self.py * rmse[1] + self.vx * rmse[2] + self.vy * rmse[3]
    }
}

/// Search settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuningParams {
    /// Initial step for both parameters
    pub step: f64,
    /// Search stops once the summed steps fall below this
    pub tolerance: f64,
    pub max_epochs: usize,
}

impl Default for TuningParams {
    fn default() -> Self {
        TuningParams {
            step: 0.2,
            tolerance: 0.001,
            max_epochs: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuningResult {
    pub process_noise: ProcessNoise,
    pub score: f64,
    pub epochs: usize,
}

/// Weighted RMSE of one process noise candidate summed over all datasets
///
/// Non-positive parameters cannot build a filter and score as infinity.
pub fn score_process_noise(
    datasets: &[Dataset],
    base: &FilterConfig,
    process_noise: ProcessNoise,
    weights: &ScoreWeights,
) -> Result<f64> {
    if process_noise.std_a <= 0.0 || process_noise.std_yawdd <= 0.0 {
        return Ok(f64::INFINITY);
    }

    let config = base.with_process_noise(process_noise);
    let mut score = 0.0;
    for dataset in datasets {
        let summary = evaluate(dataset, config)?;
        score += weights.score(&summary.rmse);
    }
    Ok(score)
}

/// Search the process noise parameters, starting from `base`
///
/// # Arguments
/// * `datasets` - Datasets the score is summed over
/// * `base` - Configuration supplying the starting point and all other settings
/// * `weights` - RMSE component weights
/// * `params` - Step, tolerance and epoch cap
///
/// # Returns
/// Best parameters found and their score
pub fn tune(
    datasets: &[Dataset],
    base: FilterConfig,
    weights: ScoreWeights,
    params: TuningParams,
) -> Result<TuningResult> {
    base.validate()?;

    let to_noise = |p: &[f64; 2]| ProcessNoise {
        std_a: p[0],
        std_yawdd: p[1],
    };

    let mut p = [base.process_noise.std_a, base.process_noise.std_yawdd];
    let mut dp = [params.step, params.step];
    let mut best = score_process_noise(datasets, &base, to_noise(&p), &weights)?;
    info!(std_a = p[0], std_yawdd = p[1], score = best, "tuning started");

    let mut epochs = 0;
    while dp.iter().sum::<f64>() > params.tolerance && epochs < params.max_epochs {
        for i in 0..p.len() {
            p[i] += dp[i];
            let score = score_process_noise(datasets, &base, to_noise(&p), &weights)?;
            if score < best {
                best = score;
                dp[i] *= STEP_GROWTH;
                continue;
            }

            p[i] -= 2.0 * dp[i];
            let score = score_process_noise(datasets, &base, to_noise(&p), &weights)?;
            if score < best {
                best = score;
                dp[i] *= STEP_GROWTH;
            } else {
                p[i] += dp[i];
                dp[i] *= STEP_SHRINK;
            }
        }
        epochs += 1;
        debug!(
            epoch = epochs,
            std_a = p[0],
            std_yawdd = p[1],
            step_a = dp[0],
            step_yawdd = dp[1],
            score = best,
            "tuning epoch"
        );
    }

    info!(std_a = p[0], std_yawdd = p[1], score = best, epochs, "tuning finished");
    Ok(TuningResult {
        process_noise: to_noise(&p),
        score: best,
        epochs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::curved_track;

    #[test]
    fn test_score_weights() {
        let weights = ScoreWeights::default();
        let rmse = Vector4::new(0.1, 0.2, 0.3, 0.4);
        assert!((weights.score(&rmse) - (0.5 + 1.0 + 0.3 + 0.4)).abs() < 1e-12);
    }

    #[test]
    fn test_non_positive_parameters_score_infinite() {
        let datasets = vec![curved_track(10)];
        let base = FilterConfig::default();
        let weights = ScoreWeights::default();
        for noise in [
            ProcessNoise { std_a: 0.0, std_yawdd: 1.0 },
            ProcessNoise { std_a: 2.0, std_yawdd: -0.2 },
        ] {
            let score = score_process_noise(&datasets, &base, noise, &weights).unwrap();
            assert_eq!(score, f64::INFINITY);
        }
        let score = score_process_noise(&datasets, &base, ProcessNoise::default(), &weights).unwrap();
        assert!(score.is_finite() && score > 0.0);
    }

    #[test]
    fn test_tune_never_worse_than_start() {
        let datasets = vec![curved_track(40)];
        let base = FilterConfig::default();
        let weights = ScoreWeights::default();
        let start = score_process_noise(&datasets, &base, base.process_noise, &weights).unwrap();

        let params = TuningParams {
            max_epochs: 3,
            ..TuningParams::default()
        };
        let result = tune(&datasets, base, weights, params).unwrap();

        assert_eq!(result.epochs, 3);
        assert!(result.score <= start);
        assert!(result.process_noise.std_a > 0.0);
        assert!(result.process_noise.std_yawdd > 0.0);
        let rescored = score_process_noise(&datasets, &base, result.process_noise, &weights).unwrap();
        assert!((rescored - result.score).abs() < 1e-9);
    }

    #[test]
    fn test_tune_stops_at_tolerance() {
        let datasets = vec![curved_track(10)];
        let params = TuningParams {
            tolerance: 1.0,
            ..TuningParams::default()
        };
        let result = tune(&datasets, FilterConfig::default(), ScoreWeights::default(), params).unwrap();
        assert_eq!(result.epochs, 0);
        assert_eq!(result.process_noise, ProcessNoise::default());
    }

    #[test]
    fn test_tune_rejects_invalid_base() {
        let base = FilterConfig::default().with_process_noise(ProcessNoise {
            std_a: -1.0,
            std_yawdd: 1.0,
        });
        let result = tune(&[curved_track(4)], base, ScoreWeights::default(), TuningParams::default());
        assert!(result.is_err());
    }
}
