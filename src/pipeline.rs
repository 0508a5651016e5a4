// Run a dataset through a single filter instance
//
// Every record goes through the filter in file order; the resulting estimate
// is handed to each output and collected for the accuracy summary.

use nalgebra::Vector4;
use tracing::{debug, info};

use crate::accuracy::{calculate_rmse, estimate_to_cartesian, truth_to_vector, NisSummary};
use crate::config::FilterConfig;
use crate::error::{Error, Result};
use crate::kalman::KalmanState;
use crate::measurement::{Dataset, SensorKind};
use crate::output::{EstimateRecord, OutputHandler};

/// Accuracy of one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub records: usize,
    /// RMSE of (px, py, vx, vy)
    pub rmse: Vector4<f64>,
    pub nis_lidar: NisSummary,
    pub nis_radar: NisSummary,
}

impl RunSummary {
    pub fn log(&self) {
        info!(
            records = self.records,
            px = self.rmse[0],
            py = self.rmse[1],
            vx = self.rmse[2],
            vy = self.rmse[3],
            "RMSE"
        );
        for nis in [&self.nis_lidar, &self.nis_radar] {
            info!(
                sensor = %nis.sensor(),
                updates = nis.count(),
                mean = nis.mean(),
                above_95 = nis.fraction_above_bound(),
                "NIS consistency"
            );
        }
    }
}

/// Filter every record of a dataset and write each estimate to the outputs
///
/// # Arguments
/// * `dataset` - Records and ground truth, in processing order
/// * `config` - Configuration of the filter built for this run
/// * `outputs` - Sinks receiving one row per record
///
/// # Returns
/// RMSE against ground truth and NIS statistics of the run
pub fn run(
    dataset: &Dataset,
    config: FilterConfig,
    outputs: &mut [Box<dyn OutputHandler>],
) -> Result<RunSummary> {
    if dataset.records.len() != dataset.ground_truth.len() {
        return Err(Error::Config(format!(
            "dataset has {} records but {} ground truth entries",
            dataset.records.len(),
            dataset.ground_truth.len()
        )));
    }

    let mut filter = KalmanState::new(config)?;
    debug!(
        std_a = filter.process_noise().std_a,
        std_yawdd = filter.process_noise().std_yawdd,
        records = dataset.len(),
        "run started"
    );
    let mut estimations = Vec::with_capacity(dataset.len());
    let mut ground_truth = Vec::with_capacity(dataset.len());
    let mut nis_lidar = NisSummary::new(SensorKind::Lidar);
    let mut nis_radar = NisSummary::new(SensorKind::Radar);

    for (measurement, truth) in dataset.records.iter().zip(&dataset.ground_truth) {
        filter.process_measurement(measurement);

        // Rows without an update (initialization, skipped update) carry a zero
        // NIS and stay out of the consistency summary
        let nis = match filter.last_nis() {
            Some(nis) => {
                match measurement.kind() {
                    SensorKind::Lidar => nis_lidar.record(nis),
                    SensorKind::Radar => nis_radar.record(nis),
                }
                nis
            }
            None => 0.0,
        };

        let estimate = filter.state();
        let record = EstimateRecord::new(measurement, estimate, *truth, nis);
        for output in outputs.iter_mut() {
            output.handle_estimate(&record)?;
        }

        estimations.push(estimate_to_cartesian(&estimate));
        ground_truth.push(truth_to_vector(truth));
    }

    for output in outputs.iter_mut() {
        output.flush()?;
    }

    let summary = RunSummary {
        records: dataset.len(),
        rmse: calculate_rmse(&estimations, &ground_truth),
        nis_lidar,
        nis_radar,
    };
    debug!(records = summary.records, "run complete");
    Ok(summary)
}

/// Run without outputs, for scoring
pub fn evaluate(dataset: &Dataset, config: FilterConfig) -> Result<RunSummary> {
    run(dataset, config, &mut [])
}

/// Synthetic target on a gentle curve, observed alternately by lidar and radar
#[cfg(test)]
pub(crate) fn curved_track(records: usize) -> Dataset {
    use crate::geometry::cartesian_to_polar;
    use crate::measurement::{GroundTruth, Measurement};

    let (speed, yaw_rate) = (4.0, 0.2);
    let mut dataset = Dataset::default();
    for k in 0..records {
        let t = k as f64 * 0.05;
        let yaw = 0.3 + yaw_rate * t;
        let px = 2.0 + speed / yaw_rate * (yaw.sin() - (0.3f64).sin());
        let py = 1.0 + speed / yaw_rate * ((0.3f64).cos() - yaw.cos());
        let (vx, vy) = (speed * yaw.cos(), speed * yaw.sin());
        let timestamp = (k as i64) * 50_000;

        let measurement = if k % 2 == 0 {
            Measurement::lidar(px, py, timestamp)
        } else {
            let (rho, phi, rho_dot) = cartesian_to_polar(px, py, vx, vy);
            Measurement::radar(rho, phi, rho_dot, timestamp)
        };
        dataset.records.push(measurement);
        dataset.ground_truth.push(GroundTruth { px, py, vx, vy });
    }
    dataset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{JsonOutput, TsvOutput, TSV_HEADER};

    #[test]
    fn test_run_tracks_curved_target() {
        let dataset = curved_track(200);
        let summary = evaluate(&dataset, FilterConfig::default()).unwrap();

        assert_eq!(summary.records, 200);
        assert_eq!(summary.nis_lidar.count(), 99);
        assert_eq!(summary.nis_radar.count(), 100);
        assert!(summary.rmse[0] < 0.5, "px rmse {}", summary.rmse[0]);
        assert!(summary.rmse[1] < 0.5, "py rmse {}", summary.rmse[1]);
        assert!(summary.rmse.iter().all(|v| v.is_finite()));
        assert!(summary.nis_lidar.mean() >= 0.0);
        assert!(summary.nis_radar.mean() >= 0.0);
    }

    #[test]
    fn test_run_writes_every_output() {
        let dir = std::env::temp_dir();
        let tsv_path = dir.join(format!("ukf_fusion_pipeline_{}.tsv", std::process::id()));
        let json_path = dir.join(format!("ukf_fusion_pipeline_{}.json", std::process::id()));

        let dataset = curved_track(10);
        {
            let mut outputs: Vec<Box<dyn OutputHandler>> = vec![
                Box::new(TsvOutput::create(&tsv_path).unwrap()),
                Box::new(JsonOutput::create(&json_path).unwrap()),
            ];
            run(&dataset, FilterConfig::default(), &mut outputs).unwrap();
        }

        let tsv = std::fs::read_to_string(&tsv_path).unwrap();
        let lines: Vec<&str> = tsv.lines().collect();
        assert_eq!(lines.len(), 11);
        assert_eq!(lines[0], TSV_HEADER);
        // The initializing row carries a zero NIS
        assert!(lines[1].ends_with("\t0"));

        let json = std::fs::read_to_string(&json_path).unwrap();
        assert_eq!(json.lines().count(), 10);
        let second: serde_json::Value = serde_json::from_str(json.lines().nth(1).unwrap()).unwrap();
        assert_eq!(second["sensor"], "radar");

        let _ = std::fs::remove_file(&tsv_path);
        let _ = std::fs::remove_file(&json_path);
    }

    #[test]
    fn test_run_rejects_mismatched_dataset() {
        let mut dataset = curved_track(4);
        dataset.ground_truth.pop();
        assert!(matches!(
            evaluate(&dataset, FilterConfig::default()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_empty_dataset() {
        let summary = evaluate(&Dataset::default(), FilterConfig::default()).unwrap();
        assert_eq!(summary.records, 0);
        assert_eq!(summary.rmse, Vector4::zeros());
    }
}
