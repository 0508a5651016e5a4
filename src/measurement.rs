// Measurement records and the line-oriented input format
//
// Each input line is one sensor reading followed by the ground truth at the
// same instant:
//   L px py timestamp x_gt y_gt vx_gt vy_gt
//   R rho phi rho_dot timestamp x_gt y_gt vx_gt vy_gt
// Timestamps are integer microseconds.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::SplitWhitespace;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::polar_to_cartesian;

/// Which sensor produced a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Lidar,
    Radar,
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::Lidar => write!(f, "lidar"),
            SensorKind::Radar => write!(f, "radar"),
        }
    }
}

/// Raw reading from one of the two sensors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sensor", rename_all = "lowercase")]
pub enum SensorReading {
    /// Cartesian position (m)
    Lidar { px: f64, py: f64 },
    /// Range (m), bearing (rad) and range rate (m/s)
    Radar { rho: f64, phi: f64, rho_dot: f64 },
}

impl SensorReading {
    pub fn kind(&self) -> SensorKind {
        match self {
            SensorReading::Lidar { .. } => SensorKind::Lidar,
            SensorReading::Radar { .. } => SensorKind::Radar,
        }
    }

    /// Observation vector in the sensor's own space
    pub fn to_vector(&self) -> DVector<f64> {
        match *self {
            SensorReading::Lidar { px, py } => DVector::from_vec(vec![px, py]),
            SensorReading::Radar { rho, phi, rho_dot } => DVector::from_vec(vec![rho, phi, rho_dot]),
        }
    }

    /// Measured position in Cartesian coordinates
    pub fn position(&self) -> (f64, f64) {
        match *self {
            SensorReading::Lidar { px, py } => (px, py),
            SensorReading::Radar { rho, phi, rho_dot } => {
                let (px, py, _, _) = polar_to_cartesian(rho, phi, rho_dot);
                (px, py)
            }
        }
    }
}

/// One timestamped sensor reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub reading: SensorReading,
    /// Arrival time in microseconds
    pub timestamp: i64,
}

impl Measurement {
    pub fn lidar(px: f64, py: f64, timestamp: i64) -> Self {
        Measurement {
            reading: SensorReading::Lidar { px, py },
            timestamp,
        }
    }

    pub fn radar(rho: f64, phi: f64, rho_dot: f64, timestamp: i64) -> Self {
        Measurement {
            reading: SensorReading::Radar { rho, phi, rho_dot },
            timestamp,
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.reading.kind()
    }
}

/// True position and Cartesian velocity at a measurement's timestamp
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GroundTruth {
    pub px: f64,
    pub py: f64,
    pub vx: f64,
    pub vy: f64,
}

impl GroundTruth {
    pub fn to_array(&self) -> [f64; 4] {
        [self.px, self.py, self.vx, self.vy]
    }
}

/// Measurements and their ground truth, in file order
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub records: Vec<Measurement>,
    pub ground_truth: Vec<GroundTruth>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Load a dataset from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        Self::from_reader(BufReader::new(file)).map_err(|e| match e {
            Error::Io { source, .. } => Error::io(path, source),
            other => other,
        })
    }

    /// Parse every line of a reader; blank lines are skipped
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut dataset = Dataset::default();
        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| Error::io("<input>", e))?;
            if let Some((measurement, truth)) = parse_line(&line, index + 1)? {
                dataset.records.push(measurement);
                dataset.ground_truth.push(truth);
            }
        }
        Ok(dataset)
    }
}

/// Parse one input line
///
/// # Returns
/// * `Ok(None)` for a blank line
/// * `Ok(Some(..))` with the measurement and its ground truth
/// * `Err(Error::Parse)` for an unknown sensor tag or a bad numeric field
pub fn parse_line(line: &str, line_no: usize) -> Result<Option<(Measurement, GroundTruth)>> {
    let mut fields = Fields {
        inner: line.split_whitespace(),
        line_no,
    };

    let tag = match fields.inner.next() {
        Some(tag) => tag,
        None => return Ok(None),
    };

    let reading = match tag {
        "L" => SensorReading::Lidar {
            px: fields.float("px")?,
            py: fields.float("py")?,
        },
        "R" => SensorReading::Radar {
            rho: fields.float("rho")?,
            phi: fields.float("phi")?,
            rho_dot: fields.float("rho_dot")?,
        },
        other => {
            return Err(Error::Parse {
                line: line_no,
                message: format!("unknown sensor type '{}'", other),
            })
        }
    };
    let timestamp = fields.integer("timestamp")?;

    let truth = GroundTruth {
        px: fields.float("x_gt")?,
        py: fields.float("y_gt")?,
        vx: fields.float("vx_gt")?,
        vy: fields.float("vy_gt")?,
    };

    Ok(Some((Measurement { reading, timestamp }, truth)))
}

struct Fields<'a> {
    inner: SplitWhitespace<'a>,
    line_no: usize,
}

impl<'a> Fields<'a> {
    fn next_field(&mut self, name: &str) -> Result<&'a str> {
        self.inner.next().ok_or_else(|| Error::Parse {
            line: self.line_no,
            message: format!("missing field '{}'", name),
        })
    }

    fn float(&mut self, name: &str) -> Result<f64> {
        let raw = self.next_field(name)?;
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(Error::Parse {
                line: self.line_no,
                message: format!("invalid value '{}' for '{}'", raw, name),
            }),
        }
    }

    fn integer(&mut self, name: &str) -> Result<i64> {
        let raw = self.next_field(name)?;
        raw.parse::<i64>().map_err(|_| Error::Parse {
            line: self.line_no,
            message: format!("invalid value '{}' for '{}'", raw, name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lidar_line() {
        let line = "L\t3.122427e-01\t5.803398e-01\t1477010443000000\t6.000000e-01\t6.000000e-01\t5.199937e+00\t0";
        let (m, gt) = parse_line(line, 1).unwrap().unwrap();
        assert_eq!(m.kind(), SensorKind::Lidar);
        assert_eq!(m.timestamp, 1477010443000000);
        match m.reading {
            SensorReading::Lidar { px, py } => {
                assert!((px - 0.3122427).abs() < 1e-12);
                assert!((py - 0.5803398).abs() < 1e-12);
            }
            _ => panic!("Expected lidar"),
        }
        assert_eq!(gt.px, 0.6);
        assert!((gt.vx - 5.199937).abs() < 1e-12);
        assert_eq!(gt.vy, 0.0);
    }

    #[test]
    fn test_parse_radar_line() {
        let line = "R 1.014892e+00 5.543292e-01 4.892807e+00 1477010443050000 8.599968e-01 6.000449e-01 5.199747e+00 1.796856e-03";
        let (m, gt) = parse_line(line, 2).unwrap().unwrap();
        assert_eq!(m.kind(), SensorKind::Radar);
        assert_eq!(m.timestamp, 1477010443050000);
        let z = m.reading.to_vector();
        assert_eq!(z.len(), 3);
        assert!((z[2] - 4.892807).abs() < 1e-12);
        assert!((gt.vy - 1.796856e-3).abs() < 1e-15);
    }

    #[test]
    fn test_parse_blank_line() {
        assert!(parse_line("   ", 3).unwrap().is_none());
    }

    #[test]
    fn test_parse_unknown_sensor() {
        let err = parse_line("X 1 2 3 4 5 6 7", 9).unwrap_err();
        match err {
            Error::Parse { line, message } => {
                assert_eq!(line, 9);
                assert!(message.contains("unknown sensor"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_parse_bad_number_and_missing_field() {
        assert!(matches!(
            parse_line("L 1.0 abc 100 0 0 0 0", 4),
            Err(Error::Parse { line: 4, .. })
        ));
        assert!(matches!(
            parse_line("R 1.0 0.2 0.3 100 0 0 0", 5),
            Err(Error::Parse { line: 5, .. })
        ));
        assert!(matches!(
            parse_line("L 1.0 2.0 1.5 0 0 0 0", 6),
            Err(Error::Parse { line: 6, .. })
        ));
    }

    #[test]
    fn test_dataset_from_reader() {
        let input = "L 0.5 0.3 0 0.5 0.3 0 0\n\nR 5.0 0.0 0.0 100000 5.0 0.0 0.0 0.0\n";
        let dataset = Dataset::from_reader(input.as_bytes()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.ground_truth.len(), 2);
        assert_eq!(dataset.records[1].kind(), SensorKind::Radar);
        assert_eq!(dataset.records[1].reading.position(), (5.0, 0.0));
    }

    #[test]
    fn test_dataset_reports_line_number() {
        let input = "L 0.5 0.3 0 0.5 0.3 0 0\nQ 1 2 3\n";
        match Dataset::from_reader(input.as_bytes()) {
            Err(Error::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_reading_serializes_with_sensor_tag() {
        let json = serde_json::to_string(&SensorReading::Radar { rho: 1.0, phi: 0.5, rho_dot: -0.2 }).unwrap();
        assert!(json.contains("\"sensor\":\"radar\""));
        assert!(json.contains("\"rho_dot\":-0.2"));
    }
}
