use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::kalman::CtrvState;
use crate::measurement::{GroundTruth, Measurement, SensorKind};

/// Header of the tab-separated output
pub const TSV_HEADER: &str = "px\tpy\tv\tyaw_angle\tyaw_rate\tpx_measured\tpy_measured\tpx_true\tpy_true\tvx_true\tvy_true\tNIS";

/// One output row: the estimate after processing a measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EstimateRecord {
    pub timestamp: i64,
    pub sensor: SensorKind,
    pub estimate: CtrvState,
    /// Measured position; radar readings are converted to Cartesian
    pub px_measured: f64,
    pub py_measured: f64,
    pub truth: GroundTruth,
    /// NIS of this update (0 for the initializing measurement)
    pub nis: f64,
}

impl EstimateRecord {
    pub fn new(measurement: &Measurement, estimate: CtrvState, truth: GroundTruth, nis: f64) -> Self {
        let (px_measured, py_measured) = measurement.reading.position();
        EstimateRecord {
            timestamp: measurement.timestamp,
            sensor: measurement.kind(),
            estimate,
            px_measured,
            py_measured,
            truth,
            nis,
        }
    }
}

/// Trait for output handlers
pub trait OutputHandler {
    /// Handle a new estimate
    fn handle_estimate(&mut self, record: &EstimateRecord) -> Result<()>;

    /// Push buffered rows to the underlying writer
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

fn write_failed(e: std::io::Error) -> Error {
    Error::Output(e.to_string())
}

/// Tab-separated output, one header row then one row per estimate
pub struct TsvOutput<W: Write> {
    writer: W,
}

impl TsvOutput<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        TsvOutput::new(BufWriter::new(file))
    }
}

impl<W: Write> TsvOutput<W> {
    pub fn new(mut writer: W) -> Result<Self> {
        writeln!(writer, "{}", TSV_HEADER).map_err(write_failed)?;
        Ok(TsvOutput { writer })
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn format_row(record: &EstimateRecord) -> String {
        let x = &record.estimate;
        let gt = &record.truth;
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            x.px,
            x.py,
            x.v,
            x.yaw,
            x.yaw_rate,
            record.px_measured,
            record.py_measured,
            gt.px,
            gt.py,
            gt.vx,
            gt.vy,
            record.nis
        )
    }
}

impl<W: Write> OutputHandler for TsvOutput<W> {
    fn handle_estimate(&mut self, record: &EstimateRecord) -> Result<()> {
        writeln!(self.writer, "{}", Self::format_row(record)).map_err(write_failed)
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(write_failed)
    }
}

/// JSON lines output, one object per estimate
pub struct JsonOutput<W: Write> {
    writer: W,
}

impl JsonOutput<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        Ok(JsonOutput::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonOutput<W> {
    pub fn new(writer: W) -> Self {
        JsonOutput { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> OutputHandler for JsonOutput<W> {
    fn handle_estimate(&mut self, record: &EstimateRecord) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record).map_err(|e| Error::Output(e.to_string()))?;
        self.writer.write_all(b"\n").map_err(write_failed)
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(write_failed)
    }
}
