use crate::{error::RegulatorResult, transport::PersistenceSink};
use common::comm::Sample;
use std::{
  fs,
  path::{Path, PathBuf},
};

/// Append-only time series of smoothed pressure.
///
/// There is no way to truncate a log in place; starting over means replacing
/// it with a fresh `SampleLog`.
#[derive(Clone, Debug, Default)]
pub struct SampleLog {
  samples: Vec<Sample>,
}

impl SampleLog {
  pub fn new() -> Self {
    SampleLog::default()
  }

  pub fn append(&mut self, time: f64, pressure: f64) {
    self.samples.push(Sample { time, pressure });
  }

  pub fn samples(&self) -> &[Sample] {
    &self.samples
  }

  pub fn last(&self) -> Option<&Sample> {
    self.samples.last()
  }

  pub fn len(&self) -> usize {
    self.samples.len()
  }

  pub fn is_empty(&self) -> bool {
    self.samples.is_empty()
  }
}

/// Writes the session log as a two-column CSV file.
///
/// The file is written next to its destination under a temporary name and
/// renamed into place, so readers never observe a half-written log.
#[derive(Clone, Debug)]
pub struct CsvSink {
  path: PathBuf,
}

impl CsvSink {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    CsvSink { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn staging_path(&self) -> PathBuf {
    let mut name = self
      .path
      .file_name()
      .map(|name| name.to_os_string())
      .unwrap_or_else(|| "pressure_log.csv".into());
    name.push(".partial");

    self.path.with_file_name(name)
  }
}

impl PersistenceSink for CsvSink {
  fn flush(&mut self, samples: &[Sample]) -> RegulatorResult<()> {
    if let Some(parent) = self.path.parent() {
      if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)?;
      }
    }

    let staging = self.staging_path();

    {
      let mut writer = csv::Writer::from_path(&staging)?;
      writer.write_record(["Time", "Pressure"])?;

      for sample in samples {
        writer.write_record([
          format!("{:.3}", sample.time),
          format!("{:.3}", sample.pressure),
        ])?;
      }

      writer.flush()?;
    }

    fs::rename(&staging, &self.path)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  static IDENTIFIER: AtomicU32 = AtomicU32::new(0);

  fn scratch_path(name: &str) -> PathBuf {
    let identifier = IDENTIFIER.fetch_add(1, Ordering::Relaxed);

    std::env::temp_dir()
      .join(format!("regulator-tests-{}-{identifier}", std::process::id()))
      .join(name)
  }

  #[test]
  fn log_appends_in_order() {
    let mut log = SampleLog::new();
    assert!(log.is_empty());

    log.append(0.6, 10.0);
    log.append(1.2, 20.0);

    assert_eq!(log.len(), 2);
    assert_eq!(log.samples()[0].pressure, 10.0);
    assert_eq!(log.last().unwrap().time, 1.2);
  }

  #[test]
  fn csv_sink_writes_header_and_rows() {
    let path = scratch_path("session.csv");
    let mut sink = CsvSink::new(&path);

    let samples = [
      Sample {
        time: 0.6,
        pressure: 350.0,
      },
      Sample {
        time: 1.2,
        pressure: 351.25,
      },
    ];
    sink.flush(&samples).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines, vec!["Time,Pressure", "0.600,350.000", "1.200,351.250"]);
    assert!(!sink.staging_path().exists());

    fs::remove_dir_all(path.parent().unwrap()).unwrap();
  }

  #[test]
  fn csv_sink_replaces_previous_contents() {
    let path = scratch_path("replace.csv");
    let mut sink = CsvSink::new(&path);

    let one = [Sample {
      time: 0.0,
      pressure: 1.0,
    }];
    sink.flush(&one).unwrap();
    sink.flush(&[]).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 1);

    fs::remove_dir_all(path.parent().unwrap()).unwrap();
  }

  #[test]
  fn csv_sink_reports_unwritable_destination() {
    let blocker = scratch_path("blocker");
    fs::create_dir_all(blocker.parent().unwrap()).unwrap();
    fs::write(&blocker, b"not a directory").unwrap();

    let mut sink = CsvSink::new(blocker.join("log.csv"));
    assert!(sink.flush(&[]).is_err());

    fs::remove_dir_all(blocker.parent().unwrap()).unwrap();
  }
}
