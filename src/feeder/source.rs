//! Per-sensor sample sources for the feeders.
//!
//! Sample exports hold one reading per line, either `timestamp,value` or a
//! bare `value`. A bare value is stamped with the wall clock when read.

use crate::core::time::now_seconds;
use crate::core::types::SensorKind;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One parsed sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: f64,
    pub value: f64,
}

/// Next item produced by a source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceItem {
    Sample(Sample),
    /// A line that could not be parsed; the source continues after it
    Skipped(String),
    /// No more data; the source is not polled again
    Exhausted,
}

/// Ordered stream of samples for one sensor.
pub trait SampleSource: Send {
    fn next_item(&mut self) -> SourceItem;
}

/// Parse one sample line, stamping bare values with `now()`.
///
/// With two or more fields the first is the timestamp and the second the
/// value. If the timestamp does not parse, the last field is tried as a bare
/// value.
pub fn parse_sample_line(line: &str, now: impl FnOnce() -> f64) -> Option<Sample> {
    let parts: Vec<&str> = line.trim().split(',').map(str::trim).collect();

    if parts.len() >= 2 {
        if let (Ok(timestamp), Ok(value)) = (parts[0].parse::<f64>(), parts[1].parse::<f64>()) {
            return Some(Sample { timestamp, value });
        }
    }

    let value = parts.last()?.parse::<f64>().ok()?;
    Some(Sample {
        timestamp: now(),
        value,
    })
}

/// Source reading lines from any buffered reader.
pub struct LineSource<R> {
    reader: R,
    line: String,
}

impl<R: BufRead + Send> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }
}

impl LineSource<BufReader<File>> {
    /// Open a CSV export, skipping its header line.
    pub fn open_csv(path: impl AsRef<Path>) -> io::Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut header = String::new();
        reader.read_line(&mut header)?;
        Ok(Self::new(reader))
    }
}

impl<R: BufRead + Send> SampleSource for LineSource<R> {
    fn next_item(&mut self) -> SourceItem {
        self.line.clear();
        match self.reader.read_line(&mut self.line) {
            Ok(0) => SourceItem::Exhausted,
            Ok(_) => match parse_sample_line(&self.line, now_seconds) {
                Some(sample) => SourceItem::Sample(sample),
                None => SourceItem::Skipped(self.line.trim_end().to_string()),
            },
            Err(e) => {
                tracing::warn!("Sample source read failed, treating as exhausted: {}", e);
                SourceItem::Exhausted
            }
        }
    }
}

/// Sources attached to one subject's feeder.
pub type SensorSources = Vec<(SensorKind, Box<dyn SampleSource>)>;

/// Subject ids with a sample directory under `samples_dir`, sorted.
pub fn discover_subjects(samples_dir: &Path) -> io::Result<Vec<String>> {
    let mut subjects: Vec<String> = std::fs::read_dir(samples_dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();
    subjects.sort();
    Ok(subjects)
}

/// Path of a subject's sample directory.
pub fn subject_dir(samples_dir: &Path, subject_id: &str) -> PathBuf {
    samples_dir.join(subject_id)
}

/// Open every sensor export present in a subject's directory.
///
/// Missing files are skipped; files that fail to open are logged and skipped.
pub fn open_subject_sources(dir: &Path) -> SensorSources {
    let mut sources: SensorSources = Vec::new();
    for kind in SensorKind::ALL {
        let path = dir.join(kind.sample_file());
        if !path.exists() {
            continue;
        }
        match LineSource::open_csv(&path) {
            Ok(source) => sources.push((kind, Box::new(source) as Box<dyn SampleSource>)),
            Err(e) => tracing::warn!("Could not open {:?}: {}", path, e),
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_timestamp_and_value() {
        let sample = parse_sample_line("1700000000.5, 72.0\n", || unreachable!()).unwrap();
        assert_eq!(sample, Sample { timestamp: 1_700_000_000.5, value: 72.0 });
    }

    #[test]
    fn test_parse_bare_value_uses_clock() {
        let sample = parse_sample_line("36.6", || 42.0).unwrap();
        assert_eq!(sample, Sample { timestamp: 42.0, value: 36.6 });
    }

    #[test]
    fn test_parse_bad_timestamp_falls_back_to_last_field() {
        let sample = parse_sample_line("2024-01-01T00:00:00,0.8", || 7.0).unwrap();
        assert_eq!(sample, Sample { timestamp: 7.0, value: 0.8 });
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(parse_sample_line("", || 0.0), None);
        assert_eq!(parse_sample_line("abc", || 0.0), None);
        assert_eq!(parse_sample_line("1.0,abc", || 0.0), None);
    }

    #[test]
    fn test_line_source_sequence() {
        let mut source = LineSource::new(Cursor::new("1,10\noops\n2,20\n"));
        assert_eq!(
            source.next_item(),
            SourceItem::Sample(Sample { timestamp: 1.0, value: 10.0 })
        );
        assert_eq!(source.next_item(), SourceItem::Skipped("oops".to_string()));
        assert_eq!(
            source.next_item(),
            SourceItem::Sample(Sample { timestamp: 2.0, value: 20.0 })
        );
        assert_eq!(source.next_item(), SourceItem::Exhausted);
        assert_eq!(source.next_item(), SourceItem::Exhausted);
    }

    #[test]
    fn test_discovery_and_csv_header() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("bob")).unwrap();
        std::fs::create_dir(dir.path().join("alice")).unwrap();
        std::fs::write(dir.path().join("README.txt"), "not a subject").unwrap();
        std::fs::write(
            dir.path().join("alice").join("wrist_hr.csv"),
            "timestamp,value\n1,70\n",
        )
        .unwrap();

        assert_eq!(
            discover_subjects(dir.path()).unwrap(),
            vec!["alice".to_string(), "bob".to_string()]
        );

        let mut sources = open_subject_sources(&subject_dir(dir.path(), "alice"));
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].0, SensorKind::Hr);
        assert_eq!(
            sources[0].1.next_item(),
            SourceItem::Sample(Sample { timestamp: 1.0, value: 70.0 })
        );
        assert!(open_subject_sources(&subject_dir(dir.path(), "bob")).is_empty());
    }
}
