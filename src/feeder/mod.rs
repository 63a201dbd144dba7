//! Feeders replaying wrist sample exports into the pipeline.
//!
//! Sample directories are laid out as `<samples_dir>/<subject>/wrist_*.csv`,
//! one file per sensor.

pub mod source;
pub mod supervisor;

// Re-export commonly used types
pub use source::{
    discover_subjects, open_subject_sources, parse_sample_line, subject_dir, LineSource, Sample,
    SampleSource, SensorSources, SourceItem,
};
pub use supervisor::{FeederError, FeederEvent, FeederReport, FeederState, FeederSupervisor};
