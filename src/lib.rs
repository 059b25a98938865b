//! Pronunciation practice: capture speech, assess it remotely, coach the speaker.
//!
//! The capture pipeline (`audio`, `state_machine`, `controller`) is usable on
//! its own; `services`, `store` and `practice` add the assessment flow on top.

pub mod audio;
pub mod controller;
pub mod practice;
pub mod services;
pub mod settings;
pub mod state_machine;
pub mod store;

/// Directory name used under the platform config and data directories.
pub const APP_DIR_NAME: &str = "speech-practice";

pub use controller::{
    ControllerError, ControllerOptions, RecorderStatus, RecordingController, StartOutcome,
    StopOutcome,
};
pub use practice::{AnalysisError, AnalysisReport, PracticeCoach};
pub use settings::AppSettings;
pub use state_machine::CaptureState;
