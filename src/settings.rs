use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::{AudioFormat, FeedConfig, DEFAULT_QUEUE_CAPACITY, DEFAULT_SAMPLE_RATE};
use crate::services::Language;

const SETTINGS_FILE_NAME: &str = "settings.json";
const DATABASE_FILE_NAME: &str = "practice.json";

pub const AZURE_KEY_ENV: &str = "AZURE_SPEECH_KEY";
pub const AZURE_REGION_ENV: &str = "AZURE_SPEECH_REGION";
pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";

const MIN_SAMPLE_RATE: u32 = 8_000;
const MAX_SAMPLE_RATE: u32 = 192_000;
const MAX_CHANNELS: u16 = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Requested capture rate. The device may pick another if it can't do this one.
    pub sample_rate: u32,

    pub channels: u16,

    /// Chunks held for visualization before the oldest is dropped.
    pub queue_capacity: usize,

    /// Waveform feed cadence.
    pub visualization_tick_ms: u64,

    /// Most recent samples kept in each waveform snapshot.
    pub waveform_window_samples: usize,

    /// Where WAV files go. `None` uses the platform data directory.
    pub recordings_dir: Option<PathBuf>,

    /// Older recordings beyond this count are deleted after each save.
    pub max_recordings: usize,

    /// Practice texts and sessions. `None` uses the platform data directory.
    pub database_path: Option<PathBuf>,

    pub feedback_language: Language,

    /// Recognition locale sent to the assessment service.
    pub speech_language: String,

    /// Overridden by AZURE_SPEECH_REGION when set.
    pub azure_region: String,

    pub openai_model: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            visualization_tick_ms: 100,
            waveform_window_samples: 44_100,
            recordings_dir: None,
            max_recordings: 20,
            database_path: None,
            feedback_language: Language::English,
            speech_language: "en-US".to_string(),
            azure_region: "eastus".to_string(),
            openai_model: "gpt-4".to_string(),
        }
    }
}

impl AppSettings {
    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, self.channels)
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            tick: Duration::from_millis(self.visualization_tick_ms),
            window_samples: self.waveform_window_samples,
        }
    }

    pub fn recordings_dir(&self) -> PathBuf {
        self.recordings_dir
            .clone()
            .unwrap_or_else(crate::audio::default_recordings_dir)
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| data_dir().join(DATABASE_FILE_NAME))
    }

    /// Region from the environment if set, otherwise from settings
    pub fn effective_azure_region(&self) -> String {
        env_value(AZURE_REGION_ENV).unwrap_or_else(|| self.azure_region.clone())
    }

    /// Replace out-of-range values with defaults, warning for each one.
    /// Returns true if anything changed.
    pub fn sanitize(&mut self) -> bool {
        let defaults = AppSettings::default();
        let mut changed = false;

        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            log::warn!(
                "Settings: sample_rate {} out of range, using {}",
                self.sample_rate,
                defaults.sample_rate
            );
            self.sample_rate = defaults.sample_rate;
            changed = true;
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            log::warn!(
                "Settings: channels {} out of range, using {}",
                self.channels,
                defaults.channels
            );
            self.channels = defaults.channels;
            changed = true;
        }
        if self.queue_capacity == 0 {
            log::warn!("Settings: queue_capacity 0, using {}", defaults.queue_capacity);
            self.queue_capacity = defaults.queue_capacity;
            changed = true;
        }
        // tokio intervals can't have a zero period
        if self.visualization_tick_ms == 0 {
            log::warn!(
                "Settings: visualization_tick_ms 0, using {}",
                defaults.visualization_tick_ms
            );
            self.visualization_tick_ms = defaults.visualization_tick_ms;
            changed = true;
        }
        if self.waveform_window_samples == 0 {
            log::warn!(
                "Settings: waveform_window_samples 0, using {}",
                defaults.waveform_window_samples
            );
            self.waveform_window_samples = defaults.waveform_window_samples;
            changed = true;
        }
        if self.max_recordings == 0 {
            log::warn!("Settings: max_recordings 0, using {}", defaults.max_recordings);
            self.max_recordings = defaults.max_recordings;
            changed = true;
        }

        changed
    }
}

/// Read a non-empty environment variable.
pub fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(crate::APP_DIR_NAME)
}

/// ~/.config/speech-practice/settings.json
pub fn default_settings_path() -> Result<PathBuf, String> {
    let dir = dirs::config_dir().ok_or("Could not determine config directory")?;
    Ok(dir.join(crate::APP_DIR_NAME).join(SETTINGS_FILE_NAME))
}

pub fn load_settings(path: &Path) -> AppSettings {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(mut settings) => {
                settings.sanitize();
                settings
            }
            Err(e) => {
                log::warn!("Settings: failed to parse {:?}: {}", path, e);
                AppSettings::default()
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => AppSettings::default(),
        Err(e) => {
            log::warn!("Settings: failed to read {:?}: {}", path, e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> Result<(), String> {
    let contents =
        serde_json::to_string_pretty(settings).map_err(|e| format!("Serialize settings: {}", e))?;

    write_atomically(path, contents.as_bytes())
        .map_err(|e| format!("Write settings {:?}: {}", path, e))
}

/// Write to a temp file in the same directory, then rename over `path`.
pub(crate) fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, contents)?;

    // On Windows, rename fails if the destination exists
    if cfg!(windows) {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != io::ErrorKind::NotFound {
                return Err(e);
            }
        }
    }

    std::fs::rename(&tmp_path, path)
}
