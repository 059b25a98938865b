//! XDG path helpers for recorded audio
//!
//! Recordings are stored in: ~/.local/share/speech-practice/recordings/
//! unless the settings point somewhere else.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;

/// Default recordings directory.
/// Returns: ~/.local/share/speech-practice/recordings/
pub fn default_recordings_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(crate::APP_DIR_NAME)
        .join("recordings")
}

/// Create the recordings directory if it doesn't exist.
pub fn create_recordings_dir(dir: &Path) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    Ok(dir.to_path_buf())
}

/// Generate a unique WAV file path for a recording.
/// Format: <YYYYMMDD_HHMMSS>_<uuid>.wav
pub fn generate_wav_path(dir: &Path, recording_id: Uuid) -> std::io::Result<PathBuf> {
    let dir = create_recordings_dir(dir)?;
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let filename = format!("{}_{}.wav", timestamp, recording_id);
    Ok(dir.join(filename))
}

/// Clean up old recordings, keeping only the most recent `keep` files.
pub fn cleanup_old_recordings(dir: &Path, keep: usize) -> std::io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let mut entries: Vec<_> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == "wav")
                .unwrap_or(false)
        })
        .collect();

    if entries.len() <= keep {
        return Ok(0);
    }

    // Oldest first; names start with a timestamp so they break mtime ties
    entries.sort_by(|a, b| {
        let time_a = a.metadata().and_then(|m| m.modified()).ok();
        let time_b = b.metadata().and_then(|m| m.modified()).ok();
        time_a
            .cmp(&time_b)
            .then_with(|| a.file_name().cmp(&b.file_name()))
    });

    let to_delete = entries.len() - keep;
    let mut deleted = 0;

    for entry in entries.into_iter().take(to_delete) {
        if fs::remove_file(entry.path()).is_ok() {
            log::debug!("Cleaned up old recording: {:?}", entry.path());
            deleted += 1;
        }
    }

    Ok(deleted)
}
