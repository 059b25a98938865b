//! Practice text and session persistence
//!
//! Records live in memory and are written back to a single JSON file after
//! every change (temp file + rename). A store opened with `in_memory()` never
//! touches disk.

mod models;

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use models::{
    Difficulty, NewPracticeSession, NewPracticeText, PracticeSession, PracticeText,
    PRESET_CATEGORY,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read practice data {path:?}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Practice data {path:?} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("Failed to write practice data {path:?}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("Practice text {0} does not exist")]
    UnknownText(i64),

    #[error("Practice text must have a title and content")]
    EmptyText,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoreData {
    next_text_id: i64,
    next_session_id: i64,
    texts: Vec<PracticeText>,
    sessions: Vec<PracticeSession>,
}

#[derive(Debug)]
pub struct PracticeStore {
    path: Option<PathBuf>,
    data: StoreData,
}

impl PracticeStore {
    /// Open (or create on first write) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                serde_json::from_str::<StoreData>(&contents).map_err(|e| StoreError::Corrupt {
                    path: path.clone(),
                    message: e.to_string(),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => {
                return Err(StoreError::Read {
                    path,
                    message: e.to_string(),
                })
            }
        };

        log::debug!(
            "Practice store opened: {:?} ({} texts, {} sessions)",
            path,
            data.texts.len(),
            data.sessions.len()
        );

        Ok(Self {
            path: Some(path),
            data,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: StoreData::default(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn create_text(&mut self, new: NewPracticeText) -> Result<PracticeText, StoreError> {
        let text = self.insert_text(new)?;
        self.persist()?;
        log::info!("Practice text created: #{} {:?}", text.id, text.title);
        Ok(text)
    }

    pub fn text(&self, id: i64) -> Option<&PracticeText> {
        self.data.texts.iter().find(|t| t.id == id)
    }

    pub fn texts(&self) -> &[PracticeText] {
        &self.data.texts
    }

    /// Preset texts, seeding the defaults first if there are none.
    pub fn preset_texts(&mut self) -> Result<Vec<PracticeText>, StoreError> {
        if !self.data.texts.iter().any(|t| t.category == PRESET_CATEGORY) {
            for preset in models::default_presets() {
                self.insert_text(preset)?;
            }
            self.persist()?;
            log::info!("Seeded preset practice texts");
        }

        Ok(self
            .data
            .texts
            .iter()
            .filter(|t| t.category == PRESET_CATEGORY)
            .cloned()
            .collect())
    }

    pub fn create_session(
        &mut self,
        new: NewPracticeSession,
    ) -> Result<PracticeSession, StoreError> {
        if self.text(new.practice_text_id).is_none() {
            return Err(StoreError::UnknownText(new.practice_text_id));
        }

        self.data.next_session_id = self.data.next_session_id.max(0) + 1;
        let session = PracticeSession {
            id: self.data.next_session_id,
            practice_text_id: new.practice_text_id,
            audio_path: new.audio_path,
            transcribed_text: new.transcribed_text,
            score: new.score,
            feedback: new.feedback,
            created_at: Utc::now(),
        };
        self.data.sessions.push(session.clone());
        self.persist()?;

        log::info!(
            "Practice session #{} saved for text #{} (score {:.1})",
            session.id,
            session.practice_text_id,
            session.score
        );
        Ok(session)
    }

    pub fn session(&self, id: i64) -> Option<&PracticeSession> {
        self.data.sessions.iter().find(|s| s.id == id)
    }

    /// Sessions in the order they were recorded, optionally for one text only.
    pub fn sessions(&self, text_id: Option<i64>) -> Vec<&PracticeSession> {
        self.data
            .sessions
            .iter()
            .filter(|s| text_id.map_or(true, |id| s.practice_text_id == id))
            .collect()
    }

    fn insert_text(&mut self, new: NewPracticeText) -> Result<PracticeText, StoreError> {
        if new.title.trim().is_empty() || new.content.trim().is_empty() {
            return Err(StoreError::EmptyText);
        }

        self.data.next_text_id = self.data.next_text_id.max(0) + 1;
        let text = PracticeText {
            id: self.data.next_text_id,
            title: new.title.trim().to_string(),
            content: new.content.trim().to_string(),
            difficulty: new.difficulty,
            category: new.category,
            created_at: Utc::now(),
        };
        self.data.texts.push(text.clone());
        Ok(text)
    }

    fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let write_err = |message: String| StoreError::Write {
            path: path.clone(),
            message,
        };

        let contents =
            serde_json::to_string_pretty(&self.data).map_err(|e| write_err(e.to_string()))?;
        crate::settings::write_atomically(path, contents.as_bytes())
            .map_err(|e| write_err(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_text(title: &str) -> NewPracticeText {
        NewPracticeText {
            title: title.to_string(),
            content: "Some words to read.".to_string(),
            difficulty: Difficulty::Intermediate,
            category: "custom".to_string(),
        }
    }

    #[test]
    fn test_ids_increment() {
        let mut store = PracticeStore::in_memory();
        let a = store.create_text(new_text("a")).unwrap();
        let b = store.create_text(new_text("b")).unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(store.text(2).unwrap().title, "b");
        assert!(store.text(3).is_none());
    }

    #[test]
    fn test_empty_text_rejected() {
        let mut store = PracticeStore::in_memory();
        let mut blank = new_text("  ");
        assert!(matches!(
            store.create_text(blank.clone()),
            Err(StoreError::EmptyText)
        ));
        blank.title = "ok".to_string();
        blank.content = String::new();
        assert!(matches!(store.create_text(blank), Err(StoreError::EmptyText)));
        assert!(store.texts().is_empty());
    }

    #[test]
    fn test_presets_seeded_once() {
        let mut store = PracticeStore::in_memory();
        let first = store.preset_texts().unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].difficulty, Difficulty::Beginner);
        assert!(first[0].content.starts_with("Hello, my name is Roy."));

        let second = store.preset_texts().unwrap();
        assert_eq!(second, first);
        assert_eq!(store.texts().len(), 3);
    }

    #[test]
    fn test_difficulty_parse() {
        assert_eq!("Advanced".parse::<Difficulty>().unwrap(), Difficulty::Advanced);
        assert!("expert".parse::<Difficulty>().is_err());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("practice.json");
        std::fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(
            PracticeStore::open(&path),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
