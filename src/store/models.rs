//! Practice texts and the sessions recorded against them

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(Difficulty::Beginner),
            "intermediate" => Ok(Difficulty::Intermediate),
            "advanced" => Ok(Difficulty::Advanced),
            other => Err(format!("Unknown difficulty: {}", other)),
        }
    }
}

/// A passage the user reads aloud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeText {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub difficulty: Difficulty,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPracticeText {
    pub title: String,
    pub content: String,
    pub difficulty: Difficulty,
    pub category: String,
}

/// One analysed attempt at a practice text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeSession {
    pub id: i64,
    pub practice_text_id: i64,
    pub audio_path: PathBuf,
    pub transcribed_text: String,
    pub score: f64,
    pub feedback: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPracticeSession {
    pub practice_text_id: i64,
    pub audio_path: PathBuf,
    pub transcribed_text: String,
    pub score: f64,
    pub feedback: String,
}

pub const PRESET_CATEGORY: &str = "preset";

/// Passages seeded when the store has no presets yet
pub(super) fn default_presets() -> Vec<NewPracticeText> {
    [
        (
            "自我介绍",
            "Hello, my name is Roy. I am a software engineer from San Francisco. I love coding and learning new technologies.",
            Difficulty::Beginner,
        ),
        (
            "日常生活",
            "Every morning, I wake up at 6 AM and start my day with a cup of coffee. I enjoy reading books and listening to podcasts during my free time.",
            Difficulty::Intermediate,
        ),
        (
            "职业规划",
            "As a software developer, I am passionate about creating innovative solutions that can make people's lives easier. I believe in continuous learning and staying updated with the latest technological trends.",
            Difficulty::Advanced,
        ),
    ]
    .into_iter()
    .map(|(title, content, difficulty)| NewPracticeText {
        title: title.to_string(),
        content: content.to_string(),
        difficulty,
        category: PRESET_CATEGORY.to_string(),
    })
    .collect()
}
