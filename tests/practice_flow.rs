//! Integration tests for the practice flow and its persistence
//!
//! Remote services are replaced with in-process fakes ("mock" tests), so no
//! API keys or network access are needed:
//! ```bash
//! cargo test --test practice_flow
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use speech_practice::audio::{AudioFormat, PersistedRecording};
use speech_practice::services::{
    AssessmentResult, FeedbackProvider, Language, ServiceError, SpeechAssessor,
};
use speech_practice::store::{
    Difficulty, NewPracticeSession, NewPracticeText, PracticeStore, StoreError,
};
use speech_practice::{AnalysisError, PracticeCoach};
use uuid::Uuid;

#[derive(Clone, Default)]
struct FakeAssessor {
    fail: bool,
    calls: Arc<Mutex<Vec<(PathBuf, String)>>>,
}

impl SpeechAssessor for FakeAssessor {
    async fn assess(
        &self,
        wav_path: &Path,
        reference_text: &str,
    ) -> Result<AssessmentResult, ServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push((wav_path.to_path_buf(), reference_text.to_string()));
        if self.fail {
            return Err(ServiceError::NotRecognized("NoMatch".to_string()));
        }
        Ok(AssessmentResult {
            transcribed_text: "hello my name is roy".to_string(),
            accuracy_score: 88.0,
            fluency_score: 75.0,
            completeness_score: 95.0,
            overall_score: 84.5,
        })
    }
}

#[derive(Clone, Default)]
struct FakeFeedback {
    calls: Arc<Mutex<Vec<(String, Option<f64>, Language)>>>,
}

impl FeedbackProvider for FakeFeedback {
    async fn feedback(
        &self,
        _reference_text: &str,
        transcribed_text: &str,
        scores: Option<&AssessmentResult>,
        language: Language,
    ) -> Result<String, ServiceError> {
        self.calls.lock().unwrap().push((
            transcribed_text.to_string(),
            scores.map(|s| s.overall_score),
            language,
        ));
        Ok("Work on the 'r' in Roy.".to_string())
    }
}

fn recording(path: &str) -> PersistedRecording {
    PersistedRecording {
        id: Uuid::new_v4(),
        path: PathBuf::from(path),
        duration_secs: 3.2,
        format: AudioFormat::mono(44_100),
    }
}

fn store_with_presets() -> PracticeStore {
    let mut store = PracticeStore::in_memory();
    store.preset_texts().unwrap();
    store
}

// ============================================================================
// Mock Tests - practice coach
// ============================================================================

mod mock_tests {
    use super::*;

    #[tokio::test]
    async fn mock_submit_records_session() {
        let assessor = FakeAssessor::default();
        let feedback = FakeFeedback::default();
        let mut coach = PracticeCoach::new(
            assessor.clone(),
            feedback.clone(),
            store_with_presets(),
            Language::Chinese,
        );

        let text = coach.select_text(1).unwrap().clone();
        let report = coach
            .submit_for_analysis(&recording("/tmp/attempt.wav"))
            .await
            .unwrap();

        assert_eq!(report.assessment.overall_score, 84.5);
        assert_eq!(report.feedback, "Work on the 'r' in Roy.");
        assert_eq!(report.session.practice_text_id, text.id);
        assert_eq!(report.session.score, 84.5);
        assert_eq!(report.session.audio_path, PathBuf::from("/tmp/attempt.wav"));

        let assess_calls = assessor.calls.lock().unwrap();
        assert_eq!(assess_calls[0].1, text.content);

        let feedback_calls = feedback.calls.lock().unwrap();
        assert_eq!(
            feedback_calls.as_slice(),
            &[(
                "hello my name is roy".to_string(),
                Some(84.5),
                Language::Chinese
            )]
        );

        assert_eq!(coach.store().sessions(Some(text.id)).len(), 1);
    }

    #[tokio::test]
    async fn mock_submit_without_selection() {
        let mut coach = PracticeCoach::new(
            FakeAssessor::default(),
            FakeFeedback::default(),
            store_with_presets(),
            Language::English,
        );

        let err = coach
            .submit_for_analysis(&recording("/tmp/a.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NoTextSelected));
    }

    #[tokio::test]
    async fn mock_assessment_failure_saves_nothing() {
        let assessor = FakeAssessor {
            fail: true,
            ..FakeAssessor::default()
        };
        let feedback = FakeFeedback::default();
        let mut coach =
            PracticeCoach::new(assessor, feedback.clone(), store_with_presets(), Language::English);
        coach.select_text(2).unwrap();

        let err = coach
            .submit_for_analysis(&recording("/tmp/a.wav"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AnalysisError::Assessment(ServiceError::NotRecognized(_))
        ));
        assert!(err.to_string().contains("NoMatch"));
        assert!(feedback.calls.lock().unwrap().is_empty());
        assert!(coach.store().sessions(None).is_empty());
    }

    #[test]
    fn mock_select_unknown_text_keeps_selection() {
        let mut coach = PracticeCoach::new(
            FakeAssessor::default(),
            FakeFeedback::default(),
            store_with_presets(),
            Language::English,
        );
        coach.select_text(3).unwrap();

        assert!(matches!(coach.select_text(99), Err(StoreError::UnknownText(99))));
        assert_eq!(coach.selected().unwrap().id, 3);
    }
}

// ============================================================================
// Practice store on disk
// ============================================================================

#[test]
fn store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("practice.json");

    let (text_id, session_id) = {
        let mut store = PracticeStore::open(&path).unwrap();
        let presets = store.preset_texts().unwrap();
        assert_eq!(presets.len(), 3);

        let text = store
            .create_text(NewPracticeText {
                title: "Tongue twister".to_string(),
                content: "She sells sea shells by the sea shore.".to_string(),
                difficulty: Difficulty::Advanced,
                category: "custom".to_string(),
            })
            .unwrap();

        let session = store
            .create_session(NewPracticeSession {
                practice_text_id: text.id,
                audio_path: PathBuf::from("/tmp/she-sells.wav"),
                transcribed_text: "she sells sea shells".to_string(),
                score: 71.0,
                feedback: "Slow down on 'shells'.".to_string(),
            })
            .unwrap();
        (text.id, session.id)
    };

    let mut reopened = PracticeStore::open(&path).unwrap();
    assert_eq!(reopened.texts().len(), 4);
    assert_eq!(reopened.text(text_id).unwrap().difficulty, Difficulty::Advanced);
    assert_eq!(reopened.session(session_id).unwrap().score, 71.0);

    // Presets are not seeded twice
    assert_eq!(reopened.preset_texts().unwrap().len(), 3);

    // New ids continue after the persisted ones
    let next = reopened
        .create_text(NewPracticeText {
            title: "Next".to_string(),
            content: "More words.".to_string(),
            difficulty: Difficulty::Beginner,
            category: "custom".to_string(),
        })
        .unwrap();
    assert_eq!(next.id, text_id + 1);
}

#[test]
fn sessions_filter_by_text() {
    let mut store = store_with_presets();
    for (text_id, score) in [(1, 50.0), (2, 60.0), (1, 70.0)] {
        store
            .create_session(NewPracticeSession {
                practice_text_id: text_id,
                audio_path: PathBuf::from("/tmp/x.wav"),
                transcribed_text: String::new(),
                score,
                feedback: String::new(),
            })
            .unwrap();
    }

    let scores: Vec<f64> = store.sessions(Some(1)).iter().map(|s| s.score).collect();
    assert_eq!(scores, vec![50.0, 70.0]);
    assert_eq!(store.sessions(None).len(), 3);
    assert!(store.sessions(Some(3)).is_empty());
}

#[test]
fn session_for_unknown_text_is_rejected() {
    let mut store = PracticeStore::in_memory();
    let err = store
        .create_session(NewPracticeSession {
            practice_text_id: 42,
            audio_path: PathBuf::from("/tmp/x.wav"),
            transcribed_text: String::new(),
            score: 0.0,
            feedback: String::new(),
        })
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownText(42)));
    assert!(store.sessions(None).is_empty());
}
