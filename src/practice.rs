//! Practice flow: pick a text, record it, get it assessed and coached
//!
//! `submit_for_analysis` makes at most two remote calls (assessment, then
//! feedback) and saves a `PracticeSession` only when both succeed.

use thiserror::Error;

use crate::audio::PersistedRecording;
use crate::services::{AssessmentResult, FeedbackProvider, Language, ServiceError, SpeechAssessor};
use crate::store::{NewPracticeSession, PracticeSession, PracticeStore, PracticeText, StoreError};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("No practice text selected")]
    NoTextSelected,

    #[error("Pronunciation assessment failed: {0}")]
    Assessment(#[source] ServiceError),

    #[error("Feedback generation failed: {0}")]
    Feedback(#[source] ServiceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything produced by one analysed attempt.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub assessment: AssessmentResult,
    pub feedback: String,
    pub session: PracticeSession,
}

pub struct PracticeCoach<A, F> {
    assessor: A,
    feedback: F,
    store: PracticeStore,
    language: Language,
    selected: Option<PracticeText>,
}

impl<A: SpeechAssessor, F: FeedbackProvider> PracticeCoach<A, F> {
    pub fn new(assessor: A, feedback: F, store: PracticeStore, language: Language) -> Self {
        Self {
            assessor,
            feedback,
            store,
            language,
            selected: None,
        }
    }

    pub fn store(&self) -> &PracticeStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut PracticeStore {
        &mut self.store
    }

    pub fn selected(&self) -> Option<&PracticeText> {
        self.selected.as_ref()
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    /// Select the text to practice. Unknown ids leave the selection unchanged.
    pub fn select_text(&mut self, text_id: i64) -> Result<&PracticeText, StoreError> {
        let text = self
            .store
            .text(text_id)
            .cloned()
            .ok_or(StoreError::UnknownText(text_id))?;
        log::info!("Selected practice text #{} {:?}", text.id, text.title);
        Ok(&*self.selected.insert(text))
    }

    pub async fn submit_for_analysis(
        &mut self,
        recording: &PersistedRecording,
    ) -> Result<AnalysisReport, AnalysisError> {
        let text = self.selected.clone().ok_or(AnalysisError::NoTextSelected)?;

        let assessment = self
            .assessor
            .assess(&recording.path, &text.content)
            .await
            .map_err(AnalysisError::Assessment)?;

        let feedback = self
            .feedback
            .feedback(
                &text.content,
                &assessment.transcribed_text,
                Some(&assessment),
                self.language,
            )
            .await
            .map_err(AnalysisError::Feedback)?;

        let session = self.store.create_session(NewPracticeSession {
            practice_text_id: text.id,
            audio_path: recording.path.clone(),
            transcribed_text: assessment.transcribed_text.clone(),
            score: assessment.overall_score,
            feedback: feedback.clone(),
        })?;

        Ok(AnalysisReport {
            assessment,
            feedback,
            session,
        })
    }
}
