//! Azure Speech REST client
//!
//! Pronunciation assessment uses the short-audio recognition endpoint with a
//! `Pronunciation-Assessment` header (base64 JSON). Synthesis posts SSML to
//! the TTS endpoint and returns WAV bytes.

use std::future::Future;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{api_error, http_client, Language, ServiceError};
use crate::settings::{env_value, AZURE_KEY_ENV};

/// Scores for one attempt, all on a 0-100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub transcribed_text: String,
    pub accuracy_score: f64,
    pub fluency_score: f64,
    pub completeness_score: f64,
    pub overall_score: f64,
}

/// Scores a recording against the text the speaker was reading.
pub trait SpeechAssessor: Send + Sync {
    fn assess(
        &self,
        wav_path: &Path,
        reference_text: &str,
    ) -> impl Future<Output = Result<AssessmentResult, ServiceError>> + Send;
}

/// Reads text aloud; returns WAV bytes.
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(
        &self,
        text: &str,
        language: Language,
        speed: f32,
    ) -> impl Future<Output = Result<Vec<u8>, ServiceError>> + Send;
}

/// Assessment parameters sent in the `Pronunciation-Assessment` header
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AssessmentParams<'a> {
    reference_text: &'a str,
    grading_system: &'static str,
    granularity: &'static str,
    dimension: &'static str,
    enable_miscue: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecognitionResponse {
    recognition_status: String,
    #[serde(default)]
    display_text: Option<String>,
    #[serde(default, rename = "NBest")]
    n_best: Vec<NBestEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NBestEntry {
    #[serde(default)]
    display: Option<String>,
    #[serde(default)]
    lexical: Option<String>,
    #[serde(flatten)]
    flat: Scores,
    #[serde(default)]
    pronunciation_assessment: Option<Scores>,
}

/// Older responses put the scores directly on the NBest entry, newer ones
/// nest them under `PronunciationAssessment`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Scores {
    #[serde(default)]
    accuracy_score: Option<f64>,
    #[serde(default)]
    fluency_score: Option<f64>,
    #[serde(default)]
    completeness_score: Option<f64>,
    #[serde(default)]
    pron_score: Option<f64>,
}

/// Parse a detailed-format recognition response.
pub fn parse_assessment(body: &str) -> Result<AssessmentResult, ServiceError> {
    let response: RecognitionResponse =
        serde_json::from_str(body).map_err(|e| ServiceError::Parse(e.to_string()))?;

    if response.recognition_status != "Success" {
        return Err(ServiceError::NotRecognized(response.recognition_status));
    }

    let best = response
        .n_best
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::Parse("Response contained no NBest results".to_string()))?;

    let scores = best.pronunciation_assessment.unwrap_or(best.flat);
    let transcribed_text = response
        .display_text
        .or(best.display)
        .or(best.lexical)
        .unwrap_or_default();

    Ok(AssessmentResult {
        transcribed_text,
        accuracy_score: scores.accuracy_score.unwrap_or(0.0),
        fluency_score: scores.fluency_score.unwrap_or(0.0),
        completeness_score: scores.completeness_score.unwrap_or(0.0),
        overall_score: scores.pron_score.unwrap_or(0.0),
    })
}

/// Voice name and locale for a language
fn voice_for(language: Language) -> (&'static str, &'static str) {
    match language {
        Language::English => ("en-US-JennyNeural", "en-US"),
        Language::Chinese => ("zh-CN-XiaoxiaoNeural", "zh-CN"),
    }
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// SSML for a synthesis request. `speed` is a rate multiplier (0.5-2.0).
pub fn build_ssml(text: &str, language: Language, speed: f32) -> String {
    let (voice, lang) = voice_for(language);
    let rate = (speed.clamp(0.5, 2.0) * 100.0).round() as u32;
    format!(
        r#"<speak version="1.0" xmlns="http://www.w3.org/2001/10/synthesis" xml:lang="{lang}"><voice name="{voice}"><prosody rate="{rate}%" pitch="0%">{text}</prosody></voice></speak>"#,
        lang = lang,
        voice = voice,
        rate = rate,
        text = escape_xml(text),
    )
}

pub struct AzureSpeechClient {
    client: Client,
    key: String,
    region: String,
    language: String,
}

impl AzureSpeechClient {
    pub fn new(
        key: impl Into<String>,
        region: impl Into<String>,
        language: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(ServiceError::MissingApiKey { env: AZURE_KEY_ENV });
        }
        Ok(Self {
            client: http_client()?,
            key,
            region: region.into(),
            language: language.into(),
        })
    }

    /// Key from AZURE_SPEECH_KEY; region and locale as given.
    pub fn from_env(region: &str, language: &str) -> Result<Self, ServiceError> {
        let key = env_value(AZURE_KEY_ENV).ok_or(ServiceError::MissingApiKey { env: AZURE_KEY_ENV })?;
        Self::new(key, region, language)
    }

    pub fn recognition_url(&self) -> String {
        format!(
            "https://{}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1?language={}&format=detailed",
            self.region, self.language
        )
    }

    pub fn synthesis_url(&self) -> String {
        format!(
            "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
            self.region
        )
    }

    /// Value of the `Pronunciation-Assessment` header.
    pub fn assessment_header(reference_text: &str) -> Result<String, ServiceError> {
        let params = AssessmentParams {
            reference_text,
            grading_system: "HundredMark",
            granularity: "Phoneme",
            dimension: "Comprehensive",
            enable_miscue: true,
        };
        let json = serde_json::to_string(&params).map_err(|e| ServiceError::Parse(e.to_string()))?;
        Ok(BASE64.encode(json))
    }

    /// Content type for a WAV upload, using the sample rate from its header.
    fn wav_content_type(bytes: &[u8]) -> String {
        let sample_rate = hound::WavReader::new(std::io::Cursor::new(bytes))
            .map(|r| r.spec().sample_rate)
            .unwrap_or(16_000);
        format!("audio/wav; codecs=audio/pcm; samplerate={}", sample_rate)
    }
}

impl SpeechAssessor for AzureSpeechClient {
    async fn assess(
        &self,
        wav_path: &Path,
        reference_text: &str,
    ) -> Result<AssessmentResult, ServiceError> {
        let file_bytes = tokio::fs::read(wav_path)
            .await
            .map_err(|e| ServiceError::FileRead(e.to_string()))?;

        log::info!(
            "Assessing pronunciation: {:?} ({} bytes, reference {} chars)",
            wav_path.file_name().unwrap_or_default(),
            file_bytes.len(),
            reference_text.chars().count()
        );

        let response = self
            .client
            .post(self.recognition_url())
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header("Content-Type", Self::wav_content_type(&file_bytes))
            .header("Accept", "application/json")
            .header("Pronunciation-Assessment", Self::assessment_header(reference_text)?)
            .body(file_bytes)
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(api_error("Azure Speech", response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        let result = parse_assessment(&body);
        match &result {
            Ok(r) => log::info!(
                "Assessment complete: overall {:.1} (accuracy {:.1}, fluency {:.1}, completeness {:.1})",
                r.overall_score,
                r.accuracy_score,
                r.fluency_score,
                r.completeness_score
            ),
            Err(e) => log::error!("Assessment failed: {}", e),
        }
        result
    }
}

impl SpeechSynthesizer for AzureSpeechClient {
    async fn synthesize(
        &self,
        text: &str,
        language: Language,
        speed: f32,
    ) -> Result<Vec<u8>, ServiceError> {
        let ssml = build_ssml(text, language, speed);

        let response = self
            .client
            .post(self.synthesis_url())
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", "riff-16khz-16bit-mono-pcm")
            .header("User-Agent", crate::APP_DIR_NAME)
            .body(ssml)
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(api_error("Azure TTS", response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        log::info!("Synthesized {} bytes of speech", bytes.len());
        Ok(bytes.to_vec())
    }
}
