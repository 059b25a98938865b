//! OpenAI Chat Completions client for pronunciation coaching.
//!
//! Three requests share one transport:
//! - feedback comparing the reference text with what was recognized
//! - a phonetic guide for a whole passage
//! - a pronunciation guide for a single word

use std::future::Future;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::azure::AssessmentResult;
use super::{api_error, http_client, Language, ServiceError};
use crate::settings::{env_value, OPENAI_KEY_ENV};

/// OpenAI Chat Completions API endpoint.
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Request body for Chat Completions API.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

/// Chat message structure.
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

/// Produces coaching text from an attempt.
pub trait FeedbackProvider: Send + Sync {
    fn feedback(
        &self,
        reference_text: &str,
        transcribed_text: &str,
        scores: Option<&AssessmentResult>,
        language: Language,
    ) -> impl Future<Output = Result<String, ServiceError>> + Send;
}

fn system_prompt(language: Language) -> &'static str {
    match language {
        Language::English => {
            "You are an expert English pronunciation coach. Provide feedback in English."
        }
        Language::Chinese => "你是一位专业的英语发音教练。请用中文提供反馈。",
    }
}

/// User prompt for a feedback request. Scores are appended when present.
pub fn feedback_prompt(
    reference_text: &str,
    transcribed_text: &str,
    scores: Option<&AssessmentResult>,
    language: Language,
) -> String {
    let mut prompt = match language {
        Language::English => format!(
            "Compare the original text and the transcribed speech, then provide feedback:\n\
             Original text: {reference_text}\n\
             Transcribed speech: {transcribed_text}\n\n\
             Please analyze:\n\
             1. Pronunciation accuracy\n\
             2. Common mistakes\n\
             3. Specific improvement suggestions\n\
             4. Phonetic tips for difficult words\n"
        ),
        Language::Chinese => format!(
            "请对比原文和语音识别结果，并提供发音反馈：\n\
             原文：{reference_text}\n\
             识别结果：{transcribed_text}\n\n\
             请分析以下几点：\n\
             1. 发音准确度\n\
             2. 常见错误\n\
             3. 具体改进建议\n\
             4. 难词的发音技巧\n"
        ),
    };

    if let Some(s) = scores {
        let block = match language {
            Language::English => format!(
                "\nAdditional pronunciation scores:\n\
                 - Overall pronunciation score: {:.1}\n\
                 - Accuracy score: {:.1}\n\
                 - Fluency score: {:.1}\n\
                 - Completeness score: {:.1}\n\n\
                 Please incorporate these scores in your feedback.\n",
                s.overall_score, s.accuracy_score, s.fluency_score, s.completeness_score
            ),
            Language::Chinese => format!(
                "\n额外的发音评分：\n\
                 - 总体发音得分：{:.1}\n\
                 - 准确性得分：{:.1}\n\
                 - 流畅度得分：{:.1}\n\
                 - 完整度得分：{:.1}\n\n\
                 请将这些分数纳入你的反馈中。\n",
                s.overall_score, s.accuracy_score, s.fluency_score, s.completeness_score
            ),
        };
        prompt.push_str(&block);
    }

    prompt
}

pub fn phonetic_guide_prompt(text: &str) -> String {
    format!(
        "Please provide phonetic guidance for the following text:\n\
         {text}\n\n\
         Focus on:\n\
         1. Stress patterns\n\
         2. Difficult sounds\n\
         3. Word linking\n\
         4. Natural rhythm\n\
         Include IPA symbols where helpful.\n"
    )
}

/// The word itself is always English; `language` picks the language of the explanation.
pub fn word_guide_prompt(word: &str, language: Language) -> String {
    let mut prompt = format!(
        "Please provide a detailed pronunciation guide for the word: \"{word}\"\n\n\
         Include:\n\
         1. IPA transcription\n\
         2. Syllable breakdown\n\
         3. Stress pattern\n\
         4. Common pronunciation mistakes\n\
         5. Similar sounding words\n\
         6. Example sentences\n\n\
         Format the response in markdown.\n"
    );
    if language == Language::Chinese {
        prompt.push_str("请用中文解释，例句保留英文。\n");
    }
    prompt
}

fn word_guide_system_prompt(language: Language) -> &'static str {
    match language {
        Language::English => "You are an expert in English pronunciation and phonetics.",
        Language::Chinese => "你是一位英语发音和语音学专家。请用中文回答。",
    }
}

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ServiceError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ServiceError::MissingApiKey {
                env: OPENAI_KEY_ENV,
            });
        }
        Ok(Self {
            client: http_client()?,
            api_key,
            model: model.into(),
        })
    }

    /// Key from OPENAI_API_KEY.
    pub fn from_env(model: &str) -> Result<Self, ServiceError> {
        let api_key = env_value(OPENAI_KEY_ENV).ok_or(ServiceError::MissingApiKey {
            env: OPENAI_KEY_ENV,
        })?;
        Self::new(api_key, model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Phonetic guidance (stress, linking, rhythm) for a passage.
    pub async fn phonetic_guide(&self, text: &str) -> Result<String, ServiceError> {
        self.complete(
            "You are an expert in English phonetics and pronunciation.",
            phonetic_guide_prompt(text),
        )
        .await
    }

    /// Markdown pronunciation guide for one word, explained in `language`.
    pub async fn word_guide(&self, word: &str, language: Language) -> Result<String, ServiceError> {
        self.complete(
            word_guide_system_prompt(language),
            word_guide_prompt(word, language),
        )
        .await
    }

    fn request(&self, system: &str, user: String) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        }
    }

    async fn complete(&self, system: &str, user: String) -> Result<String, ServiceError> {
        let request = self.request(system, user);

        let response = self
            .client
            .post(OPENAI_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(api_error("OpenAI", response).await);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;

        let text = first_choice(chat_response)?;
        log::info!("Chat completion succeeded: {} chars", text.len());
        Ok(text)
    }
}

fn first_choice(response: ChatResponse) -> Result<String, ServiceError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ServiceError::Parse("Empty response from API".to_string()))
}

impl FeedbackProvider for OpenAiClient {
    async fn feedback(
        &self,
        reference_text: &str,
        transcribed_text: &str,
        scores: Option<&AssessmentResult>,
        language: Language,
    ) -> Result<String, ServiceError> {
        log::info!(
            "Generating pronunciation feedback ({}, reference {} chars)",
            language.as_str(),
            reference_text.chars().count()
        );
        self.complete(
            system_prompt(language),
            feedback_prompt(reference_text, transcribed_text, scores, language),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores() -> AssessmentResult {
        AssessmentResult {
            transcribed_text: "hello word".to_string(),
            accuracy_score: 80.0,
            fluency_score: 70.0,
            completeness_score: 90.0,
            overall_score: 78.3,
        }
    }

    #[test]
    fn test_feedback_prompt_english() {
        let prompt = feedback_prompt("hello world", "hello word", None, Language::English);
        assert!(prompt.contains("Original text: hello world"));
        assert!(prompt.contains("Transcribed speech: hello word"));
        assert!(!prompt.contains("Additional pronunciation scores"));
    }

    #[test]
    fn test_feedback_prompt_with_scores() {
        let s = scores();
        let prompt = feedback_prompt("hello world", "hello word", Some(&s), Language::English);
        assert!(prompt.contains("Overall pronunciation score: 78.3"));
        assert!(prompt.contains("Fluency score: 70.0"));
    }

    #[test]
    fn test_feedback_prompt_chinese() {
        let s = scores();
        let prompt = feedback_prompt("hello", "hallo", Some(&s), Language::Chinese);
        assert!(prompt.contains("原文：hello"));
        assert!(prompt.contains("识别结果：hallo"));
        assert!(prompt.contains("准确性得分：80.0"));
        assert!(system_prompt(Language::Chinese).contains("中文"));
    }

    #[test]
    fn test_guide_prompts() {
        assert!(phonetic_guide_prompt("The quick fox").contains("The quick fox"));
        assert!(word_guide_prompt("thorough", Language::English).contains("\"thorough\""));
    }

    #[test]
    fn test_word_guide_follows_language() {
        let english = word_guide_prompt("thorough", Language::English);
        assert!(!english.contains("中文"));
        assert!(word_guide_system_prompt(Language::English).contains("English pronunciation"));

        let chinese = word_guide_prompt("thorough", Language::Chinese);
        assert!(chinese.contains("\"thorough\""));
        assert!(chinese.contains("请用中文解释"));
        assert!(word_guide_system_prompt(Language::Chinese).contains("中文"));
    }

    #[test]
    fn test_request_shape() {
        let client = OpenAiClient::new("sk-test", "gpt-4").unwrap();
        let request = client.request("sys", "user text".to_string());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["model"], "gpt-4");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "user text");
    }

    #[test]
    fn test_first_choice() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "  Nice work!  "}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice(response).unwrap(), "Nice work!");

        let empty: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(first_choice(empty), Err(ServiceError::Parse(_))));
    }

    #[test]
    fn test_empty_key_rejected() {
        let err = OpenAiClient::new("", "gpt-4").err().unwrap();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
