//! Answer generation via the Gemini API.
//!
//! The answer path is the one stage allowed to degrade instead of fail:
//! any model or transport error becomes a descriptive error-text answer,
//! so a request whose retrieval succeeded still gets a response. The
//! question-generation path keeps the hard-fail contract (the caller maps
//! it to a 5xx).
//!
//! The API key comes from `GEMINI_API_KEY` only; construction fails when
//! it is absent.

use serde_json::{json, Value};
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::{PipelineError, Result, Stage};
use crate::models::{Content, Retrieved};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// System instruction for `/generate-questions/`: extract the two key
/// ideas of a technical passage and phrase each as one plain-language,
/// single-sentence question, returned as a numbered list with nothing else.
const QUESTION_PROMPT: &str = "You are given a block of technical or academic text. \
Identify exactly two distinct key ideas it discusses. For each idea, write one \
simplified question that captures its essence in a single concise sentence, using \
plain language while staying technically accurate. Return only the two questions, \
numbered 1 and 2, with no commentary, summaries, or explanations.";

pub struct GeminiClient {
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| PipelineError::upstream(Stage::Generate, e))?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        })
    }

    /// Point the client at a different host. Used by tests to exercise the
    /// failure paths without reaching the real API.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Answer `query` grounded in the retrieved content. Never fails:
    /// model errors come back as an error-text answer.
    pub async fn answer(&self, query: &str, retrieved: &[Retrieved]) -> String {
        let parts = build_answer_parts(query, retrieved);
        match self.generate(parts, None).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "answer generation degraded to error text");
                format!("LLM error: {}", e)
            }
        }
    }

    /// Produce two clarifying questions for a block of text. Hard-fail.
    pub async fn generate_questions(&self, text: &str) -> Result<String> {
        let parts = vec![json!({ "text": text })];
        self.generate(parts, Some(QUESTION_PROMPT)).await
    }

    async fn generate(&self, parts: Vec<Value>, system: Option<&str>) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let mut body = json!({
            "contents": [{ "parts": parts }],
        });
        if let Some(instruction) = system {
            body["systemInstruction"] = json!({ "parts": [{ "text": instruction }] });
        }

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::upstream(Stage::Generate, e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(PipelineError::upstream(
                Stage::Generate,
                format!("Gemini API error {}: {}", status, body_text),
            ));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::upstream(Stage::Generate, e))?;
        parse_generation_response(&json)
    }
}

/// Assemble the prompt parts: the query, then either the retrieved chunk
/// texts as context or the top page image inline (visual backend).
fn build_answer_parts(query: &str, retrieved: &[Retrieved]) -> Vec<Value> {
    use base64::Engine;

    let mut parts = Vec::new();

    let context: Vec<&str> = retrieved
        .iter()
        .filter_map(|r| match &r.content {
            Content::Text(text) => Some(text.as_str()),
            Content::Image(_) => None,
        })
        .collect();

    if context.is_empty() {
        parts.push(json!({ "text": query }));
    } else {
        parts.push(json!({ "text": format!(
            "Answer the question using only the context below.\n\nContext:\n{}\n\nQuestion: {}",
            context.join("\n---\n"),
            query
        )}));
    }

    for r in retrieved {
        if let Content::Image(page) = &r.content {
            parts.push(json!({
                "inline_data": {
                    "mime_type": "image/png",
                    "data": base64::engine::general_purpose::STANDARD.encode(&page.png),
                }
            }));
        }
    }

    parts
}

/// Extract the text of the first candidate, concatenating its parts.
fn parse_generation_response(json: &Value) -> Result<String> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            PipelineError::upstream(Stage::Generate, "invalid Gemini response: no candidates")
        })?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        return Err(PipelineError::upstream(
            Stage::Generate,
            "invalid Gemini response: empty candidate text",
        ));
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PageImage;

    #[test]
    fn parse_candidate_text() {
        let json = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "The refund window " }, { "text": "is 30 days." }] }
            }]
        });
        assert_eq!(
            parse_generation_response(&json).unwrap(),
            "The refund window is 30 days."
        );
    }

    #[test]
    fn parse_missing_candidates_is_error() {
        let json = serde_json::json!({ "promptFeedback": {} });
        assert!(parse_generation_response(&json).is_err());
    }

    #[test]
    fn text_context_is_folded_into_prompt() {
        let retrieved = vec![Retrieved {
            content: Content::Text("refund window is 30 days".to_string()),
            score: 0.9,
        }];
        let parts = build_answer_parts("refund window", &retrieved);
        assert_eq!(parts.len(), 1);
        let prompt = parts[0]["text"].as_str().unwrap();
        assert!(prompt.contains("refund window is 30 days"));
        assert!(prompt.contains("Question: refund window"));
    }

    #[test]
    fn image_context_becomes_inline_data() {
        let retrieved = vec![Retrieved {
            content: Content::Image(PageImage {
                page_index: 0,
                png: vec![1, 2, 3],
            }),
            score: 0.8,
        }];
        let parts = build_answer_parts("what is on this page?", &retrieved);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["text"].as_str().unwrap(), "what is on this page?");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
    }

    #[tokio::test]
    async fn answer_soft_fails_to_error_text() {
        let client = GeminiClient::new(&GenerationConfig::default(), "test-key".to_string())
            .unwrap()
            // Unroutable: connection refused immediately.
            .with_base_url("http://127.0.0.1:9");
        let answer = client.answer("anything", &[]).await;
        assert!(answer.starts_with("LLM error:"), "got: {}", answer);
    }

    #[tokio::test]
    async fn generate_questions_hard_fails() {
        let client = GeminiClient::new(&GenerationConfig::default(), "test-key".to_string())
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let err = client.generate_questions("some text").await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Upstream {
                stage: Stage::Generate,
                ..
            }
        ));
    }
}
