use anyhow::anyhow;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{Provider, ProviderFuture, ProviderResponse, ProviderUsage};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct Gemini {
    key: String,
    model: String,
    base_url: String,
    inputs: Vec<String>,
}

impl Gemini {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: BASE_URL.to_string(),
            inputs: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        if !base_url.trim().is_empty() {
            self.base_url = base_url.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Provider for Gemini {
    fn append_user_input(mut self, input: String) -> Self {
        self.inputs.push(input);
        self
    }

    fn generate(self) -> ProviderFuture {
        Box::pin(async move {
            let client = reqwest::Client::new();
            let url = format!("{}/{}:generateContent", self.base_url, self.model);
            let parts = self
                .inputs
                .into_iter()
                .map(|text| json!({ "text": text }))
                .collect::<Vec<_>>();
            let body = json!({
                "contents": [
                    {
                        "role": "user",
                        "parts": parts
                    }
                ]
            });

            debug!(model = %self.model, "sending generateContent request");
            let response = client
                .post(&url)
                .header("x-goog-api-key", self.key.clone())
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                return extract_text_response(&text, &self.model);
            }
            Err(anyhow!(
                "Gemini API error ({}): {}",
                status,
                extract_gemini_error(&text).unwrap_or(text)
            ))
        })
    }
}

fn extract_text_response(
    text: &str,
    fallback_model: &str,
) -> Result<ProviderResponse, anyhow::Error> {
    let payload: GeminiResponse = serde_json::from_str(text)
        .map_err(|err| anyhow!("failed to parse Gemini response JSON: {}", err))?;

    let content = payload
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref());
    let Some(content) = content else {
        if let Some(reason) = payload
            .prompt_feedback
            .and_then(|feedback| feedback.block_reason)
        {
            return Err(anyhow!("prompt blocked by Gemini ({})", reason));
        }
        return Err(anyhow!("no candidate returned from Gemini"));
    };

    let output = content
        .parts
        .iter()
        .filter_map(|part| part.text.as_deref())
        .collect::<Vec<_>>()
        .join("");
    if output.trim().is_empty() {
        return Err(anyhow!("no text returned from Gemini"));
    }

    let model = payload
        .model_version
        .filter(|value| !value.trim().is_empty())
        .or_else(|| Some(fallback_model.to_string()));
    let usage = payload.usage_metadata.map(|usage| ProviderUsage {
        prompt_tokens: usage.prompt_token_count,
        completion_tokens: usage.candidates_token_count,
        total_tokens: usage.total_token_count,
    });
    Ok(ProviderResponse {
        text: output,
        model,
        usage,
    })
}

fn extract_gemini_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<GeminiError>,
    }

    #[derive(Deserialize)]
    struct GeminiError {
        message: Option<String>,
        status: Option<String>,
        code: Option<i32>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    Some(format_error_parts(
        error.message,
        error.status,
        error.code.map(|value| value.to_string()),
    ))
}

fn format_error_parts(
    message: Option<String>,
    kind: Option<String>,
    code: Option<String>,
) -> String {
    let present = |value: Option<String>| value.filter(|value| !value.trim().is_empty());
    let mut parts = Vec::new();
    if let Some(message) = present(message) {
        parts.push(message);
    }
    if let Some(kind) = present(kind) {
        parts.push(format!("type: {}", kind));
    }
    if let Some(code) = present(code) {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(" | ")
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<GeminiPromptFeedback>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<GeminiUsage>,
    #[serde(rename = "modelVersion")]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiPromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiUsage {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u64>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u64>,
    #[serde(rename = "totalTokenCount")]
    total_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}
