use anyhow::{Context, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{AudioClip, SynthFuture, Synthesizer, Voice, split_into_chunks};

const BASE_URL: &str = "https://texttospeech.googleapis.com/v1/text:synthesize";
/// Keeps every request under the 5000-byte input limit.
const MAX_CHUNK_CHARS: usize = 1200;

/// Google Cloud Text-to-Speech neural voices, one per gender.
#[derive(Debug, Clone)]
pub struct CloudTts {
    key: String,
    language_code: String,
    female_voice: String,
    male_voice: String,
    base_url: String,
    client: reqwest::Client,
}

impl CloudTts {
    pub fn new(key: impl Into<String>, language_code: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            language_code: language_code.into(),
            female_voice: "it-IT-Neural2-A".to_string(),
            male_voice: "it-IT-Neural2-C".to_string(),
            base_url: BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_voices(mut self, female: impl Into<String>, male: impl Into<String>) -> Self {
        self.female_voice = female.into();
        self.male_voice = male.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Standard falls back to the female voice.
    pub fn voice_name(&self, voice: Voice) -> &str {
        match voice {
            Voice::Male => &self.male_voice,
            Voice::Female | Voice::Standard => &self.female_voice,
        }
    }
}

impl Synthesizer for CloudTts {
    fn synthesize<'a>(&'a self, text: &'a str, voice: Voice) -> SynthFuture<'a> {
        Box::pin(async move {
            let voice_name = self.voice_name(voice);
            let mut audio = Vec::new();
            for chunk in split_into_chunks(text, MAX_CHUNK_CHARS) {
                debug!(
                    voice = voice_name,
                    chars = chunk.chars().count(),
                    "requesting text:synthesize"
                );
                let body = json!({
                    "input": { "text": chunk },
                    "voice": {
                        "languageCode": self.language_code,
                        "name": voice_name
                    },
                    "audioConfig": { "audioEncoding": "MP3" }
                });
                let response = self
                    .client
                    .post(&self.base_url)
                    .header("x-goog-api-key", self.key.clone())
                    .json(&body)
                    .send()
                    .await
                    .with_context(|| "failed to reach Cloud Text-to-Speech")?;
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                if !status.is_success() {
                    return Err(anyhow!(
                        "Text-to-Speech API error ({}): {}",
                        status,
                        extract_error_message(&text).unwrap_or(text)
                    ));
                }
                let payload: SynthesizeResponse = serde_json::from_str(&text)
                    .map_err(|err| anyhow!("failed to parse Text-to-Speech response: {}", err))?;
                let bytes = BASE64
                    .decode(payload.audio_content.trim())
                    .with_context(|| "Text-to-Speech returned invalid base64 audio")?;
                audio.extend_from_slice(&bytes);
            }
            Ok(AudioClip::mp3(audio))
        })
    }
}

#[derive(Debug, Deserialize)]
struct SynthesizeResponse {
    #[serde(rename = "audioContent")]
    audio_content: String,
}

fn extract_error_message(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<ErrorDetail>,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        message: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed
        .error?
        .message
        .filter(|message| !message.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;

    async fn synthesize(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        if headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) == Some("revoked") {
            return (
                StatusCode::FORBIDDEN,
                Json(json!({"error": {"code": 403, "message": "API key revoked"}})),
            );
        }
        let audio = format!(
            "{}|{}|{}",
            body["voice"]["languageCode"].as_str().unwrap_or_default(),
            body["voice"]["name"].as_str().unwrap_or_default(),
            body["input"]["text"].as_str().unwrap_or_default()
        );
        (
            StatusCode::OK,
            Json(json!({ "audioContent": BASE64.encode(audio) })),
        )
    }

    async fn spawn_fake_tts() -> String {
        let app = Router::new().route("/v1/synthesize", post(synthesize));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1/synthesize", addr)
    }

    #[tokio::test]
    async fn male_voice_is_requested_and_audio_decoded() {
        let base_url = spawn_fake_tts().await;
        let clip = CloudTts::new("key", "it-IT")
            .with_base_url(base_url)
            .synthesize("Buongiorno a tutti", Voice::Male)
            .await
            .unwrap();
        assert_eq!(
            String::from_utf8(clip.bytes).unwrap(),
            "it-IT|it-IT-Neural2-C|Buongiorno a tutti"
        );
    }

    #[tokio::test]
    async fn api_error_message_is_surfaced() {
        let base_url = spawn_fake_tts().await;
        let err = CloudTts::new("revoked", "it-IT")
            .with_base_url(base_url)
            .synthesize("ciao", Voice::Female)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Text-to-Speech API error (403 Forbidden): API key revoked"
        );
    }

    #[test]
    fn standard_voice_uses_female() {
        let tts = CloudTts::new("key", "it-IT").with_voices("F", "M");
        assert_eq!(tts.voice_name(Voice::Standard), "F");
        assert_eq!(tts.voice_name(Voice::Female), "F");
        assert_eq!(tts.voice_name(Voice::Male), "M");
    }
}
