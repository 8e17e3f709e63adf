use anyhow::{Context, anyhow};
use tracing::debug;

use super::{AudioClip, SynthFuture, Synthesizer, Voice, split_into_chunks};

const BASE_URL: &str = "https://translate.google.com/translate_tts";
/// The endpoint rejects longer inputs.
const MAX_CHUNK_CHARS: usize = 100;

/// Google Translate's text-to-speech voice: one fixed voice per language.
#[derive(Debug, Clone)]
pub struct TranslateTts {
    language: String,
    base_url: String,
    client: reqwest::Client,
}

impl TranslateTts {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            base_url: BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Synthesizer for TranslateTts {
    fn synthesize<'a>(&'a self, text: &'a str, _voice: Voice) -> SynthFuture<'a> {
        Box::pin(async move {
            let chunks = split_into_chunks(text, MAX_CHUNK_CHARS);
            let total = chunks.len().to_string();
            let mut audio = Vec::new();
            for (idx, chunk) in chunks.iter().enumerate() {
                debug!(chunk = idx + 1, of = chunks.len(), "requesting translate_tts chunk");
                let idx = idx.to_string();
                let textlen = chunk.chars().count().to_string();
                let response = self
                    .client
                    .get(&self.base_url)
                    .query(&[
                        ("ie", "UTF-8"),
                        ("client", "tw-ob"),
                        ("tl", self.language.as_str()),
                        ("q", chunk.as_str()),
                        ("total", total.as_str()),
                        ("idx", idx.as_str()),
                        ("textlen", textlen.as_str()),
                    ])
                    .send()
                    .await
                    .with_context(|| "failed to reach Google Translate TTS")?;
                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    return Err(anyhow!(
                        "Google Translate TTS error ({}): {}",
                        status,
                        body.trim()
                    ));
                }
                let bytes = response.bytes().await?;
                audio.extend_from_slice(&bytes);
            }
            Ok(AudioClip::mp3(audio))
        })
    }
}
