use anyhow::{Context, Result};
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tracing::{info, warn};

use crate::normalizer::{self, CleaningPolicy};
use crate::settings::Settings;

mod basic;
mod neural;

pub use basic::TranslateTts;
pub use neural::CloudTts;

pub const MP3_MIME: &str = "audio/mpeg";
/// Name offered for the downloaded audio.
pub const AUDIO_FILE_NAME: &str = "audio_pulito.mp3";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    /// Whatever the engine speaks with by default.
    #[default]
    Standard,
    Female,
    Male,
}

impl Voice {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "" | "standard" | "default" => Some(Voice::Standard),
            "female" | "donna" | "femminile" => Some(Voice::Female),
            "male" | "uomo" | "maschile" => Some(Voice::Male),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Voice::Standard => "standard",
            Voice::Female => "female",
            Voice::Male => "male",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Voice::Standard => "Standard",
            Voice::Female => "Donna",
            Voice::Male => "Uomo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechEngine {
    Basic,
    Neural,
}

impl SpeechEngine {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "basic" | "gtts" => Some(SpeechEngine::Basic),
            "neural" => Some(SpeechEngine::Neural),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SpeechEngine::Basic => "basic",
            SpeechEngine::Neural => "neural",
        }
    }

    /// Voices the engine lets the user pick from.
    pub fn voices(&self) -> &'static [Voice] {
        match self {
            SpeechEngine::Basic => &[Voice::Standard],
            SpeechEngine::Neural => &[Voice::Female, Voice::Male],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl AudioClip {
    pub fn mp3(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime: MP3_MIME.to_string(),
        }
    }
}

pub type SynthFuture<'a> = Pin<Box<dyn Future<Output = Result<AudioClip>> + Send + 'a>>;

/// Turns already-cleaned text into audio. One call per user action; the
/// caller awaits it to completion.
pub trait Synthesizer: Send + Sync {
    fn synthesize<'a>(&'a self, text: &'a str, voice: Voice) -> SynthFuture<'a>;
}

#[derive(Debug, Clone)]
pub enum SpeechBackend {
    Basic(TranslateTts),
    Neural(CloudTts),
}

impl SpeechBackend {
    /// `key` is only used by the neural engine.
    pub fn from_settings(engine: SpeechEngine, settings: &Settings, key: &str) -> Self {
        match engine {
            SpeechEngine::Basic => {
                SpeechBackend::Basic(TranslateTts::new(settings.speech_language.clone()))
            }
            SpeechEngine::Neural => SpeechBackend::Neural(
                CloudTts::new(key, settings.neural_language.clone())
                    .with_voices(settings.female_voice.clone(), settings.male_voice.clone()),
            ),
        }
    }

    pub fn engine(&self) -> SpeechEngine {
        match self {
            SpeechBackend::Basic(_) => SpeechEngine::Basic,
            SpeechBackend::Neural(_) => SpeechEngine::Neural,
        }
    }
}

impl Synthesizer for SpeechBackend {
    fn synthesize<'a>(&'a self, text: &'a str, voice: Voice) -> SynthFuture<'a> {
        match self {
            SpeechBackend::Basic(backend) => backend.synthesize(text, voice),
            SpeechBackend::Neural(backend) => backend.synthesize(text, voice),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechOutcome {
    Done(AudioClip),
    /// Nothing speakable was left after cleaning; the backend was not called.
    NothingToSay,
    Failed(String),
}

/// Clean `text` and synthesize it, reporting every failure as an outcome.
pub async fn speak<S: Synthesizer + ?Sized>(
    synthesizer: &S,
    text: &str,
    policy: &CleaningPolicy,
    voice: Voice,
) -> SpeechOutcome {
    let Some(cleaned) = normalizer::prepare_for_speech(text, policy) else {
        info!("nothing left to synthesize after cleaning");
        return SpeechOutcome::NothingToSay;
    };
    info!(
        voice = voice.as_str(),
        chars = cleaned.chars().count(),
        "synthesizing audio"
    );
    match synthesizer.synthesize(&cleaned, voice).await {
        Ok(clip) if clip.bytes.is_empty() => {
            SpeechOutcome::Failed("speech service returned no audio".to_string())
        }
        Ok(clip) => SpeechOutcome::Done(clip),
        Err(err) => {
            warn!("speech synthesis failed: {:#}", err);
            SpeechOutcome::Failed(format!("{:#}", err))
        }
    }
}

/// Write `clip` to `path` through a temp file in the same directory.
pub fn write_audio_file(path: &Path, clip: &AudioClip) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().with_context(|| "failed to resolve current directory")?,
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create audio dir: {}", dir.display()))?;
    let file = tempfile::Builder::new()
        .prefix("pdf-ai-audio-")
        .suffix(".mp3")
        .tempfile_in(&dir)?;
    std::fs::write(file.path(), &clip.bytes).with_context(|| "failed to write audio temp file")?;
    file.persist(path)
        .with_context(|| format!("failed to write audio file: {}", path.display()))?;
    Ok(())
}

/// Split `text` at spaces into pieces of at most `max_chars` characters.
/// Words longer than the limit are cut.
pub(crate) fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    for word in text.split_whitespace() {
        let mut word = word.to_string();
        loop {
            let word_len = word.chars().count();
            let needed = if current_len == 0 { word_len } else { word_len + 1 };
            if current_len + needed <= max_chars {
                if current_len > 0 {
                    current.push(' ');
                }
                current.push_str(&word);
                current_len += needed;
                break;
            }
            if current_len > 0 {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
                continue;
            }
            let head = word.chars().take(max_chars).collect::<String>();
            word = word.chars().skip(max_chars).collect();
            chunks.push(head);
            if word.is_empty() {
                break;
            }
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::{Arc, Mutex};

    /// Returns the text it was given as "audio".
    #[derive(Clone, Default)]
    pub(crate) struct MockSynthesizer {
        pub(crate) fail: bool,
        pub(crate) calls: Arc<Mutex<Vec<(String, Voice)>>>,
    }

    impl MockSynthesizer {
        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub(crate) fn calls(&self) -> Vec<(String, Voice)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Synthesizer for MockSynthesizer {
        fn synthesize<'a>(&'a self, text: &'a str, voice: Voice) -> SynthFuture<'a> {
            Box::pin(async move {
                self.calls.lock().unwrap().push((text.to_string(), voice));
                if self.fail {
                    return Err(anyhow!("voice service down"));
                }
                Ok(AudioClip::mp3(text.as_bytes().to_vec()))
            })
        }
    }

    #[tokio::test]
    async fn speak_sends_cleaned_text() {
        let synth = MockSynthesizer::default();
        let outcome = speak(
            &synth,
            "Ciao!!!\nMondo",
            &CleaningPolicy::default(),
            Voice::Female,
        )
        .await;
        assert_eq!(outcome, SpeechOutcome::Done(AudioClip::mp3(b"Ciao. Mondo".to_vec())));
        assert_eq!(synth.calls(), vec![("Ciao. Mondo".to_string(), Voice::Female)]);
    }

    #[tokio::test]
    async fn speak_skips_backend_when_nothing_is_left() {
        let synth = MockSynthesizer::default();
        let outcome = speak(&synth, "*** ● ###", &CleaningPolicy::default(), Voice::Standard).await;
        assert_eq!(outcome, SpeechOutcome::NothingToSay);
        assert!(synth.calls().is_empty());
    }

    #[tokio::test]
    async fn speak_reports_backend_failure() {
        let outcome = speak(
            &MockSynthesizer::failing(),
            "Ciao",
            &CleaningPolicy::default(),
            Voice::Standard,
        )
        .await;
        assert_eq!(outcome, SpeechOutcome::Failed("voice service down".to_string()));
    }

    #[test]
    fn chunks_respect_limit_and_order() {
        let text = "uno due tre quattro cinque sei";
        let chunks = split_into_chunks(text, 9);
        assert_eq!(chunks, vec!["uno due", "tre", "quattro", "cinque", "sei"]);
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn long_words_are_cut() {
        assert_eq!(
            split_into_chunks("abcdefghij kl", 4),
            vec!["abcd", "efgh", "ij", "kl"]
        );
        assert!(split_into_chunks("   ", 4).is_empty());
    }

    #[test]
    fn writes_audio_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join(AUDIO_FILE_NAME);
        write_audio_file(&path, &AudioClip::mp3(vec![1, 2, 3])).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn parses_voice_and_engine() {
        assert_eq!(Voice::parse("Female"), Some(Voice::Female));
        assert_eq!(Voice::parse("uomo"), Some(Voice::Male));
        assert_eq!(Voice::parse(""), Some(Voice::Standard));
        assert_eq!(Voice::parse("robot"), None);
        assert_eq!(SpeechEngine::parse("NEURAL"), Some(SpeechEngine::Neural));
        assert_eq!(SpeechEngine::parse("gtts"), Some(SpeechEngine::Basic));
    }
}
