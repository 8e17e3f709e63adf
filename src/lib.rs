use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub mod analysis;
pub mod credentials;
pub mod extractor;
pub mod logging;
pub mod normalizer;
mod providers;
pub mod server;
pub mod session;
pub mod settings;
pub mod speech;
#[cfg(test)]
mod test_util;

pub use analysis::{AnalysisKind, AnalysisOutput, Analyzer};
pub use providers::{DEFAULT_MODEL, Gemini, Provider, ProviderResponse, ProviderUsage};
pub use session::{ActionOutcome, Controller, SessionState, UploadOutcome};
pub use speech::{AudioClip, SpeechBackend, SpeechEngine, Voice};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub model: Option<String>,
    pub key: Option<String>,
    pub engine: Option<String>,
    pub settings_path: Option<String>,
    pub addr: Option<String>,
    pub data: Vec<String>,
    pub analysis: Option<String>,
    pub audio_out: Option<String>,
    pub voice: Option<String>,
    pub with_using_tokens: bool,
}

/// Everything an action needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Services {
    pub settings: settings::Settings,
    pub provider: Gemini,
    pub synthesizer: SpeechBackend,
}

/// Load settings, resolve keys and build the Gemini and speech clients.
/// `prompt` is asked for the Gemini key when nothing else provides one.
pub fn prepare<F>(config: &Config, prompt: F) -> Result<Services>
where
    F: FnOnce() -> Result<Option<String>>,
{
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    if let Some(engine) = config.engine.as_deref() {
        settings.speech_engine = SpeechEngine::parse(engine)
            .ok_or_else(|| anyhow!("unknown speech engine: {} (basic, neural)", engine))?;
    }
    if let Some(model) = config.model.as_deref().map(str::trim)
        && !model.is_empty()
    {
        settings.model = model.to_string();
    }

    let (key, source) = credentials::resolve_api_key(config.key.as_deref(), &settings, prompt)?;
    debug!(?source, "resolved Gemini API key");
    let tts_key = credentials::resolve_tts_key(&settings).unwrap_or_else(|| key.clone());

    let mut provider = Gemini::new(key).with_model(settings.model.clone());
    if let Some(base_url) = settings.gemini_base_url.as_deref() {
        provider = provider.with_base_url(base_url);
    }
    let synthesizer = SpeechBackend::from_settings(settings.speech_engine, &settings, &tts_key);
    info!(
        model = provider.model(),
        engine = settings.speech_engine.as_str(),
        "services ready"
    );
    Ok(Services {
        settings,
        provider,
        synthesizer,
    })
}

/// One-shot mode: extract the `--data` PDFs, then run the requested
/// analysis and/or write the audio. With neither, prints the text.
pub async fn run(config: Config, services: Services) -> Result<String> {
    if config.data.is_empty() {
        return Err(anyhow!("no PDF given (use --data <file.pdf>)"));
    }
    let kind = config
        .analysis
        .as_deref()
        .map(|value| {
            AnalysisKind::parse(value).ok_or_else(|| {
                anyhow!(
                    "unknown analysis: {} (synthesis, validation, action-items, critique)",
                    value
                )
            })
        })
        .transpose()?;
    let voice = parse_voice(config.voice.as_deref(), services.synthesizer.engine())?;

    let documents = config
        .data
        .iter()
        .map(|path| extractor::load_document(Path::new(path)))
        .collect::<Result<Vec<_>>>()?;

    let Services {
        settings,
        provider,
        synthesizer,
    } = services;
    let analyzer = Analyzer::new(provider, settings.instructions.clone());
    let mut controller = Controller::new(analyzer, synthesizer, settings.cleaning);

    if controller.upload(&documents)? == UploadOutcome::NothingToProcess {
        return Ok("Nessun testo estratto dai PDF: niente da elaborare.".to_string());
    }
    if kind.is_none() && config.audio_out.is_none() {
        return Ok(controller.state().extracted_text().to_string());
    }

    let mut sections = Vec::new();
    if let Some(kind) = kind
        && let ActionOutcome::Done(output) = controller.analyze(kind).await
    {
        sections.push(format_analysis(&output, config.with_using_tokens));
    }

    if let Some(path) = config.audio_out.as_deref() {
        match controller.synthesize(voice).await {
            ActionOutcome::Done(clip) => {
                let path = PathBuf::from(path);
                speech::write_audio_file(&path, &clip)?;
                sections.push(format!("audio: {}", path.display()));
            }
            ActionOutcome::NothingToSay | ActionOutcome::NothingToProcess => {
                sections.push("Nessun testo leggibile dopo la pulizia: audio non generato.".to_string());
            }
            ActionOutcome::Failed(message) => {
                return Err(anyhow!("speech synthesis failed: {}", message));
            }
        }
    }
    Ok(sections.join("\n\n"))
}

/// Serve the single-page app until the process is stopped.
pub async fn serve(config: Config, services: Services) -> Result<()> {
    let addr = config
        .addr
        .clone()
        .unwrap_or_else(|| services.settings.server_addr.clone());
    server::run_server(services, addr)
        .await
        .with_context(|| "server stopped")
}

pub(crate) fn parse_voice(value: Option<&str>, engine: SpeechEngine) -> Result<Voice> {
    let voice = match value {
        Some(value) => Voice::parse(value)
            .ok_or_else(|| anyhow!("unknown voice: {} (standard, female, male)", value))?,
        None => engine.voices()[0],
    };
    if !engine.voices().contains(&voice) && voice != Voice::Standard {
        return Err(anyhow!(
            "voice {} is not available with the {} engine",
            voice.as_str(),
            engine.as_str()
        ));
    }
    Ok(voice)
}

fn format_analysis(output: &AnalysisOutput, with_using_tokens: bool) -> String {
    let mut text = format!("## {}\n\n{}", output.kind.label(), output.text);
    if with_using_tokens {
        text.push('\n');
        text.push_str(&format!(
            "model: {}\n{}",
            output.model.as_deref().unwrap_or("unavailable"),
            format_usage(output.usage.as_ref())
        ));
    }
    text
}

fn format_usage(usage: Option<&ProviderUsage>) -> String {
    let Some(usage) = usage else {
        return "tokens: unavailable".to_string();
    };
    let total = usage.total_tokens.or_else(|| {
        usage
            .prompt_tokens
            .zip(usage.completion_tokens)
            .map(|(prompt, completion)| prompt + completion)
    });

    let mut parts = Vec::new();
    if let Some(prompt) = usage.prompt_tokens {
        parts.push(format!("prompt={}", prompt));
    }
    if let Some(completion) = usage.completion_tokens {
        parts.push(format!("completion={}", completion));
    }
    if let Some(total) = total {
        parts.push(format!("total={}", total));
    }

    if parts.is_empty() {
        "tokens: unavailable".to_string()
    } else {
        format!("tokens: {}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_line_fills_in_total() {
        let usage = ProviderUsage {
            prompt_tokens: Some(10),
            completion_tokens: Some(5),
            total_tokens: None,
        };
        assert_eq!(
            format_usage(Some(&usage)),
            "tokens: prompt=10, completion=5, total=15"
        );
        assert_eq!(format_usage(None), "tokens: unavailable");
    }

    #[test]
    fn voice_defaults_follow_engine() {
        assert_eq!(parse_voice(None, SpeechEngine::Basic).unwrap(), Voice::Standard);
        assert_eq!(parse_voice(None, SpeechEngine::Neural).unwrap(), Voice::Female);
        assert_eq!(
            parse_voice(Some("uomo"), SpeechEngine::Neural).unwrap(),
            Voice::Male
        );
        let err = parse_voice(Some("male"), SpeechEngine::Basic).unwrap_err();
        assert_eq!(err.to_string(), "voice male is not available with the basic engine");
    }

    #[test]
    fn analysis_section_has_label_heading() {
        let output = AnalysisOutput {
            kind: AnalysisKind::ActionItems,
            text: "- Chiamare Bob".to_string(),
            html: String::new(),
            failed: false,
            model: Some("gemini-test".to_string()),
            usage: None,
        };
        assert_eq!(format_analysis(&output, false), "## Action Items\n\n- Chiamare Bob");
        assert_eq!(
            format_analysis(&output, true),
            "## Action Items\n\n- Chiamare Bob\nmodel: gemini-test\ntokens: unavailable"
        );
    }
}
