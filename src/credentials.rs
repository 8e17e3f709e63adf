use anyhow::{Result, anyhow};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::Path;
use tracing::{debug, warn};

use crate::settings::Settings;

const KEY_ENV_VARS: [&str; 2] = ["GOOGLE_API_KEY", "GEMINI_API_KEY"];

/// Where the Gemini key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Flag,
    Environment,
    Secrets,
    Prompt,
}

/// Resolve the Gemini API key: explicit override, then the environment,
/// then the `[secrets]` settings, then `prompt`. No key is an error.
pub fn resolve_api_key<F>(
    override_key: Option<&str>,
    settings: &Settings,
    prompt: F,
) -> Result<(String, KeySource)>
where
    F: FnOnce() -> Result<Option<String>>,
{
    if let Some(key) = override_key.and_then(non_blank) {
        return Ok((key, KeySource::Flag));
    }
    if let Some(key) = KEY_ENV_VARS.iter().find_map(|name| get_env(name)) {
        return Ok((key, KeySource::Environment));
    }
    if let Some(key) = settings.google_api_key.as_deref().and_then(non_blank) {
        return Ok((key, KeySource::Secrets));
    }
    if let Some(key) = prompt()?.as_deref().and_then(non_blank) {
        return Ok((key, KeySource::Prompt));
    }
    warn!("Google Gemini API key is missing");
    Err(anyhow!(
        "no API key found (checked --key, GOOGLE_API_KEY/GEMINI_API_KEY, [secrets] google_api_key)"
    ))
}

/// Load `.env` from the working directory, if there is one. Variables
/// already set in the environment are kept.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(err) if err.not_found() => {}
        Err(err) => warn!("failed to load .env: {}", err),
    }
}

/// Load `dir/.env`; returns whether a file was read.
pub fn load_dotenv_from(dir: &Path) -> Result<bool> {
    match dotenvy::from_path(dir.join(".env")) {
        Ok(()) => Ok(true),
        Err(err) if err.not_found() => Ok(false),
        Err(err) => Err(anyhow!("failed to load {}: {}", dir.join(".env").display(), err)),
    }
}

/// Ask for the key on the terminal; returns `None` when stdin is not one.
pub fn prompt_for_key() -> Result<Option<String>> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Ok(None);
    }
    eprint!("Inserisci Google Gemini API Key: ");
    io::stderr().flush()?;
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    Ok(non_blank(&line))
}

/// Key for Cloud Text-to-Speech, when it differs from the Gemini key.
pub fn resolve_tts_key(settings: &Settings) -> Option<String> {
    get_env("GOOGLE_TTS_API_KEY").or_else(|| settings.tts_api_key.as_deref().and_then(non_blank))
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
