use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::AnalysisKind;
use crate::normalizer::{CleaningPolicy, Replacement};
use crate::speech::SpeechEngine;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub model: String,
    pub gemini_base_url: Option<String>,
    pub instructions: Instructions,
    pub speech_engine: SpeechEngine,
    pub speech_language: String,
    pub neural_language: String,
    pub female_voice: String,
    pub male_voice: String,
    pub cleaning: CleaningPolicy,
    pub server_addr: String,
    /// Largest accepted `/upload` body, in MiB.
    pub max_upload_mb: usize,
    /// Idle time after which a web session and its results are dropped.
    pub session_ttl_minutes: u64,
    pub google_api_key: Option<String>,
    pub tts_api_key: Option<String>,
}

/// Instruction sent in front of the document for each analysis kind.
#[derive(Debug, Clone)]
pub struct Instructions {
    pub synthesis: String,
    pub validation: String,
    pub action_items: String,
    pub critique: String,
}

impl Default for Instructions {
    fn default() -> Self {
        Self {
            synthesis: AnalysisKind::Synthesis.default_instruction().to_string(),
            validation: AnalysisKind::Validation.default_instruction().to_string(),
            action_items: AnalysisKind::ActionItems.default_instruction().to_string(),
            critique: AnalysisKind::Critique.default_instruction().to_string(),
        }
    }
}

impl Instructions {
    pub fn for_kind(&self, kind: AnalysisKind) -> &str {
        match kind {
            AnalysisKind::Synthesis => &self.synthesis,
            AnalysisKind::Validation => &self.validation,
            AnalysisKind::ActionItems => &self.action_items,
            AnalysisKind::Critique => &self.critique,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: crate::providers::DEFAULT_MODEL.to_string(),
            gemini_base_url: None,
            instructions: Instructions::default(),
            speech_engine: SpeechEngine::Basic,
            speech_language: "it".to_string(),
            neural_language: "it-IT".to_string(),
            female_voice: "it-IT-Neural2-A".to_string(),
            male_voice: "it-IT-Neural2-C".to_string(),
            cleaning: CleaningPolicy::default(),
            server_addr: "127.0.0.1:8501".to_string(),
            max_upload_mb: 50,
            session_ttl_minutes: 60,
            google_api_key: None,
            tts_api_key: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    gemini: Option<GeminiSettings>,
    analysis: Option<AnalysisSettings>,
    speech: Option<SpeechSettings>,
    cleaning: Option<CleaningSettings>,
    server: Option<ServerSettings>,
    secrets: Option<SecretSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct GeminiSettings {
    model: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AnalysisSettings {
    synthesis: Option<String>,
    validation: Option<String>,
    action_items: Option<String>,
    critique: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SpeechSettings {
    engine: Option<String>,
    language: Option<String>,
    neural_language: Option<String>,
    female_voice: Option<String>,
    male_voice: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CleaningSettings {
    replacement: Option<String>,
    strip_glyphs: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSettings {
    addr: Option<String>,
    max_upload_mb: Option<usize>,
    session_ttl_minutes: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SecretSettings {
    google_api_key: Option<String>,
    tts_api_key: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed = parse_settings(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed)?;
        }
    }

    Ok(settings)
}

fn parse_settings(content: &str) -> Result<SettingsFile> {
    Ok(toml::from_str(content)?)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) -> Result<()> {
        if let Some(gemini) = incoming.gemini {
            if let Some(model) = non_empty(gemini.model) {
                self.model = model;
            }
            if let Some(base_url) = non_empty(gemini.base_url) {
                self.gemini_base_url = Some(base_url);
            }
        }
        if let Some(analysis) = incoming.analysis {
            if let Some(value) = non_empty(analysis.synthesis) {
                self.instructions.synthesis = value;
            }
            if let Some(value) = non_empty(analysis.validation) {
                self.instructions.validation = value;
            }
            if let Some(value) = non_empty(analysis.action_items) {
                self.instructions.action_items = value;
            }
            if let Some(value) = non_empty(analysis.critique) {
                self.instructions.critique = value;
            }
        }
        if let Some(speech) = incoming.speech {
            if let Some(engine) = non_empty(speech.engine) {
                self.speech_engine = SpeechEngine::parse(&engine)
                    .ok_or_else(|| anyhow!("unknown speech engine '{}'", engine))?;
            }
            if let Some(language) = non_empty(speech.language) {
                self.speech_language = language;
            }
            if let Some(language) = non_empty(speech.neural_language) {
                self.neural_language = language;
            }
            if let Some(voice) = non_empty(speech.female_voice) {
                self.female_voice = voice;
            }
            if let Some(voice) = non_empty(speech.male_voice) {
                self.male_voice = voice;
            }
        }
        if let Some(cleaning) = incoming.cleaning {
            if let Some(replacement) = non_empty(cleaning.replacement) {
                self.cleaning.replacement = Replacement::parse(&replacement)
                    .ok_or_else(|| anyhow!("unknown cleaning replacement '{}'", replacement))?;
            }
            if let Some(strip) = cleaning.strip_glyphs {
                self.cleaning.strip_glyphs = strip;
            }
        }
        if let Some(server) = incoming.server {
            if let Some(addr) = non_empty(server.addr) {
                self.server_addr = addr;
            }
            if let Some(limit) = server.max_upload_mb {
                if limit == 0 {
                    return Err(anyhow!("[server] max_upload_mb must be greater than 0"));
                }
                self.max_upload_mb = limit;
            }
            if let Some(ttl) = server.session_ttl_minutes {
                if ttl == 0 {
                    return Err(anyhow!("[server] session_ttl_minutes must be greater than 0"));
                }
                self.session_ttl_minutes = ttl;
            }
        }
        if let Some(secrets) = incoming.secrets {
            if let Some(key) = non_empty(secrets.google_api_key) {
                self.google_api_key = Some(key);
            }
            if let Some(key) = non_empty(secrets.tts_api_key) {
                self.tts_api_key = Some(key);
            }
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".pdf-ai-audio-rust"))
        }
    })
}
