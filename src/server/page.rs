use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tera::{Context as TeraContext, Tera};

use crate::analysis::AnalysisKind;
use crate::speech::{AUDIO_FILE_NAME, SpeechEngine};

#[derive(Serialize)]
struct SelectOption {
    value: &'static str,
    label: &'static str,
}

pub(crate) fn render_index(engine: SpeechEngine, model: &str) -> Result<String> {
    let template = load_template("index.html.tera")?;
    let kinds = AnalysisKind::ALL
        .iter()
        .map(|kind| SelectOption {
            value: kind.as_str(),
            label: kind.label(),
        })
        .collect::<Vec<_>>();
    let voices = engine
        .voices()
        .iter()
        .map(|voice| SelectOption {
            value: voice.as_str(),
            label: voice.label(),
        })
        .collect::<Vec<_>>();

    let mut context = TeraContext::new();
    context.insert("kinds", &kinds);
    context.insert("voices", &voices);
    context.insert("show_voice_select", &(voices.len() > 1));
    context.insert("engine", engine.as_str());
    context.insert("model", model);
    context.insert("audio_file_name", AUDIO_FILE_NAME);
    Tera::one_off(&template, &context, true).with_context(|| "failed to render index template")
}

fn load_template(name: &str) -> Result<String> {
    let path = template_path(name);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read page template: {}", path.display()))
}

fn template_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("src")
        .join("server")
        .join("templates")
        .join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neural_page_offers_both_voices() {
        let html = render_index(SpeechEngine::Neural, "gemini-test").unwrap();
        assert!(html.contains(r#"<option value="action-items">Action Items</option>"#));
        assert!(html.contains(r#"<option value="female">Donna</option>"#));
        assert!(html.contains(r#"<option value="male">Uomo</option>"#));
        assert!(html.contains("gemini-test"));
    }

    #[test]
    fn basic_page_hides_voice_select() {
        let html = render_index(SpeechEngine::Basic, "gemini-test").unwrap();
        assert!(!html.contains(r#"id="voice""#));
        assert!(html.contains(AUDIO_FILE_NAME));
    }
}
