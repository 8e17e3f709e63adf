use pulldown_cmark::{Event, Options, Parser, html};
use serde::Serialize;
use tracing::{info, warn};

use crate::providers::{Provider, ProviderUsage};
use crate::settings::Instructions;

/// Separates the instruction from the document in the prompt.
pub const DOCUMENT_DELIMITER: &str = "--- TESTO PDF ---";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisKind {
    Synthesis,
    Validation,
    ActionItems,
    Critique,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 4] = [
        AnalysisKind::Synthesis,
        AnalysisKind::Validation,
        AnalysisKind::ActionItems,
        AnalysisKind::Critique,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::Synthesis => "synthesis",
            AnalysisKind::Validation => "validation",
            AnalysisKind::ActionItems => "action-items",
            AnalysisKind::Critique => "critique",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AnalysisKind::Synthesis => "Sintesi",
            AnalysisKind::Validation => "Validazione",
            AnalysisKind::ActionItems => "Action Items",
            AnalysisKind::Critique => "Critica",
        }
    }

    pub fn default_instruction(&self) -> &'static str {
        match self {
            AnalysisKind::Synthesis => "Riassumi il contenuto.",
            AnalysisKind::Validation => "Verifica i fatti.",
            AnalysisKind::ActionItems => "Estrai azioni.",
            AnalysisKind::Critique => "Trova errori.",
        }
    }

    /// Accepts the key (`action-items`, `action_items`) or the label
    /// (`Action Items`), case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        let wanted = value.trim().to_lowercase().replace(['_', ' '], "-");
        Self::ALL.into_iter().find(|kind| {
            kind.as_str() == wanted || kind.label().to_lowercase().replace(' ', "-") == wanted
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisOutput {
    pub kind: AnalysisKind,
    /// Markdown as returned by the model, or `Errore: ...`.
    pub text: String,
    pub html: String,
    pub failed: bool,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
}

pub fn build_prompt(instruction: &str, text: &str) -> String {
    format!("{}\n\n{}\n{}", instruction, DOCUMENT_DELIMITER, text)
}

/// Render the model's Markdown. Raw HTML in the reply is shown as text.
pub fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) => Event::Text(raw),
        other => other,
    });
    let mut output = String::new();
    html::push_html(&mut output, parser);
    output
}

#[derive(Debug, Clone)]
pub struct Analyzer<P: Provider> {
    provider: P,
    instructions: Instructions,
}

impl<P: Provider> Analyzer<P> {
    pub fn new(provider: P, instructions: Instructions) -> Self {
        Self {
            provider,
            instructions,
        }
    }

    /// Sends one request and never fails: an API error comes back as the
    /// result text so it can be shown in place of the analysis.
    pub async fn analyze(&self, text: &str, kind: AnalysisKind) -> AnalysisOutput {
        let prompt = build_prompt(self.instructions.for_kind(kind), text);
        info!(kind = kind.as_str(), chars = text.chars().count(), "requesting analysis");
        match self.provider.clone().append_user_input(prompt).generate().await {
            Ok(response) => AnalysisOutput {
                kind,
                html: render_markdown(&response.text),
                text: response.text,
                failed: false,
                model: response.model,
                usage: response.usage,
            },
            Err(err) => {
                warn!(kind = kind.as_str(), "analysis failed: {:#}", err);
                let text = format!("Errore: {:#}", err);
                AnalysisOutput {
                    kind,
                    html: render_markdown(&text),
                    text,
                    failed: true,
                    model: None,
                    usage: None,
                }
            }
        }
    }
}
