//! Per-session state and the three user actions: upload, analyze, synthesize.
//!
//! A session starts empty. An upload whose text differs from the held text
//! replaces it and clears the analysis and audio together; results are only
//! computed when there is text to work on.

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use crate::analysis::{AnalysisKind, AnalysisOutput, Analyzer};
use crate::extractor::{self, Document};
use crate::normalizer::CleaningPolicy;
use crate::providers::Provider;
use crate::speech::{self, AudioClip, SpeechOutcome, Synthesizer, Voice};

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    extracted_text: String,
    last_analysis: Option<AnalysisOutput>,
    last_audio: Option<AudioClip>,
    generation: u64,
}

impl SessionState {
    pub fn extracted_text(&self) -> &str {
        &self.extracted_text
    }

    pub fn last_analysis(&self) -> Option<&AnalysisOutput> {
        self.last_analysis.as_ref()
    }

    pub fn last_audio(&self) -> Option<&AudioClip> {
        self.last_audio.as_ref()
    }

    /// Bumped every time the text is replaced.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_text(&self) -> bool {
        !self.extracted_text.trim().is_empty()
    }

    /// Hold `text`, dropping derived results. Returns `false` (and keeps
    /// everything) when the text is the one already held.
    pub fn replace_text(&mut self, text: String) -> bool {
        if text == self.extracted_text && self.generation > 0 {
            return false;
        }
        self.extracted_text = text;
        self.last_analysis = None;
        self.last_audio = None;
        self.generation += 1;
        true
    }

    /// Store a result computed for `generation`; stale results are dropped.
    pub fn store_analysis(&mut self, generation: u64, output: AnalysisOutput) -> bool {
        if generation != self.generation || !self.has_text() {
            return false;
        }
        self.last_analysis = Some(output);
        true
    }

    pub fn store_audio(&mut self, generation: u64, audio: Option<AudioClip>) -> bool {
        if generation != self.generation || !self.has_text() {
            return false;
        }
        self.last_audio = audio;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadOutcome {
    NewDocument,
    Unchanged,
    /// No text could be extracted; nothing can be analyzed or read aloud.
    NothingToProcess,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome<T> {
    Done(T),
    NothingToProcess,
    /// Text exists but nothing speakable is left after cleaning.
    NothingToSay,
    Failed(String),
}

/// Extract `documents` into `state`.
pub fn upload_into(state: &mut SessionState, documents: &[Document]) -> Result<UploadOutcome> {
    let text = extractor::extract_text(documents)?;
    let outcome = apply_extracted(state, text);
    info!(documents = documents.len(), ?outcome, "document upload");
    Ok(outcome)
}

/// Hold already-extracted text in `state`.
pub fn apply_extracted(state: &mut SessionState, text: String) -> UploadOutcome {
    let has_text = !text.trim().is_empty();
    let replaced = state.replace_text(text);
    if !has_text {
        UploadOutcome::NothingToProcess
    } else if replaced {
        UploadOutcome::NewDocument
    } else {
        UploadOutcome::Unchanged
    }
}

/// Drives one session: holds its state and wires each action to the
/// extractor, the analyzer or the synthesizer.
pub struct Controller<P: Provider, S: Synthesizer> {
    analyzer: Analyzer<P>,
    synthesizer: S,
    policy: CleaningPolicy,
    state: SessionState,
}

impl<P: Provider, S: Synthesizer> Controller<P, S> {
    pub fn new(analyzer: Analyzer<P>, synthesizer: S, policy: CleaningPolicy) -> Self {
        Self {
            analyzer,
            synthesizer,
            policy,
            state: SessionState::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn upload(&mut self, documents: &[Document]) -> Result<UploadOutcome> {
        upload_into(&mut self.state, documents)
    }

    pub async fn analyze(&mut self, kind: AnalysisKind) -> ActionOutcome<AnalysisOutput> {
        if !self.state.has_text() {
            return ActionOutcome::NothingToProcess;
        }
        let generation = self.state.generation();
        let output = self
            .analyzer
            .analyze(self.state.extracted_text(), kind)
            .await;
        self.state.store_analysis(generation, output.clone());
        ActionOutcome::Done(output)
    }

    pub async fn synthesize(&mut self, voice: Voice) -> ActionOutcome<AudioClip> {
        if !self.state.has_text() {
            return ActionOutcome::NothingToProcess;
        }
        let generation = self.state.generation();
        let outcome = speech::speak(
            &self.synthesizer,
            self.state.extracted_text(),
            &self.policy,
            voice,
        )
        .await;
        match outcome {
            SpeechOutcome::Done(clip) => {
                self.state.store_audio(generation, Some(clip.clone()));
                ActionOutcome::Done(clip)
            }
            SpeechOutcome::NothingToSay => {
                self.state.store_audio(generation, None);
                ActionOutcome::NothingToSay
            }
            SpeechOutcome::Failed(message) => {
                self.state.store_audio(generation, None);
                ActionOutcome::Failed(message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::MockProvider;
    use crate::extractor::tests::build_pdf;
    use crate::settings::Instructions;
    use crate::speech::tests::MockSynthesizer;

    fn controller(
        provider: MockProvider,
        synth: MockSynthesizer,
    ) -> Controller<MockProvider, MockSynthesizer> {
        Controller::new(
            Analyzer::new(provider, Instructions::default()),
            synth,
            CleaningPolicy::default(),
        )
    }

    fn pdf(text: &str) -> Vec<Document> {
        vec![Document::new(Some("doc.pdf".to_string()), build_pdf(&[Some(text)]))]
    }

    #[tokio::test]
    async fn new_upload_clears_analysis_and_audio() {
        let mut controller = controller(
            MockProvider::replying("Riassunto"),
            MockSynthesizer::default(),
        );
        assert_eq!(controller.upload(&pdf("Primo documento")).unwrap(), UploadOutcome::NewDocument);
        assert!(matches!(
            controller.analyze(AnalysisKind::Synthesis).await,
            ActionOutcome::Done(_)
        ));
        assert!(matches!(
            controller.synthesize(Voice::Standard).await,
            ActionOutcome::Done(_)
        ));
        assert!(controller.state().last_analysis().is_some());
        assert!(controller.state().last_audio().is_some());

        assert_eq!(
            controller.upload(&pdf("Secondo documento")).unwrap(),
            UploadOutcome::NewDocument
        );
        assert!(controller.state().extracted_text().contains("Secondo documento"));
        assert!(controller.state().last_analysis().is_none());
        assert!(controller.state().last_audio().is_none());
    }

    #[tokio::test]
    async fn same_upload_keeps_results() {
        let mut controller = controller(MockProvider::replying("ok"), MockSynthesizer::default());
        controller.upload(&pdf("Stesso testo")).unwrap();
        controller.analyze(AnalysisKind::Critique).await;
        assert_eq!(controller.upload(&pdf("Stesso testo")).unwrap(), UploadOutcome::Unchanged);
        assert!(controller.state().last_analysis().is_some());
    }

    #[tokio::test]
    async fn textless_pdf_reports_nothing_to_process() {
        let provider = MockProvider::replying("never");
        let synth = MockSynthesizer::default();
        let mut controller = controller(provider.clone(), synth.clone());
        let documents = vec![Document::new(None, build_pdf(&[None]))];

        assert_eq!(controller.upload(&documents).unwrap(), UploadOutcome::NothingToProcess);
        assert_eq!(controller.state().extracted_text(), "");
        assert_eq!(
            controller.analyze(AnalysisKind::Synthesis).await,
            ActionOutcome::NothingToProcess
        );
        assert_eq!(
            controller.synthesize(Voice::Female).await,
            ActionOutcome::NothingToProcess
        );
        assert!(provider.calls().is_empty());
        assert!(synth.calls().is_empty());
    }

    #[tokio::test]
    async fn analysis_failure_is_shown_as_result() {
        let mut controller = controller(MockProvider::failing(), MockSynthesizer::default());
        controller.upload(&pdf("Testo")).unwrap();
        let ActionOutcome::Done(output) = controller.analyze(AnalysisKind::Validation).await else {
            panic!("analysis should always produce a result");
        };
        assert!(output.failed);
        assert!(output.text.starts_with("Errore: "));
        assert_eq!(controller.state().last_analysis().unwrap().text, output.text);
    }

    #[tokio::test]
    async fn synthesis_failure_leaves_no_audio() {
        let mut controller = controller(MockProvider::replying("ok"), MockSynthesizer::failing());
        controller.upload(&pdf("Testo da leggere")).unwrap();
        assert_eq!(
            controller.synthesize(Voice::Male).await,
            ActionOutcome::Failed("voice service down".to_string())
        );
        assert!(controller.state().last_audio().is_none());
    }

    #[tokio::test]
    async fn symbols_only_text_is_not_synthesized() {
        let synth = MockSynthesizer::default();
        let mut controller = controller(MockProvider::replying("ok"), synth.clone());
        controller.upload(&pdf("*** ### @@@")).unwrap();
        assert_eq!(controller.synthesize(Voice::Standard).await, ActionOutcome::NothingToSay);
        assert!(synth.calls().is_empty());
    }

    #[test]
    fn stale_results_are_dropped() {
        let mut state = SessionState::default();
        state.replace_text("uno".to_string());
        let stale = state.generation();
        state.replace_text("due".to_string());
        assert!(!state.store_audio(stale, Some(AudioClip::mp3(vec![1]))));
        assert!(state.last_audio().is_none());
        assert!(state.store_audio(state.generation(), Some(AudioClip::mp3(vec![1]))));
    }
}
