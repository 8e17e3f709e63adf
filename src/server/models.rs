use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisOutput;
use crate::session::{SessionState, UploadOutcome};
use crate::speech::{SpeechEngine, Voice};

#[derive(Debug, Deserialize)]
pub(crate) struct UploadRequest {
    #[serde(default)]
    pub(crate) documents: Vec<UploadDocument>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadDocument {
    pub(crate) name: Option<String>,
    pub(crate) data_base64: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UploadResponse {
    pub(crate) outcome: UploadOutcome,
    pub(crate) chars: usize,
    pub(crate) message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AnalyzeRequest {
    pub(crate) kind: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SynthesizeRequest {
    pub(crate) voice: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum ActionStatus {
    Done,
    NothingToProcess,
    NothingToSay,
    Failed,
}

#[derive(Debug, Serialize)]
pub(crate) struct AnalyzeResponse {
    pub(crate) status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) analysis: Option<AnalysisOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SynthesizeResponse {
    pub(crate) status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) audio_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) mime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

impl SynthesizeResponse {
    pub(crate) fn status(status: ActionStatus, message: &str) -> Self {
        Self {
            status,
            audio_base64: None,
            mime: None,
            message: Some(message.to_string()),
            error: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StateResponse {
    pub(crate) has_text: bool,
    pub(crate) extracted_text: String,
    pub(crate) generation: u64,
    pub(crate) analysis: Option<AnalysisOutput>,
    pub(crate) has_audio: bool,
    pub(crate) engine: SpeechEngine,
    pub(crate) voices: Vec<Voice>,
}

impl StateResponse {
    pub(crate) fn new(state: &SessionState, engine: SpeechEngine) -> Self {
        Self {
            has_text: state.has_text(),
            extracted_text: state.extracted_text().to_string(),
            generation: state.generation(),
            analysis: state.last_analysis().cloned(),
            has_audio: state.last_audio().is_some(),
            engine,
            voices: engine.voices().to_vec(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}
