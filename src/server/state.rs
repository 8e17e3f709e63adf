use anyhow::Result;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::page;
use crate::Services;
use crate::analysis::Analyzer;
use crate::normalizer::CleaningPolicy;
use crate::providers::{Gemini, Provider};
use crate::session::SessionState;
use crate::speech::{SpeechBackend, SpeechEngine, Synthesizer};

#[derive(Debug, Clone, Copy)]
pub(crate) struct ServerLimits {
    pub(crate) max_upload_bytes: usize,
    pub(crate) session_ttl: Duration,
}

impl ServerLimits {
    pub(crate) fn from_settings(settings: &crate::settings::Settings) -> Self {
        Self {
            max_upload_bytes: settings.max_upload_mb.saturating_mul(1024 * 1024),
            session_ttl: Duration::from_secs(settings.session_ttl_minutes.saturating_mul(60)),
        }
    }
}

struct SessionEntry {
    state: SessionState,
    last_seen: Instant,
}

/// Sessions keyed by cookie. Every access drops the ones idle for longer
/// than `ttl` and refreshes the one it touches.
pub(crate) struct SessionStore {
    entries: HashMap<String, SessionEntry>,
    ttl: Duration,
}

impl SessionStore {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub(crate) fn get(&mut self, id: &str) -> Option<&SessionState> {
        self.get_mut(id).map(|state| &*state)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut SessionState> {
        let now = Instant::now();
        self.evict_expired(now);
        self.entries.get_mut(id).map(|entry| {
            entry.last_seen = now;
            &mut entry.state
        })
    }

    /// The session for `id`, created empty when missing or expired.
    pub(crate) fn entry(&mut self, id: String) -> &mut SessionState {
        let now = Instant::now();
        self.evict_expired(now);
        let entry = self.entries.entry(id).or_insert_with(|| SessionEntry {
            state: SessionState::default(),
            last_seen: now,
        });
        entry.last_seen = now;
        &mut entry.state
    }

    /// Drop sessions idle since before `now - ttl`; returns how many.
    pub(crate) fn evict_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= ttl);
        before - self.entries.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Shared by every request. The session lock is only held while reading or
/// writing a `SessionState`.
pub(crate) struct ServerState<P: Provider, S: Synthesizer> {
    pub(crate) analyzer: Analyzer<P>,
    pub(crate) synthesizer: S,
    pub(crate) policy: CleaningPolicy,
    pub(crate) engine: SpeechEngine,
    pub(crate) limits: ServerLimits,
    pub(crate) index_html: String,
    pub(crate) sessions: Mutex<SessionStore>,
}

impl<P: Provider, S: Synthesizer> ServerState<P, S> {
    pub(crate) fn new(
        analyzer: Analyzer<P>,
        synthesizer: S,
        policy: CleaningPolicy,
        engine: SpeechEngine,
        model: &str,
        limits: ServerLimits,
    ) -> Result<Self> {
        Ok(Self {
            index_html: page::render_index(engine, model)?,
            analyzer,
            synthesizer,
            policy,
            engine,
            limits,
            sessions: Mutex::new(SessionStore::new(limits.session_ttl)),
        })
    }

    /// Text and generation of a session that has something to process.
    pub(crate) async fn snapshot(&self, session: &str) -> Option<(String, u64)> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .get(session)
            .filter(|state| state.has_text())
            .map(|state| (state.extracted_text().to_string(), state.generation()))
    }
}

impl ServerState<Gemini, SpeechBackend> {
    pub(crate) fn from_services(services: Services) -> Result<Self> {
        let Services {
            settings,
            provider,
            synthesizer,
        } = services;
        let model = provider.model().to_string();
        Self::new(
            Analyzer::new(provider, settings.instructions.clone()),
            synthesizer,
            settings.cleaning,
            settings.speech_engine,
            &model,
            ServerLimits::from_settings(&settings),
        )
    }
}
