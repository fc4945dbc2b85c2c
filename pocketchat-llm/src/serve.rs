//! Abstract interfaces for serving LLMs
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ModelConfig;
use crate::{LLMError, Result, TokenId};

/// Who wrote a chat message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Message type for use with instruct models
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// The neural network, seen from the outside: given the prompt and everything generated so
/// far, produce one more token.
///
/// Implementations may cache state keyed on the growing sequence (KV cache etc.); callers
/// only ever append to `generated`. Engine-held resources are released when the engine is
/// dropped.
pub trait InferenceEngine {
    fn next_token(&mut self, input_ids: &[TokenId], generated: &[TokenId]) -> Result<TokenId>;

    /// Called exactly once when a generation session terminates, whatever the outcome.
    fn end_session(&mut self) {}
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn next_token(&mut self, input_ids: &[TokenId], generated: &[TokenId]) -> Result<TokenId> {
        (**self).next_token(input_ids, generated)
    }

    fn end_session(&mut self) {
        (**self).end_session()
    }
}

/// A *loader* turns a model configuration into a ready engine, failing with
/// [`LLMError::LoadError`] when model assets are missing or malformed.
pub trait Loader {
    type Engine: InferenceEngine;

    fn load(&self, config: &ModelConfig) -> Result<Self::Engine>;
}

/// Receives the complete decoded text after every visible token.
pub trait TextSink {
    fn on_text(&mut self, full_text: &str);
}

impl<F: FnMut(&str)> TextSink for F {
    fn on_text(&mut self, full_text: &str) {
        self(full_text)
    }
}

/// Replays a fixed token list. Useful for tests and for driving the orchestrator without
/// model weights.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    script: Vec<TokenId>,
    position: usize,
    fail_at: Option<usize>,
    delay: Option<Duration>,
    /// Number of `next_token` calls made so far.
    pub calls: usize,
    /// Number of sessions that have ended.
    pub sessions_ended: usize,
    /// Length of `generated` seen on each call.
    pub generated_lens: Vec<usize>,
}

impl ScriptedEngine {
    pub fn new(script: Vec<TokenId>) -> Self {
        Self {
            script,
            ..Default::default()
        }
    }

    /// Fail with an inference error on the `step`th call (0-based).
    pub fn fail_at(mut self, step: usize) -> Self {
        self.fail_at = Some(step);
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the script and rewind, for driving another session with the same engine.
    pub fn reset(&mut self, script: Vec<TokenId>) {
        self.script = script;
        self.position = 0;
    }
}

impl InferenceEngine for ScriptedEngine {
    fn next_token(&mut self, _input_ids: &[TokenId], generated: &[TokenId]) -> Result<TokenId> {
        let step = self.calls;
        self.calls += 1;
        self.generated_lens.push(generated.len());

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail_at == Some(step) {
            return Err(LLMError::InferenceError(format!(
                "scripted failure at step {step}"
            )));
        }

        let token = self.script.get(self.position).copied().ok_or_else(|| {
            LLMError::InferenceError(format!("script exhausted after {} tokens", self.position))
        })?;
        self.position += 1;
        Ok(token)
    }

    fn end_session(&mut self) {
        self.sessions_ended += 1;
    }
}

/// Loads a [`ScriptedEngine`] with a fixed script, ignoring the model configuration.
#[derive(Debug, Clone)]
pub struct ScriptedLoader(pub Vec<TokenId>);

impl Loader for ScriptedLoader {
    type Engine = ScriptedEngine;

    fn load(&self, config: &ModelConfig) -> Result<ScriptedEngine> {
        log::info!("Loading scripted engine for {}", config.model_name);
        Ok(ScriptedEngine::new(self.0.clone()))
    }
}
