//! A conversation: message history plus at most one running generation.
use std::sync::Arc;

use crate::config::ModelConfig;
use crate::prompt::{Intent, PromptBuilder};
use crate::run::{GenerationHandle, Generator, SessionOutcome, SessionState};
use crate::serve::{InferenceEngine, Loader, Message, TextSink};
use crate::tokenizer::Tokenizer;
use crate::utils::recent_window;
use crate::{LLMError, Result};

// The engine lives here while idle and moves into the worker thread while generating.
enum EngineSlot<E> {
    Idle(E),
    Busy(GenerationHandle<E>),
    // The worker panicked and took the engine with it.
    Lost,
}

pub struct Conversation<E: InferenceEngine + Send + 'static> {
    tokenizer: Arc<Tokenizer>,
    config: ModelConfig,
    generator: Generator,
    history: Vec<Message>,
    engine: EngineSlot<E>,
    last_outcome: Option<SessionOutcome>,
}

impl<E: InferenceEngine + Send + 'static> Conversation<E> {
    pub fn new(tokenizer: Arc<Tokenizer>, config: ModelConfig, engine: E) -> Self {
        let generator = Generator::for_model(Arc::clone(&tokenizer), &config);
        Self {
            tokenizer,
            config,
            generator,
            history: vec![],
            engine: EngineSlot::Idle(engine),
            last_outcome: None,
        }
    }

    pub fn load<L>(loader: &L, tokenizer: Arc<Tokenizer>, config: ModelConfig) -> Result<Self>
    where
        L: Loader<Engine = E>,
    {
        let engine = loader.load(&config)?;
        Ok(Self::new(tokenizer, config, engine))
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Outcome of the most recently joined session.
    pub fn last_outcome(&self) -> Option<&SessionOutcome> {
        self.last_outcome.as_ref()
    }

    /// State of the current or most recent session, if one is still held.
    pub fn state(&self) -> Option<SessionState> {
        match &self.engine {
            EngineSlot::Busy(handle) => Some(handle.state()),
            _ => None,
        }
    }

    pub fn is_generating(&self) -> bool {
        self.state() == Some(SessionState::Running)
    }

    /// Append a user message and start generating the reply.
    ///
    /// Any session still running is cancelled and joined first. The prompt is built from
    /// the trailing `history_window` messages.
    pub fn send<S>(&mut self, text: impl Into<String>, thinking: bool, sink: S) -> Result<()>
    where
        S: TextSink + Send + 'static,
    {
        self.cancel();
        self.wait()?;

        self.history.push(Message::user(text));
        let window = recent_window(&self.history, self.config.history_window);
        let intent = Intent::with_system_prompt(self.config.system_prompt(thinking));
        let input_ids = match PromptBuilder::new(&self.tokenizer, &self.config).build(window, &intent) {
            Ok(ids) => ids,
            Err(err) => {
                self.history.pop();
                return Err(err);
            }
        };

        match std::mem::replace(&mut self.engine, EngineSlot::Lost) {
            EngineSlot::Idle(engine) => {
                self.engine = EngineSlot::Busy(self.generator.spawn(engine, input_ids, sink));
                Ok(())
            }
            EngineSlot::Busy(handle) => {
                self.engine = EngineSlot::Busy(handle);
                self.history.pop();
                Err(LLMError::InferenceError(
                    "a generation session is still running".to_string(),
                ))
            }
            EngineSlot::Lost => {
                self.history.pop();
                Err(lost_engine())
            }
        }
    }

    /// Request cancellation of the running session, if any.
    pub fn cancel(&self) {
        if let EngineSlot::Busy(handle) = &self.engine {
            handle.cancel();
        }
    }

    /// Wait for the running session to end and record the reply in the history.
    ///
    /// Partial replies from cancelled or failed sessions are kept.
    pub fn wait(&mut self) -> Result<Option<SessionOutcome>> {
        let handle = match std::mem::replace(&mut self.engine, EngineSlot::Lost) {
            EngineSlot::Busy(handle) => handle,
            EngineSlot::Idle(engine) => {
                self.engine = EngineSlot::Idle(engine);
                return Ok(None);
            }
            EngineSlot::Lost => return Err(lost_engine()),
        };

        let (engine, outcome) = handle.join()?;
        self.engine = EngineSlot::Idle(engine);
        if !outcome.text.is_empty() {
            self.history.push(Message::assistant(outcome.text.clone()));
        }
        self.last_outcome = Some(outcome.clone());
        Ok(Some(outcome))
    }

    /// Stop any running session and forget the history.
    pub fn clear(&mut self) -> Result<()> {
        self.cancel();
        self.wait()?;
        self.history.clear();
        Ok(())
    }
}

impl<E: InferenceEngine + Send + 'static> Drop for Conversation<E> {
    fn drop(&mut self) {
        self.cancel();
        if let EngineSlot::Busy(handle) = std::mem::replace(&mut self.engine, EngineSlot::Lost) {
            let _ = handle.join();
        }
    }
}

fn lost_engine() -> LLMError {
    LLMError::InferenceError("engine lost after a worker panic".to_string())
}
