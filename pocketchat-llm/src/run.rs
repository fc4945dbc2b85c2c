//! The autoregressive decode loop.
//!
//! One [`Generator::run`] call is one generation session: ask the engine for a token,
//! stop on EOS or cancellation, drop the thinking preamble, and push the full decoded
//! text to a sink whenever a kept token changes it. [`Generator::spawn`] runs the same loop on a
//! worker thread and hands the engine back on join.
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::JoinHandle;

use crate::config::ModelConfig;
use crate::serve::{InferenceEngine, TextSink};
use crate::tokenizer::Tokenizer;
use crate::{LLMError, Result, TokenId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        self != SessionState::Running
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::Running,
            1 => SessionState::Completed,
            2 => SessionState::Cancelled,
            _ => SessionState::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Eos,
    MaxTokens,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationStatus {
    Completed(StopReason),
    Cancelled,
    Failed(String),
}

impl GenerationStatus {
    pub fn state(&self) -> SessionState {
        match self {
            GenerationStatus::Completed(_) => SessionState::Completed,
            GenerationStatus::Cancelled => SessionState::Cancelled,
            GenerationStatus::Failed(_) => SessionState::Failed,
        }
    }
}

/// Cooperative cancellation flag, checked once per loop iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Session state readable from other threads. Leaves `Running` at most once.
#[derive(Debug, Clone)]
struct SharedState(Arc<AtomicU8>);

impl SharedState {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(SessionState::Running as u8)))
    }

    fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn finish(&self, state: SessionState) {
        let _ = self.0.compare_exchange(
            SessionState::Running as u8,
            state as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

// Marks the session failed if the worker unwinds before reaching a terminal state.
struct FailOnUnwind(SharedState);

impl Drop for FailOnUnwind {
    fn drop(&mut self) {
        self.0.finish(SessionState::Failed);
    }
}

/// Stop and skip rules for a session.
#[derive(Debug, Clone, Default)]
pub struct GenerationPolicy {
    pub eos_token_ids: HashSet<TokenId>,
    /// Leading tokens discarded before anything is shown.
    pub skip_preamble: usize,
    pub max_new_tokens: Option<usize>,
}

impl From<&ModelConfig> for GenerationPolicy {
    fn from(config: &ModelConfig) -> Self {
        Self {
            eos_token_ids: config.eos_token_ids.clone(),
            skip_preamble: if config.thinking_mode_available {
                config.thinking_preamble_tokens
            } else {
                0
            },
            max_new_tokens: config.max_new_tokens,
        }
    }
}

/// Final state of a session. Partial output survives cancellation and failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub status: GenerationStatus,
    /// Tokens kept after the preamble, in production order.
    pub generated_ids: Vec<TokenId>,
    pub text: String,
    /// Preamble tokens discarded before display.
    pub skipped: usize,
    /// Every non-EOS token the engine produced, skipped ones included.
    pub total_tokens: usize,
}

// Mutable per-request state, owned by the loop.
struct GenerationSession {
    produced: Vec<TokenId>,
    generated_ids: Vec<TokenId>,
    skipped: usize,
    text: String,
}

impl GenerationSession {
    fn new() -> Self {
        Self {
            produced: Vec::new(),
            generated_ids: Vec::new(),
            skipped: 0,
            text: String::new(),
        }
    }

    fn into_outcome(self, status: GenerationStatus) -> SessionOutcome {
        SessionOutcome {
            status,
            total_tokens: self.produced.len(),
            generated_ids: self.generated_ids,
            text: self.text,
            skipped: self.skipped,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Generator {
    tokenizer: Arc<Tokenizer>,
    policy: GenerationPolicy,
}

impl Generator {
    pub fn new(tokenizer: Arc<Tokenizer>, policy: GenerationPolicy) -> Self {
        Self { tokenizer, policy }
    }

    pub fn for_model(tokenizer: Arc<Tokenizer>, config: &ModelConfig) -> Self {
        Self::new(tokenizer, GenerationPolicy::from(config))
    }

    pub fn policy(&self) -> &GenerationPolicy {
        &self.policy
    }

    /// Run one session to completion on the current thread.
    pub fn run<E, S>(
        &self,
        engine: &mut E,
        input_ids: &[TokenId],
        cancel: &CancelToken,
        sink: &mut S,
    ) -> SessionOutcome
    where
        E: InferenceEngine + ?Sized,
        S: TextSink + ?Sized,
    {
        log::info!("Generation started with {} input tokens", input_ids.len());
        let mut session = GenerationSession::new();

        let status = loop {
            if cancel.is_cancelled() {
                break GenerationStatus::Cancelled;
            }
            if self
                .policy
                .max_new_tokens
                .is_some_and(|max| session.produced.len() >= max)
            {
                break GenerationStatus::Completed(StopReason::MaxTokens);
            }

            let token = match engine.next_token(input_ids, &session.produced) {
                Ok(token) => token,
                Err(err) => break GenerationStatus::Failed(err.to_string()),
            };
            if self.policy.eos_token_ids.contains(&token) {
                break GenerationStatus::Completed(StopReason::Eos);
            }

            if session.produced.len() < self.policy.skip_preamble {
                log::debug!("Skipping preamble token {token}");
                session.skipped += 1;
            } else {
                session.generated_ids.push(token);
                let text = self.tokenizer.decode(&session.generated_ids);
                // Ids with an empty fragment leave the text as it was.
                if text != session.text {
                    session.text = text;
                    sink.on_text(&session.text);
                }
            }
            session.produced.push(token);
        };

        engine.end_session();

        match &status {
            GenerationStatus::Completed(reason) => log::info!(
                "Generation completed ({reason:?}) after {} tokens",
                session.produced.len()
            ),
            GenerationStatus::Cancelled => log::info!(
                "Generation cancelled after {} tokens",
                session.produced.len()
            ),
            GenerationStatus::Failed(reason) => log::warn!("Generation failed: {reason}"),
        }

        session.into_outcome(status)
    }

    /// Run one session on a worker thread.
    pub fn spawn<E, S>(&self, mut engine: E, input_ids: Vec<TokenId>, mut sink: S) -> GenerationHandle<E>
    where
        E: InferenceEngine + Send + 'static,
        S: TextSink + Send + 'static,
    {
        let cancel = CancelToken::new();
        let state = SharedState::new();
        let generator = self.clone();

        let worker = {
            let cancel = cancel.clone();
            let state = state.clone();
            std::thread::spawn(move || {
                let guard = FailOnUnwind(state);
                let outcome = generator.run(&mut engine, &input_ids, &cancel, &mut sink);
                guard.0.finish(outcome.status.state());
                (engine, outcome)
            })
        };

        GenerationHandle {
            cancel,
            state,
            worker,
        }
    }
}

/// A session running on a worker thread.
#[derive(Debug)]
pub struct GenerationHandle<E> {
    cancel: CancelToken,
    state: SharedState,
    worker: JoinHandle<(E, SessionOutcome)>,
}

impl<E> GenerationHandle<E> {
    /// Request cancellation. Takes effect before the next engine call.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the session to end and take the engine back.
    pub fn join(self) -> Result<(E, SessionOutcome)> {
        self.worker
            .join()
            .map_err(|_| LLMError::InferenceError("generation worker panicked".to_string()))
    }
}
