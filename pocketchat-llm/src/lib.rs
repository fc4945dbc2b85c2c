//! Tokenization, chat prompt assembly and streaming generation for on-device LLM chat.
//!
//! The neural network itself lives behind [`serve::InferenceEngine`]; everything here is
//! the deterministic plumbing around it.
mod error;
pub mod chat;
pub mod config;
pub mod prompt;
pub mod run;
pub mod serve;
pub mod tokenizer;
pub mod utils;

pub use error::LLMError;
pub type Result<T, E = error::LLMError> = std::result::Result<T, E>;

/// Dense vocabulary index.
pub type TokenId = u32;
