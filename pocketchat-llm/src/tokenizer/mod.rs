//! Byte-pair-encoding tokenizer over a fixed subword vocabulary.
//!
//! Text is split into whitespace and non-whitespace runs, spaces and newlines
//! are mapped to the `Ġ`/`Ċ` glyphs used by GPT-2 style vocabularies, and each
//! run is merged independently with the ranked merge table.
mod bpe;
mod loader;
mod vocab;

pub use bpe::{NEWLINE_GLYPH, SPACE_GLYPH, bpe, pre_tokenize};
pub use loader::TokenizerParts;
pub use vocab::{MergeTable, SpecialTokens, Vocabulary};

use std::collections::HashMap;
use std::path::Path;
use unicode_normalization::UnicodeNormalization;

use crate::{LLMError, Result, TokenId};

/// What `encode` does with a subword that has no vocabulary id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownTokenPolicy {
    /// Skip the subword and log a warning. Lossy for characters outside the
    /// trained vocabulary.
    #[default]
    Drop,
    /// Fail the whole call with [`LLMError::TokenizationError`].
    Fail,
}

#[derive(Debug, Clone)]
pub struct TokenizerOptions {
    pub unknown_policy: UnknownTokenPolicy,
    /// Special token prepended when `add_special_tokens` is set.
    pub sequence_start: String,
    /// Special token appended when `add_special_tokens` is set.
    pub sequence_end: String,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self {
            unknown_policy: UnknownTokenPolicy::Drop,
            sequence_start: "<|im_start|>".to_string(),
            sequence_end: "<|im_end|>".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tokenizer {
    vocab: Vocabulary,
    merges: MergeTable,
    special_tokens: SpecialTokens,
    nfc: bool,
    options: TokenizerOptions,
    decode_cache: HashMap<TokenId, String>,
}

// Display fragment for a single vocabulary entry.
fn display_fragment(token: &str) -> String {
    match token.strip_prefix(SPACE_GLYPH) {
        Some(rest) => format!(" {}", bpe::from_glyphs(rest)),
        None => bpe::from_glyphs(token),
    }
}

impl Tokenizer {
    pub fn new(parts: TokenizerParts, options: TokenizerOptions) -> Self {
        let TokenizerParts {
            vocab,
            merges,
            special_tokens,
            nfc,
        } = parts;

        let mut decode_cache: HashMap<TokenId, String> = vocab
            .iter()
            .map(|(id, token)| (id, display_fragment(token)))
            .collect();
        for (token, id) in special_tokens.iter() {
            decode_cache
                .entry(id)
                .or_insert_with(|| token.to_string());
        }

        log::debug!(
            "Tokenizer loaded: vocab={}, merges={}, special_tokens={}, NFC={}",
            vocab.len(),
            merges.len(),
            special_tokens.len(),
            nfc
        );

        Self {
            vocab,
            merges,
            special_tokens,
            nfc,
            options,
            decode_cache,
        }
    }

    /// Parse a HuggingFace `tokenizer.json` string.
    pub fn from_json_str(json: &str, options: TokenizerOptions) -> Result<Self> {
        Ok(Self::new(loader::parse(json)?, options))
    }

    pub fn from_file<P: AsRef<Path>>(path: P, options: TokenizerOptions) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|err| {
            LLMError::LoadError(format!("tokenizer {}: {err}", path.display()))
        })?;
        Self::from_json_str(&json, options)
    }

    pub fn options(&self) -> &TokenizerOptions {
        &self.options
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn special_tokens(&self) -> &SpecialTokens {
        &self.special_tokens
    }

    pub fn normalizes(&self) -> bool {
        self.nfc
    }

    fn normalize(&self, text: &str) -> String {
        if self.nfc {
            text.nfc().collect()
        } else {
            text.to_string()
        }
    }

    /// Convert text into token ids.
    pub fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<TokenId>> {
        let mut ids = Vec::new();

        if add_special_tokens {
            ids.extend(self.special_tokens.id(&self.options.sequence_start));
        }

        let text = self.normalize(text);
        for chunk in pre_tokenize(&text) {
            let mapped = bpe::to_glyphs(chunk);
            for piece in bpe(&mapped, &self.merges) {
                match self.vocab.id(&piece) {
                    Some(id) => ids.push(id),
                    None => match self.options.unknown_policy {
                        UnknownTokenPolicy::Drop => {
                            log::warn!("Token not found in vocab, dropping: {piece:?}");
                        }
                        UnknownTokenPolicy::Fail => {
                            return Err(LLMError::TokenizationError(format!(
                                "no vocabulary entry for {piece:?}"
                            )));
                        }
                    },
                }
            }
        }

        if add_special_tokens {
            ids.extend(self.special_tokens.id(&self.options.sequence_end));
        }

        log::debug!("Tokenized {text:?} -> {ids:?}");
        Ok(ids)
    }

    /// Convert token ids back into text. Unknown ids contribute nothing.
    pub fn decode(&self, ids: &[TokenId]) -> String {
        let raw: String = ids.iter().map(|&id| self.decode_single_token(id)).collect();
        self.normalize(&bpe::from_glyphs(&raw))
    }

    /// Cached display fragment for one id, or `""` if the id is unknown.
    pub fn decode_single_token(&self, id: TokenId) -> &str {
        self.decode_cache.get(&id).map(String::as_str).unwrap_or("")
    }

    /// Look up a token string, checking special tokens before the vocabulary.
    ///
    /// Unlike `encode`, a miss here is always an error: it is used to resolve
    /// role and control tokens, and a silent miss would corrupt every prompt.
    pub fn get_token_id(&self, token: &str) -> Result<TokenId> {
        self.special_tokens
            .id(token)
            .or_else(|| self.vocab.id(token))
            .ok_or_else(|| LLMError::token_not_found(token))
    }
}
