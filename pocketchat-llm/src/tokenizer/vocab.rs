//! Static lookup tables behind the tokenizer.
//!
//! All three structures are built once and only read afterwards, so a single
//! [`super::Tokenizer`] can be shared across threads without locking.

use std::collections::HashMap;

use crate::{LLMError, Result, TokenId};

/// Bidirectional token string <-> id mapping.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    token_to_id: HashMap<String, TokenId>,
    id_to_token: HashMap<TokenId, String>,
}

impl Vocabulary {
    /// Build from a token -> id table. The reverse map is derived here and never
    /// mutated on its own.
    pub fn new(token_to_id: HashMap<String, TokenId>) -> Self {
        let id_to_token = token_to_id
            .iter()
            .map(|(token, &id)| (id, token.clone()))
            .collect();
        Self {
            token_to_id,
            id_to_token,
        }
    }

    pub fn id(&self, token: &str) -> Option<TokenId> {
        self.token_to_id.get(token).copied()
    }

    pub fn token(&self, id: TokenId) -> Option<&str> {
        self.id_to_token.get(&id).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TokenId, &str)> {
        self.id_to_token.iter().map(|(&id, t)| (id, t.as_str()))
    }

    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, TokenId)> for Vocabulary {
    fn from_iter<I: IntoIterator<Item = (S, TokenId)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(t, id)| (t.into(), id)).collect())
    }
}

/// Ordered merge rules. A pair's position is its rank; lower ranks merge first.
#[derive(Debug, Clone, Default)]
pub struct MergeTable {
    merges: Vec<(String, String)>,
    // Keyed left then right so lookups borrow both halves.
    ranks: HashMap<String, HashMap<String, usize>>,
}

impl MergeTable {
    /// Fails if the same pair is listed twice, since its rank would be ambiguous.
    pub fn new(merges: Vec<(String, String)>) -> Result<Self> {
        let mut ranks: HashMap<String, HashMap<String, usize>> = HashMap::new();
        for (rank, (left, right)) in merges.iter().enumerate() {
            let seconds = ranks.entry(left.clone()).or_default();
            if seconds.insert(right.clone(), rank).is_some() {
                return Err(LLMError::LoadError(format!(
                    "tokenizer: duplicate merge rule {left:?} {right:?}"
                )));
            }
        }
        Ok(Self { merges, ranks })
    }

    pub fn rank(&self, left: &str, right: &str) -> Option<usize> {
        self.ranks.get(left)?.get(right).copied()
    }

    pub fn len(&self) -> usize {
        self.merges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.merges.is_empty()
    }
}

/// Reserved structural tokens (`<|im_start|>`, `<|endoftext|>`, ...).
///
/// Ids may overlap with the main vocabulary's id space.
#[derive(Debug, Clone, Default)]
pub struct SpecialTokens {
    tokens: HashMap<String, TokenId>,
}

impl SpecialTokens {
    pub fn new(tokens: HashMap<String, TokenId>) -> Self {
        Self { tokens }
    }

    pub fn id(&self, token: &str) -> Option<TokenId> {
        self.tokens.get(token).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, TokenId)> {
        self.tokens.iter().map(|(t, &id)| (t.as_str(), id))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, TokenId)> for SpecialTokens {
    fn from_iter<I: IntoIterator<Item = (S, TokenId)>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|(t, id)| (t.into(), id)).collect())
    }
}
