//! Reading the HuggingFace `tokenizer.json` description.
use serde::Deserialize;
use std::collections::HashMap;

use super::vocab::{MergeTable, SpecialTokens, Vocabulary};
use crate::{LLMError, Result, TokenId};

#[derive(Debug, Deserialize)]
struct TokenizerFile {
    model: BpeModel,
    #[serde(default)]
    added_tokens: Vec<AddedToken>,
    #[serde(default)]
    normalizer: Option<Normalizer>,
}

#[derive(Debug, Deserialize)]
struct BpeModel {
    vocab: HashMap<String, TokenId>,
    #[serde(default)]
    merges: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AddedToken {
    content: String,
    id: TokenId,
}

#[derive(Debug, Deserialize)]
struct Normalizer {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Logical content of a tokenizer description.
#[derive(Debug)]
pub struct TokenizerParts {
    pub vocab: Vocabulary,
    pub merges: MergeTable,
    pub special_tokens: SpecialTokens,
    pub nfc: bool,
}

// Older files store merges as "a b", newer ones as ["a", "b"].
fn parse_merge(entry: &serde_json::Value) -> Result<(String, String)> {
    use serde_json::Value;
    match entry {
        Value::String(s) => match s.split(' ').collect::<Vec<_>>()[..] {
            [a, b] => Ok((a.to_string(), b.to_string())),
            _ => Err(LLMError::LoadError(format!(
                "tokenizer: invalid merge string {s:?}"
            ))),
        },
        Value::Array(pair) => match &pair[..] {
            [Value::String(a), Value::String(b)] => Ok((a.clone(), b.clone())),
            _ => Err(LLMError::LoadError(format!(
                "tokenizer: invalid merge array {entry}"
            ))),
        },
        other => Err(LLMError::LoadError(format!(
            "tokenizer: unsupported merge entry {other}"
        ))),
    }
}

pub fn parse(json: &str) -> Result<TokenizerParts> {
    let file: TokenizerFile = serde_json::from_str(json)?;

    let merges = file
        .model
        .merges
        .iter()
        .map(parse_merge)
        .collect::<Result<Vec<_>>>()?;

    let special_tokens = file
        .added_tokens
        .into_iter()
        .map(|t| (t.content, t.id))
        .collect();

    let nfc = file
        .normalizer
        .and_then(|n| n.kind)
        .is_some_and(|kind| kind == "NFC");

    Ok(TokenizerParts {
        vocab: Vocabulary::new(file.model.vocab),
        merges: MergeTable::new(merges)?,
        special_tokens,
        nfc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_merge_formats() {
        let json = r#"{
            "model": {
                "vocab": {"a": 0, "b": 1, "ab": 2, "c": 3, "abc": 4},
                "merges": ["a b", ["ab", "c"]]
            },
            "added_tokens": [{"id": 5, "content": "<|im_start|>", "special": true}],
            "normalizer": {"type": "NFC"}
        }"#;
        let parts = parse(json).unwrap();
        assert_eq!(parts.vocab.len(), 5);
        assert_eq!(parts.merges.rank("a", "b"), Some(0));
        assert_eq!(parts.merges.rank("ab", "c"), Some(1));
        assert_eq!(parts.special_tokens.id("<|im_start|>"), Some(5));
        assert!(parts.nfc);
    }

    #[test]
    fn test_missing_optional_sections() {
        let parts = parse(r#"{"model": {"vocab": {"a": 0}}, "normalizer": null}"#).unwrap();
        assert!(parts.merges.is_empty());
        assert!(parts.special_tokens.is_empty());
        assert!(!parts.nfc);
    }

    #[test]
    fn test_malformed_merge() {
        let json = r#"{"model": {"vocab": {}, "merges": ["a b c"]}}"#;
        assert!(matches!(parse(json), Err(LLMError::LoadError(_))));

        let json = r#"{"model": {"vocab": {}, "merges": [42]}}"#;
        assert!(matches!(parse(json), Err(LLMError::LoadError(_))));
    }
}
