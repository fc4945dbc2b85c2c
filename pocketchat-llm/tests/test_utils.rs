#![allow(dead_code)]
use std::sync::{Arc, Mutex};

use pocketchat_llm::config::{ModelConfig, ModelSpec};
use pocketchat_llm::tokenizer::{Tokenizer, TokenizerOptions};

pub const HELLO: u32 = 32;
pub const SPACE: u32 = 26;
pub const NEWLINE: u32 = 27;
pub const WORLD: u32 = 36;
pub const BANG: u32 = 40;
pub const ENDOFTEXT: u32 = 100;
pub const IM_START: u32 = 101;
pub const IM_END: u32 = 102;

/// A tiny ChatML-style `tokenizer.json`: single letters, a few merges spelling
/// "hello" and "world", role words and the usual special tokens.
pub fn tokenizer_json() -> String {
    let mut vocab: Vec<(String, u32)> = ('a'..='z')
        .enumerate()
        .map(|(i, c)| (c.to_string(), i as u32))
        .collect();
    let words = [
        ("Ġ", 26),
        ("Ċ", 27),
        ("ĠĠ", 28),
        ("he", 29),
        ("ll", 30),
        ("llo", 31),
        ("hello", 32),
        ("or", 33),
        ("wor", 34),
        ("ld", 35),
        ("world", 36),
        ("system", 37),
        ("user", 38),
        ("assistant", 39),
        ("!", 40),
    ];
    vocab.extend(words.iter().map(|(t, id)| (t.to_string(), *id)));
    let vocab: serde_json::Map<String, serde_json::Value> =
        vocab.into_iter().map(|(t, id)| (t, id.into())).collect();

    serde_json::json!({
        "version": "1.0",
        "normalizer": {"type": "NFC"},
        "added_tokens": [
            {"id": 100, "content": "<|endoftext|>", "special": true},
            {"id": 101, "content": "<|im_start|>", "special": true},
            {"id": 102, "content": "<|im_end|>", "special": true}
        ],
        "model": {
            "type": "BPE",
            "vocab": vocab,
            "merges": [
                "h e", "l l", "ll o", "he llo",
                ["o", "r"], ["w", "or"], ["l", "d"], ["wor", "ld"],
                "Ġ Ġ"
            ]
        }
    })
    .to_string()
}

pub fn tokenizer() -> Tokenizer {
    Tokenizer::from_json_str(&tokenizer_json(), TokenizerOptions::default())
        .expect("fixture tokenizer")
}

pub fn model_spec() -> ModelSpec {
    ModelSpec {
        model_name: "fixture".to_string(),
        default_system_prompt: "hello".to_string(),
        ..Default::default()
    }
}

pub fn model_config(tokenizer: &Tokenizer) -> ModelConfig {
    ModelConfig::resolve(&model_spec(), tokenizer).expect("fixture config")
}

/// A sink that records every snapshot it receives.
pub fn collecting_sink() -> (impl FnMut(&str) + Send + 'static, Arc<Mutex<Vec<String>>>) {
    let snapshots = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let snapshots = Arc::clone(&snapshots);
        move |text: &str| snapshots.lock().unwrap().push(text.to_string())
    };
    (sink, snapshots)
}
