use pocketchat_llm::LLMError;
use pocketchat_llm::config::{ModelConfig, ModelSpec, PromptStyle, RoleTemplate, RoleTokenIds};
use pocketchat_llm::prompt::{Intent, PromptBuilder};
use pocketchat_llm::serve::{Message, Role};
use pocketchat_llm::tokenizer::{MergeTable, Tokenizer, TokenizerOptions, TokenizerParts};

pub mod test_utils;
use test_utils::*;

fn xy_tokenizer() -> Tokenizer {
    Tokenizer::new(
        TokenizerParts {
            vocab: [("x", 5), ("y", 6)].into_iter().collect(),
            merges: MergeTable::new(vec![]).unwrap(),
            special_tokens: Default::default(),
            nfc: false,
        },
        TokenizerOptions::default(),
    )
}

fn numbered_config() -> ModelConfig {
    ModelConfig {
        model_name: "numbered".to_string(),
        prompt_style: PromptStyle::ChatMl,
        eos_token_ids: [99].into_iter().collect(),
        role_tokens: RoleTokenIds {
            system_start: vec![10, 11, 12],
            user_start: vec![20, 21, 22],
            assistant_start: vec![30, 31, 32],
            end: 99,
        },
        default_system_prompt: "y".to_string(),
        thinking_mode_available: false,
        thinking_preamble_tokens: 4,
        no_think_suffix: " /no_think".to_string(),
        max_prompt_tokens: 500,
        history_window: 5,
        max_new_tokens: None,
        architecture: Default::default(),
    }
}

#[test]
fn test_prompt_template() {
    let tok = xy_tokenizer();
    let config = numbered_config();
    let builder = PromptBuilder::new(&tok, &config);

    let ids = builder
        .build_prompt_tokens(&[Message::user("y")], &Intent::with_system_prompt("x"), 500)
        .unwrap();
    assert_eq!(ids, vec![10, 11, 12, 5, 99, 20, 21, 22, 6, 99, 30, 31, 32]);
}

#[test]
fn test_default_system_prompt_and_roles() {
    let tok = xy_tokenizer();
    let config = numbered_config();
    let builder = PromptBuilder::new(&tok, &config);

    let history = [
        Message::new(Role::User, "x"),
        Message::assistant("y"),
        Message::user("xy"),
    ];
    let ids = builder.build(&history, &Intent::qa()).unwrap();
    assert_eq!(
        ids,
        vec![
            10, 11, 12, 6, 99, // system: default prompt "y"
            20, 21, 22, 5, 99, // user
            30, 31, 32, 6, 99, // assistant
            20, 21, 22, 5, 6, 99, // user
            30, 31, 32,
        ]
    );
}

#[test]
fn test_truncation_keeps_assistant_priming() {
    let tok = xy_tokenizer();
    let config = numbered_config();
    let builder = PromptBuilder::new(&tok, &config);
    let history = [Message::user("xxxx"), Message::user("yy")];
    let intent = Intent::with_system_prompt("x");

    // Untruncated: 5 + 8 + 6 + 3 = 22.
    assert_eq!(builder.build_prompt_tokens(&history, &intent, 22).unwrap().len(), 22);

    // The oldest user message goes first.
    let ids = builder.build_prompt_tokens(&history, &intent, 14).unwrap();
    assert_eq!(ids, vec![10, 11, 12, 5, 99, 20, 21, 22, 6, 6, 99, 30, 31, 32]);

    // Then the newest is shortened from the front.
    let ids = builder.build_prompt_tokens(&history, &intent, 13).unwrap();
    assert_eq!(ids, vec![10, 11, 12, 5, 99, 20, 21, 22, 6, 99, 30, 31, 32]);

    // A budget below the priming sequence still yields it intact.
    let ids = builder.build_prompt_tokens(&history, &intent, 2).unwrap();
    assert_eq!(ids, vec![30, 31, 32]);
}

#[test]
fn test_truncation_is_deterministic() {
    let tok = xy_tokenizer();
    let config = numbered_config();
    let builder = PromptBuilder::new(&tok, &config);
    let history: Vec<_> = (0..6).map(|i| Message::user("xy".repeat(i + 1))).collect();
    for budget in [3, 10, 17, 40] {
        let a = builder.build_prompt_tokens(&history, &Intent::qa(), budget).unwrap();
        let b = builder.build_prompt_tokens(&history, &Intent::qa(), budget).unwrap();
        assert_eq!(a, b);
        assert!(a.len() <= budget.max(3));
        assert!(a.ends_with(&[30, 31, 32]));
    }
}

#[test]
fn test_resolve_chatml_config() {
    let tok = tokenizer();
    let config = model_config(&tok);
    assert_eq!(config.role_tokens.system_start, vec![IM_START, 37, NEWLINE]);
    assert_eq!(config.role_tokens.start(Role::User), &[IM_START, 38, NEWLINE]);
    assert_eq!(config.role_tokens.end, IM_END);
    assert!(config.is_eos(ENDOFTEXT));
    assert!(config.is_eos(IM_END));
    assert!(!config.is_eos(HELLO));

    let ids = PromptBuilder::new(&tok, &config)
        .build(&[Message::user("world")], &Intent::qa())
        .unwrap();
    assert_eq!(
        tok.decode(&ids),
        "<|im_start|>system\nhello<|im_end|><|im_start|>user\nworld<|im_end|><|im_start|>assistant\n"
    );
}

#[test]
fn test_unresolvable_role_token() {
    let tok = tokenizer();
    let spec = ModelSpec {
        roles: RoleTemplate {
            end: "<|eot_id|>".to_string(),
            ..RoleTemplate::chatml()
        },
        ..model_spec()
    };
    assert!(matches!(
        ModelConfig::resolve(&spec, &tok),
        Err(LLMError::ConfigurationError(_))
    ));

    let spec = ModelSpec {
        eos_tokens: vec![],
        ..model_spec()
    };
    assert!(matches!(
        ModelConfig::resolve(&spec, &tok),
        Err(LLMError::ConfigurationError(_))
    ));
}

#[test]
fn test_presets_resolve() {
    let tok = tokenizer();
    let qwen3 = ModelConfig::resolve(&ModelSpec::qwen3(), &tok).unwrap();
    assert!(qwen3.thinking_mode_available);
    assert_eq!(qwen3.thinking_preamble_tokens, 4);
    assert_eq!(qwen3.architecture.num_layers, 28);
    assert!(qwen3.default_system_prompt.starts_with("You are PrometheusAI, an advanced offline"));
    assert!(
        qwen3
            .default_system_prompt
            .ends_with("no user data is ever sent to external servers or used for training.")
    );
    assert!(!qwen3.default_system_prompt.contains("  "));
    assert!(qwen3.system_prompt(false).ends_with(" /no_think"));
    assert_eq!(qwen3.system_prompt(true), qwen3.default_system_prompt);

    let qwen25 = ModelConfig::resolve(&ModelSpec::qwen2_5(), &tok).unwrap();
    assert!(!qwen25.thinking_mode_available);
    assert_eq!(
        qwen25.default_system_prompt,
        "You are Qwen, created by Alibaba Cloud. You are a helpful assistant."
    );
    assert_eq!(qwen25.system_prompt(false), qwen25.default_system_prompt);
}

#[test]
fn test_spec_from_file() {
    let dir = tempdir::TempDir::new("pocketchat").unwrap();
    let path = dir.path().join("model.json");
    std::fs::write(
        &path,
        r#"{
            "model_name": "tiny",
            "prompt_style": "qwen3",
            "thinking_mode_available": true,
            "thinking_preamble_tokens": 2,
            "max_prompt_tokens": 64,
            "architecture": {"num_layers": 2, "head_dim": 16}
        }"#,
    )
    .unwrap();

    let spec = ModelSpec::from_file(&path).unwrap();
    assert_eq!(spec.prompt_style, PromptStyle::Qwen3);
    assert_eq!(spec.thinking_preamble_tokens, 2);
    assert_eq!(spec.history_window, 5);
    assert_eq!(spec.roles, RoleTemplate::chatml());
    assert_eq!(spec.architecture.head_dim, 16);

    let config = ModelConfig::resolve(&spec, &tokenizer()).unwrap();
    assert_eq!(config.max_prompt_tokens, 64);
}
