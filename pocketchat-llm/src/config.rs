//! Model configuration: role templates, EOS ids and generation policy.
//!
//! A [`ModelSpec`] is the serializable form, naming every control token by its string.
//! [`ModelConfig::resolve`] turns it into ids against a concrete tokenizer, so a
//! misconfigured token surfaces once at startup instead of corrupting every prompt.
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::serve::Role;
use crate::tokenizer::Tokenizer;
use crate::{LLMError, Result, TokenId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStyle {
    #[default]
    ChatMl,
    #[serde(rename = "qwen2_5")]
    Qwen25,
    Qwen3,
}

/// Role framing, as token strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoleTemplate {
    pub system_start: Vec<String>,
    pub user_start: Vec<String>,
    pub assistant_start: Vec<String>,
    pub end: String,
}

impl RoleTemplate {
    /// `<|im_start|>{role}\n ... <|im_end|>`
    pub fn chatml() -> Self {
        let start = |role: &str| vec!["<|im_start|>".to_string(), role.to_string(), "Ċ".to_string()];
        Self {
            system_start: start("system"),
            user_start: start("user"),
            assistant_start: start("assistant"),
            end: "<|im_end|>".to_string(),
        }
    }
}

impl Default for RoleTemplate {
    fn default() -> Self {
        Self::chatml()
    }
}

/// Parameters passed through to the inference engine untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Architecture {
    pub model_path: String,
    pub num_layers: usize,
    pub num_kv_heads: usize,
    pub head_dim: usize,
    pub batch_size: usize,
    pub scalar_position_ids: bool,
    pub dtype: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelSpec {
    pub model_name: String,
    pub prompt_style: PromptStyle,
    pub eos_tokens: Vec<String>,
    pub roles: RoleTemplate,
    pub default_system_prompt: String,
    pub thinking_mode_available: bool,
    /// Tokens discarded at the start of each response when thinking mode is available.
    pub thinking_preamble_tokens: usize,
    /// Appended to the system prompt when thinking is available but switched off.
    pub no_think_suffix: String,
    pub max_prompt_tokens: usize,
    /// Trailing messages sent with each request.
    pub history_window: usize,
    pub max_new_tokens: Option<usize>,
    pub architecture: Architecture,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            model_name: String::new(),
            prompt_style: PromptStyle::ChatMl,
            eos_tokens: vec!["<|endoftext|>".to_string(), "<|im_end|>".to_string()],
            roles: RoleTemplate::chatml(),
            default_system_prompt: "You are a helpful assistant.".to_string(),
            thinking_mode_available: false,
            thinking_preamble_tokens: 4,
            no_think_suffix: " /no_think".to_string(),
            max_prompt_tokens: 500,
            history_window: 5,
            max_new_tokens: None,
            architecture: Architecture::default(),
        }
    }
}

impl ModelSpec {
    pub fn qwen2_5() -> Self {
        Self {
            model_name: "Qwen2_5".to_string(),
            prompt_style: PromptStyle::Qwen25,
            default_system_prompt:
                "You are Qwen, created by Alibaba Cloud. You are a helpful assistant.".to_string(),
            architecture: Architecture {
                model_path: "model.onnx".to_string(),
                num_layers: 24,
                num_kv_heads: 2,
                head_dim: 64,
                batch_size: 1,
                scalar_position_ids: false,
                dtype: None,
            },
            ..Default::default()
        }
    }

    pub fn qwen3() -> Self {
        Self {
            model_name: "Qwen3".to_string(),
            prompt_style: PromptStyle::Qwen3,
            default_system_prompt: "You are PrometheusAI, an advanced offline Local LLM \
                developed by SamCodeMan. Your purpose is to provide secure, private, and \
                intelligent assistance entirely on-device. You do not rely on internet \
                connectivity, and no user data is ever sent to external servers or used for \
                training."
                .to_string(),
            thinking_mode_available: true,
            architecture: Architecture {
                model_path: "model.onnx".to_string(),
                num_layers: 28,
                num_kv_heads: 8,
                head_dim: 128,
                batch_size: 1,
                scalar_position_ids: true,
                dtype: Some("float32".to_string()),
            },
            ..Default::default()
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }
}

/// Role framing, as ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTokenIds {
    pub system_start: Vec<TokenId>,
    pub user_start: Vec<TokenId>,
    pub assistant_start: Vec<TokenId>,
    pub end: TokenId,
}

impl RoleTokenIds {
    pub fn resolve(template: &RoleTemplate, tokenizer: &Tokenizer) -> Result<Self> {
        let ids = |tokens: &[String]| -> Result<Vec<TokenId>> {
            tokens.iter().map(|t| tokenizer.get_token_id(t)).collect()
        };
        Ok(Self {
            system_start: ids(&template.system_start)?,
            user_start: ids(&template.user_start)?,
            assistant_start: ids(&template.assistant_start)?,
            end: tokenizer.get_token_id(&template.end)?,
        })
    }

    pub fn start(&self, role: Role) -> &[TokenId] {
        match role {
            Role::System => &self.system_start,
            Role::User => &self.user_start,
            Role::Assistant => &self.assistant_start,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub model_name: String,
    pub prompt_style: PromptStyle,
    pub eos_token_ids: HashSet<TokenId>,
    pub role_tokens: RoleTokenIds,
    pub default_system_prompt: String,
    pub thinking_mode_available: bool,
    pub thinking_preamble_tokens: usize,
    pub no_think_suffix: String,
    pub max_prompt_tokens: usize,
    pub history_window: usize,
    pub max_new_tokens: Option<usize>,
    pub architecture: Architecture,
}

impl ModelConfig {
    /// Resolve every token string in `spec`. Any miss is a [`LLMError::ConfigurationError`].
    pub fn resolve(spec: &ModelSpec, tokenizer: &Tokenizer) -> Result<Self> {
        if spec.eos_tokens.is_empty() {
            return Err(LLMError::ConfigurationError(format!(
                "{}: at least one EOS token is required",
                spec.model_name
            )));
        }
        let eos_token_ids = spec
            .eos_tokens
            .iter()
            .map(|t| tokenizer.get_token_id(t))
            .collect::<Result<HashSet<_>>>()?;
        let role_tokens = RoleTokenIds::resolve(&spec.roles, tokenizer)?;

        log::info!(
            "Resolved model config {}: eos={:?}, thinking={}",
            spec.model_name,
            eos_token_ids,
            spec.thinking_mode_available
        );

        Ok(Self {
            model_name: spec.model_name.clone(),
            prompt_style: spec.prompt_style,
            eos_token_ids,
            role_tokens,
            default_system_prompt: spec.default_system_prompt.clone(),
            thinking_mode_available: spec.thinking_mode_available,
            thinking_preamble_tokens: spec.thinking_preamble_tokens,
            no_think_suffix: spec.no_think_suffix.clone(),
            max_prompt_tokens: spec.max_prompt_tokens,
            history_window: spec.history_window,
            max_new_tokens: spec.max_new_tokens,
            architecture: spec.architecture.clone(),
        })
    }

    pub fn is_eos(&self, id: TokenId) -> bool {
        self.eos_token_ids.contains(&id)
    }

    /// The default system prompt, with the no-think suffix when thinking is available but
    /// switched off.
    pub fn system_prompt(&self, thinking: bool) -> String {
        if self.thinking_mode_available && !thinking {
            format!("{}{}", self.default_system_prompt, self.no_think_suffix)
        } else {
            self.default_system_prompt.clone()
        }
    }
}
