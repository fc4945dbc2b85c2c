use hf_hub::api::sync::Api;
use std::path::PathBuf;

use crate::Result;
use crate::serve::Message;

/// The last `window` messages of `history` (all of them if it is shorter).
///
/// Prompt building only enforces a token budget, so callers that want to bound how many
/// turns the model sees apply this first.
pub fn recent_window(history: &[Message], window: usize) -> &[Message] {
    &history[history.len().saturating_sub(window)..]
}

/// Fetch `tokenizer.json` for a model repository on the HuggingFace Hub.
pub fn get_tokenizer_file(model: &str) -> Result<PathBuf> {
    let api = Api::new()?;
    let repo = api.model(model.to_string());
    Ok(repo.get("tokenizer.json")?)
}
