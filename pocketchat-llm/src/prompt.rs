//! Turning chat history into model input ids.
use crate::config::ModelConfig;
use crate::serve::{Message, Role};
use crate::tokenizer::Tokenizer;
use crate::{Result, TokenId};

/// What the caller wants out of a generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Question answering. `None` falls back to the model's default system prompt.
    Qa { system_prompt: Option<String> },
}

impl Intent {
    pub fn qa() -> Self {
        Intent::Qa {
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Intent::Qa {
            system_prompt: Some(prompt.into()),
        }
    }

    fn system_prompt_override(&self) -> Option<&str> {
        match self {
            Intent::Qa { system_prompt } => system_prompt.as_deref(),
        }
    }
}

impl Default for Intent {
    fn default() -> Self {
        Self::qa()
    }
}

// One framed turn: role start ids, content ids, end id.
struct Segment<'a> {
    start: &'a [TokenId],
    content: Vec<TokenId>,
}

impl Segment<'_> {
    fn len(&self) -> usize {
        self.start.len() + self.content.len() + 1
    }
}

pub struct PromptBuilder<'a> {
    tokenizer: &'a Tokenizer,
    config: &'a ModelConfig,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(tokenizer: &'a Tokenizer, config: &'a ModelConfig) -> Self {
        Self { tokenizer, config }
    }

    /// Build input ids for `messages`, in order, followed by an open assistant turn.
    ///
    /// Message-count windowing is the caller's job; the only limit applied here is
    /// `max_tokens`. When over budget, history messages are dropped or shortened from the
    /// oldest first, then the system prompt. The trailing assistant start sequence is
    /// always kept intact, so the result can only exceed `max_tokens` when that sequence
    /// alone does.
    pub fn build_prompt_tokens(
        &self,
        messages: &[Message],
        intent: &Intent,
        max_tokens: usize,
    ) -> Result<Vec<TokenId>> {
        let roles = &self.config.role_tokens;
        let system_prompt = intent
            .system_prompt_override()
            .unwrap_or(self.config.default_system_prompt.as_str());

        let mut segments = Vec::with_capacity(messages.len() + 1);
        segments.push(Segment {
            start: roles.start(Role::System),
            content: self.tokenizer.encode(system_prompt, false)?,
        });
        for message in messages {
            segments.push(Segment {
                start: roles.start(message.role),
                content: self.tokenizer.encode(&message.content, false)?,
            });
        }

        let priming = roles.start(Role::Assistant);
        fit_to_budget(&mut segments, max_tokens.saturating_sub(priming.len()));

        let len = segments.iter().map(Segment::len).sum::<usize>() + priming.len();
        let mut ids = Vec::with_capacity(len);
        for segment in &segments {
            ids.extend_from_slice(segment.start);
            ids.extend_from_slice(&segment.content);
            ids.push(roles.end);
        }
        ids.extend_from_slice(priming);
        Ok(ids)
    }

    /// [`Self::build_prompt_tokens`] with the configured token budget.
    pub fn build(&self, messages: &[Message], intent: &Intent) -> Result<Vec<TokenId>> {
        self.build_prompt_tokens(messages, intent, self.config.max_prompt_tokens)
    }
}

// History (index 1..) is consumed oldest first; the system segment at index 0 goes last.
fn fit_to_budget(segments: &mut Vec<Segment<'_>>, budget: usize) {
    let mut total: usize = segments.iter().map(Segment::len).sum();
    if total > budget {
        log::debug!("Prompt of {total} tokens exceeds budget of {budget}, truncating");
    }

    while total > budget && !segments.is_empty() {
        let target = if segments.len() > 1 { 1 } else { 0 };
        let excess = total - budget;
        let segment = &mut segments[target];
        if excess > segment.content.len() {
            total -= segment.len();
            segments.remove(target);
        } else {
            segment.content.drain(..excess);
            total -= excess;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn segment(start: &[TokenId], content: Vec<TokenId>) -> Segment<'_> {
        Segment { start, content }
    }

    #[test]
    fn test_fit_drops_oldest_history_first() {
        let framing = [1, 2];
        let mut segments = vec![
            segment(&framing, vec![10, 11]),
            segment(&framing, vec![20, 21, 22]),
            segment(&framing, vec![30]),
        ];
        // 5 + 6 + 4 = 15; dropping the oldest history message leaves 9.
        fit_to_budget(&mut segments, 10);
        let contents: Vec<_> = segments.iter().map(|s| s.content.clone()).collect();
        assert_eq!(contents, vec![vec![10, 11], vec![30]]);
    }

    #[test]
    fn test_fit_shortens_from_the_front() {
        let framing = [1];
        let mut segments = vec![
            segment(&framing, vec![10]),
            segment(&framing, vec![20, 21, 22, 23]),
        ];
        // 3 + 6 = 9, two over.
        fit_to_budget(&mut segments, 7);
        assert_eq!(segments[1].content, vec![22, 23]);
        assert_eq!(segments.iter().map(Segment::len).sum::<usize>(), 7);
    }

    #[test]
    fn test_fit_falls_back_to_system() {
        let framing = [1];
        let mut segments = vec![segment(&framing, vec![10, 11, 12])];
        fit_to_budget(&mut segments, 3);
        assert_eq!(segments[0].content, vec![12]);

        fit_to_budget(&mut segments, 1);
        assert!(segments.is_empty());
    }
}
