//! Rough token accounting for the context-window guard.

use crate::types::{ContentPart, Message};

/// Approximate tokens in `text` at four characters per token.
pub fn estimate_text_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.chars().count().div_ceil(4)
}

/// Approximate tokens for one message, including per-message overhead.
pub fn estimate_message_tokens(message: &Message) -> usize {
    let mut tokens = 4usize;
    for part in &message.content {
        tokens += match part {
            ContentPart::Text { text } => estimate_text_tokens(text),
            ContentPart::ToolUse(call) => {
                let input = serde_json::to_string(&call.input).unwrap_or_default();
                estimate_text_tokens(&call.name) + estimate_text_tokens(&input) + 8
            }
            ContentPart::ToolResult(result) => {
                estimate_text_tokens(&result.tool_call_id) + estimate_text_tokens(&result.content) + 8
            }
            ContentPart::File(file) => estimate_text_tokens(&file.uri) + 8,
            ContentPart::Data { data } => {
                estimate_text_tokens(&serde_json::to_string(data).unwrap_or_default())
            }
        };
    }
    tokens
}

pub fn estimate_context_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_rounds_up_to_whole_tokens() {
        assert_eq!(estimate_text_tokens(""), 0);
        assert_eq!(estimate_text_tokens("abc"), 1);
        assert_eq!(estimate_text_tokens("abcdefgh"), 2);
        assert_eq!(estimate_text_tokens("abcdefghi"), 3);
    }

    #[test]
    fn context_sums_messages_with_overhead() {
        let messages = vec![Message::system("abcd"), Message::user("abcdefgh")];
        assert_eq!(estimate_context_tokens(&messages), (4 + 1) + (4 + 2));
    }
}
