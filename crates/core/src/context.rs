//! Conversation history budgeting: token estimates, trimming and compression.

use crate::domain::conversation::{Message, Role};

pub const MESSAGE_OVERHEAD_TOKENS: usize = 3;
pub const SUMMARY_PREFIX: &str = "Previous Conversation Summary:\n";
pub const FALLBACK_KEEP_MESSAGES: usize = 10;
pub const DEFAULT_KEEP_LAST: usize = 6;
pub const DEFAULT_MAX_TOOL_OUTPUT: usize = 100;

pub fn estimate_text_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

pub fn estimate_message_tokens(message: &Message) -> usize {
    estimate_text_tokens(&message.content) + MESSAGE_OVERHEAD_TOKENS
}

pub fn estimate_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Keeps every system message plus the newest others, up to `max_message_count` in total.
pub fn enforce_message_limit(messages: &[Message], max_message_count: usize) -> Vec<Message> {
    if messages.len() <= max_message_count {
        return messages.to_vec();
    }

    let (system, others): (Vec<Message>, Vec<Message>) =
        messages.iter().cloned().partition(Message::is_system);

    let remaining = max_message_count.saturating_sub(system.len());
    if remaining == 0 {
        return system;
    }

    let start = others.len().saturating_sub(remaining);
    system.into_iter().chain(others.into_iter().skip(start)).collect()
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrimOutcome {
    pub kept: Vec<Message>,
    pub dropped: Vec<Message>,
}

impl TrimOutcome {
    pub fn trimmed(&self) -> bool {
        !self.dropped.is_empty()
    }
}

/// Keeps the newest non-system suffix that fits in `max_tokens` and starts on a user turn.
///
/// System messages are neither counted nor kept; earlier summaries land in `dropped` so the
/// caller can fold them into a fresh summary.
pub fn trim_history(messages: &[Message], max_tokens: usize) -> TrimOutcome {
    let mut budget = max_tokens;
    let mut start = messages.len();

    for (index, message) in messages.iter().enumerate().rev() {
        if message.is_system() {
            continue;
        }
        let cost = estimate_message_tokens(message);
        if cost > budget {
            break;
        }
        budget -= cost;
        start = index;
    }

    let mut kept: Vec<Message> =
        messages[start..].iter().filter(|message| !message.is_system()).cloned().collect();
    let first_user = kept.iter().position(|message| message.role == Role::User);
    match first_user {
        Some(offset) => {
            kept.drain(..offset);
        }
        None => kept.clear(),
    }

    let kept_count = kept.len();
    let non_system_total = messages.iter().filter(|message| !message.is_system()).count();
    let dropped_others = non_system_total - kept_count;

    let mut dropped = Vec::new();
    let mut seen_others = 0;
    for message in messages {
        if message.is_system() {
            if seen_others < dropped_others {
                dropped.push(message.clone());
            }
            continue;
        }
        if seen_others < dropped_others {
            dropped.push(message.clone());
        }
        seen_others += 1;
    }

    TrimOutcome { kept, dropped }
}

/// Trim result with the dropped part folded into a leading summary message.
pub fn with_summary(outcome: TrimOutcome, summary: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(outcome.kept.len() + 1);
    messages.push(Message::system(format!("{SUMMARY_PREFIX}{summary}")));
    messages.extend(outcome.kept);
    messages
}

/// Used when summarising dropped history fails.
pub fn fallback_tail(messages: &[Message]) -> Vec<Message> {
    let start = messages.len().saturating_sub(FALLBACK_KEEP_MESSAGES);
    messages[start..].to_vec()
}

/// Truncates old tool outputs while keeping system messages and the last `keep_last` others.
pub fn compress_history(messages: &[Message], keep_last: usize, max_tool_output: usize) -> Vec<Message> {
    let (system, others): (Vec<Message>, Vec<Message>) =
        messages.iter().cloned().partition(Message::is_system);

    if others.len() <= keep_last {
        return system.into_iter().chain(others).collect();
    }

    let split = others.len() - keep_last;
    let compressed_old = others[..split].iter().map(|message| {
        let length = message.content.chars().count();
        if message.role == Role::Tool && length > max_tool_output {
            let head: String = message.content.chars().take(max_tool_output).collect();
            Message {
                content: format!("{head}...\n[Output truncated. Original length: {length} chars]"),
                ..message.clone()
            }
        } else {
            message.clone()
        }
    });

    system.iter().cloned().chain(compressed_old).chain(others[split..].iter().cloned()).collect()
}

#[cfg(test)]
mod tests {
    use super::{
        compress_history, enforce_message_limit, estimate_tokens, fallback_tail, trim_history,
        with_summary, SUMMARY_PREFIX,
    };
    use crate::domain::conversation::{Message, Role};

    fn turns(count: usize) -> Vec<Message> {
        (0..count)
            .flat_map(|index| {
                [Message::user(format!("question {index}")), Message::assistant(format!("answer {index}"))]
            })
            .collect()
    }

    #[test]
    fn token_estimate_rounds_up_and_adds_overhead() {
        assert_eq!(estimate_tokens(&[Message::user("abcde")]), 2 + 3);
        assert_eq!(estimate_tokens(&[Message::user("")]), 3);
    }

    #[test]
    fn message_limit_keeps_system_and_newest() {
        let mut messages = vec![Message::system("rules")];
        messages.extend(turns(5));

        let limited = enforce_message_limit(&messages, 4);
        assert_eq!(limited.len(), 4);
        assert_eq!(limited[0].role, Role::System);
        assert_eq!(limited[3].content, "answer 4");
        assert_eq!(limited[1].content, "answer 3");
    }

    #[test]
    fn trim_keeps_newest_suffix_starting_on_user() {
        let messages = turns(10);
        // "question 9" costs 6 tokens, "answer 9" costs 5.
        let outcome = trim_history(&messages, 15);

        assert_eq!(outcome.kept.len(), 2);
        assert_eq!(outcome.kept[0].content, "question 9");
        assert_eq!(outcome.kept[0].role, Role::User);
        assert_eq!(outcome.dropped.len(), 18);
        assert!(outcome.trimmed());
    }

    #[test]
    fn trim_drops_leading_non_user_messages() {
        let messages = vec![
            Message::user("show version"),
            Message::tool("show_command", "x".repeat(400)),
            Message::assistant("ok"),
            Message::user("thanks"),
        ];
        let outcome = trim_history(&messages, 20);

        assert_eq!(outcome.kept, vec![Message::user("thanks")]);
        assert_eq!(outcome.dropped.len(), 3);
    }

    #[test]
    fn trim_without_pressure_keeps_everything() {
        let mut messages = vec![Message::system("Previous Conversation Summary:\nold")];
        messages.extend(turns(2));
        let outcome = trim_history(&messages, 10_000);

        assert_eq!(outcome.kept.len(), 4);
        assert!(!outcome.trimmed());
    }

    #[test]
    fn summary_is_prepended_as_system_message() {
        let outcome = trim_history(&turns(3), 7);
        let messages = with_summary(outcome, "user asked about R1");

        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, format!("{SUMMARY_PREFIX}user asked about R1"));
        assert_eq!(fallback_tail(&turns(8)).len(), 10);
    }

    #[test]
    fn compression_truncates_only_old_tool_output() {
        let mut messages = vec![Message::system("rules"), Message::tool("show_command", "y".repeat(250))];
        messages.extend(turns(3));
        messages.push(Message::tool("show_command", "z".repeat(250)));

        let compressed = compress_history(&messages, 6, 100);
        assert_eq!(compressed.len(), messages.len());
        assert_eq!(
            compressed[1].content,
            format!("{}...\n[Output truncated. Original length: 250 chars]", "y".repeat(100))
        );
        assert_eq!(compressed.last().map(|message| message.content.len()), Some(250));
    }
}
