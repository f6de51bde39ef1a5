//! Prompt assembly: one system message, bounded history, current user
//! message.

use crate::models::{ChatMessage, Role};

/// Grounding instruction appended after injected document knowledge.
pub const REFUSAL_LINE: &str = "Use the document knowledge above to answer. If the answer is not \
covered there, say you do not have that information instead of guessing.";

const KNOWLEDGE_HEADER: &str = "DOCUMENT KNOWLEDGE:";

/// Build the message list for one completion call.
///
/// Invariants: exactly one system message, first; any system messages in
/// `history` are dropped (the profile's prompt is authoritative); history
/// is bounded to the most recent `history_window` messages; the current
/// user message is last.
pub fn build_messages(
    system_prompt: &str,
    context: Option<&str>,
    history: &[ChatMessage],
    user_message: &str,
    history_window: usize,
) -> Vec<ChatMessage> {
    let mut system = system_prompt.to_string();
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        system.push_str("\n\n");
        system.push_str(KNOWLEDGE_HEADER);
        system.push('\n');
        system.push_str(context);
        system.push_str("\n\n");
        system.push_str(REFUSAL_LINE);
    }

    let recent: Vec<ChatMessage> = history
        .iter()
        .filter(|m| m.role != Role::System)
        .cloned()
        .collect();
    let skip = recent.len().saturating_sub(history_window);

    let mut messages = Vec::with_capacity(recent.len() - skip + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(recent.into_iter().skip(skip));
    messages.push(ChatMessage::user(user_message));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_system_message_first() {
        let history = vec![
            ChatMessage::system("stale system prompt"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ];
        let messages = build_messages("You are helpful.", None, &history, "question", 6);

        let system_count = messages.iter().filter(|m| m.role == Role::System).count();
        assert_eq!(system_count, 1);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "You are helpful.");
        assert_eq!(messages.last().unwrap().content, "question");
    }

    #[test]
    fn test_context_injected_into_system() {
        let messages = build_messages(
            "You are helpful.",
            Some("From doc.txt:\nThe plan costs $19."),
            &[],
            "how much?",
            6,
        );
        assert!(messages[0].content.contains(KNOWLEDGE_HEADER));
        assert!(messages[0].content.contains("$19"));
        assert!(messages[0].content.contains(REFUSAL_LINE));
    }

    #[test]
    fn test_blank_context_omitted() {
        let messages = build_messages("Prompt.", Some("   "), &[], "q", 6);
        assert_eq!(messages[0].content, "Prompt.");
        assert!(!messages[0].content.contains(KNOWLEDGE_HEADER));
    }

    #[test]
    fn test_history_window_keeps_most_recent() {
        let history: Vec<ChatMessage> = (0..10)
            .map(|i| {
                if i % 2 == 0 {
                    ChatMessage::user(format!("u{}", i))
                } else {
                    ChatMessage::assistant(format!("a{}", i))
                }
            })
            .collect();
        let messages = build_messages("P", None, &history, "now", 4);

        // system + 4 history + current user
        assert_eq!(messages.len(), 6);
        assert_eq!(messages[1].content, "u6");
        assert_eq!(messages[4].content, "a9");
    }
}
