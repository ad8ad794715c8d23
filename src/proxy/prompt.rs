//! Upstream prompt construction and canned replies

use super::provider::PromptMessage;
use crate::api::ChatRequest;
use crate::session::Difficulty;

/// Reply used when no provider is configured
pub const OFFLINE_REPLY: &str = "I'm running without a connection to my language model right now, so I can't give a full answer. Try breaking your question into smaller steps and writing down what you already know about each one.";

/// Reply shown alongside upstream failures
pub const FALLBACK_REPLY: &str = "I'm having trouble thinking right now. Please try asking again in a moment.";

/// Text returned with a 429
pub const RATE_LIMIT_REPLY: &str = "Too many requests. Please wait a minute before trying again.";

fn difficulty_guidance(difficulty: Option<Difficulty>) -> &'static str {
    match difficulty {
        Some(Difficulty::Beginner) => {
            "The student is a beginner. Use simple language and everyday analogies, and avoid jargon."
        }
        Some(Difficulty::Intermediate) | None => {
            "The student knows the basics. Build on the fundamentals and introduce proper terminology."
        }
        Some(Difficulty::Advanced) => {
            "The student is advanced. Go into depth and discuss nuances and edge cases rigorously."
        }
    }
}

/// System prompt for a subject and level
///
/// # Examples
///
/// ```
/// use tutorchat::proxy::prompt::system_prompt;
/// use tutorchat::session::Difficulty;
///
/// let prompt = system_prompt(Some("chemistry"), Some(Difficulty::Beginner));
/// assert!(prompt.contains("chemistry"));
/// assert!(prompt.contains("beginner"));
/// ```
pub fn system_prompt(subject: Option<&str>, difficulty: Option<Difficulty>) -> String {
    let subject = subject
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("any subject the student asks about");

    format!(
        "You are a patient and encouraging tutor helping a student learn {}. {} \
         Explain ideas step by step and check understanding with a short follow-up question. \
         Keep answers focused and under 300 words.",
        subject,
        difficulty_guidance(difficulty)
    )
}

/// Full upstream prompt: system message then the last `context_messages`
/// turns of the conversation
pub fn build_messages(request: &ChatRequest, context_messages: usize) -> Vec<PromptMessage> {
    let skip = request.messages.len().saturating_sub(context_messages);

    std::iter::once(PromptMessage::new(
        "system",
        system_prompt(request.subject.as_deref(), request.difficulty),
    ))
    .chain(
        request
            .messages
            .iter()
            .skip(skip)
            .map(|turn| PromptMessage::new(turn.role.to_string(), turn.content.clone())),
    )
    .collect()
}
