//! The AI transport seam.
//!
//! The generation queue only sees [`AiTransport`]: a request goes in, a
//! channel of [`StreamEvent`]s comes out. The production implementation is
//! [`crate::llm_provider::OpenAiCompatibleTransport`]; tests script their own.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use notetree_core::{ContextMessage, ContextSnapshot};

/// One generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub model: String,
    pub system_prompt: String,
    pub messages: Vec<ContextMessage>,
}

impl GenerationRequest {
    pub fn new(model: &str, snapshot: &ContextSnapshot) -> Self {
        GenerationRequest {
            model: model.to_string(),
            system_prompt: snapshot.system_prompt.clone(),
            messages: snapshot.messages.clone(),
        }
    }
}

/// One item of a streamed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The next piece of reply text.
    Delta(String),
    /// The provider stopped the reply for content-safety reasons.
    SafetyStop,
    /// The request failed. No further events follow.
    Error(TransportError),
}

/// Transport failures, classified by how the queue must react.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("quota exceeded: {0}")]
    Quota(String),

    /// Network failure, timeout, 503 or 504. The only retryable class.
    #[error("connection failed: {0}")]
    Connectivity(String),

    #[error("content blocked: {0}")]
    Blocked(String),

    #[error("model unavailable: {0}")]
    Unavailable(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Classifies a raw provider error message by keyword.
    pub fn classify(message: &str) -> TransportError {
        let lower = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
        let message = message.to_string();

        if has(&["unauthorized", "api key", "authentication", "invalid key"]) {
            TransportError::Auth(message)
        } else if has(&["quota", "rate limit", "too many requests"]) {
            TransportError::Quota(message)
        } else if has(&[
            "fetch failed",
            "network error",
            "failed to fetch",
            "deadline exceeded",
            "timeout",
            "timed out",
        ]) {
            TransportError::Connectivity(message)
        } else if has(&["safety", "blocked"]) {
            TransportError::Blocked(message)
        } else if has(&["model not found", "unavailable"]) {
            TransportError::Unavailable(message)
        } else {
            TransportError::Other(message)
        }
    }

    /// Classifies a non-success HTTP response.
    pub fn from_status(status: u16, body: &str) -> TransportError {
        let message = format!("HTTP {}: {}", status, body);
        match status {
            401 | 403 => TransportError::Auth(message),
            429 => TransportError::Quota(message),
            408 | 503 | 504 => TransportError::Connectivity(message),
            _ => TransportError::classify(&message),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Connectivity(_))
    }

    /// Short message suitable for showing to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            TransportError::Connectivity(_) => "Connection issue. Please check your internet.",
            TransportError::Auth(_) => "Invalid API key. Check your settings.",
            TransportError::Quota(_) => "API quota exceeded. Try again later.",
            TransportError::Blocked(_) => "Content was blocked by safety filters.",
            TransportError::Unavailable(_) => "AI service temporarily unavailable.",
            TransportError::Other(_) => "Something went wrong. Please try again.",
        }
    }
}

/// A streaming text-generation backend.
pub trait AiTransport: Send + Sync {
    /// Starts a generation and returns the channel its events arrive on.
    ///
    /// The stream ends when the channel closes. Once `cancel` fires the
    /// implementation must stop sending.
    fn generate(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<StreamEvent>;

    /// Advisory prompt size, used for diagnostics only.
    fn count_tokens(&self, model: &str, messages: &[ContextMessage], system_prompt: &str) -> usize {
        let _ = model;
        estimate_tokens(messages, system_prompt)
    }
}

/// Roughly four characters per token.
pub fn estimate_tokens(messages: &[ContextMessage], system_prompt: &str) -> usize {
    let chars: usize = system_prompt.chars().count()
        + messages.iter().map(|m| m.text.chars().count()).sum::<usize>();
    chars.div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notetree_core::Role;

    #[test]
    fn keyword_classification() {
        assert!(matches!(
            TransportError::classify("Request timed out"),
            TransportError::Connectivity(_)
        ));
        assert!(matches!(
            TransportError::classify("Invalid API key provided"),
            TransportError::Auth(_)
        ));
        assert!(matches!(
            TransportError::classify("Rate limit reached"),
            TransportError::Quota(_)
        ));
        assert!(matches!(
            TransportError::classify("model not found: foo"),
            TransportError::Unavailable(_)
        ));
        assert!(matches!(
            TransportError::classify("weird"),
            TransportError::Other(_)
        ));
    }

    #[test]
    fn auth_wins_over_connection_wording() {
        assert!(matches!(
            TransportError::classify("connection rejected: invalid API key"),
            TransportError::Auth(_)
        ));
        assert!(matches!(
            TransportError::classify("Connection closed: rate limit exceeded"),
            TransportError::Quota(_)
        ));
        assert!(!TransportError::classify("connection rejected").is_retryable());
        assert!(TransportError::classify("fetch failed").is_retryable());
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            TransportError::from_status(401, ""),
            TransportError::Auth(_)
        ));
        assert!(matches!(
            TransportError::from_status(429, ""),
            TransportError::Quota(_)
        ));
        assert!(TransportError::from_status(503, "").is_retryable());
        assert!(TransportError::from_status(504, "").is_retryable());
        assert!(!TransportError::from_status(500, "boom").is_retryable());
        assert!(!TransportError::from_status(401, "").is_retryable());
    }

    #[test]
    fn user_messages_are_one_liners() {
        let err = TransportError::Quota("429".into());
        assert_eq!(err.user_message(), "API quota exceeded. Try again later.");
        assert!(!TransportError::Other(String::new()).user_message().contains('\n'));
    }

    #[test]
    fn token_estimate_rounds_up() {
        let messages = vec![ContextMessage {
            role: Role::User,
            text: "hello".into(),
        }];
        assert_eq!(estimate_tokens(&messages, "abc"), 2);
        assert_eq!(estimate_tokens(&[], ""), 0);
    }
}
