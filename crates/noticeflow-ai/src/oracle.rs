use async_trait::async_trait;
use noticeflow_core::{ConversationHistory, Decision, NoticeRecord};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum OracleError {
    /// Transport or service failure. Callers may retry.
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
    /// The service answered, but not in the expected shape.
    #[error("malformed oracle response: {0}")]
    MalformedResponse(String),
}

impl OracleError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Typed questions about a single piece of text. No retries happen here.
#[async_trait]
pub trait TextOracle: Send + Sync {
    /// Yes/no question answered from `context`.
    async fn answer_binary_question(
        &self,
        question: &str,
        context: &str,
    ) -> Result<bool, OracleError>;

    /// Whether `message` meets the natural-language escalation `criteria`.
    async fn check_escalation(&self, criteria: &str, message: &str) -> Result<bool, OracleError>;

    /// Structured fields from a notice. Unparsable dates and emails come
    /// back absent, never as an error.
    async fn extract_notice_fields(&self, message: &str) -> Result<NoticeRecord, OracleError>;
}

/// Chooses the next actions for a dispatch session.
#[async_trait]
pub trait DispatchOracle: Send + Sync {
    async fn decide(&self, history: &ConversationHistory) -> Result<Decision, OracleError>;
}
