//! Oracle implementations over any text-generation backend.

use async_trait::async_trait;
use noticeflow_core::{ConversationHistory, Decision, NoticeRecord, RawNoticeExtract};
use serde::Deserialize;
use tracing::{debug, info};

use crate::{DispatchOracle, OracleError, TextOracle, parse_json, prompts};

/// A single system + user prompt completion.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, OracleError>;
}

#[derive(Deserialize)]
struct BinaryAnswer {
    is_true: bool,
}

#[derive(Deserialize)]
struct EscalationCheck {
    needs_escalation: bool,
}

/// [`TextOracle`] and [`DispatchOracle`] backed by an [`LlmBackend`].
pub struct LlmOracle<B> {
    backend: B,
}

impl<B: LlmBackend> LlmOracle<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[async_trait]
impl<B: LlmBackend> TextOracle for LlmOracle<B> {
    async fn answer_binary_question(
        &self,
        question: &str,
        context: &str,
    ) -> Result<bool, OracleError> {
        let text = self
            .backend
            .generate(
                prompts::BINARY_QUESTION_SYSTEM,
                &prompts::binary_question_user(question, context),
            )
            .await?;
        let answer: BinaryAnswer = parse_json(&text)?;
        debug!(question, answer = answer.is_true, "binary question answered");
        Ok(answer.is_true)
    }

    async fn check_escalation(&self, criteria: &str, message: &str) -> Result<bool, OracleError> {
        let text = self
            .backend
            .generate(
                prompts::ESCALATION_SYSTEM,
                &prompts::escalation_user(criteria, message),
            )
            .await?;
        let check: EscalationCheck = parse_json(&text)?;
        Ok(check.needs_escalation)
    }

    async fn extract_notice_fields(&self, message: &str) -> Result<NoticeRecord, OracleError> {
        let text = self
            .backend
            .generate(
                prompts::EXTRACTION_SYSTEM,
                &prompts::extraction_user(message),
            )
            .await?;
        let raw: RawNoticeExtract = parse_json(&text)?;
        let record = NoticeRecord::from_raw(raw);
        info!(
            entity = record.entity_name.as_deref().unwrap_or("-"),
            project_id = ?record.project_id,
            max_fine = ?record.max_potential_fine,
            "notice fields extracted"
        );
        Ok(record)
    }
}

#[async_trait]
impl<B: LlmBackend> DispatchOracle for LlmOracle<B> {
    async fn decide(&self, history: &ConversationHistory) -> Result<Decision, OracleError> {
        let user_prompt = prompts::dispatch_user(history)
            .map_err(|e| OracleError::MalformedResponse(format!("render history: {e}")))?;
        let text = self
            .backend
            .generate(prompts::DISPATCH_SYSTEM, &user_prompt)
            .await?;
        parse_json(&text)
    }
}
