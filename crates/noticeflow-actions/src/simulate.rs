//! Simulated side effects with injected latency and failures.

use std::time::Duration;

use async_trait::async_trait;
use noticeflow_core::{FollowUpLedger, NoticeRecord, RecipientList};
use rand::Rng;
use tracing::{info, warn};

use crate::{ActionError, TicketDesk};

/// External effects a workflow may trigger. Each call may block and may fail.
#[async_trait]
pub trait SideEffects: Send + Sync {
    async fn send_escalation_notice(
        &self,
        record: &NoticeRecord,
        recipients: &[String],
    ) -> Result<(), ActionError>;

    /// Returns the addresses the message was delivered to.
    async fn forward_message(
        &self,
        message: &str,
        recipients: &RecipientList,
    ) -> Result<Vec<String>, ActionError>;

    async fn notify_wrong_recipient(
        &self,
        sender_email: &str,
        correct_department: &str,
    ) -> Result<(), ActionError>;

    /// `Some(question)` if filing needs a follow-up answered first,
    /// `None` once the ticket is filed.
    async fn file_legal_ticket(
        &self,
        ledger: &FollowUpLedger,
        record: &NoticeRecord,
    ) -> Result<Option<String>, ActionError>;

    /// Number of distinct follow-up questions filing can ask. Bounds the
    /// FileTicket ⇄ AnswerFollowUp cycle.
    fn follow_up_pool_size(&self) -> usize;
}

/// Uniform delay range for one simulated call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Latency {
    pub min: Duration,
    pub max: Duration,
}

impl Latency {
    pub const fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub const fn between_ms(min: u64, max: u64) -> Self {
        Self {
            min: Duration::from_millis(min),
            max: Duration::from_millis(max),
        }
    }

    fn sample(&self, rng: &mut impl Rng) -> Duration {
        if self.max <= self.min {
            self.min
        } else {
            rng.gen_range(self.min..=self.max)
        }
    }
}

impl Default for Latency {
    fn default() -> Self {
        Self::between_ms(500, 1000)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimulationConfig {
    pub latency: Latency,
    /// Probability in `[0, 1]` that a call fails after its delay.
    pub failure_rate: f64,
}

impl SimulationConfig {
    /// No delay, no failures.
    pub const fn instant() -> Self {
        Self {
            latency: Latency::none(),
            failure_rate: 0.0,
        }
    }

    /// `failure_rate` clamped to `[0, 1]`; NaN counts as never failing.
    pub fn failure_probability(&self) -> f64 {
        if self.failure_rate.is_nan() {
            0.0
        } else {
            self.failure_rate.clamp(0.0, 1.0)
        }
    }

    async fn call(&self, action: &'static str) -> Result<(), ActionError> {
        let (delay, fails) = {
            let mut rng = rand::thread_rng();
            let fails = rng.gen_bool(self.failure_probability());
            (self.latency.sample(&mut rng), fails)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fails {
            return Err(ActionError::Failed {
                action,
                cause: "simulated upstream failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Default [`SideEffects`] implementation: logs instead of sending.
#[derive(Default)]
pub struct SimulatedActions {
    config: SimulationConfig,
    desk: TicketDesk,
}

impl SimulatedActions {
    pub fn new(config: SimulationConfig, desk: TicketDesk) -> Self {
        Self { config, desk }
    }

    pub fn desk(&self) -> &TicketDesk {
        &self.desk
    }
}

#[async_trait]
impl SideEffects for SimulatedActions {
    async fn send_escalation_notice(
        &self,
        record: &NoticeRecord,
        recipients: &[String],
    ) -> Result<(), ActionError> {
        if recipients.is_empty() {
            warn!("no escalation recipients; skipping notice");
            return Ok(());
        }
        info!(
            recipients = %recipients.join(", "),
            entity = record.entity_name.as_deref().unwrap_or("-"),
            "sending escalation notice"
        );
        for recipient in recipients {
            self.config.call("send_escalation_notice").await?;
            info!(%recipient, "escalation details sent");
        }
        Ok(())
    }

    async fn forward_message(
        &self,
        message: &str,
        recipients: &RecipientList,
    ) -> Result<Vec<String>, ActionError> {
        let addresses = recipients.addresses();
        if addresses.is_empty() {
            warn!("forward requested without a valid recipient");
            return Err(ActionError::NoValidRecipient);
        }
        for recipient in &addresses {
            self.config.call("forward_message").await?;
            info!(%recipient, bytes = message.len(), "message forwarded");
        }
        Ok(addresses)
    }

    async fn notify_wrong_recipient(
        &self,
        sender_email: &str,
        correct_department: &str,
    ) -> Result<(), ActionError> {
        let sender = sender_email.trim();
        if sender.is_empty() {
            return Err(ActionError::NoValidRecipient);
        }
        self.config.call("notify_wrong_recipient").await?;
        info!(sender, correct_department, "wrong-recipient notification sent");
        Ok(())
    }

    async fn file_legal_ticket(
        &self,
        ledger: &FollowUpLedger,
        record: &NoticeRecord,
    ) -> Result<Option<String>, ActionError> {
        self.config.call("file_legal_ticket").await?;
        match self.desk.next_follow_up(ledger) {
            Some(question) => {
                info!(%question, answered = ledger.len(), "follow-up required before filing");
                Ok(Some(question))
            }
            None => {
                info!(
                    project_id = ?record.project_id,
                    follow_ups = ledger.len(),
                    "legal ticket filed"
                );
                Ok(None)
            }
        }
    }

    fn follow_up_pool_size(&self) -> usize {
        self.desk.pool_size()
    }
}
