//! In-memory oracles and a recording action layer for workflow tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use noticeflow_actions::{
    ActionError, FirstChooser, SideEffects, SimulatedActions, SimulationConfig, TicketDesk,
};
use noticeflow_ai::{DispatchOracle, OracleError, TextOracle};
use noticeflow_core::{
    ConversationHistory, Decision, FollowUpLedger, NoticeRecord, RecipientList,
};

pub fn notice_record_with_fine(fine: f64) -> NoticeRecord {
    NoticeRecord {
        entity_name: Some("Occupational Safety and Health Administration".into()),
        project_id: Some(111232345),
        max_potential_fine: Some(fine),
        ..Default::default()
    }
}

/// Text oracle answering from fixed values. Unscripted questions answer `false`.
pub struct Scripted {
    record: Result<NoticeRecord, OracleError>,
    escalation: Result<bool, OracleError>,
    answers: HashMap<String, Result<bool, OracleError>>,
    criteria: Mutex<Vec<String>>,
}

impl Scripted {
    pub fn new() -> Self {
        Self {
            record: Ok(NoticeRecord::default()),
            escalation: Ok(false),
            answers: HashMap::new(),
            criteria: Mutex::new(Vec::new()),
        }
    }

    pub fn with_record(mut self, record: NoticeRecord) -> Self {
        self.record = Ok(record);
        self
    }

    pub fn with_extraction_error(mut self, err: OracleError) -> Self {
        self.record = Err(err);
        self
    }

    pub fn with_escalation(mut self, result: Result<bool, OracleError>) -> Self {
        self.escalation = result;
        self
    }

    pub fn with_answer(mut self, question: &str, result: Result<bool, OracleError>) -> Self {
        self.answers.insert(question.to_string(), result);
        self
    }

    /// Criteria passed to every escalation check so far.
    pub fn criteria(&self) -> Vec<String> {
        self.criteria.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextOracle for Scripted {
    async fn answer_binary_question(
        &self,
        question: &str,
        _context: &str,
    ) -> Result<bool, OracleError> {
        self.answers.get(question).cloned().unwrap_or(Ok(false))
    }

    async fn check_escalation(&self, criteria: &str, _message: &str) -> Result<bool, OracleError> {
        self.criteria.lock().unwrap().push(criteria.to_string());
        self.escalation.clone()
    }

    async fn extract_notice_fields(&self, _message: &str) -> Result<NoticeRecord, OracleError> {
        self.record.clone()
    }
}

/// Instant simulated actions that count calls, with optional injected faults.
pub struct Recording {
    inner: SimulatedActions,
    escalations: AtomicUsize,
    escalation_recipients: Mutex<Vec<Vec<String>>>,
    tickets: AtomicUsize,
    forwards: Mutex<Vec<Vec<String>>>,
    notifications: Mutex<Vec<(String, String)>>,
    fail_escalations: bool,
    fail_tickets: bool,
    repeat_question: Option<String>,
}

impl Recording {
    pub fn instant() -> Self {
        Self::with_desk(TicketDesk::default())
    }

    /// Instant actions over a custom follow-up pool, asked in pool order.
    pub fn with_desk(desk: TicketDesk) -> Self {
        Self {
            inner: SimulatedActions::new(SimulationConfig::instant(), desk.with_chooser(FirstChooser)),
            escalations: AtomicUsize::new(0),
            escalation_recipients: Mutex::new(Vec::new()),
            tickets: AtomicUsize::new(0),
            forwards: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
            fail_escalations: false,
            fail_tickets: false,
            repeat_question: None,
        }
    }

    pub fn failing_escalations(mut self) -> Self {
        self.fail_escalations = true;
        self
    }

    pub fn failing_tickets(mut self) -> Self {
        self.fail_tickets = true;
        self
    }

    /// Ticket backend that keeps asking the same question.
    pub fn repeating_question(mut self, question: &str) -> Self {
        self.repeat_question = Some(question.to_string());
        self
    }

    pub fn escalations(&self) -> usize {
        self.escalations.load(Ordering::SeqCst)
    }

    pub fn escalation_recipients(&self) -> Vec<Vec<String>> {
        self.escalation_recipients.lock().unwrap().clone()
    }

    pub fn tickets(&self) -> usize {
        self.tickets.load(Ordering::SeqCst)
    }

    pub fn forwards(&self) -> Vec<Vec<String>> {
        self.forwards.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<(String, String)> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl SideEffects for Recording {
    async fn send_escalation_notice(
        &self,
        record: &NoticeRecord,
        recipients: &[String],
    ) -> Result<(), ActionError> {
        self.escalations.fetch_add(1, Ordering::SeqCst);
        self.escalation_recipients
            .lock()
            .unwrap()
            .push(recipients.to_vec());
        if self.fail_escalations {
            return Err(ActionError::Failed {
                action: "send_escalation_notice",
                cause: "smtp relay down".into(),
            });
        }
        self.inner.send_escalation_notice(record, recipients).await
    }

    async fn forward_message(
        &self,
        message: &str,
        recipients: &RecipientList,
    ) -> Result<Vec<String>, ActionError> {
        let delivered = self.inner.forward_message(message, recipients).await?;
        self.forwards.lock().unwrap().push(delivered.clone());
        Ok(delivered)
    }

    async fn notify_wrong_recipient(
        &self,
        sender_email: &str,
        correct_department: &str,
    ) -> Result<(), ActionError> {
        self.inner
            .notify_wrong_recipient(sender_email, correct_department)
            .await?;
        self.notifications
            .lock()
            .unwrap()
            .push((sender_email.to_string(), correct_department.to_string()));
        Ok(())
    }

    async fn file_legal_ticket(
        &self,
        ledger: &FollowUpLedger,
        record: &NoticeRecord,
    ) -> Result<Option<String>, ActionError> {
        self.tickets.fetch_add(1, Ordering::SeqCst);
        if self.fail_tickets {
            return Err(ActionError::Failed {
                action: "file_legal_ticket",
                cause: "ticketing API returned 500".into(),
            });
        }
        if let Some(q) = &self.repeat_question {
            return Ok(Some(q.clone()));
        }
        self.inner.file_legal_ticket(ledger, record).await
    }

    fn follow_up_pool_size(&self) -> usize {
        self.inner.follow_up_pool_size()
    }
}

/// Dispatch oracle replaying a fixed sequence of decisions and recording
/// the history length it saw each time.
pub struct ScriptedDispatch {
    replies: Mutex<Vec<Result<Decision, OracleError>>>,
    seen: Mutex<Vec<ConversationHistory>>,
    /// Returned once the script runs out.
    fallback: Decision,
}

impl ScriptedDispatch {
    pub fn new(replies: Vec<Result<Decision, OracleError>>) -> Self {
        let mut replies = replies;
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
            seen: Mutex::new(Vec::new()),
            fallback: Decision::default(),
        }
    }

    /// Keep returning `decision` after the script runs out.
    pub fn then_forever(mut self, decision: Decision) -> Self {
        self.fallback = decision;
        self
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn seen(&self) -> Vec<ConversationHistory> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl DispatchOracle for ScriptedDispatch {
    async fn decide(&self, history: &ConversationHistory) -> Result<Decision, OracleError> {
        self.seen.lock().unwrap().push(history.clone());
        let next = self.replies.lock().unwrap().pop();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}
