//! Notice workflow: extract fields, check escalation, notify, file a ticket.
//!
//! ```text
//! ParseNotice → CheckEscalation ─┬─→ SendEscalationNotice ─→ FileTicket
//!                                └─────────────────────────→ FileTicket
//! FileTicket ⇄ AnswerFollowUp (until no follow-up remains) → done
//! ```
//!
//! The run owns its [`RunState`] exclusively and threads it through each
//! step. Steps never abort the run: oracle and action failures degrade the
//! step, are logged, and are listed in the returned [`NoticeOutcome`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use noticeflow_actions::SideEffects;
use noticeflow_ai::TextOracle;
use noticeflow_core::{Answer, EscalationPolicy, FollowUpLedger, NoticeRecord};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, error, info, info_span, warn};

static RUN_SEQ: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    ParseNotice,
    CheckEscalation,
    SendEscalationNotice,
    FileTicket,
    AnswerFollowUp,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParseNotice => "parse_notice",
            Self::CheckEscalation => "check_escalation",
            Self::SendEscalationNotice => "send_escalation_notice",
            Self::FileTicket => "file_ticket",
            Self::AnswerFollowUp => "answer_follow_up",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// No follow-up remained; the ticket was filed.
    Filed,
    /// Extraction produced no record, so no ticket could be filed.
    NoRecord,
    /// The ticket backend failed; filing should be retried later.
    TicketDeferred,
    Cancelled,
    CycleCapReached,
}

impl Termination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Filed => "filed",
            Self::NoRecord => "no record",
            Self::TicketDeferred => "deferred",
            Self::Cancelled => "cancelled",
            Self::CycleCapReached => "cycle cap reached",
        }
    }
}

/// A step that did not do its full job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Degradation {
    pub step: Step,
    pub reason: String,
}

/// Sub-check results of the escalation step. `text` is `None` when the
/// oracle failed and the policy fallback was used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EscalationCheck {
    pub text: Option<bool>,
    pub fine: bool,
}

/// State threaded through one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub message: String,
    pub record: Option<NoticeRecord>,
    pub policy: EscalationPolicy,
    pub requires_escalation: bool,
    pub recipients: Vec<String>,
    pub follow_ups: FollowUpLedger,
    pub pending_follow_up: Option<String>,
}

impl RunState {
    fn new(request: NoticeRequest) -> Self {
        Self {
            message: request.message,
            record: None,
            policy: request.policy,
            requires_escalation: false,
            recipients: request.recipients,
            follow_ups: FollowUpLedger::new(),
            pending_follow_up: None,
        }
    }
}

/// Entry arguments for one run.
#[derive(Debug, Clone)]
pub struct NoticeRequest {
    pub message: String,
    pub policy: EscalationPolicy,
    pub recipients: Vec<String>,
}

impl NoticeRequest {
    pub fn new(message: impl Into<String>, policy: EscalationPolicy) -> Self {
        Self {
            message: message.into(),
            policy,
            recipients: Vec::new(),
        }
    }

    pub fn with_recipients(mut self, recipients: impl IntoIterator<Item = String>) -> Self {
        self.recipients = recipients.into_iter().collect();
        self
    }
}

/// Terminal result of a run. Always produced, even when every step degraded.
#[derive(Debug, Clone, Serialize)]
pub struct NoticeOutcome {
    pub state: RunState,
    pub termination: Termination,
    pub escalation: EscalationCheck,
    /// Steps in the order they ran.
    pub trace: Vec<Step>,
    pub degradations: Vec<Degradation>,
}

impl NoticeOutcome {
    pub fn follow_up_cycles(&self) -> usize {
        self.trace
            .iter()
            .filter(|s| **s == Step::AnswerFollowUp)
            .count()
    }

    pub fn ran(&self, step: Step) -> bool {
        self.trace.contains(&step)
    }

    /// Text summary handed back to the dispatch loop.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        match &self.state.record {
            Some(record) => {
                lines.push("Notice data extracted successfully.".to_string());
                lines.push(to_json(record));
            }
            None => lines.push("Error: Failed to extract notice data from the email.".to_string()),
        }

        if !self.state.follow_ups.is_empty() {
            lines.push("\nFollow-up questions answered:".to_string());
            lines.push(to_json(&self.state.follow_ups));
        }

        if self.state.requires_escalation {
            lines.push("\nNotice required escalation.".to_string());
        } else {
            lines.push("\nNotice did not require escalation.".to_string());
        }

        lines.push(format!("Legal ticket: {}.", self.termination.as_str()));
        for d in &self.degradations {
            lines.push(format!("Degraded step {}: {}", d.step, d.reason));
        }
        lines.join("\n")
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("<unserialisable: {e}>"))
}

/// Outcome of a FileTicket step.
enum Filing {
    Filed,
    NeedsAnswer,
    NoRecord,
    Deferred,
}

/// Mutable bookkeeping for one run.
struct Run {
    state: RunState,
    escalation: EscalationCheck,
    trace: Vec<Step>,
    degradations: Vec<Degradation>,
}

impl Run {
    fn degrade(&mut self, step: Step, reason: impl Into<String>) {
        self.degradations.push(Degradation {
            step,
            reason: reason.into(),
        });
    }

    fn finish(self, termination: Termination) -> NoticeOutcome {
        NoticeOutcome {
            state: self.state,
            termination,
            escalation: self.escalation,
            trace: self.trace,
            degradations: self.degradations,
        }
    }
}

/// Runs notices against shared, stateless collaborators. Independent runs
/// may execute concurrently.
#[derive(Clone)]
pub struct NoticeWorkflow {
    oracle: Arc<dyn TextOracle>,
    actions: Arc<dyn SideEffects>,
    cycle_cap: usize,
}

impl NoticeWorkflow {
    /// The follow-up cycle cap is the action layer's pool size plus one. The
    /// pool shrinks every pass, so the cap only trips on a misbehaving
    /// ticket backend.
    pub fn new(oracle: Arc<dyn TextOracle>, actions: Arc<dyn SideEffects>) -> Self {
        let cycle_cap = actions.follow_up_pool_size() + 1;
        Self {
            oracle,
            actions,
            cycle_cap,
        }
    }

    pub fn cycle_cap(&self) -> usize {
        self.cycle_cap
    }

    pub fn with_cycle_cap(mut self, cycle_cap: usize) -> Self {
        self.cycle_cap = cycle_cap;
        self
    }

    /// Run to completion inside a fresh span tagged with a run number.
    pub async fn run(&self, request: NoticeRequest, cancel: &CancellationToken) -> NoticeOutcome {
        let run = RUN_SEQ.fetch_add(1, Ordering::Relaxed);
        self.run_in(info_span!("notice", run), request, cancel).await
    }

    /// Run to completion with all step logging attributed to `span`.
    pub async fn run_in(
        &self,
        span: Span,
        request: NoticeRequest,
        cancel: &CancellationToken,
    ) -> NoticeOutcome {
        self.drive(request, cancel).instrument(span).await
    }

    async fn drive(&self, request: NoticeRequest, cancel: &CancellationToken) -> NoticeOutcome {
        let mut run = Run {
            state: RunState::new(request),
            escalation: EscalationCheck::default(),
            trace: Vec::new(),
            degradations: Vec::new(),
        };
        let mut cycles = 0usize;
        let mut step = Step::ParseNotice;

        let termination = loop {
            if cancel.is_cancelled() {
                warn!(next = %step, "notice run cancelled");
                break Termination::Cancelled;
            }
            run.trace.push(step);

            step = match step {
                Step::ParseNotice => {
                    self.parse_notice(&mut run).await;
                    Step::CheckEscalation
                }
                Step::CheckEscalation => {
                    self.check_escalation(&mut run).await;
                    if run.state.requires_escalation {
                        Step::SendEscalationNotice
                    } else {
                        Step::FileTicket
                    }
                }
                Step::SendEscalationNotice => {
                    self.send_escalation_notice(&mut run).await;
                    Step::FileTicket
                }
                Step::FileTicket => match self.file_ticket(&mut run).await {
                    Filing::NeedsAnswer if cycles >= self.cycle_cap => {
                        error!(cap = self.cycle_cap, "follow-up cycle cap reached");
                        run.degrade(Step::FileTicket, "follow-up cycle cap reached");
                        break Termination::CycleCapReached;
                    }
                    Filing::NeedsAnswer => {
                        cycles += 1;
                        Step::AnswerFollowUp
                    }
                    Filing::Filed => break Termination::Filed,
                    Filing::NoRecord => break Termination::NoRecord,
                    Filing::Deferred => break Termination::TicketDeferred,
                },
                Step::AnswerFollowUp => {
                    self.answer_follow_up(&mut run).await;
                    Step::FileTicket
                }
            };
        };

        info!(
            termination = termination.as_str(),
            escalated = run.state.requires_escalation,
            follow_ups = run.state.follow_ups.len(),
            degraded = run.degradations.len(),
            "notice run finished"
        );
        run.finish(termination)
    }

    async fn parse_notice(&self, run: &mut Run) {
        match self.oracle.extract_notice_fields(&run.state.message).await {
            Ok(record) => {
                info!(empty = record.is_empty(), "notice parsed");
                run.state.record = Some(record);
            }
            Err(e) => {
                error!(error = %e, "notice extraction failed; continuing without a record");
                run.degrade(Step::ParseNotice, format!("extraction failed: {e}"));
                run.state.record = None;
            }
        }
    }

    async fn check_escalation(&self, run: &mut Run) {
        let on_failure = run.state.policy.on_failure;
        let result = self
            .oracle
            .check_escalation(&run.state.policy.criteria, &run.state.message)
            .await;
        let text = match result {
            Ok(triggered) => Some(triggered),
            Err(e) => {
                let fallback = on_failure.fallback();
                warn!(
                    error = %e,
                    policy = on_failure.as_str(),
                    fallback,
                    "escalation text check failed; applying failure policy"
                );
                run.degrade(
                    Step::CheckEscalation,
                    format!(
                        "text check failed ({e}); treated as {fallback} under {} policy",
                        on_failure.as_str()
                    ),
                );
                None
            }
        };
        let text_trigger = text.unwrap_or(on_failure.fallback());

        let fine = run
            .state
            .record
            .as_ref()
            .map(|record| run.state.policy.fine_triggers(record.max_potential_fine));
        let requires = match fine {
            Some(fine) => {
                run.escalation = EscalationCheck { text, fine };
                text_trigger || fine
            }
            None => {
                warn!(text_trigger, "no notice record; escalation forced off");
                run.degrade(
                    Step::CheckEscalation,
                    "no notice record; escalation forced off",
                );
                run.escalation = EscalationCheck { text, fine: false };
                false
            }
        };

        info!(
            text = ?run.escalation.text,
            fine = run.escalation.fine,
            requires,
            "escalation checked"
        );
        run.state.requires_escalation = requires;
    }

    async fn send_escalation_notice(&self, run: &mut Run) {
        let Some(record) = &run.state.record else {
            warn!("cannot send escalation notice without a record");
            run.degrade(
                Step::SendEscalationNotice,
                "escalation required but no notice record",
            );
            return;
        };
        if run.state.recipients.is_empty() {
            warn!("cannot send escalation notice: no recipients configured");
            run.degrade(
                Step::SendEscalationNotice,
                "escalation required but no recipients configured",
            );
            return;
        }
        let result = self
            .actions
            .send_escalation_notice(record, &run.state.recipients)
            .await;
        if let Err(e) = result {
            error!(error = %e, "escalation notice failed; continuing to ticket filing");
            run.degrade(Step::SendEscalationNotice, e.to_string());
        }
    }

    async fn file_ticket(&self, run: &mut Run) -> Filing {
        let Some(record) = &run.state.record else {
            warn!("cannot file legal ticket without a record");
            run.degrade(Step::FileTicket, "no notice record to file");
            return Filing::NoRecord;
        };

        let result = self
            .actions
            .file_legal_ticket(&run.state.follow_ups, record)
            .await;
        match result {
            Ok(None) => {
                run.state.pending_follow_up = None;
                Filing::Filed
            }
            Ok(Some(question)) if run.state.follow_ups.contains(&question) => {
                error!(%question, "ticket backend re-offered an answered question");
                run.degrade(
                    Step::FileTicket,
                    format!("follow-up re-offered: {question}"),
                );
                Filing::Deferred
            }
            Ok(Some(question)) => {
                info!(%question, "follow-up required");
                run.state.pending_follow_up = Some(question);
                Filing::NeedsAnswer
            }
            Err(e) => {
                error!(error = %e, "legal ticket filing failed; deferring");
                run.degrade(Step::FileTicket, e.to_string());
                Filing::Deferred
            }
        }
    }

    async fn answer_follow_up(&self, run: &mut Run) {
        let Some(question) = run.state.pending_follow_up.take() else {
            warn!("no pending follow-up to answer");
            return;
        };
        let result = self
            .oracle
            .answer_binary_question(&question, &run.state.message)
            .await;
        let answer = match result {
            Ok(value) => Answer::from(value),
            Err(e) => {
                warn!(%question, error = %e, "follow-up unanswerable");
                run.degrade(
                    Step::AnswerFollowUp,
                    format!("could not answer '{question}': {e}"),
                );
                Answer::Unanswerable
            }
        };
        info!(%question, answer = ?answer, "follow-up answered");
        run.state.follow_ups.record(question, answer);
    }
}
