//! Dispatch loop: ask the oracle for actions, run them, feed results back.
//!
//! Each iteration shows the full [`ConversationHistory`] to the
//! [`DispatchOracle`], executes the requested actions strictly in order and
//! appends one result turn per action. A decision with no actions ends the
//! session; its message (or the last text in history) is the answer. The
//! notice workflow runs as a single action and only its summary is recorded.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use noticeflow_actions::SideEffects;
use noticeflow_ai::{DispatchOracle, OracleError};
use noticeflow_core::{ActionRequest, ConversationHistory, Decision, EscalationPolicy, Turn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

use crate::notice::{NoticeRequest, NoticeWorkflow};

static SESSION_SEQ: AtomicU64 = AtomicU64::new(1);

/// Why a session stopped without a final answer. Every variant keeps the
/// history up to that point, including results of actions that already ran.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatch did not finish within {max_iterations} iterations")]
    Exhausted {
        max_iterations: usize,
        history: Box<ConversationHistory>,
    },

    #[error("dispatch cancelled")]
    Cancelled { history: Box<ConversationHistory> },

    #[error("dispatch oracle failed: {source}")]
    Oracle {
        source: OracleError,
        history: Box<ConversationHistory>,
    },
}

impl DispatchError {
    pub fn history(&self) -> &ConversationHistory {
        match self {
            Self::Exhausted { history, .. }
            | Self::Cancelled { history }
            | Self::Oracle { history, .. } => history,
        }
    }

    /// Actions that ran before the session stopped.
    pub fn completed_actions(&self) -> usize {
        self.history()
            .turns()
            .iter()
            .filter(|t| matches!(t, Turn::ActionResult { .. }))
            .count()
    }
}

/// A decision attempt that produced nothing usable.
enum Halt {
    Cancelled,
    Oracle(OracleError),
}

/// Escalation settings used when the oracle invokes the notice workflow.
#[derive(Debug, Clone)]
pub struct NoticeDefaults {
    pub policy: EscalationPolicy,
    pub recipients: Vec<String>,
}

impl Default for NoticeDefaults {
    fn default() -> Self {
        Self {
            policy: EscalationPolicy {
                criteria: "safety violations, structural issues, or fines over $50,000".to_string(),
                fine_threshold: 50_000.0,
                on_failure: Default::default(),
            },
            recipients: vec![
                "legal-team@example.com".to_string(),
                "compliance-dept@example.com".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Oracle decisions allowed per session.
    pub max_iterations: usize,
    /// Extra attempts for a transiently unavailable oracle, per iteration.
    pub decision_retries: u32,
    pub retry_backoff: Duration,
    pub notice: NoticeDefaults,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            decision_retries: 2,
            retry_backoff: Duration::from_millis(500),
            notice: NoticeDefaults::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub answer: String,
    pub history: ConversationHistory,
    pub iterations: usize,
}

pub struct DispatchWorkflow {
    oracle: Arc<dyn DispatchOracle>,
    actions: Arc<dyn SideEffects>,
    notices: NoticeWorkflow,
    config: DispatchConfig,
}

impl DispatchWorkflow {
    pub fn new(
        oracle: Arc<dyn DispatchOracle>,
        actions: Arc<dyn SideEffects>,
        notices: NoticeWorkflow,
        config: DispatchConfig,
    ) -> Self {
        Self {
            oracle,
            actions,
            notices,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Handle one inbound message in a fresh span tagged with a session number.
    pub async fn run(
        &self,
        inbound: &str,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, DispatchError> {
        let session = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
        self.run_in(info_span!("dispatch", session), inbound, cancel)
            .await
    }

    /// Handle one inbound message with all logging attributed to `span`.
    pub async fn run_in(
        &self,
        span: Span,
        inbound: &str,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.drive(inbound, cancel).instrument(span).await
    }

    async fn drive(
        &self,
        inbound: &str,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome, DispatchError> {
        let mut history = ConversationHistory::new(inbound);
        let max_iterations = self.config.max_iterations;

        for iteration in 1..=max_iterations {
            if cancel.is_cancelled() {
                return Err(DispatchError::Cancelled {
                    history: Box::new(history),
                });
            }

            let decision = match self.decide(&history, cancel).await {
                Ok(decision) => decision,
                Err(Halt::Oracle(e)) if !e.is_transient() => {
                    warn!(iteration, error = %e, "unusable decision; asking again");
                    history.push(Turn::Note {
                        content: format!("Error: the previous decision could not be parsed ({e}). Respond with the JSON format described."),
                    });
                    continue;
                }
                Err(Halt::Oracle(source)) => {
                    error!(iteration, error = %source, "dispatch oracle unavailable; aborting");
                    return Err(DispatchError::Oracle {
                        source,
                        history: Box::new(history),
                    });
                }
                Err(Halt::Cancelled) => {
                    return Err(DispatchError::Cancelled {
                        history: Box::new(history),
                    });
                }
            };

            if decision.is_final() {
                history.push(Turn::Decision(decision));
                let answer = history.last_text().unwrap_or_default().to_string();
                info!(iteration, turns = history.len(), "dispatch complete");
                return Ok(DispatchOutcome {
                    answer,
                    history,
                    iterations: iteration,
                });
            }

            info!(
                iteration,
                actions = decision.actions.len(),
                "oracle requested actions"
            );
            let actions = decision.actions.clone();
            history.push(Turn::Decision(decision));

            for action in &actions {
                if cancel.is_cancelled() {
                    return Err(DispatchError::Cancelled {
                        history: Box::new(history),
                    });
                }
                let output = self.execute(action, cancel).await;
                debug!(action = action.name(), %output, "action finished");
                history.push(Turn::ActionResult {
                    action: action.name().to_string(),
                    output,
                });
            }
        }

        error!(max_iterations, "dispatch iteration cap exceeded");
        Err(DispatchError::Exhausted {
            max_iterations,
            history: Box::new(history),
        })
    }

    async fn decide(
        &self,
        history: &ConversationHistory,
        cancel: &CancellationToken,
    ) -> Result<Decision, Halt> {
        let mut attempt = 0;
        loop {
            match self.oracle.decide(history).await {
                Ok(decision) => return Ok(decision),
                Err(e) if e.is_transient() && attempt < self.config.decision_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "dispatch oracle unavailable; retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(Halt::Cancelled),
                        _ = tokio::time::sleep(self.config.retry_backoff * attempt) => {}
                    }
                }
                Err(e) => return Err(Halt::Oracle(e)),
            }
        }
    }

    async fn execute(&self, action: &ActionRequest, cancel: &CancellationToken) -> String {
        match action {
            ActionRequest::ForwardMessage {
                message,
                recipients,
            } => match self.actions.forward_message(message, recipients).await {
                Ok(delivered) => format!(
                    "Successfully forwarded email to {}.",
                    delivered.join(", ")
                ),
                Err(e) => {
                    warn!(error = %e, "forward failed");
                    format!("Error: Failed to forward email. Details: {e}")
                }
            },
            ActionRequest::NotifyWrongRecipient {
                sender_email,
                correct_department,
            } => match self
                .actions
                .notify_wrong_recipient(sender_email, correct_department)
                .await
            {
                Ok(()) => format!(
                    "Successfully sent wrong email notification to {sender_email}, advising them to use {correct_department}."
                ),
                Err(e) => {
                    warn!(error = %e, "wrong-recipient notification failed");
                    format!("Error: Failed to send notification. Details: {e}")
                }
            },
            ActionRequest::InvokeNoticeWorkflow {
                message,
                escalation_criteria,
            } => {
                let mut policy = self.config.notice.policy.clone();
                if let Some(criteria) = escalation_criteria
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                {
                    policy.criteria = criteria.to_string();
                }
                let request = NoticeRequest::new(message.clone(), policy)
                    .with_recipients(self.config.notice.recipients.clone());
                self.notices.run(request, cancel).await.summary()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Recording, Scripted, ScriptedDispatch, notice_record_with_fine};
    use noticeflow_core::RecipientList;

    const INVOICE: &str = "Hi, attached is invoice #4521 for October landscaping services. \
                           Payment is due in 30 days. Regards, Green Lawns AP (ap@greenlawns.com)";

    fn dispatcher(
        oracle: &Arc<ScriptedDispatch>,
        actions: &Arc<Recording>,
        text: &Arc<Scripted>,
        config: DispatchConfig,
    ) -> DispatchWorkflow {
        let notices = NoticeWorkflow::new(text.clone(), actions.clone());
        DispatchWorkflow::new(oracle.clone(), actions.clone(), notices, config)
    }

    fn fast_config() -> DispatchConfig {
        DispatchConfig {
            retry_backoff: Duration::ZERO,
            ..Default::default()
        }
    }

    fn invoice_routing() -> Decision {
        Decision {
            message: None,
            actions: vec![
                ActionRequest::ForwardMessage {
                    message: INVOICE.into(),
                    recipients: RecipientList::from("billing@company.com"),
                },
                ActionRequest::NotifyWrongRecipient {
                    sender_email: "ap@greenlawns.com".into(),
                    correct_department: "billing@company.com".into(),
                },
            ],
        }
    }

    fn done(message: &str) -> Decision {
        Decision {
            message: Some(message.into()),
            actions: vec![],
        }
    }

    #[tokio::test]
    async fn invoice_is_forwarded_and_sender_notified() {
        let oracle = Arc::new(ScriptedDispatch::new(vec![
            Ok(invoice_routing()),
            Ok(done("Forwarded the invoice to billing and told the sender.")),
        ]));
        let actions = Arc::new(Recording::instant());
        let flow = dispatcher(&oracle, &actions, &Arc::new(Scripted::new()), fast_config());

        let outcome = flow.run(INVOICE, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.answer, "Forwarded the invoice to billing and told the sender.");
        assert_eq!(outcome.iterations, 2);
        assert_eq!(actions.forwards(), vec![vec!["billing@company.com".to_string()]]);
        assert_eq!(
            actions.notifications(),
            vec![("ap@greenlawns.com".to_string(), "billing@company.com".to_string())]
        );

        // Second decision saw both action results, in request order.
        let seen = oracle.seen();
        let turns = seen[1].turns();
        assert_eq!(turns.len(), 4);
        assert!(matches!(&turns[2], Turn::ActionResult { action, .. } if action == "forward_message"));
        assert!(
            matches!(&turns[3], Turn::ActionResult { action, .. } if action == "notify_wrong_recipient")
        );
    }

    #[tokio::test]
    async fn notice_workflow_runs_as_one_action() {
        let oracle = Arc::new(ScriptedDispatch::new(vec![
            Ok(Decision {
                message: None,
                actions: vec![ActionRequest::InvokeNoticeWorkflow {
                    message: "OSHA notice: max fine $75,000".into(),
                    escalation_criteria: Some("there are fines over $10,000".into()),
                }],
            }),
            Ok(done("Notice processed and escalated.")),
        ]));
        let actions = Arc::new(Recording::instant());
        let text = Arc::new(
            Scripted::new()
                .with_record(notice_record_with_fine(75_000.0))
                .with_escalation(Ok(false)),
        );
        let flow = dispatcher(&oracle, &actions, &text, fast_config());

        let outcome = flow
            .run("Please process this OSHA notice", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(actions.escalations(), 1);
        assert_eq!(text.criteria(), vec!["there are fines over $10,000"]);
        assert_eq!(
            actions.escalation_recipients(),
            vec![vec![
                "legal-team@example.com".to_string(),
                "compliance-dept@example.com".to_string()
            ]]
        );
        let results: Vec<&str> = outcome
            .history
            .turns()
            .iter()
            .filter_map(|t| match t {
                Turn::ActionResult { output, .. } => Some(output.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].starts_with("Notice data extracted successfully."));
        assert!(results[0].contains("Notice required escalation."));
        assert!(results[0].contains("Legal ticket: filed."));
    }

    fn invoke_notice(criteria: Option<&str>) -> Decision {
        Decision {
            message: None,
            actions: vec![ActionRequest::InvokeNoticeWorkflow {
                message: "Notice of violation, max fine $75,000".into(),
                escalation_criteria: criteria.map(str::to_string),
            }],
        }
    }

    #[tokio::test]
    async fn blank_or_missing_criteria_fall_back_to_defaults() {
        for criteria in [None, Some(""), Some("   ")] {
            let oracle = Arc::new(ScriptedDispatch::new(vec![
                Ok(invoke_notice(criteria)),
                Ok(done("Processed.")),
            ]));
            let actions = Arc::new(Recording::instant());
            let text = Arc::new(
                Scripted::new()
                    .with_record(notice_record_with_fine(1.0))
                    .with_escalation(Ok(false)),
            );
            let flow = dispatcher(&oracle, &actions, &text, fast_config());

            flow.run("notice", &CancellationToken::new()).await.unwrap();

            assert_eq!(
                text.criteria(),
                vec![NoticeDefaults::default().policy.criteria],
                "{criteria:?}"
            );
        }
    }

    #[tokio::test]
    async fn invoked_notice_uses_configured_threshold_and_recipients() {
        let config = DispatchConfig {
            notice: NoticeDefaults {
                policy: EscalationPolicy::new("anything on fire", 100_000.0).unwrap(),
                recipients: vec!["ops@company.com".into()],
            },
            ..fast_config()
        };

        // 75,000 is under the configured threshold.
        let oracle = Arc::new(ScriptedDispatch::new(vec![
            Ok(invoke_notice(None)),
            Ok(done("Processed.")),
        ]));
        let actions = Arc::new(Recording::instant());
        let text = Arc::new(
            Scripted::new()
                .with_record(notice_record_with_fine(75_000.0))
                .with_escalation(Ok(false)),
        );
        let flow = dispatcher(&oracle, &actions, &text, config.clone());
        let outcome = flow.run("notice", &CancellationToken::new()).await.unwrap();

        assert_eq!(text.criteria(), vec!["anything on fire"]);
        assert_eq!(actions.escalations(), 0);
        let Turn::ActionResult { output, .. } = &outcome.history.turns()[2] else {
            panic!("expected action result");
        };
        assert!(output.contains("Notice did not require escalation."));

        // Text trigger escalates to the configured recipients.
        let oracle = Arc::new(ScriptedDispatch::new(vec![
            Ok(invoke_notice(None)),
            Ok(done("Processed.")),
        ]));
        let actions = Arc::new(Recording::instant());
        let text = Arc::new(
            Scripted::new()
                .with_record(notice_record_with_fine(75_000.0))
                .with_escalation(Ok(true)),
        );
        let flow = dispatcher(&oracle, &actions, &text, config);
        flow.run("notice", &CancellationToken::new()).await.unwrap();

        assert_eq!(
            actions.escalation_recipients(),
            vec![vec!["ops@company.com".to_string()]]
        );
    }

    #[tokio::test]
    async fn action_failures_become_history_text() {
        let oracle = Arc::new(ScriptedDispatch::new(vec![
            Ok(Decision {
                message: None,
                actions: vec![ActionRequest::ForwardMessage {
                    message: "hello".into(),
                    recipients: RecipientList::from(" , , "),
                }],
            }),
            Ok(done("Could not forward: no recipient.")),
        ]));
        let actions = Arc::new(Recording::instant());
        let flow = dispatcher(&oracle, &actions, &Arc::new(Scripted::new()), fast_config());

        let outcome = flow.run("hello", &CancellationToken::new()).await.unwrap();

        let Turn::ActionResult { output, .. } = &outcome.history.turns()[2] else {
            panic!("expected action result");
        };
        assert!(output.starts_with("Error:"));
        assert!(output.contains("no valid recipient"));
        assert!(actions.forwards().is_empty());
    }

    #[tokio::test]
    async fn never_finishing_oracle_exhausts_the_cap() {
        let oracle = Arc::new(ScriptedDispatch::new(vec![]).then_forever(invoice_routing()));
        let actions = Arc::new(Recording::instant());
        let config = DispatchConfig {
            max_iterations: 3,
            ..fast_config()
        };
        let flow = dispatcher(&oracle, &actions, &Arc::new(Scripted::new()), config);

        let err = flow.run(INVOICE, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, DispatchError::Exhausted { max_iterations: 3, .. }));
        assert_eq!(oracle.calls(), 3);
        assert_eq!(actions.forwards().len(), 3);
        // Three rounds of forward + notify already happened.
        assert_eq!(err.completed_actions(), 6);
        assert_eq!(err.history().len(), 1 + 3 * 3);
    }

    #[tokio::test]
    async fn transient_oracle_failures_are_retried() {
        let oracle = Arc::new(ScriptedDispatch::new(vec![
            Err(OracleError::Unavailable("502".into())),
            Err(OracleError::Unavailable("502".into())),
            Ok(done("Nothing to do.")),
        ]));
        let actions = Arc::new(Recording::instant());
        let flow = dispatcher(&oracle, &actions, &Arc::new(Scripted::new()), fast_config());

        let outcome = flow.run("hi", &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.answer, "Nothing to do.");
        assert_eq!(outcome.iterations, 1);
        assert_eq!(oracle.calls(), 3);
    }

    #[tokio::test]
    async fn persistent_outage_aborts() {
        let oracle = Arc::new(ScriptedDispatch::new(vec![
            Err(OracleError::Unavailable("down".into())),
            Err(OracleError::Unavailable("down".into())),
            Err(OracleError::Unavailable("down".into())),
        ]));
        let actions = Arc::new(Recording::instant());
        let flow = dispatcher(&oracle, &actions, &Arc::new(Scripted::new()), fast_config());

        let err = flow.run("hi", &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Oracle {
                source: OracleError::Unavailable(_),
                ..
            }
        ));
        assert_eq!(err.history().len(), 1);
    }

    #[tokio::test]
    async fn malformed_decision_is_noted_and_counts_toward_cap() {
        let oracle = Arc::new(ScriptedDispatch::new(vec![
            Err(OracleError::MalformedResponse("not json".into())),
            Ok(done("Done.")),
        ]));
        let actions = Arc::new(Recording::instant());
        let flow = dispatcher(&oracle, &actions, &Arc::new(Scripted::new()), fast_config());

        let outcome = flow.run("hi", &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.iterations, 2);
        assert!(matches!(outcome.history.turns()[1], Turn::Note { .. }));
        assert_eq!(outcome.answer, "Done.");
    }

    #[tokio::test]
    async fn final_answer_falls_back_to_last_text() {
        let oracle = Arc::new(ScriptedDispatch::new(vec![
            Ok(invoice_routing()),
            Ok(Decision::default()),
        ]));
        let actions = Arc::new(Recording::instant());
        let flow = dispatcher(&oracle, &actions, &Arc::new(Scripted::new()), fast_config());

        let outcome = flow.run(INVOICE, &CancellationToken::new()).await.unwrap();

        assert!(outcome.answer.starts_with("Successfully sent wrong email notification"));
    }

    #[tokio::test]
    async fn cancellation_stops_at_the_next_boundary() {
        let oracle = Arc::new(ScriptedDispatch::new(vec![Ok(invoice_routing())]));
        let actions = Arc::new(Recording::instant());
        let flow = dispatcher(&oracle, &actions, &Arc::new(Scripted::new()), fast_config());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = flow.run(INVOICE, &cancel).await.unwrap_err();

        assert!(matches!(err, DispatchError::Cancelled { .. }));
        assert_eq!(oracle.calls(), 0);
        assert_eq!(err.completed_actions(), 0);
    }
}
