//! Vertical card display for workflow outcomes.

use noticeflow_core::{Answer, ConversationHistory, NoticeRecord, Turn};
use noticeflow_workflow::{DispatchOutcome, NoticeOutcome};

const MAX_OUTPUT_CHARS: usize = 160;

// ── Public API ──

/// Print a notice run as a card grouped into record, escalation, follow-ups and outcome.
pub fn print_notice_card(outcome: &NoticeOutcome) {
    let title = outcome
        .state
        .record
        .as_ref()
        .and_then(|r| r.entity_name.as_deref())
        .unwrap_or("(no entity)");
    println!("=== Notice: {title} ===");
    println!();

    match &outcome.state.record {
        Some(record) => print_record(record),
        None => println!("Record\n  (extraction failed)\n"),
    }

    println!("Escalation");
    let text = match outcome.escalation.text {
        Some(true) => "matched",
        Some(false) => "not matched",
        None => "unavailable",
    };
    row("criteria", &outcome.state.policy.criteria);
    row("text trigger", text);
    row(
        "fine trigger",
        &format!(
            "{} (threshold {})",
            yes_no(outcome.escalation.fine),
            money(outcome.state.policy.fine_threshold)
        ),
    );
    row("required", yes_no(outcome.state.requires_escalation));
    if outcome.state.requires_escalation {
        row("recipients", &outcome.state.recipients.join(", "));
    }
    println!();

    if !outcome.state.follow_ups.is_empty() {
        println!("Follow-ups");
        for (question, answer) in outcome.state.follow_ups.iter() {
            println!("  {:<14} {}", answer_label(answer), question);
        }
        println!();
    }

    println!("Outcome");
    row("ticket", outcome.termination.as_str());
    row("follow-up cycles", &outcome.follow_up_cycles().to_string());
    let trace: Vec<&str> = outcome.trace.iter().map(|s| s.as_str()).collect();
    row("steps", &trace.join(" -> "));
    for d in &outcome.degradations {
        row(&format!("degraded {}", d.step), &d.reason);
    }
}

/// Print the dispatcher's final answer followed by a compact transcript.
pub fn print_dispatch(outcome: &DispatchOutcome) {
    println!("=== Dispatch ({} iterations) ===", outcome.iterations);
    println!();
    println!("{}", outcome.answer);
    println!();
    print_transcript(&outcome.history);
}

/// One line per turn: inbound message, decisions, action results and notes.
pub fn print_transcript(history: &ConversationHistory) {
    println!("Transcript");
    for turn in history.turns() {
        match turn {
            Turn::Inbound { content } => println!("  {:<22} {}", "inbound", clip(content)),
            Turn::Decision(decision) => {
                let names: Vec<&str> = decision.actions.iter().map(|a| a.name()).collect();
                if names.is_empty() {
                    println!("  {:<22} done", "decision");
                } else {
                    println!("  {:<22} {}", "decision", names.join(", "));
                }
            }
            Turn::ActionResult { action, output } => println!("  {:<22} {}", action, clip(output)),
            Turn::Note { content } => println!("  {:<22} {}", "note", clip(content)),
        }
    }
}

// ── Field rendering ──

fn print_record(record: &NoticeRecord) {
    println!("Record");
    opt_row("date of notice", record.date_of_notice.map(|d| d.to_string()));
    opt_row("entity", record.entity_name.clone());
    opt_row("phone", record.entity_phone.clone());
    opt_row("email", record.entity_email.clone());
    opt_row("project id", record.project_id.map(|id| id.to_string()));
    opt_row("site", record.site_location.clone());
    opt_row("violation", record.violation_type.clone());
    opt_row("required changes", record.required_changes.clone());
    opt_row(
        "compliance deadline",
        record.compliance_deadline.map(|d| d.to_string()),
    );
    opt_row("max potential fine", record.max_potential_fine.map(money));
    println!();
}

fn row(label: &str, value: &str) {
    println!("  {:<22} {}", label, value);
}

fn opt_row(label: &str, value: Option<String>) {
    if let Some(v) = value {
        row(label, &v);
    }
}

fn yes_no(b: bool) -> &'static str {
    if b { "yes" } else { "no" }
}

fn answer_label(answer: Answer) -> &'static str {
    match answer {
        Answer::Yes => "[yes]",
        Answer::No => "[no]",
        Answer::Unanswerable => "[unanswerable]",
    }
}

fn money(v: f64) -> String {
    format!("${v:.2}")
}

/// First line only, truncated.
fn clip(s: &str) -> String {
    let line = s.lines().next().unwrap_or_default();
    if line.chars().count() > MAX_OUTPUT_CHARS {
        let cut: String = line.chars().take(MAX_OUTPUT_CHARS).collect();
        format!("{cut}…")
    } else {
        line.to_string()
    }
}
