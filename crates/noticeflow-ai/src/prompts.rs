//! Prompt templates for each oracle task.
//!
//! Every prompt asks for raw JSON so the response can be decoded with
//! [`parse_json`](crate::parse_json) against a fixed shape.

use noticeflow_core::ConversationHistory;

// ── Binary question ──

pub const BINARY_QUESTION_SYSTEM: &str = "\
Answer the question based on the provided context as true for \"yes\" and false for \"no\". \
No other answers are allowed.

Respond ONLY with a JSON object. No markdown fences, no explanation, just raw JSON:
{\"is_true\": true | false}";

pub fn binary_question_user(question: &str, context: &str) -> String {
    format!("Context:\n{context}\n\nQuestion:\n{question}")
}

// ── Escalation check ──

pub const ESCALATION_SYSTEM: &str = "\
Determine whether the following notice received from a regulatory body requires \
immediate escalation according to the criteria given.

Respond ONLY with a JSON object. No markdown fences, no explanation, just raw JSON:
{\"needs_escalation\": true | false}";

pub fn escalation_user(criteria: &str, message: &str) -> String {
    format!(
        "Immediate escalation is required when {criteria}.\n\
         \n\
         Here's the notice message:\n\
         \n\
         {message}"
    )
}

// ── Notice extraction ──

pub const EXTRACTION_SYSTEM: &str = "\
Parse the date of notice, sending entity name, sending entity phone, sending entity email, \
project id, site location, violation type, required changes, compliance deadline, and \
maximum potential fine from the message. If any of the fields aren't present, set them to null. \
Cast dates into the YYYY-mm-dd format. The project id must be an integer. Use the full \
address for the site location if possible.

Respond ONLY with a JSON object. No markdown fences, no explanation, just raw JSON:
{
  \"date_of_notice_str\": \"YYYY-mm-dd\" or null,
  \"entity_name\": string or null,
  \"entity_phone\": string or null,
  \"entity_email\": string or null,
  \"project_id\": integer or null,
  \"site_location\": string or null,
  \"violation_type\": string or null,
  \"required_changes\": string or null,
  \"compliance_deadline_str\": \"YYYY-mm-dd\" or null,
  \"max_potential_fine\": number or null
}";

pub fn extraction_user(message: &str) -> String {
    format!("Here's the notice message:\n\n{message}")
}

// ── Dispatch ──

pub const DISPATCH_SYSTEM: &str = "\
You route inbound email for a property management company. Decide which actions to take, \
observe their results, and finish with a short summary of what was done.

Available actions:
- forward_message: {\"action\": \"forward_message\", \"message\": string, \"recipients\": \"a@x.com, b@x.com\"}
  Forwards the message to internal departments only. It does not reply to the sender.
- notify_wrong_recipient: {\"action\": \"notify_wrong_recipient\", \"sender_email\": string, \"correct_department\": string}
  Tells the sender they used the wrong address and which address to use instead.
- invoke_notice_workflow: {\"action\": \"invoke_notice_workflow\", \"message\": string, \"escalation_criteria\": string or null}
  Extracts structured fields from a regulatory notice, checks escalation and files a legal ticket. \
Use ONLY when the email clearly comes from a regulatory body, government agency, or auditor \
regarding a property or construction site. Pass the escalation criteria from the request if \
one was given. Do not request other actions for that email afterwards.

Routing guidelines:
1. Invoice/Billing: forward ONLY to billing@company.com, then notify the sender that the correct \
department is billing@company.com.
2. Customer support (issues, help, maintenance, refunds): forward to ALL of support@company.com, \
cdetuma@company.com, ctu@abc.com, then notify the sender that the correct department is \
support@company.com.
3. Regulatory notice (OSHA, building department, auditors): invoke_notice_workflow.
4. Other: infer the department from context (e.g. job application -> humanresources@company.com). \
If unsure, notify the sender suggesting general-info@company.com.

Respond ONLY with a JSON object. No markdown fences, no explanation, just raw JSON:
{\"message\": string or null, \"actions\": [action, ...]}
Return an empty actions list once the work is complete, with the final summary in message.";

/// Render the history as the user turn of a dispatch request.
pub fn dispatch_user(history: &ConversationHistory) -> Result<String, serde_json::Error> {
    let turns = serde_json::to_string_pretty(history)?;
    Ok(format!(
        "Conversation so far (oldest first):\n{turns}\n\nDecide the next actions."
    ))
}
