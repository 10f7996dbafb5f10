//! Follow-up questions asked during ticket filing and their answers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Answer to a yes/no follow-up question.
///
/// Serialised as `true`, `false` or `null` (unanswerable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<bool>", into = "Option<bool>")]
pub enum Answer {
    Yes,
    No,
    /// The oracle failed; the question still counts as asked.
    Unanswerable,
}

impl From<bool> for Answer {
    fn from(value: bool) -> Self {
        if value { Self::Yes } else { Self::No }
    }
}

impl From<Option<bool>> for Answer {
    fn from(value: Option<bool>) -> Self {
        value.map_or(Self::Unanswerable, Self::from)
    }
}

impl From<Answer> for Option<bool> {
    fn from(answer: Answer) -> Self {
        match answer {
            Answer::Yes => Some(true),
            Answer::No => Some(false),
            Answer::Unanswerable => None,
        }
    }
}

/// Question text → answer. Grows monotonically; keys are never replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FollowUpLedger {
    answers: BTreeMap<String, Answer>,
}

impl FollowUpLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an answer. Returns `false` (and keeps the first answer) if the
    /// question was already present.
    pub fn record(&mut self, question: impl Into<String>, answer: Answer) -> bool {
        let question = question.into();
        if self.answers.contains_key(&question) {
            return false;
        }
        self.answers.insert(question, answer);
        true
    }

    pub fn contains(&self, question: &str) -> bool {
        self.answers.contains_key(question)
    }

    pub fn get(&self, question: &str) -> Option<Answer> {
        self.answers.get(question).copied()
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Answer)> {
        self.answers.iter().map(|(q, a)| (q.as_str(), *a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_answer_wins() {
        let mut ledger = FollowUpLedger::new();
        assert!(ledger.record("Does it mention Texas?", Answer::Yes));
        assert!(!ledger.record("Does it mention Texas?", Answer::No));
        assert_eq!(ledger.get("Does it mention Texas?"), Some(Answer::Yes));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn unanswerable_serialises_as_null() {
        let mut ledger = FollowUpLedger::new();
        ledger.record("a", Answer::Yes);
        ledger.record("b", Answer::No);
        ledger.record("c", Answer::Unanswerable);
        let json = serde_json::to_value(&ledger).unwrap();
        assert_eq!(json, serde_json::json!({"a": true, "b": false, "c": null}));

        let back: FollowUpLedger = serde_json::from_value(json).unwrap();
        assert_eq!(back, ledger);
    }

    #[test]
    fn unanswered_question_still_counts_as_asked() {
        let mut ledger = FollowUpLedger::new();
        ledger.record("HVAC?", Answer::Unanswerable);
        assert!(ledger.contains("HVAC?"));
    }
}
