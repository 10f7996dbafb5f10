//! Legal ticket filing and its follow-up question pool.
//!
//! Filing only succeeds once every question in the pool has an entry in
//! the ledger. Each call offers one question the ledger does not have yet,
//! so a run asks at most `pool_size()` questions.

use noticeflow_core::FollowUpLedger;
use rand::Rng;

pub const DEFAULT_FOLLOW_UPS: &[&str] = &[
    "Does this message mention the states of Texas, Georgia, or New Jersey?",
    "Did this notice involve an issue with FakeAirCo's HVAC system?",
];

/// Picks which unanswered question to ask next.
pub trait QuestionChooser: Send + Sync {
    /// Index into `candidates`, which is never empty. Out-of-range picks
    /// fall back to the first candidate.
    fn choose(&self, candidates: &[&str]) -> usize;
}

/// Uniformly random pick.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomChooser;

impl QuestionChooser for RandomChooser {
    fn choose(&self, candidates: &[&str]) -> usize {
        rand::thread_rng().gen_range(0..candidates.len())
    }
}

/// Always the first remaining question in pool order.
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstChooser;

impl QuestionChooser for FirstChooser {
    fn choose(&self, _candidates: &[&str]) -> usize {
        0
    }
}

pub struct TicketDesk {
    pool: Vec<String>,
    chooser: Box<dyn QuestionChooser>,
}

impl Default for TicketDesk {
    fn default() -> Self {
        Self::new(DEFAULT_FOLLOW_UPS.iter().map(|q| q.to_string()))
    }
}

impl TicketDesk {
    /// Build a desk over a fixed pool. Duplicates and blank questions are dropped.
    pub fn new(pool: impl IntoIterator<Item = String>) -> Self {
        let mut unique: Vec<String> = Vec::new();
        for q in pool {
            let q = q.trim().to_string();
            if !q.is_empty() && !unique.contains(&q) {
                unique.push(q);
            }
        }
        Self {
            pool: unique,
            chooser: Box::new(RandomChooser),
        }
    }

    pub fn with_chooser(mut self, chooser: impl QuestionChooser + 'static) -> Self {
        self.chooser = Box::new(chooser);
        self
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    pub fn pool(&self) -> &[String] {
        &self.pool
    }

    /// The next question the ledger has not seen, or `None` if the ticket
    /// can be filed.
    pub fn next_follow_up(&self, ledger: &FollowUpLedger) -> Option<String> {
        let remaining: Vec<&str> = self
            .pool
            .iter()
            .map(String::as_str)
            .filter(|q| !ledger.contains(q))
            .collect();
        if remaining.is_empty() {
            return None;
        }
        let idx = self.chooser.choose(&remaining);
        let pick = remaining.get(idx).or(remaining.first())?;
        Some(pick.to_string())
    }
}
