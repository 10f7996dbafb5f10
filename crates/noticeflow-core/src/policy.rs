//! Per-run escalation configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("fine threshold must be a finite, non-negative amount (got {0})")]
    InvalidThreshold(f64),
}

/// What an escalation check does when the text oracle cannot answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationFailurePolicy {
    /// Treat the failed sub-check as "no escalation".
    #[default]
    FailOpen,
    /// Treat the failed sub-check as "escalate".
    FailClosed,
}

impl EscalationFailurePolicy {
    /// Value substituted for a sub-check that could not be evaluated.
    pub fn fallback(self) -> bool {
        matches!(self, Self::FailClosed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FailOpen => "fail-open",
            Self::FailClosed => "fail-closed",
        }
    }
}

/// Escalation criteria supplied by the caller at workflow start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// Natural-language condition, e.g. "there is water damage".
    pub criteria: String,
    pub fine_threshold: f64,
    #[serde(default)]
    pub on_failure: EscalationFailurePolicy,
}

impl EscalationPolicy {
    pub fn new(criteria: impl Into<String>, fine_threshold: f64) -> Result<Self, PolicyError> {
        if !fine_threshold.is_finite() || fine_threshold < 0.0 {
            return Err(PolicyError::InvalidThreshold(fine_threshold));
        }
        Ok(Self {
            criteria: criteria.into(),
            fine_threshold,
            on_failure: EscalationFailurePolicy::default(),
        })
    }

    pub fn with_failure_policy(mut self, on_failure: EscalationFailurePolicy) -> Self {
        self.on_failure = on_failure;
        self
    }

    /// Fine trigger: present and at or above the threshold.
    pub fn fine_triggers(&self, max_fine: Option<f64>) -> bool {
        max_fine.is_some_and(|fine| fine >= self.fine_threshold)
    }
}
