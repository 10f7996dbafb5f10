use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActionError {
    #[error("{action} failed: {cause}")]
    Failed { action: &'static str, cause: String },

    #[error("no valid recipient address provided")]
    NoValidRecipient,
}
