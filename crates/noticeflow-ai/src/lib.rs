//! Oracle layer: typed contracts over an external text-understanding service.

mod llm;
mod oracle;
pub mod prompts;
mod response;

#[cfg(feature = "http")]
pub mod client;

pub use llm::{LlmBackend, LlmOracle};
pub use oracle::{DispatchOracle, OracleError, TextOracle};
pub use response::parse_json;

#[cfg(feature = "http")]
pub use client::{HttpBackend, OracleConfig};
