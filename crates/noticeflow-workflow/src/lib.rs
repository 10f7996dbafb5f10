//! Workflow engine: the notice state machine and the dispatch agent loop.

pub mod dispatch;
pub mod notice;

#[cfg(test)]
mod testing;

pub use dispatch::{DispatchConfig, DispatchError, DispatchOutcome, DispatchWorkflow, NoticeDefaults};
pub use notice::{
    Degradation, EscalationCheck, NoticeOutcome, NoticeRequest, NoticeWorkflow, RunState, Step,
    Termination,
};
pub use tokio_util::sync::CancellationToken;
