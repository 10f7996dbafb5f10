//! Side-effecting actions. Every call simulates unreliable external I/O.

mod error;
mod simulate;
pub mod ticket;

pub use error::ActionError;
pub use simulate::{Latency, SideEffects, SimulatedActions, SimulationConfig};
pub use ticket::{DEFAULT_FOLLOW_UPS, FirstChooser, QuestionChooser, RandomChooser, TicketDesk};
