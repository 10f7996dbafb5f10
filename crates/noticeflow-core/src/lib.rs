pub mod conversation;
pub mod ledger;
pub mod notice;
pub mod policy;

pub use conversation::{ActionRequest, ConversationHistory, Decision, RecipientList, Turn};
pub use ledger::{Answer, FollowUpLedger};
pub use notice::{NoticeRecord, RawNoticeExtract};
pub use policy::{EscalationFailurePolicy, EscalationPolicy, PolicyError};
