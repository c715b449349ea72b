//! Conversation core
//!
//! The controller owns conversation state changes; the automated response
//! engine reacts to customer messages; the scheduler runs the engine in the
//! background, one pipeline per conversation at a time.

pub mod automated;
pub mod business_hours;
pub mod controller;
pub mod defaults;
pub mod presence;
pub mod scheduler;

pub use automated::{AutomatedResponseEngine, DispatchedReply, AUTO_RESPONSE_SENDER};
pub use business_hours::BusinessHours;
pub use controller::{
    ConversationController, PostMessage, PostedMessage, SessionGuard, SessionPolicy, SYSTEM_SENDER,
};
pub use defaults::{default_rules, install_default_rules};
pub use presence::{DashboardPresence, StaffPresence};
pub use scheduler::AutoReplyScheduler;
