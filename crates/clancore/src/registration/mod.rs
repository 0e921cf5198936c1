//! Registration conversation: nickname, then screenshot, then leader review.

pub mod flow;
pub mod state;

pub use flow::RegistrationFlow;
pub use state::{Applicant, Effect, RegistrationEvent, RegistrationState, Reply, Transition};
