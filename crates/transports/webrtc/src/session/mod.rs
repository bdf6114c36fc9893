//! Session management
//!
//! Tracks the clients sharing the room and drives each one's negotiation.

pub mod driver;
pub mod negotiation;
pub mod registry;
#[allow(clippy::module_inception)]
pub mod session;

pub use driver::run_session;
pub use negotiation::NegotiationController;
pub use registry::{Admission, SessionRegistry};
pub use session::{Role, Session, SessionId};
