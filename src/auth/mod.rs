//! Authentication: token storage and the session state machine.

pub mod session;
pub mod store;
pub mod token;

pub use session::{AuthSession, SessionState};
pub use store::TokenStore;
pub use token::TokenPair;
