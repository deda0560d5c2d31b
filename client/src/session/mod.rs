pub mod manager;
pub mod state;

pub use manager::{SessionError, SessionManager};
pub use state::{
    AbandonReason, CancelSignal, LoginCancel, LoginOutcome, SessionConfig, SessionState,
};
