//! Remote greeting service contract
//!
//! This module provides:
//! - `BackendService` trait: the two remote operations, `greet` and `whoami`
//! - `CallerHandle`: the swappable binding of a service to one identity
//! - `ServiceFactory` trait and `AgentServiceFactory`, which calls through an `Agent`

mod actor;
mod service;
mod types;

pub use actor::{AgentCaller, AgentServiceFactory};
pub use service::{BackendService, ServiceFactory};
pub use types::{CallError, CallerHandle};
