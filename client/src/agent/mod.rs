//! Network agents
//!
//! This module provides:
//! - `Agent` trait: a signing identity bound to a network, able to issue queries
//! - `AgentFactory` trait for constructing agents per identity
//! - `HttpAgent` for talking to a replica over HTTP

mod http;
mod service;
mod types;

pub use http::{HttpAgent, HttpAgentFactory, parse_root_key};
pub use service::{Agent, AgentFactory};
pub use types::AgentError;
