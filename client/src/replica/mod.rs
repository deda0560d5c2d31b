//! Local development replica
//!
//! This module provides:
//! - `Canister` trait for services hosted on the replica
//! - `GreetingCanister`, the `greet` / `whoami` backend
//! - HTTP routes serving the root key and certified, signature-checked queries

mod canister;
pub mod routes;

pub use canister::{Canister, GreetingCanister, ReplicaError};
pub use routes::{ReplicaErrorResponse, ReplicaState, replica_routes};
