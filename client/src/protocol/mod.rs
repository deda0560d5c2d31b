//! Wire format spoken between the HTTP agent and the development replica

mod messages;

pub use messages::*;
