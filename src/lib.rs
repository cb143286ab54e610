//! Library crate for ban-sweep-rs: discovery, verification and follow-up
//! banning of stale cheating punishments.
pub mod ban_window;
pub mod clock;
pub mod config;
pub mod error;
pub mod executor;
pub mod progress;
pub mod remote;
pub mod scanner;
pub mod store;
pub mod types;
pub mod verifier;

pub use error::{Error, MalformedRecord, Result};
