//! Line protocol implementation
//!
//! Handles command parsing, dispatch, and reply formatting.

pub mod commands;
pub mod handlers;
pub mod responses;

pub use commands::{Command, CommandStatus, TokenArgs, parse_command};
pub use handlers::handle_command;
