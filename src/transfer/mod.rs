//! Transfer module
//!
//! Moves file content between the async connection and the blocking
//! storage engine.

pub mod download;
pub mod upload;

pub use download::send_file;
pub use upload::{ChannelReader, receive_upload};
