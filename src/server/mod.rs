//! Server core functionality
//!
//! The listener, its accept loop and the state shared by all connections.

pub mod core;
pub mod state;

pub use self::core::Server;
pub use state::AppState;
