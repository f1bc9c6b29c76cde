//! Client management module
//!
//! Per-connection session state, the session loop and the registry of
//! connected clients.

pub mod handler;
pub mod registry;
pub mod state;

pub use handler::handle_client;
pub use registry::{ClientRegistry, RegistrationGuard};
pub use state::Session;
