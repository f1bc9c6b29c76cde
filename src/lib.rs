pub mod audit;
pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod transfer;

pub use crate::config::DepotConfig;
pub use server::Server;
