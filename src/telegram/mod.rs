//! Telegram bot integration and handlers

pub mod commands;
pub mod handlers;
pub mod menu;

// Re-exports for convenience
pub use commands::{parse_absen_caption, AbsenEntry, Command};
pub use handlers::{schema, HandlerDeps, HandlerError};
