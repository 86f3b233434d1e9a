//! Attendance tracking and invoice generation for a music lesson studio.
//!
//! Lessons are logged by sending a photo to the Telegram bot with an
//! `absen` caption; after four uninvoiced lessons an invoice image is
//! composed from the photos and sent back automatically. An HTTP API
//! serves the same data to the admin dashboard.

pub mod cli;
pub mod core;
pub mod dashboard;
pub mod invoice;
pub mod storage;
pub mod telegram;

pub use core::{AppError, AppResult};
