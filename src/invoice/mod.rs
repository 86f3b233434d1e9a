//! Invoice generation: asset retrieval, text rendering, compositing and
//! the orchestration around them

pub mod assets;
pub mod compose;
pub mod service;
pub mod text;

pub use assets::AssetResolver;
pub use service::{GeneratedInvoice, InvoiceService};
