use once_cell::sync::Lazy;
use std::env;
use std::time::Duration;

/// Configuration constants for the bot and dashboard
///
/// Everything is read once at startup from environment variables.
/// Credentials live in `.env` (loaded by `dotenvy` in main).

/// Telegram bot token, required for the bot process
pub static BOT_TOKEN: Lazy<String> = Lazy::new(|| env::var("BOT_TOKEN").unwrap_or_default());

/// MongoDB connection string, required for both processes
pub static MONGODB_URI: Lazy<String> = Lazy::new(|| env::var("MONGODB_URI").unwrap_or_default());

/// MongoDB database name
pub static MONGODB_DATABASE: Lazy<String> =
    Lazy::new(|| env::var("MONGODB_DATABASE").unwrap_or_else(|_| "absensi".to_string()));

/// Dashboard HTTP listen port
pub static DASHBOARD_PORT: Lazy<u16> = Lazy::new(|| {
    env::var("DASHBOARD_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3001)
});

/// Path to the invoice template bitmap
/// May also be an object-storage key or URL; the asset resolver handles all three
pub static TEMPLATE_PATH: Lazy<String> =
    Lazy::new(|| env::var("TEMPLATE_PATH").unwrap_or_else(|_| "./images/invoice.png".to_string()));

/// Directory where generated invoices are written
pub static INVOICE_DIR: Lazy<String> =
    Lazy::new(|| env::var("INVOICE_DIR").unwrap_or_else(|_| "./invoice".to_string()));

/// Directory for locally-stored attendance photos (fallback when R2 is down)
pub static ABSEN_DIR: Lazy<String> =
    Lazy::new(|| env::var("ABSEN_DIR").unwrap_or_else(|_| "./absen".to_string()));

/// TrueType font used for invoice text
/// When unset, a list of common system font paths is probed instead
pub static FONT_PATH: Lazy<Option<String>> = Lazy::new(|| env::var("FONT_PATH").ok());

/// Log file path
pub static LOG_FILE_PATH: Lazy<String> =
    Lazy::new(|| env::var("LOG_FILE_PATH").unwrap_or_else(|_| "absenbot.log".to_string()));

/// CDN base URL for photos served over a custom domain
/// The dashboard rewrites these into proxy URLs to bypass CORS
pub static CDN_BASE_URL: Lazy<Option<String>> = Lazy::new(|| {
    env::var("CDN_BASE_URL")
        .ok()
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('/').to_string())
});

/// Cloudflare R2 (S3-compatible) object storage configuration
pub mod r2 {
    use once_cell::sync::Lazy;
    use std::env;

    pub static ACCOUNT_ID: Lazy<String> =
        Lazy::new(|| env::var("R2_ACCOUNT_ID").unwrap_or_default());
    pub static ACCESS_KEY_ID: Lazy<String> =
        Lazy::new(|| env::var("R2_ACCESS_KEY_ID").unwrap_or_default());
    pub static SECRET_ACCESS_KEY: Lazy<String> =
        Lazy::new(|| env::var("R2_SECRET_ACCESS_KEY").unwrap_or_default());
    pub static BUCKET_NAME: Lazy<String> =
        Lazy::new(|| env::var("R2_BUCKET_NAME").unwrap_or_default());
    /// Optional public base URL (custom domain) for direct read access
    pub static PUBLIC_URL: Lazy<Option<String>> = Lazy::new(|| {
        env::var("R2_PUBLIC_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| s.trim_end_matches('/').to_string())
    });

    /// Whether enough credentials are present to talk to R2 at all
    pub fn is_configured() -> bool {
        !BUCKET_NAME.is_empty() && !ACCESS_KEY_ID.is_empty() && !SECRET_ACCESS_KEY.is_empty()
    }
}

/// Invoice layout constants (fixed pixel coordinates on the template)
pub mod invoice {
    /// Fallback canvas when the template is missing
    pub const FALLBACK_WIDTH: u32 = 800;
    pub const FALLBACK_HEIGHT: u32 = 1200;

    /// Ink color for all standard fields: #70370d
    pub const TEXT_COLOR: [u8; 3] = [112, 55, 13];

    /// Invoice date field
    pub const DATE_POS: (i64, i64) = (260, 468);
    /// Student name field
    pub const NAME_POS: (i64, i64) = (310, 515);
    /// Grand total, rendered in white
    pub const TOTAL_POS: (i64, i64) = (587, 1776);

    pub const PHOTO_WIDTH: u32 = 320;
    pub const PHOTO_HEIGHT: u32 = 320;
    /// Photo slots in array order; slot i receives records[i]
    pub const PHOTO_SLOTS: [(i64, i64); 4] = [(210, 735), (834, 735), (210, 1187), (834, 1187)];

    /// Caption block starts this far below the photo bottom edge
    pub const CAPTION_OFFSET: i64 = 15;
    /// Vertical spacing between the three caption lines
    pub const CAPTION_LINE_SPACING: i64 = 35;
    /// Descriptions longer than this are cut in captions
    pub const DESCRIPTION_MAX_CHARS: usize = 25;

    /// Text size in pixels for all invoice fields
    pub const FONT_PX: f32 = 32.0;
}

/// Attendance/invoicing business rules
pub mod rules {
    /// A student with this many uninvoiced entries triggers automatic
    /// invoice generation on ingestion
    pub const AUTO_INVOICE_THRESHOLD: usize = 4;

    /// At most this many photos fit on one invoice
    pub const MAX_PHOTOS_PER_INVOICE: usize = 4;

    /// "Overdue" report: last uninvoiced entry at least this many days old
    pub const OVERDUE_IDLE_DAYS: i64 = 35;
}

/// Network fetch configuration
pub mod http {
    use super::Duration;

    /// Timeout for any single photo/template download
    pub const FETCH_TIMEOUT_SECS: u64 = 10;

    pub fn fetch_timeout() -> Duration {
        Duration::from_secs(FETCH_TIMEOUT_SECS)
    }
}

/// Dashboard pagination defaults
pub mod pagination {
    pub const DEFAULT_PAGE_SIZE: i64 = 20;
    pub const MAX_PAGE_SIZE: i64 = 100;
}
