use thiserror::Error;

/// Centralized error types for the application
///
/// All errors in the application are converted to this enum for consistent
/// error handling. Uses `thiserror` for automatic conversion and display
/// formatting. User-facing surfaces render `Display`, never debug output.
#[derive(Error, Debug)]
pub enum AppError {
    /// Asset or record absent; callers degrade gracefully (placeholder
    /// text for photos, blank canvas for the template, a "tidak ditemukan"
    /// reply for records)
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed command or request input, reported back with a usage hint
    #[error("validation error: {0}")]
    Validation(String),

    /// Transient network/storage failure after any fallback chain ran out
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Missing required credentials at startup; fatal
    #[error("configuration error: {0}")]
    Config(String),

    /// Database errors
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    /// BSON (de)serialization errors
    #[error("bson error: {0}")]
    Bson(#[from] bson::ser::Error),

    /// Object id parsing errors
    #[error("invalid record id: {0}")]
    ObjectId(#[from] bson::oid::Error),

    /// HTTP/fetch errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Telegram API errors
    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    /// Image decode/encode errors
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Anyhow errors (for general error handling)
    #[error("application error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Message suitable for an end user (chat reply or JSON body).
    ///
    /// Validation and not-found messages are written for the user and pass
    /// through; everything else collapses to a generic apology so internals
    /// never leak into chat.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg) | AppError::NotFound(msg) => msg.clone(),
            AppError::Upstream(_) | AppError::Http(_) => {
                "⚠️ Gagal mengambil data. Coba lagi nanti.".to_string()
            }
            _ => "⚠️ Terjadi kesalahan. Coba lagi nanti.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_pass_through_to_users() {
        let err = AppError::Validation("Harga harus lebih dari 0".to_string());
        assert_eq!(err.user_message(), "Harga harus lebih dari 0");
    }

    #[test]
    fn internal_errors_are_not_shown_verbatim() {
        let err = AppError::Upstream("R2 upload of absen/x.jpg failed: timeout".to_string());
        assert!(!err.user_message().contains("R2"));
    }
}
