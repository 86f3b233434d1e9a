//! Attendance data model and photo reference classification

use bson::oid::ObjectId;
use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved object-storage prefix for attendance photos
pub const STORAGE_PREFIX: &str = "absen/";

/// One attendance entry: a photographed lesson/payment event.
///
/// Field names on the wire match the original Mongo collection so the bot
/// can run against existing data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    /// Student name, free text; all lookups are case-insensitive
    pub nama: String,
    /// Price in rupiah, must be positive
    pub harga: i64,
    /// Calendar date of the lesson
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub tanggal: DateTime<Utc>,
    /// Class label
    pub deskripsi: String,
    /// Opaque photo reference: URL, storage key or local path
    pub foto_path: String,
    /// Set true exactly once when the record lands on a generated invoice
    #[serde(rename = "isInvoiced", default)]
    pub is_invoiced: bool,
    /// Tie-break ordering for "oldest uninvoiced first"
    #[serde(rename = "createdAt", with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl AttendanceRecord {
    pub fn photo_ref(&self) -> PhotoRef {
        PhotoRef::classify(&self.foto_path)
    }
}

/// A photo reference classified into its source form.
///
/// The original stored an untyped string and re-sniffed prefixes at every
/// call site; classification now happens once and the derived storage key
/// is computed identically for upload, download, delete and URL resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoRef {
    /// Direct HTTP(S) URL (CDN or public bucket URL)
    Url(String),
    /// Object-storage key under the `absen/` prefix
    StorageKey(String),
    /// Local filesystem path
    LocalPath(String),
}

impl PhotoRef {
    /// Classify an opaque reference string by its prefix.
    pub fn classify(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            PhotoRef::Url(raw.to_string())
        } else if raw.starts_with(STORAGE_PREFIX) || raw.starts_with("./absen/") {
            PhotoRef::StorageKey(raw.to_string())
        } else {
            PhotoRef::LocalPath(raw.to_string())
        }
    }

    /// The raw reference string as stored in the database.
    pub fn as_str(&self) -> &str {
        match self {
            PhotoRef::Url(s) | PhotoRef::StorageKey(s) | PhotoRef::LocalPath(s) => s,
        }
    }

    /// Normalize this reference into an object-storage key with a single
    /// `absen/` prefix.
    ///
    /// URL-shaped refs take the path after the bucket-name segment when it
    /// can be located, then after an `absen` segment, and fall back to
    /// `absen/<last-segment>`. Every storage operation goes through this
    /// one function so a photo stored under any ref form stays reachable.
    pub fn storage_key(&self, bucket: &str) -> String {
        match self {
            PhotoRef::Url(url) => {
                let parts: Vec<&str> = url.split('/').filter(|p| !p.is_empty()).collect();
                if !bucket.is_empty() {
                    if let Some(i) = parts.iter().position(|p| *p == bucket) {
                        if i + 1 < parts.len() {
                            return parts[i + 1..].join("/");
                        }
                    }
                }
                if let Some(i) = parts.iter().position(|p| *p == "absen") {
                    if i + 1 < parts.len() {
                        return parts[i..].join("/");
                    }
                }
                format!("{}{}", STORAGE_PREFIX, parts.last().copied().unwrap_or_default())
            }
            PhotoRef::StorageKey(key) | PhotoRef::LocalPath(key) => {
                let stripped = key
                    .trim_start_matches("./absen/")
                    .trim_start_matches(STORAGE_PREFIX)
                    .trim_start_matches("./");
                let name = stripped.rsplit('/').next().unwrap_or(stripped);
                format!("{}{}", STORAGE_PREFIX, name)
            }
        }
    }

    /// Local filesystem path equivalent of this ref, used as the fallback
    /// read location when object storage fails.
    pub fn local_path(&self) -> Option<&str> {
        match self {
            PhotoRef::Url(_) => None,
            PhotoRef::StorageKey(s) | PhotoRef::LocalPath(s) => Some(s),
        }
    }
}

/// Per-student rollup for the dashboard student list
#[derive(Debug, Clone, Serialize)]
pub struct StudentRollup {
    pub nama: String,
    #[serde(rename = "totalAttendances")]
    pub total_attendances: i64,
    #[serde(rename = "totalHarga")]
    pub total_harga: i64,
    #[serde(rename = "invoicedCount")]
    pub invoiced_count: i64,
    #[serde(rename = "uninvoicedCount")]
    pub uninvoiced_count: i64,
    #[serde(rename = "lastAttendance")]
    pub last_attendance: Option<DateTime<Utc>>,
    #[serde(rename = "firstAttendance")]
    pub first_attendance: Option<DateTime<Utc>>,
}

/// Revenue bucket for one calendar month
#[derive(Debug, Clone, Serialize)]
pub struct MonthRevenue {
    /// `YYYY-MM`
    pub month: String,
    pub total: i64,
    pub count: i64,
}

/// One of the top-10 students by attendance count
#[derive(Debug, Clone, Serialize)]
pub struct TopStudent {
    pub nama: String,
    pub count: i64,
    #[serde(rename = "totalHarga")]
    pub total_harga: i64,
}

/// Aggregate dashboard statistics
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    #[serde(rename = "totalAttendances")]
    pub total_attendances: i64,
    #[serde(rename = "totalStudents")]
    pub total_students: i64,
    #[serde(rename = "totalRevenue")]
    pub total_revenue: i64,
    #[serde(rename = "invoicedCount")]
    pub invoiced_count: i64,
    #[serde(rename = "uninvoicedCount")]
    pub uninvoiced_count: i64,
    #[serde(rename = "revenueByMonth")]
    pub revenue_by_month: Vec<MonthRevenue>,
    #[serde(rename = "topStudents")]
    pub top_students: Vec<TopStudent>,
}

/// A student flagged by the "belum bayar" (overdue) report
#[derive(Debug, Clone)]
pub struct OverdueStudent {
    pub nama: String,
    pub uninvoiced_count: usize,
    pub last_attendance: DateTime<Utc>,
    pub total_unpaid: i64,
    pub days_idle: i64,
}

/// Overdue criterion: 1-3 uninvoiced entries and the most recent one at
/// least five weeks old. Four or more entries means the auto-invoice will
/// catch up instead.
pub fn is_overdue(uninvoiced_count: usize, last_attendance: &DateTime<Utc>, now: &DateTime<Utc>) -> bool {
    let idle_days = (*now - *last_attendance).num_days();
    (1..crate::core::config::rules::AUTO_INVOICE_THRESHOLD).contains(&uninvoiced_count)
        && idle_days >= crate::core::config::rules::OVERDUE_IDLE_DAYS
}
