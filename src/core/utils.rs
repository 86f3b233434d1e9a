//! Small formatting and parsing helpers shared by the bot, the dashboard
//! and the invoice compositor.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Lowercase a student name and replace whitespace runs with underscores,
/// producing the slug used in photo and invoice filenames.
pub fn slugify_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Format an amount as Indonesian rupiah: `Rp 1.234.567`
///
/// Thousands separated by dots, no decimal places (id-ID locale).
pub fn format_rupiah(amount: i64) -> String {
    let negative = amount < 0;
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    if negative {
        format!("Rp -{}", grouped)
    } else {
        format!("Rp {}", grouped)
    }
}

/// Parse a `DD/MM/YYYY` date string into a UTC midnight timestamp.
///
/// The shape is enforced strictly (two, two and four digit fields) before
/// the calendar parse; chrono alone would accept `2/11/25` as year 0025.
/// Returns `None` for malformed or impossible dates (e.g. 31/02/2025).
pub fn parse_ddmmyyyy(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    let fields: Vec<&str> = s.split('/').collect();
    let [day, month, year] = fields.as_slice() else {
        return None;
    };
    if day.len() != 2 || month.len() != 2 || year.len() != 4 {
        return None;
    }
    if ![day, month, year]
        .iter()
        .all(|f| f.chars().all(|c| c.is_ascii_digit()))
    {
        return None;
    }
    let date = NaiveDate::parse_from_str(s, "%d/%m/%Y").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Format a timestamp as `DD/MM/YYYY`.
pub fn format_ddmmyyyy(dt: &DateTime<Utc>) -> String {
    dt.format("%d/%m/%Y").to_string()
}

/// Derived invoice filename: `invoice_<slug>_<DD-MM-YYYY>.png`
pub fn invoice_filename(student_name: &str, generated_at: &DateTime<Utc>) -> String {
    format!(
        "invoice_{}_{}.png",
        slugify_name(student_name),
        generated_at.format("%d-%m-%Y")
    )
}

/// Take the first `max` characters of a string (char-aware, not byte-aware).
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn slugify_lowercases_and_joins_with_underscores() {
        assert_eq!(slugify_name("Budi Santoso"), "budi_santoso");
        assert_eq!(slugify_name("  Andi  "), "andi");
        assert_eq!(slugify_name("A  B\tC"), "a_b_c");
    }

    #[test]
    fn rupiah_groups_thousands_with_dots() {
        assert_eq!(format_rupiah(0), "Rp 0");
        assert_eq!(format_rupiah(100), "Rp 100");
        assert_eq!(format_rupiah(100_000), "Rp 100.000");
        assert_eq!(format_rupiah(1_234_567), "Rp 1.234.567");
        assert_eq!(format_rupiah(400_000), "Rp 400.000");
    }

    #[test]
    fn parses_valid_ddmmyyyy() {
        let dt = parse_ddmmyyyy("02/11/2025").unwrap();
        assert_eq!(format_ddmmyyyy(&dt), "02/11/2025");
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(parse_ddmmyyyy("2025-11-02").is_none());
        assert!(parse_ddmmyyyy("31/02/2025").is_none());
        assert!(parse_ddmmyyyy("2/11/25").is_none());
        assert!(parse_ddmmyyyy("").is_none());
    }

    #[test]
    fn rejects_short_digit_fields_chrono_would_pad() {
        // chrono parses these as years 0025/0002; the strict shape check
        // must catch them before they reach the calendar parse
        assert!(parse_ddmmyyyy("02/11/25").is_none());
        assert!(parse_ddmmyyyy("2/1/2025").is_none());
        assert!(parse_ddmmyyyy("02/11/2025/x").is_none());
        assert!(parse_ddmmyyyy("aa/bb/cccc").is_none());
    }

    #[test]
    fn invoice_filename_uses_slug_and_dashed_date() {
        let dt = parse_ddmmyyyy("05/01/2026").unwrap();
        assert_eq!(
            invoice_filename("Budi Santoso", &dt),
            "invoice_budi_santoso_05-01-2026.png"
        );
    }

    #[test]
    fn truncation_is_char_aware() {
        assert_eq!(truncate_chars("Kelas Gitar Dasar", 25), "Kelas Gitar Dasar");
        let long = "Kelas Gitar Tingkat Lanjutan Sekali";
        assert_eq!(truncate_chars(long, 25).chars().count(), 25);
        assert_eq!(truncate_chars(long, 25), "Kelas Gitar Tingkat Lanju");
    }
}
