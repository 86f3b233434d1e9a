//! Bot command definitions and the `absen` photo-caption grammar

use chrono::{DateTime, Utc};
use teloxide::utils::command::BotCommands;

use crate::core::error::{AppError, AppResult};
use crate::core::utils::parse_ddmmyyyy;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Perintah yang tersedia:")]
pub enum Command {
    #[command(description = "tampilkan menu utama")]
    Start,
    #[command(description = "tampilkan menu utama")]
    Menu,
    #[command(description = "bantuan dan format absen")]
    Help,
    #[command(description = "buat invoice: /invoice <nama>")]
    Invoice(String),
    #[command(description = "daftar murid yang belum bayar")]
    Belumbayar,
    #[command(description = "cek riwayat absen: /cekmurid <nama>")]
    Cekmurid(String),
    #[command(description = "hapus absen: /hapusabsen <id>")]
    Hapusabsen(String),
}

/// Caption usage hint, sent back verbatim on any parse failure
pub const ABSEN_USAGE: &str = "Format: absen <nama> <harga> <DD/MM/YYYY> <deskripsi>\n\
Contoh: absen andi 100000 02/11/2025 Kelas Gitar Dasar";

/// A parsed `absen` photo caption.
#[derive(Debug, Clone, PartialEq)]
pub struct AbsenEntry {
    pub nama: String,
    pub harga: i64,
    pub tanggal: DateTime<Utc>,
    pub deskripsi: String,
}

/// Whether a caption even attempts the absen grammar. Only then does a
/// parse failure warrant a usage reply.
pub fn is_absen_caption(caption: &str) -> bool {
    caption
        .split_whitespace()
        .next()
        .map(|w| w.eq_ignore_ascii_case("absen"))
        .unwrap_or(false)
}

/// Parse `absen <nama> <harga> <DD/MM/YYYY> <deskripsi...>`.
///
/// The name is a single token; multi-word class descriptions take the rest
/// of the line. Price must be a positive integer, the date a real calendar
/// date.
pub fn parse_absen_caption(caption: &str) -> AppResult<AbsenEntry> {
    let tokens: Vec<&str> = caption.split_whitespace().collect();
    if tokens.len() < 5 || !tokens[0].eq_ignore_ascii_case("absen") {
        return Err(AppError::Validation(ABSEN_USAGE.to_string()));
    }

    let nama = tokens[1].to_string();
    let harga: i64 = tokens[2]
        .parse()
        .map_err(|_| AppError::Validation(format!("Harga tidak valid: {}\n\n{}", tokens[2], ABSEN_USAGE)))?;
    if harga <= 0 {
        return Err(AppError::Validation(format!(
            "Harga harus lebih dari 0, bukan {}",
            harga
        )));
    }

    let tanggal = parse_ddmmyyyy(tokens[3]).ok_or_else(|| {
        AppError::Validation(format!(
            "Tanggal tidak valid: {} (pakai DD/MM/YYYY)",
            tokens[3]
        ))
    })?;

    let deskripsi = tokens[4..].join(" ");

    Ok(AbsenEntry {
        nama,
        harga,
        tanggal,
        deskripsi,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::utils::format_ddmmyyyy;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_a_full_caption() {
        let entry = parse_absen_caption("absen andi 100000 02/11/2025 Kelas Gitar Dasar").unwrap();
        assert_eq!(entry.nama, "andi");
        assert_eq!(entry.harga, 100_000);
        assert_eq!(format_ddmmyyyy(&entry.tanggal), "02/11/2025");
        assert_eq!(entry.deskripsi, "Kelas Gitar Dasar");
    }

    #[test]
    fn keyword_is_case_insensitive() {
        assert!(parse_absen_caption("Absen budi 50000 01/01/2026 Vokal").is_ok());
        assert!(parse_absen_caption("ABSEN budi 50000 01/01/2026 Vokal").is_ok());
    }

    #[test]
    fn rejects_short_captions_with_usage() {
        let err = parse_absen_caption("absen andi 100000").unwrap_err();
        assert!(err.to_string().contains("Format: absen"));
    }

    #[test]
    fn rejects_bad_price() {
        assert!(parse_absen_caption("absen andi seratus 02/11/2025 Gitar").is_err());
        assert!(parse_absen_caption("absen andi 0 02/11/2025 Gitar").is_err());
        assert!(parse_absen_caption("absen andi -5000 02/11/2025 Gitar").is_err());
    }

    #[test]
    fn rejects_bad_date() {
        assert!(parse_absen_caption("absen andi 100000 31/02/2025 Gitar").is_err());
        assert!(parse_absen_caption("absen andi 100000 2025-11-02 Gitar").is_err());
    }

    #[test]
    fn non_absen_captions_are_ignored_not_errors() {
        assert!(!is_absen_caption("halo ini foto liburan"));
        assert!(!is_absen_caption(""));
        assert!(is_absen_caption("absen andi 100000 02/11/2025 Gitar"));
        assert!(is_absen_caption("Absen sesuatu"));
    }
}
