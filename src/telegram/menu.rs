//! Inline keyboards and the texts behind the bot's menus

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

/// At most this many students fit on a selection keyboard
pub const MAX_STUDENT_BUTTONS: usize = 50;

pub const MAIN_MENU_TEXT: &str = "🎵 *Absensi Les Musik*\n\nPilih menu di bawah:";

pub const HELP_TEXT: &str = "📖 Cara pakai:\n\n\
📸 Catat absen: kirim foto dengan caption\n\
absen <nama> <harga> <DD/MM/YYYY> <deskripsi>\n\
Contoh: absen andi 100000 02/11/2025 Kelas Gitar Dasar\n\n\
🧾 /invoice <nama> - buat invoice dari absen yang belum di-invoice\n\
🔍 /cekmurid <nama> - riwayat absen murid\n\
⏰ /belumbayar - murid yang menunggak\n\
🗑 /hapusabsen <id> - hapus satu absen\n\n\
Invoice dibuat otomatis setelah 4 absen.";

pub fn main_menu_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            InlineKeyboardButton::callback("🔍 Cek Murid", "menu_cekmurid"),
            InlineKeyboardButton::callback("⏰ Belum Bayar", "menu_belumbayar"),
        ],
        vec![
            InlineKeyboardButton::callback("🧾 Buat Invoice", "menu_invoice"),
            InlineKeyboardButton::callback("📖 Bantuan", "menu_help"),
        ],
    ])
}

/// Student selection keyboard, two names per row, capped at
/// [`MAX_STUDENT_BUTTONS`]. `prefix` decides what tapping a name does
/// (`cekmurid_` or `invoice_`).
pub fn student_keyboard(names: &[String], prefix: &str) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::new();
    for pair in names
        .iter()
        .take(MAX_STUDENT_BUTTONS)
        .collect::<Vec<_>>()
        .chunks(2)
    {
        rows.push(
            pair.iter()
                .map(|nama| {
                    InlineKeyboardButton::callback(
                        format!("👤 {}", nama),
                        format!("{}{}", prefix, nama),
                    )
                })
                .collect(),
        );
    }
    rows.push(vec![InlineKeyboardButton::callback(
        "🔙 Kembali",
        "menu_main",
    )]);
    InlineKeyboardMarkup::new(rows)
}

pub fn back_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        "🔙 Kembali",
        "menu_main",
    )]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::types::InlineKeyboardButtonKind;

    fn callback_data(keyboard: &InlineKeyboardMarkup) -> Vec<Vec<String>> {
        keyboard
            .inline_keyboard
            .iter()
            .map(|row| {
                row.iter()
                    .filter_map(|btn| match &btn.kind {
                        InlineKeyboardButtonKind::CallbackData(data) => Some(data.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn main_menu_has_four_actions() {
        let data = callback_data(&main_menu_keyboard());
        assert_eq!(data, vec![
            vec!["menu_cekmurid".to_string(), "menu_belumbayar".to_string()],
            vec!["menu_invoice".to_string(), "menu_help".to_string()],
        ]);
    }

    #[test]
    fn student_keyboard_pairs_names_and_appends_back() {
        let names = vec!["Andi".to_string(), "Budi".to_string(), "Citra".to_string()];
        let data = callback_data(&student_keyboard(&names, "cekmurid_"));

        assert_eq!(data[0], vec!["cekmurid_Andi", "cekmurid_Budi"]);
        assert_eq!(data[1], vec!["cekmurid_Citra"]);
        assert_eq!(data[2], vec!["menu_main"]);
    }

    #[test]
    fn student_keyboard_caps_at_fifty() {
        let names: Vec<String> = (0..80).map(|i| format!("murid{}", i)).collect();
        let data = callback_data(&student_keyboard(&names, "invoice_"));

        let buttons: usize = data.iter().map(|row| row.len()).sum();
        // 50 students plus the back button
        assert_eq!(buttons, MAX_STUDENT_BUTTONS + 1);
        assert!(data[0][0].starts_with("invoice_"));
    }
}
