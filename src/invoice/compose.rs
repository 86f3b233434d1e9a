//! Invoice image compositor
//!
//! Pure pixel work: takes the template bytes, the records and their already
//! fetched photo bytes, and produces a PNG. All layout is fixed pixel
//! coordinates on the template, see [`crate::core::config::invoice`].
//! Fetching happens upstream in the invoice service so this stays
//! synchronous and testable.

use std::io::Cursor;

use chrono::{DateTime, Utc};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

use crate::core::config::invoice as layout;
use crate::core::error::AppResult;
use crate::core::utils::{format_ddmmyyyy, format_rupiah, truncate_chars};
use crate::invoice::text::{invoice_font, TextStamp};
use crate::storage::AttendanceRecord;

const WHITE: [u8; 3] = [255, 255, 255];
const MISSING_PHOTO_TEXT: &str = "Foto tidak ditemukan";

/// Everything the compositor needs, resolved ahead of time.
pub struct ComposeInput<'a> {
    pub student_name: &'a str,
    pub generated_at: DateTime<Utc>,
    /// Records in slot order; only the first four get a photo slot
    pub records: &'a [AttendanceRecord],
    /// Photo bytes aligned by index with `records`; `None` degrades the
    /// slot to a placeholder
    pub photos: &'a [Option<Vec<u8>>],
    /// Grand total over ALL records, not just the ones that fit a slot
    pub total: i64,
}

/// Render the invoice and encode it as PNG.
pub fn compose_invoice(template: Option<&[u8]>, input: &ComposeInput) -> AppResult<Vec<u8>> {
    let mut canvas = load_canvas(template);
    let font = invoice_font();
    if font.is_none() {
        log::warn!("Rendering invoice without text layers (no font)");
    }

    if let Some(font) = &font {
        stamp(
            &mut canvas,
            font,
            &format_ddmmyyyy(&input.generated_at),
            layout::TEXT_COLOR,
            layout::DATE_POS,
        );
        stamp(
            &mut canvas,
            font,
            input.student_name,
            layout::TEXT_COLOR,
            layout::NAME_POS,
        );
    }

    for (i, record) in input
        .records
        .iter()
        .take(layout::PHOTO_SLOTS.len())
        .enumerate()
    {
        let (slot_x, slot_y) = layout::PHOTO_SLOTS[i];
        let photo = input.photos.get(i).and_then(|p| p.as_deref());

        match photo.and_then(decode_photo) {
            Some(resized) => imageops::overlay(&mut canvas, &resized, slot_x, slot_y),
            None => {
                log::warn!(
                    "Photo for {} on {} missing, using placeholder",
                    record.nama,
                    format_ddmmyyyy(&record.tanggal)
                );
                if let Some(font) = &font {
                    stamp(
                        &mut canvas,
                        font,
                        MISSING_PHOTO_TEXT,
                        layout::TEXT_COLOR,
                        (slot_x, slot_y),
                    );
                }
            }
        }

        if let Some(font) = &font {
            let caption_top = slot_y + i64::from(layout::PHOTO_HEIGHT) + layout::CAPTION_OFFSET;
            let lines = [
                format_ddmmyyyy(&record.tanggal),
                truncate_chars(&record.deskripsi, layout::DESCRIPTION_MAX_CHARS),
                format_rupiah(record.harga),
            ];
            for (line_idx, line) in lines.iter().enumerate() {
                stamp(
                    &mut canvas,
                    font,
                    line,
                    layout::TEXT_COLOR,
                    (slot_x, caption_top + line_idx as i64 * layout::CAPTION_LINE_SPACING),
                );
            }
        }
    }

    if let Some(font) = &font {
        stamp(
            &mut canvas,
            font,
            &format_rupiah(input.total),
            WHITE,
            layout::TOTAL_POS,
        );
    }

    let mut out = Vec::new();
    DynamicImage::ImageRgba8(canvas).write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
    Ok(out)
}

/// Decode the template, or paint a blank white canvas when it is missing
/// or corrupt. Invoice generation never fails on the template.
fn load_canvas(template: Option<&[u8]>) -> RgbaImage {
    if let Some(bytes) = template {
        match image::load_from_memory(bytes) {
            Ok(img) => return img.to_rgba8(),
            Err(e) => log::warn!("Template not decodable, using blank canvas: {}", e),
        }
    }
    RgbaImage::from_pixel(
        layout::FALLBACK_WIDTH,
        layout::FALLBACK_HEIGHT,
        Rgba([255, 255, 255, 255]),
    )
}

/// Decode one attendance photo and resize it to exactly slot size.
/// Bilinear is plenty for downscaling phone photos.
fn decode_photo(bytes: &[u8]) -> Option<RgbaImage> {
    match image::load_from_memory(bytes) {
        Ok(img) => Some(
            img.resize_exact(layout::PHOTO_WIDTH, layout::PHOTO_HEIGHT, FilterType::Triangle)
                .to_rgba8(),
        ),
        Err(e) => {
            log::warn!("Attendance photo not decodable: {}", e);
            None
        }
    }
}

fn stamp(canvas: &mut RgbaImage, font: &rusttype::Font<'_>, text: &str, color: [u8; 3], pos: (i64, i64)) {
    if let Some(stamp) = TextStamp::render(font, layout::FONT_PX, text, color) {
        stamp.stamp_onto(canvas, pos.0, pos.1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn record(nama: &str, harga: i64, day: u32) -> AttendanceRecord {
        let tanggal = Utc.with_ymd_and_hms(2025, 11, day, 0, 0, 0).unwrap();
        AttendanceRecord {
            id: None,
            nama: nama.to_string(),
            harga,
            tanggal,
            deskripsi: "Kelas Gitar".to_string(),
            foto_path: "absen/x.jpg".to_string(),
            is_invoiced: false,
            created_at: tanggal,
        }
    }

    fn solid_png(color: [u8; 3], w: u32, h: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(w, h, Rgba([color[0], color[1], color[2], 255]));
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    fn input_for<'a>(
        records: &'a [AttendanceRecord],
        photos: &'a [Option<Vec<u8>>],
    ) -> ComposeInput<'a> {
        ComposeInput {
            student_name: "Andi",
            generated_at: Utc.with_ymd_and_hms(2025, 11, 2, 10, 0, 0).unwrap(),
            records,
            photos,
            total: records.iter().map(|r| r.harga).sum(),
        }
    }

    #[test]
    fn blank_fallback_canvas_is_white_800x1200() {
        let out = compose_invoice(None, &input_for(&[], &[])).unwrap();
        let img = image::load_from_memory(&out).unwrap().to_rgba8();
        assert_eq!((img.width(), img.height()), (800, 1200));
        assert_eq!(*img.get_pixel(400, 600), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn corrupt_template_degrades_to_blank_canvas() {
        let out = compose_invoice(Some(b"not a png"), &input_for(&[], &[])).unwrap();
        let img = image::load_from_memory(&out).unwrap().to_rgba8();
        assert_eq!((img.width(), img.height()), (800, 1200));
    }

    #[test]
    fn photos_land_in_slot_order() {
        // template big enough for all four slots
        let template = solid_png([0, 0, 0], 1400, 2000);
        let records = vec![record("Andi", 100_000, 1), record("Andi", 100_000, 2)];
        let photos = vec![
            Some(solid_png([255, 0, 0], 64, 64)),
            Some(solid_png([0, 255, 0], 64, 64)),
        ];
        let out = compose_invoice(Some(&template), &input_for(&records, &photos)).unwrap();
        let img = image::load_from_memory(&out).unwrap().to_rgba8();

        // sample inside each slot: first red, second green
        assert_eq!(*img.get_pixel(210 + 160, 735 + 160), Rgba([255, 0, 0, 255]));
        assert_eq!(*img.get_pixel(834 + 160, 735 + 160), Rgba([0, 255, 0, 255]));
        // unused third slot keeps the template color
        assert_eq!(*img.get_pixel(210 + 160, 1187 + 160), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn only_four_records_get_slots() {
        let template = solid_png([0, 0, 255], 1400, 2000);
        let records: Vec<_> = (1..=5).map(|d| record("Andi", 100_000, d)).collect();
        let photos: Vec<_> = (0..5).map(|_| Some(solid_png([255, 0, 0], 32, 32))).collect();
        let out = compose_invoice(Some(&template), &input_for(&records, &photos)).unwrap();
        let img = image::load_from_memory(&out).unwrap().to_rgba8();

        for (x, y) in crate::core::config::invoice::PHOTO_SLOTS {
            assert_eq!(
                *img.get_pixel(x as u32 + 160, y as u32 + 160),
                Rgba([255, 0, 0, 255])
            );
        }
    }

    #[test]
    fn missing_photo_keeps_the_invoice_renderable() {
        let template = solid_png([0, 0, 0], 1400, 2000);
        let records = vec![record("Andi", 100_000, 1)];
        let photos = vec![None];
        let out = compose_invoice(Some(&template), &input_for(&records, &photos)).unwrap();
        assert!(image::load_from_memory(&out).is_ok());
    }

    #[test]
    fn placeholder_text_is_anchored_at_the_slot_origin() {
        if crate::invoice::text::invoice_font().is_none() {
            return;
        }
        let template = solid_png([0, 0, 0], 1400, 2000);
        let records = vec![record("Andi", 100_000, 1)];
        let photos = vec![None];
        let out = compose_invoice(Some(&template), &input_for(&records, &photos)).unwrap();
        let img = image::load_from_memory(&out).unwrap().to_rgba8();

        let (slot_x, slot_y) = (210u32, 735u32);
        let ink = |x0: u32, x1: u32, y0: u32, y1: u32| {
            (x0..x1)
                .flat_map(|x| (y0..y1).map(move |y| (x, y)))
                .filter(|&(x, y)| {
                    *img.get_pixel(x, y)
                        == Rgba([
                            crate::core::config::invoice::TEXT_COLOR[0],
                            crate::core::config::invoice::TEXT_COLOR[1],
                            crate::core::config::invoice::TEXT_COLOR[2],
                            255,
                        ])
                })
                .count()
        };
        // text lands in the band around the slot origin, not mid-slot
        assert!(ink(slot_x - 10, slot_x + 300, slot_y - 10, slot_y + 40) > 0);
        assert_eq!(ink(slot_x, slot_x + 300, slot_y + 100, slot_y + 300), 0);
    }

    #[test]
    fn undecodable_photo_degrades_to_placeholder() {
        let template = solid_png([9, 9, 9], 1400, 2000);
        let records = vec![record("Andi", 100_000, 1)];
        let photos = vec![Some(b"garbage".to_vec())];
        let out = compose_invoice(Some(&template), &input_for(&records, &photos)).unwrap();
        let img = image::load_from_memory(&out).unwrap().to_rgba8();
        // slot interior away from any placeholder text keeps the template color
        assert_eq!(*img.get_pixel(210 + 300, 735 + 300), Rgba([9, 9, 9, 255]));
    }
}
