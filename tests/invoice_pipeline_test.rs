//! End-to-end invoice pipeline tests (no database, no network)
//!
//! Run with: cargo test --test invoice_pipeline_test

use std::io::Cursor;

use chrono::{TimeZone, Utc};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

use absenbot::invoice::compose::{compose_invoice, ComposeInput};
use absenbot::invoice::AssetResolver;
use absenbot::storage::{AttendanceRecord, PhotoRef};

fn solid_png(color: [u8; 3], w: u32, h: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(w, h, Rgba([color[0], color[1], color[2], 255]));
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

fn record(nama: &str, harga: i64, day: u32, foto_path: &str) -> AttendanceRecord {
    let tanggal = Utc.with_ymd_and_hms(2025, 11, day, 0, 0, 0).unwrap();
    AttendanceRecord {
        id: None,
        nama: nama.to_string(),
        harga,
        tanggal,
        deskripsi: "Kelas Gitar Dasar".to_string(),
        foto_path: foto_path.to_string(),
        is_invoiced: false,
        created_at: tanggal,
    }
}

// ============================================================================
// Resolver + compositor, photos on local disk
// ============================================================================

mod pipeline_tests {
    use super::*;

    /// Four lessons logged for one student, photos sitting on disk the way
    /// the R2-less deployment stores them. The resolver reads each photo,
    /// the compositor stacks them into the four slots.
    #[tokio::test]
    async fn four_local_photos_fill_all_slots() {
        let dir = tempfile::tempdir().unwrap();
        let colors = [
            [255u8, 0, 0],
            [0, 255, 0],
            [0, 0, 255],
            [255, 255, 0],
        ];

        let mut records = Vec::new();
        for (i, color) in colors.iter().enumerate() {
            let path = dir.path().join(format!("andi_{}.png", i));
            std::fs::write(&path, solid_png(*color, 64, 64)).unwrap();
            records.push(record("Andi", 100_000, i as u32 + 1, path.to_str().unwrap()));
        }

        let resolver = AssetResolver::new(None);
        let mut photos = Vec::new();
        for rec in &records {
            photos.push(resolver.fetch(&rec.photo_ref()).await.ok());
        }
        assert!(photos.iter().all(|p| p.is_some()));

        let template = solid_png([20, 20, 20], 1400, 2000);
        let input = ComposeInput {
            student_name: "Andi",
            generated_at: Utc.with_ymd_and_hms(2025, 11, 4, 10, 0, 0).unwrap(),
            records: &records,
            photos: &photos,
            total: records.iter().map(|r| r.harga).sum(),
        };
        let png = compose_invoice(Some(&template), &input).unwrap();

        let img = image::load_from_memory(&png).unwrap().to_rgba8();
        let slots = [(210u32, 735u32), (834, 735), (210, 1187), (834, 1187)];
        for (i, (x, y)) in slots.iter().enumerate() {
            let c = colors[i];
            assert_eq!(*img.get_pixel(x + 160, y + 160), Rgba([c[0], c[1], c[2], 255]));
        }
    }

    /// A photo that vanished from disk degrades its slot, not the invoice.
    #[tokio::test]
    async fn vanished_photo_still_produces_an_invoice() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("budi_0.png");
        std::fs::write(&present, solid_png([0, 255, 0], 64, 64)).unwrap();

        let records = vec![
            record("Budi", 150_000, 1, present.to_str().unwrap()),
            record("Budi", 150_000, 2, "/nonexistent/budi_1.png"),
        ];

        let resolver = AssetResolver::new(None);
        let mut photos = Vec::new();
        for rec in &records {
            photos.push(resolver.fetch(&rec.photo_ref()).await.ok());
        }
        assert!(photos[0].is_some());
        assert!(photos[1].is_none());

        let input = ComposeInput {
            student_name: "Budi",
            generated_at: Utc.with_ymd_and_hms(2025, 11, 2, 9, 0, 0).unwrap(),
            records: &records,
            photos: &photos,
            total: 300_000,
        };
        let png = compose_invoice(Some(&solid_png([0, 0, 0], 1400, 2000)), &input).unwrap();
        assert!(image::load_from_memory(&png).is_ok());
    }

    /// No template anywhere still produces a sendable PNG on the blank
    /// fallback canvas.
    #[tokio::test]
    async fn missing_template_falls_back_to_blank_canvas() {
        let resolver = AssetResolver::new(None);
        let template_ref = PhotoRef::classify("/nonexistent/template.jpg");
        assert!(resolver.fetch(&template_ref).await.is_err());

        let input = ComposeInput {
            student_name: "Citra",
            generated_at: Utc::now(),
            records: &[],
            photos: &[],
            total: 0,
        };
        let png = compose_invoice(None, &input).unwrap();
        let img = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!((img.width(), img.height()), (800, 1200));
    }
}

// ============================================================================
// Caption grammar feeding the pipeline
// ============================================================================

mod caption_to_invoice_tests {
    use super::*;
    use absenbot::core::utils::{format_rupiah, invoice_filename};
    use absenbot::telegram::parse_absen_caption;

    /// The documented flow: four `absen andi 100000 ...` captions add up to
    /// a Rp 400.000 invoice named after the student and the day.
    #[test]
    fn four_andi_lessons_total_four_hundred_thousand() {
        let captions = [
            "absen andi 100000 01/11/2025 Kelas Gitar Dasar",
            "absen andi 100000 08/11/2025 Kelas Gitar Dasar",
            "absen andi 100000 15/11/2025 Kelas Gitar Dasar",
            "absen andi 100000 22/11/2025 Kelas Gitar Dasar",
        ];
        let entries: Vec<_> = captions
            .iter()
            .map(|c| parse_absen_caption(c).unwrap())
            .collect();

        let total: i64 = entries.iter().map(|e| e.harga).sum();
        assert_eq!(format_rupiah(total), "Rp 400.000");

        let generated_at = Utc.with_ymd_and_hms(2025, 11, 22, 10, 0, 0).unwrap();
        assert_eq!(
            invoice_filename(&entries[0].nama, &generated_at),
            "invoice_andi_22-11-2025.png"
        );
    }
}
