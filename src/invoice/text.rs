//! Text stamp rendering for the invoice compositor
//!
//! A "stamp" is the text rasterized dark-on-transparent into a padded
//! offscreen buffer, then recolored to the target ink color. Two passes are
//! composited per text run: the threshold-gated recolor, and a 1px
//! horizontally offset copy recolored wherever alpha is nonzero, which
//! fakes a bold stroke. The 128 threshold deliberately leaves anti-aliased
//! edge pixels blended; do not tighten it without checking the rendered
//! template visually.

use image::{Rgba, RgbaImage};
use once_cell::sync::Lazy;
use rusttype::{point, Font, Scale};
use std::sync::Arc;

use crate::core::config;

/// Transparent padding around the rasterized text, each side
pub const STAMP_PADDING: u32 = 10;

/// Horizontal offset of the synthetic bold pass
pub const BOLD_OFFSET: i64 = 1;

/// Ink channels darker than this are recolored in the first pass
pub const INK_THRESHOLD: u8 = 128;

/// System font locations probed when FONT_PATH is not set
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
];

/// Lazily-loaded invoice font, shared across all renders.
///
/// `None` when no usable font exists; the compositor then skips text layers
/// with a logged warning instead of failing the whole invoice.
static INVOICE_FONT: Lazy<Option<Arc<Font<'static>>>> = Lazy::new(|| {
    let mut candidates: Vec<String> = Vec::new();
    if let Some(path) = config::FONT_PATH.as_ref() {
        candidates.push(path.clone());
    }
    candidates.extend(FONT_CANDIDATES.iter().map(|s| s.to_string()));

    for path in &candidates {
        match std::fs::read(path) {
            Ok(bytes) => match Font::try_from_vec(bytes) {
                Some(font) => {
                    log::info!("Invoice font loaded from {}", path);
                    return Some(Arc::new(font));
                }
                None => log::warn!("Failed to parse font {}", path),
            },
            Err(_) => continue,
        }
    }
    log::warn!("No usable invoice font found; invoices will render without text");
    None
});

pub fn invoice_font() -> Option<Arc<Font<'static>>> {
    INVOICE_FONT.clone()
}

/// A rendered text stamp: two recolored passes plus the anchor offset the
/// caller must apply when compositing.
pub struct TextStamp {
    /// Threshold-gated recolor of the glyph raster
    pub primary: RgbaImage,
    /// Unconditionally recolored copy, drawn 1px right inside its buffer
    /// and composited another 1px right of the primary pass
    pub bold: RgbaImage,
}

impl TextStamp {
    /// Rasterize `text` at `px` pixels and recolor it to `color`.
    ///
    /// Pure function of its inputs; returns `None` for empty text.
    pub fn render(font: &Font<'_>, px: f32, text: &str, color: [u8; 3]) -> Option<Self> {
        if text.is_empty() {
            return None;
        }
        let raster = rasterize_dark(font, px, text)?;

        let mut primary = raster.clone();
        recolor_ink(&mut primary, color);

        // The bold raster carries the glyph shift inside its own buffer,
        // and stamp_onto offsets it again on composite, so the stroke lands
        // a net 2px to the right of the primary pass
        let mut bold = RgbaImage::from_pixel(
            raster.width() + BOLD_OFFSET as u32,
            raster.height(),
            Rgba([0, 0, 0, 0]),
        );
        image::imageops::overlay(&mut bold, &raster, BOLD_OFFSET, 0);
        recolor_all(&mut bold, color);

        Some(Self { primary, bold })
    }

    /// Composite both passes onto `canvas` so the text's visual anchor
    /// lands at `(x, y)` (the padding is subtracted here).
    pub fn stamp_onto(&self, canvas: &mut RgbaImage, x: i64, y: i64) {
        let pad = i64::from(STAMP_PADDING);
        image::imageops::overlay(canvas, &self.primary, x - pad, y - pad);
        image::imageops::overlay(canvas, &self.bold, x - pad + BOLD_OFFSET, y - pad);
    }
}

/// Draw the glyphs black-on-transparent into a buffer sized to the text
/// bounding box plus padding. Anti-aliasing coverage becomes the alpha
/// channel, which is what the recolor passes key off.
fn rasterize_dark(font: &Font<'_>, px: f32, text: &str) -> Option<RgbaImage> {
    let scale = Scale::uniform(px);
    let v_metrics = font.v_metrics(scale);
    let pad = STAMP_PADDING as f32;

    let glyphs: Vec<_> = font
        .layout(text, scale, point(pad, pad + v_metrics.ascent))
        .collect();

    let width = glyphs
        .iter()
        .filter_map(|g| g.pixel_bounding_box())
        .map(|bb| bb.max.x)
        .max()
        .unwrap_or(0)
        .max(
            glyphs
                .last()
                .map(|g| (g.position().x + g.unpositioned().h_metrics().advance_width) as i32)
                .unwrap_or(0),
        );
    let height = (v_metrics.ascent - v_metrics.descent).ceil() as u32;
    if width <= 0 || height == 0 {
        return None;
    }

    let mut img = RgbaImage::from_pixel(
        width as u32 + STAMP_PADDING,
        height + STAMP_PADDING * 2,
        Rgba([0, 0, 0, 0]),
    );

    for glyph in &glyphs {
        if let Some(bb) = glyph.pixel_bounding_box() {
            glyph.draw(|gx, gy, v| {
                let dx = gx as i32 + bb.min.x;
                let dy = gy as i32 + bb.min.y;
                if dx < 0 || dy < 0 || dx as u32 >= img.width() || dy as u32 >= img.height() {
                    return;
                }
                let alpha = (v * 255.0).round() as u8;
                if alpha == 0 {
                    return;
                }
                img.put_pixel(dx as u32, dy as u32, Rgba([0, 0, 0, alpha]));
            });
        }
    }
    Some(img)
}

/// Recolor "ink" pixels: alpha > 0 and all channels below the threshold.
/// Alpha is preserved so anti-aliased edges stay blended.
pub fn recolor_ink(img: &mut RgbaImage, color: [u8; 3]) {
    for pixel in img.pixels_mut() {
        let Rgba([r, g, b, a]) = *pixel;
        if a > 0 && r < INK_THRESHOLD && g < INK_THRESHOLD && b < INK_THRESHOLD {
            *pixel = Rgba([color[0], color[1], color[2], a]);
        }
    }
}

/// Recolor every non-transparent pixel, threshold be damned. Used for the
/// bold pass.
pub fn recolor_all(img: &mut RgbaImage, color: [u8; 3]) {
    for pixel in img.pixels_mut() {
        let a = pixel.0[3];
        if a > 0 {
            *pixel = Rgba([color[0], color[1], color[2], a]);
        }
    }
}
