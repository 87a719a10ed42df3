//! Fallback image drawn when a slide cannot be rasterized.
//!
//! Uses a built-in 5×7 bitmap font so it never depends on font loading.

use resvg::tiny_skia::{Color, Paint, Pixmap, Rect, Transform};

use crate::frame::blank_pixmap;

pub const PLACEHOLDER_TITLE: &str = "RENDER ERROR";
pub const PLACEHOLDER_MESSAGE: &str = "COULD NOT CAPTURE SLIDE";

const BACKGROUND: [u8; 3] = [0x1e, 0x1e, 0x1e];
const TITLE_COLOR: [u8; 3] = [0xff, 0x00, 0x50];
const MESSAGE_COLOR: [u8; 3] = [0xff, 0xff, 0xff];

const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;

/// Rows of a glyph, top to bottom, most significant of the low five bits
/// on the left.
fn glyph(c: char) -> [u8; 7] {
    match c.to_ascii_uppercase() {
        'A' => [0x0e, 0x11, 0x11, 0x1f, 0x11, 0x11, 0x11],
        'B' => [0x1e, 0x11, 0x11, 0x1e, 0x11, 0x11, 0x1e],
        'C' => [0x0e, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0e],
        'D' => [0x1e, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1e],
        'E' => [0x1f, 0x10, 0x10, 0x1e, 0x10, 0x10, 0x1f],
        'F' => [0x1f, 0x10, 0x10, 0x1e, 0x10, 0x10, 0x10],
        'G' => [0x0e, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0f],
        'H' => [0x11, 0x11, 0x11, 0x1f, 0x11, 0x11, 0x11],
        'I' => [0x0e, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0e],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0c],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1f],
        'M' => [0x11, 0x1b, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0e, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0e],
        'P' => [0x1e, 0x11, 0x11, 0x1e, 0x10, 0x10, 0x10],
        'Q' => [0x0e, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0d],
        'R' => [0x1e, 0x11, 0x11, 0x1e, 0x14, 0x12, 0x11],
        'S' => [0x0f, 0x10, 0x10, 0x0e, 0x01, 0x01, 0x1e],
        'T' => [0x1f, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0e],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0a, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0a],
        'X' => [0x11, 0x11, 0x0a, 0x04, 0x0a, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0a, 0x04, 0x04, 0x04],
        'Z' => [0x1f, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1f],
        '0' => [0x0e, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0e],
        '1' => [0x04, 0x0c, 0x04, 0x04, 0x04, 0x04, 0x0e],
        '2' => [0x0e, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1f],
        '3' => [0x1f, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0e],
        '4' => [0x02, 0x06, 0x0a, 0x12, 0x1f, 0x02, 0x02],
        '5' => [0x1f, 0x10, 0x1e, 0x01, 0x01, 0x11, 0x0e],
        '6' => [0x06, 0x08, 0x10, 0x1e, 0x11, 0x11, 0x0e],
        '7' => [0x1f, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0e, 0x11, 0x11, 0x0e, 0x11, 0x11, 0x0e],
        '9' => [0x0e, 0x11, 0x11, 0x0f, 0x01, 0x02, 0x0c],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0c, 0x0c],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1f, 0x00, 0x00, 0x00],
        '!' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04],
        ':' => [0x00, 0x0c, 0x0c, 0x00, 0x0c, 0x0c, 0x00],
        '|' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        _ => [0; 7],
    }
}

/// Draw `text` centered horizontally with its top at `y`. Each font pixel
/// is a `cell`-sized square.
fn draw_text(pixmap: &mut Pixmap, text: &str, y: f32, cell: f32, rgb: [u8; 3]) {
    let advance = (GLYPH_W + 1) as f32 * cell;
    let chars = text.chars().count() as f32;
    let line_width = chars * advance - cell;
    let mut x = (pixmap.width() as f32 - line_width) / 2.0;

    let mut paint = Paint::default();
    paint.set_color_rgba8(rgb[0], rgb[1], rgb[2], 255);
    paint.anti_alias = false;

    for c in text.chars() {
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (1 << (GLYPH_W - 1 - col)) == 0 {
                    continue;
                }
                if let Some(rect) = Rect::from_xywh(
                    x + col as f32 * cell,
                    y + row as f32 * cell,
                    cell,
                    cell,
                ) {
                    pixmap.fill_rect(rect, &paint, Transform::identity(), None);
                }
            }
        }
        x += advance;
    }
}

/// Largest whole cell size that fits `text` in `max_width` and `max_height`.
fn cell_for(text: &str, max_width: f32, max_height: f32) -> f32 {
    let columns = (text.chars().count() as u32 * (GLYPH_W + 1)).max(1) as f32;
    (max_width / columns)
        .min(max_height / GLYPH_H as f32)
        .floor()
        .max(1.0)
}

/// Dark card with a red title and a white message, at any size.
pub fn placeholder_pixmap(width: u32, height: u32, title: &str, message: &str) -> Pixmap {
    let mut pixmap = blank_pixmap(width, height);
    pixmap.fill(Color::from_rgba8(BACKGROUND[0], BACKGROUND[1], BACKGROUND[2], 255));

    let (w, h) = (pixmap.width() as f32, pixmap.height() as f32);
    let usable = w * 0.8;
    let title_cell = cell_for(title, usable, h * 0.05);
    let message_cell = cell_for(message, usable, h * 0.025);

    let title_h = GLYPH_H as f32 * title_cell;
    let gap = title_cell * 3.0;
    let block_h = title_h + gap + GLYPH_H as f32 * message_cell;
    let top = ((h - block_h) / 2.0).floor();

    draw_text(&mut pixmap, title, top, title_cell, TITLE_COLOR);
    draw_text(&mut pixmap, message, top + title_h + gap, message_cell, MESSAGE_COLOR);
    pixmap
}

/// The standard render-failure card.
pub fn render_error_pixmap(width: u32, height: u32) -> Pixmap {
    placeholder_pixmap(width, height, PLACEHOLDER_TITLE, PLACEHOLDER_MESSAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_rgb(p: &Pixmap, rgb: [u8; 3]) -> usize {
        p.pixels()
            .iter()
            .filter(|c| [c.red(), c.green(), c.blue()] == rgb)
            .count()
    }

    #[test]
    fn test_placeholder_has_requested_size() {
        let p = render_error_pixmap(1080, 1920);
        assert_eq!((p.width(), p.height()), (1080, 1920));
        assert_eq!(p.pixel(0, 0).map(|c| c.red()), Some(0x1e));
    }

    #[test]
    fn test_placeholder_draws_both_lines() {
        let p = render_error_pixmap(360, 640);
        assert!(count_rgb(&p, TITLE_COLOR) > 0);
        assert!(count_rgb(&p, MESSAGE_COLOR) > 0);
        // Corners stay background.
        assert_eq!(p.pixel(359, 639).map(|c| c.green()), Some(0x1e));
    }

    #[test]
    fn test_tiny_placeholder_does_not_panic() {
        let p = placeholder_pixmap(3, 3, "A", "B");
        assert_eq!((p.width(), p.height()), (3, 3));
    }

    #[test]
    fn test_unknown_glyph_is_blank() {
        assert_eq!(glyph('~'), [0; 7]);
        assert_eq!(glyph('a'), glyph('A'));
    }
}
