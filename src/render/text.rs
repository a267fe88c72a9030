use anyhow::{anyhow, Result};
use fontdue::{Font, FontSettings};

use super::blend::CompositeOp;
use super::surface::Surface;

pub const LINE_HEIGHT: f32 = 1.2;

pub struct TextOverlay {
    font: Font,
}

impl TextOverlay {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| anyhow!("Failed to parse font: {}", e))?;
        Ok(Self { font })
    }

    pub fn measure_width(&self, text: &str, font_size: f32) -> u32 {
        let width: f32 = text
            .chars()
            .map(|ch| self.font.metrics(ch, font_size).advance_width)
            .sum();
        width.ceil() as u32
    }

    /// Largest size (binary search from 8px) at which every line fits
    /// inside `width` x `height` with `LINE_HEIGHT` spacing.
    pub fn fit_font_size(&self, lines: &[&str], width: u32, height: u32) -> f32 {
        let mut best = 8u32;
        let mut lo = 8u32;
        let mut hi = width.min(height) / 2;
        while lo <= hi {
            let size = (lo + hi) / 2;
            let fits = lines.iter().all(|l| self.measure_width(l, size as f32) <= width)
                && (lines.len() as f32 * size as f32 * LINE_HEIGHT) <= height as f32;
            if fits {
                best = size;
                lo = size + 1;
            } else {
                hi = size - 1;
            }
        }
        best as f32
    }

    /// Draws `text` with its top-left corner at (x, y).
    pub fn composite(&self, surface: &mut Surface, text: &str, x: i32, y: i32, font_size: f32, color: [u8; 4]) {
        let mut cursor_x = x;
        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, font_size);
            let glyph_y = y + font_size as i32 - metrics.height as i32 - metrics.ymin;

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let coverage = bitmap[gy * metrics.width + gx];
                    if coverage == 0 {
                        continue;
                    }
                    surface.blend_pixel(
                        cursor_x + metrics.xmin + gx as i32,
                        glyph_y + gy as i32,
                        color,
                        CompositeOp::SourceOver,
                        coverage as f32 / 255.0,
                    );
                }
            }

            cursor_x += metrics.advance_width.round() as i32;
        }
    }

    /// Centres each line horizontally and the block vertically.
    pub fn composite_centered(&self, surface: &mut Surface, text: &str, color: [u8; 4]) {
        if surface.is_empty() || text.is_empty() {
            return;
        }
        let lines: Vec<&str> = text.split('\n').collect();
        let size = self.fit_font_size(&lines, surface.width(), surface.height());
        let line_height = size * LINE_HEIGHT;
        let total = line_height * lines.len() as f32;
        let mut y = (surface.height() as f32 - total) / 2.0;

        for line in lines {
            let w = self.measure_width(line, size) as i32;
            let x = (surface.width() as i32 - w) / 2;
            self.composite(surface, line, x, y.round() as i32, size, color);
            y += line_height;
        }
    }
}

/// Parses `#rgb`, `#rrggbb` or `r,g,b` into an opaque colour.
pub fn parse_color(value: &str) -> Option<[u8; 4]> {
    let v = value.trim();
    if let Some(hex) = v.strip_prefix('#') {
        if !hex.is_ascii() {
            return None;
        }
        let expand = |s: &str| u8::from_str_radix(s, 16).ok();
        return match hex.len() {
            3 => {
                let mut out = [0u8, 0, 0, 255];
                for (i, c) in hex.chars().enumerate() {
                    let d = expand(&c.to_string())?;
                    out[i] = d * 17;
                }
                Some(out)
            }
            6 => Some([
                expand(&hex[0..2])?,
                expand(&hex[2..4])?,
                expand(&hex[4..6])?,
                255,
            ]),
            _ => None,
        };
    }
    let parts: Vec<u8> = v.split(',').filter_map(|p| p.trim().parse().ok()).collect();
    if parts.len() == 3 {
        return Some([parts[0], parts[1], parts[2], 255]);
    }
    None
}

pub fn format_color(color: [u8; 4]) -> String {
    format!("#{:02x}{:02x}{:02x}", color[0], color[1], color[2])
}
