use anyhow::Result;
use rayon::prelude::*;
use std::borrow::Cow;

use super::{Container, Effect, EffectContext};
use crate::render::surface::Surface;

/// Shifts red one way and blue the other, by a fraction of the width.
pub struct ChromaticShift;

pub fn build() -> Result<Box<dyn Effect>> {
    Ok(Box::new(ChromaticShift))
}

impl Effect for ChromaticShift {
    fn render(
        &mut self,
        surface: &mut Surface,
        _container: &mut Container,
        ctx: &EffectContext<'_>,
        upstream: Option<&Surface>,
    ) -> Result<()> {
        let Some(upstream) = upstream else {
            return Ok(());
        };
        if surface.is_empty() {
            return Ok(());
        }

        let mut amount = ctx.options.number_f32("amount", 0.005).max(0.0);
        if ctx.options.flag("reactive", true) {
            amount *= 1.0 + 4.0 * ctx.features.bass;
        }

        let (w, h) = (surface.width(), surface.height());
        let src = matched_size(upstream, w, h);
        let shift = (amount * w as f32).round() as i64;
        shift_channels(src.pixels(), surface.pixels_mut(), w as usize, shift);
        Ok(())
    }
}

/// `upstream` at exactly `width` x `height`, scaling only when needed.
pub(crate) fn matched_size(upstream: &Surface, width: u32, height: u32) -> Cow<'_, Surface> {
    if upstream.width() == width && upstream.height() == height {
        Cow::Borrowed(upstream)
    } else {
        let mut scaled = Surface::new(width, height);
        scaled.copy_from(upstream);
        Cow::Owned(scaled)
    }
}

fn shift_channels(src: &[u8], dst: &mut [u8], width: usize, shift: i64) {
    let row_bytes = width * 4;
    let max_x = width as i64 - 1;
    dst.par_chunks_mut(row_bytes)
        .zip(src.par_chunks(row_bytes))
        .for_each(|(out, row)| {
            for x in 0..width {
                let red_x = (x as i64 + shift).clamp(0, max_x) as usize;
                let blue_x = (x as i64 - shift).clamp(0, max_x) as usize;
                let o = x * 4;
                out[o] = row[red_x * 4];
                out[o + 1] = row[o + 1];
                out[o + 2] = row[blue_x * 4 + 2];
                out[o + 3] = row[o + 3];
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_move_in_opposite_directions() {
        let mut src = Surface::new(5, 1);
        src.fill([0, 0, 0, 255]);
        src.set_pixel(2, 0, [255, 255, 255, 255]);
        let mut dst = Surface::new(5, 1);
        shift_channels(src.pixels(), dst.pixels_mut(), 5, 1);

        // red is sampled from x + 1, blue from x - 1
        assert_eq!(dst.pixel(1, 0), Some([255, 0, 0, 255]));
        assert_eq!(dst.pixel(2, 0), Some([0, 255, 0, 255]));
        assert_eq!(dst.pixel(3, 0), Some([0, 0, 255, 255]));
    }

    #[test]
    fn zero_shift_copies() {
        let mut src = Surface::new(3, 2);
        src.fill([10, 20, 30, 255]);
        let mut dst = Surface::new(3, 2);
        shift_channels(src.pixels(), dst.pixels_mut(), 3, 0);
        assert_eq!(src, dst);
    }
}
