use anyhow::Result;
use rayon::prelude::*;

use super::chromatic::matched_size;
use super::{Container, Effect, EffectContext};
use crate::render::surface::Surface;

/// Pixelates the composite. Each tile takes the colour at its centre.
pub struct Mosaic;

pub fn build() -> Result<Box<dyn Effect>> {
    Ok(Box::new(Mosaic))
}

impl Effect for Mosaic {
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

        let mut tile = ctx.options.number("tile", 8.0).round().max(1.0) as usize;
        if ctx.options.flag("reactive", true) && ctx.features.kick {
            tile *= 2;
        }

        let (w, h) = (surface.width(), surface.height());
        let src = matched_size(upstream, w, h);
        pixelate(src.pixels(), surface.pixels_mut(), w as usize, h as usize, tile);
        Ok(())
    }
}

fn pixelate(src: &[u8], dst: &mut [u8], width: usize, height: usize, tile: usize) {
    let row_bytes = width * 4;
    let centre = |i: usize, limit: usize| ((i / tile) * tile + tile / 2).min(limit - 1);

    dst.par_chunks_mut(row_bytes).enumerate().for_each(|(y, out)| {
        let sy = centre(y, height);
        let row = &src[sy * row_bytes..(sy + 1) * row_bytes];
        for x in 0..width {
            let sx = centre(x, width);
            out[x * 4..x * 4 + 4].copy_from_slice(&row[sx * 4..sx * 4 + 4]);
        }
    });
}
