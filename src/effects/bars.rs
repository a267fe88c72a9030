use anyhow::Result;

use super::{Container, Effect, EffectContext};
use crate::render::surface::Surface;
use crate::render::text::parse_color;

const GAP: u32 = 1;

#[derive(Default)]
struct BarsState {
    hue: f32,
}

/// Spectrum bars. The surface is faded rather than cleared each frame,
/// which leaves a short trail behind falling bars.
pub struct SpectrumBars;

pub fn build() -> Result<Box<dyn Effect>> {
    Ok(Box::new(SpectrumBars))
}

impl Effect for SpectrumBars {
    fn render(
        &mut self,
        surface: &mut Surface,
        container: &mut Container,
        ctx: &EffectContext<'_>,
        _upstream: Option<&Surface>,
    ) -> Result<()> {
        if surface.is_empty() {
            return Ok(());
        }
        let opts = ctx.options;
        surface.fade(opts.number_f32("fade", 0.3));

        let spectrum = ctx.spectrum;
        if spectrum.is_empty() {
            return Ok(());
        }

        let state = container.state_mut::<BarsState>();
        let rotate = opts.flag("colorRotate", true);
        if rotate {
            state.hue = (state.hue + opts.number_f32("speed", 1.0)).rem_euclid(360.0);
        }
        let base = parse_color(opts.text("color", "#00ffcc")).unwrap_or([255, 255, 255, 255]);
        let mirror = opts.text("mode", "bars") == "mirror";

        let count = opts.number("bars", 64.0).round().clamp(1.0, 512.0) as usize;
        // the top quarter of the analyser range is mostly empty
        let usable = (spectrum.len() * 3 / 4).max(1);
        let (w, h) = (surface.width(), surface.height());
        let bar_width = w as f32 / count as f32;
        let boost = if ctx.features.kick { 1.1 } else { 1.0 };

        for i in 0..count {
            let start = i * usable / count;
            let end = ((i + 1) * usable / count).max(start + 1).min(spectrum.len());
            let sum: u32 = spectrum[start..end].iter().map(|&v| v as u32).sum();
            let level = (sum as f32 / (end - start) as f32 / 255.0 * boost).min(1.0);
            let bar_h = (level * h as f32).round() as u32;
            if bar_h == 0 {
                continue;
            }

            let color = if rotate {
                hsl_to_rgb(state.hue + i as f32 / count as f32 * 60.0, 1.0, 0.5)
            } else {
                base
            };
            let x = (i as f32 * bar_width) as i32;
            let y = if mirror { (h - bar_h) / 2 } else { h - bar_h } as i32;
            let bw = (bar_width as u32).saturating_sub(GAP).max(1);
            surface.fill_rect(x, y, bw, bar_h, color);
        }
        Ok(())
    }
}

pub(crate) fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> [u8; 4] {
    let h = hue.rem_euclid(360.0) / 60.0;
    let c = (1.0 - (2.0 * lightness - 1.0).abs()) * saturation;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = lightness - c / 2.0;
    let byte = |v: f32| ((v + m).clamp(0.0, 1.0) * 255.0).round() as u8;
    [byte(r), byte(g), byte(b), 255]
}
