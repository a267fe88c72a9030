use anyhow::Result;

use super::{Container, Effect, EffectContext};
use crate::render::blend::CompositeOp;
use crate::render::surface::Surface;
use crate::render::text::parse_color;

const DECAY: f32 = 0.85;

#[derive(Default)]
struct PulseState {
    level: f32,
    was_kick: bool,
}

/// A ring that jumps on the rising edge of every kick and shrinks back.
pub struct KickPulse;

pub fn build() -> Result<Box<dyn Effect>> {
    Ok(Box::new(KickPulse))
}

impl Effect for KickPulse {
    fn render(
        &mut self,
        surface: &mut Surface,
        container: &mut Container,
        ctx: &EffectContext<'_>,
        _upstream: Option<&Surface>,
    ) -> Result<()> {
        surface.clear();
        if surface.is_empty() {
            return Ok(());
        }

        let state = container.state_mut::<PulseState>();
        let kick = ctx.features.kick;
        if kick && !state.was_kick {
            state.level = 1.0;
        } else {
            state.level *= DECAY;
        }
        state.was_kick = kick;
        let level = state.level;

        let opts = ctx.options;
        let mut color = parse_color(opts.text("color", "#ffffff")).unwrap_or([255, 255, 255, 255]);

        if opts.flag("flash", false) && level > 0.05 {
            color[3] = (level * 64.0) as u8;
            surface.fill(color);
            color[3] = 255;
        }

        let (w, h) = (surface.width() as f32, surface.height() as f32);
        let max_radius = w.min(h) / 2.0 * opts.number_f32("size", 0.5).clamp(0.05, 1.0);
        let radius = max_radius * (0.6 + 0.3 * level + 0.1 * ctx.features.bass);
        let half_thickness = (radius * 0.04).max(1.0);
        let alpha = 0.3 + 0.7 * level;
        let (cx, cy) = (w / 2.0, h / 2.0);

        let reach = radius + half_thickness;
        let x0 = (cx - reach).floor().max(0.0) as i32;
        let x1 = (cx + reach).ceil().min(w) as i32;
        let y0 = (cy - reach).floor().max(0.0) as i32;
        let y1 = (cy + reach).ceil().min(h) as i32;
        for y in y0..y1 {
            for x in x0..x1 {
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                let edge = ((dx * dx + dy * dy).sqrt() - radius).abs();
                if edge <= half_thickness {
                    surface.blend_pixel(x, y, color, CompositeOp::SourceOver, alpha);
                }
            }
        }
        Ok(())
    }
}
