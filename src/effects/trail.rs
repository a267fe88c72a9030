use anyhow::Result;

use super::{Container, Effect, EffectContext};
use crate::render::blend::CompositeOp;
use crate::render::surface::Surface;

/// Feedback trail. Keeps its previous output in the slot surface, fades
/// it and lightens the new composite over it, so it depends on the
/// surface keeping its pixels between frames.
pub struct Trail;

pub fn build() -> Result<Box<dyn Effect>> {
    Ok(Box::new(Trail))
}

impl Effect for Trail {
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
        let decay = ctx.options.number_f32("decay", 0.83).clamp(0.0, 0.99);
        surface.fade(decay);
        surface.draw(upstream, CompositeOp::Lighten, 1.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::features::FeatureFrame;
    use crate::effects::{Options, SharedState};

    #[test]
    fn bright_pixels_linger() {
        let features = FeatureFrame::default();
        let options = Options::default();
        let shared = SharedState::default();
        let ctx = EffectContext {
            features: &features,
            spectrum: &[],
            options: &options,
            shared: &shared,
        };
        let mut surface = Surface::new(2, 1);
        let mut container = Container::default();

        let mut frame = Surface::new(2, 1);
        frame.fill([0, 0, 0, 255]);
        frame.set_pixel(0, 0, [255, 255, 255, 255]);
        Trail.render(&mut surface, &mut container, &ctx, Some(&frame)).unwrap();
        assert_eq!(surface.pixel(0, 0), Some([255, 255, 255, 255]));

        // the marker is gone from the composite but still visible in the trail
        frame.fill([0, 0, 0, 255]);
        Trail.render(&mut surface, &mut container, &ctx, Some(&frame)).unwrap();
        let px = surface.pixel(0, 0).unwrap();
        assert!(px[0] > 100 && px[0] < 255, "{:?}", px);
        assert_eq!(surface.pixel(1, 0), Some([0, 0, 0, 255]));
    }
}
