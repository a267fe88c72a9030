use anyhow::{Context, Result};

use super::{Container, Effect, EffectContext};
use crate::render::surface::Surface;
use crate::render::text::{parse_color, TextOverlay};

#[derive(Default)]
struct TextState {
    /// Font parsed from the file input, keyed by file name
    font: Option<(String, TextOverlay)>,
    warned_no_font: bool,
}

/// Draws the shared engine text (or the `caption` option when that is
/// empty), centred and sized to fit. Needs a font through the `font` file
/// input; renders nothing until one is provided.
pub struct TextEffect;

pub fn build() -> Result<Box<dyn Effect>> {
    Ok(Box::new(TextEffect))
}

impl Effect for TextEffect {
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

        let opts = ctx.options;
        let text = if ctx.shared.text.is_empty() {
            opts.text("caption", "")
        } else {
            ctx.shared.text.as_str()
        };
        if text.is_empty() {
            return Ok(());
        }

        let state = container.state_mut::<TextState>();
        let Some(file) = opts.file("font") else {
            if !state.warned_no_font {
                log::info!("Text effect has no font file yet, drawing nothing");
                state.warned_no_font = true;
            }
            return Ok(());
        };

        let cached = matches!(&state.font, Some((name, _)) if name == file.name());
        if !cached {
            let overlay = TextOverlay::from_bytes(file.bytes())
                .with_context(|| format!("Font '{}' is not usable", file.name()))?;
            state.font = Some((file.name().to_string(), overlay));
        }
        let Some((_, overlay)) = &state.font else {
            return Ok(());
        };

        let mut color = parse_color(opts.text("color", "#ffffff")).unwrap_or([255, 255, 255, 255]);
        if opts.flag("reactive", true) {
            color[3] = ((0.5 + 0.5 * ctx.features.bass.clamp(0.0, 1.0)) * 255.0) as u8;
        }
        overlay.composite_centered(surface, text, color);
        Ok(())
    }

    fn cleanup(&mut self, _surface: &mut Surface, container: &mut Container) -> Result<()> {
        if let Some(state) = container.state::<TextState>() {
            if let Some((name, _)) = &state.font {
                log::debug!("Dropping font '{}'", name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::features::FeatureFrame;
    use crate::effects::{FileHandle, OptionMap, OptionValue, Options, SharedState};

    #[test]
    fn no_font_draws_nothing() {
        let features = FeatureFrame::default();
        let options = Options::default();
        let shared = SharedState {
            text: "hello".into(),
            ..Default::default()
        };
        let ctx = EffectContext {
            features: &features,
            spectrum: &[],
            options: &options,
            shared: &shared,
        };
        let mut surface = Surface::new(16, 16);
        let mut container = Container::default();
        TextEffect.render(&mut surface, &mut container, &ctx, None).unwrap();
        assert!(surface.pixels().iter().all(|&b| b == 0));
    }

    #[test]
    fn unreadable_font_is_a_render_error() {
        let features = FeatureFrame::default();
        let mut map = OptionMap::new();
        map.insert("caption".into(), OptionValue::Text("hi".into()));
        map.insert(
            "font".into(),
            OptionValue::File(FileHandle::new("bad.ttf", b"garbage".to_vec())),
        );
        let options = Options::new(map);
        let shared = SharedState::default();
        let ctx = EffectContext {
            features: &features,
            spectrum: &[],
            options: &options,
            shared: &shared,
        };
        let mut surface = Surface::new(16, 16);
        let mut container = Container::default();
        assert!(TextEffect.render(&mut surface, &mut container, &ctx, None).is_err());
    }
}
