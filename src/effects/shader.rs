use anyhow::Result;

use super::chromatic::matched_size;
use super::{Container, Effect, EffectContext};
use crate::render::gpu::{GpuContext, ShaderChain};
use crate::render::surface::Surface;

#[derive(Default)]
struct ShaderState {
    gpu: Option<GpuContext>,
    chain: Option<(String, ShaderChain)>,
}

/// Runs WGSL passes over the composite on the GPU. The read-back image is
/// appended to the container, so the compositor draws it in place of the
/// slot's primary surface.
pub struct ShaderEffect;

pub fn build() -> Result<Box<dyn Effect>> {
    Ok(Box::new(ShaderEffect))
}

impl Effect for ShaderEffect {
    fn render(
        &mut self,
        surface: &mut Surface,
        container: &mut Container,
        ctx: &EffectContext<'_>,
        upstream: Option<&Surface>,
    ) -> Result<()> {
        let Some(upstream) = upstream else {
            return Ok(());
        };
        if surface.is_empty() {
            return Ok(());
        }
        let (w, h) = (surface.width(), surface.height());
        let preset = ctx.options.text("preset", "crt").to_string();
        let mut intensity = ctx.options.number_f32("intensity", 1.0);
        if ctx.options.flag("reactive", false) {
            intensity *= 0.5 + ctx.features.bass;
        }

        if container.surfaces().is_empty() {
            container.push_surface(Surface::new(w, h));
        }
        let mut output = container.surface_mut(0).map(std::mem::take).unwrap_or_default();

        let state = container.state_mut::<ShaderState>();
        if state.gpu.is_none() {
            state.gpu = Some(GpuContext::new()?);
        }
        let stale = !matches!(&state.chain, Some((p, chain)) if *p == preset && chain.size() == (w, h));
        if stale {
            if let Some(gpu) = &state.gpu {
                let chain = ShaderChain::new(&gpu.device, w, h, &[preset.as_str()])?;
                log::debug!("Built shader chain '{}' with {} passes at {}x{}", preset, chain.pass_count(), w, h);
                state.chain = Some((preset, chain));
            }
        }

        let result = match (&state.gpu, &state.chain) {
            (Some(gpu), Some((_, chain))) => {
                let input = matched_size(upstream, w, h);
                chain.run(gpu, &input, &mut output, ctx.shared.time, intensity)
            }
            _ => Ok(()),
        };

        if let Some(slot) = container.surface_mut(0) {
            *slot = output;
        }
        result
    }

    fn cleanup(&mut self, _surface: &mut Surface, container: &mut Container) -> Result<()> {
        if container.state::<ShaderState>().is_some_and(|s| s.gpu.is_some()) {
            log::info!("Releasing shader GPU device");
        }
        container.clear();
        Ok(())
    }
}
