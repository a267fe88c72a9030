//! Small effects for exercising the engine in tests.

use std::cell::Cell;
use std::rc::Rc;

use anyhow::{bail, Result};

use crate::effects::catalog::assemble;
use crate::effects::{Container, Effect, EffectContext, LoadedEffect};
use crate::render::surface::Surface;

fn manifest(id: &str, post_process: bool) -> String {
    format!(r#"{{ "id": "{}", "name": "{}", "post_process": {} }}"#, id, id, post_process)
}

fn load(id: &str, post_process: bool, plugin: Box<dyn Effect>) -> LoadedEffect {
    assemble(id, &manifest(id, post_process), || Ok(plugin)).unwrap()
}

/// Fills its surface with one colour.
pub struct Solid(pub [u8; 4]);

impl Effect for Solid {
    fn render(&mut self, surface: &mut Surface, _: &mut Container, _: &EffectContext<'_>, _: Option<&Surface>) -> Result<()> {
        surface.fill(self.0);
        Ok(())
    }
}

pub fn solid(id: &str, color: [u8; 4]) -> LoadedEffect {
    load(id, false, Box::new(Solid(color)))
}

/// Solid white with a caller-supplied manifest.
pub fn effect_with(manifest_json: &str) -> LoadedEffect {
    let id = serde_json::from_str::<serde_json::Value>(manifest_json).unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    assemble(&id, manifest_json, || Ok(Box::new(Solid([255; 4])) as Box<dyn Effect>)).unwrap()
}

/// Post-process that writes the inverted upstream into its surface.
pub struct Invert;

impl Effect for Invert {
    fn render(
        &mut self,
        surface: &mut Surface,
        _: &mut Container,
        _: &EffectContext<'_>,
        upstream: Option<&Surface>,
    ) -> Result<()> {
        let Some(upstream) = upstream else { bail!("no upstream") };
        surface.copy_from(upstream);
        for px in surface.pixels_mut().chunks_exact_mut(4) {
            for c in &mut px[..3] {
                *c = 255 - *c;
            }
        }
        Ok(())
    }
}

pub fn invert(id: &str) -> LoadedEffect {
    load(id, true, Box::new(Invert))
}

/// Post-process that only copies what it receives.
pub struct Passthrough;

impl Effect for Passthrough {
    fn render(
        &mut self,
        surface: &mut Surface,
        _: &mut Container,
        _: &EffectContext<'_>,
        upstream: Option<&Surface>,
    ) -> Result<()> {
        if let Some(upstream) = upstream {
            surface.copy_from(upstream);
        }
        Ok(())
    }
}

pub fn passthrough(id: &str) -> LoadedEffect {
    load(id, true, Box::new(Passthrough))
}

/// Draws into a surface it appends to the container; the primary surface
/// stays transparent.
pub struct Swapped(pub [u8; 4]);

impl Effect for Swapped {
    fn render(&mut self, surface: &mut Surface, container: &mut Container, _: &EffectContext<'_>, _: Option<&Surface>) -> Result<()> {
        if container.surfaces().is_empty() {
            container.push_surface(Surface::new(surface.width(), surface.height()));
        }
        if let Some(own) = container.surface_mut(0) {
            own.resize(surface.width(), surface.height());
            own.fill(self.0);
        }
        Ok(())
    }
}

pub fn swapped(id: &str, color: [u8; 4]) -> LoadedEffect {
    load(id, false, Box::new(Swapped(color)))
}

/// Fails (or panics) on every render after drawing a marker.
pub struct Broken {
    pub panic: bool,
}

impl Effect for Broken {
    fn render(&mut self, surface: &mut Surface, _: &mut Container, _: &EffectContext<'_>, _: Option<&Surface>) -> Result<()> {
        surface.fill([1, 2, 3, 255]);
        if self.panic {
            panic!("effect blew up");
        }
        bail!("effect failed")
    }
}

pub fn broken(id: &str, panic: bool) -> LoadedEffect {
    load(id, false, Box::new(Broken { panic }))
}

/// Draws a marker once, then leaves its surface alone.
#[derive(Default)]
pub struct MarkOnce {
    drawn: bool,
}

impl Effect for MarkOnce {
    fn render(&mut self, surface: &mut Surface, _: &mut Container, _: &EffectContext<'_>, _: Option<&Surface>) -> Result<()> {
        if !self.drawn {
            surface.set_pixel(0, 0, [9, 9, 9, 255]);
            self.drawn = true;
        }
        Ok(())
    }
}

pub fn mark_once(id: &str) -> LoadedEffect {
    load(id, false, Box::<MarkOnce>::default())
}

/// Counts cleanup calls through a shared cell.
#[derive(Clone, Default)]
pub struct CleanupProbe(Rc<Cell<u32>>);

struct Probed {
    calls: Rc<Cell<u32>>,
    fail: bool,
}

impl Effect for Probed {
    fn render(&mut self, _: &mut Surface, container: &mut Container, _: &EffectContext<'_>, _: Option<&Surface>) -> Result<()> {
        *container.state_mut::<u32>() += 1;
        Ok(())
    }

    fn cleanup(&mut self, _: &mut Surface, _: &mut Container) -> Result<()> {
        self.calls.set(self.calls.get() + 1);
        if self.fail {
            bail!("could not release");
        }
        Ok(())
    }
}

impl CleanupProbe {
    pub fn effect(&self, fail: bool) -> LoadedEffect {
        load(
            "probe",
            false,
            Box::new(Probed {
                calls: Rc::clone(&self.0),
                fail,
            }),
        )
    }

    pub fn calls(&self) -> u32 {
        self.0.get()
    }
}
