//! Effect plugin contract and the built-in effects.
//!
//! An effect is resolved once, at load time, into a [`LoadedEffect`]: its
//! manifest (id, kind, option schema, file inputs) plus the boxed plugin.
//! The engine never probes capabilities while rendering.

pub mod catalog;
pub mod manifest;
pub mod options;
pub mod schema;

mod bars;
mod chromatic;
mod mosaic;
mod pulse;
#[cfg(feature = "gpu")]
mod shader;
mod text;
mod trail;

use anyhow::Result;
use std::any::Any;

use crate::audio::features::FeatureFrame;
use crate::render::surface::Surface;

pub use manifest::{EffectKind, EffectManifest, FileInputSpec};
pub use options::{FileHandle, OptionMap, OptionValue, Options};
pub use schema::{OptionKind, OptionSchema, OptionSpec};

/// Engine-wide values every effect can read.
#[derive(Clone, Debug, Default)]
pub struct SharedState {
    /// Free text shown by text effects
    pub text: String,
    /// Rolling frames-per-second estimate
    pub fps: f32,
    /// Frames rendered since start
    pub frame: u64,
    /// Seconds since start
    pub time: f32,
}

/// Per-frame inputs handed to `Effect::render`.
pub struct EffectContext<'a> {
    pub features: &'a FeatureFrame,
    /// Byte magnitude spectrum the features were derived from
    pub spectrum: &'a [u8],
    pub options: &'a Options,
    pub shared: &'a SharedState,
}

/// Slot-private scratch space. Survives across frames, dropped on cleanup.
///
/// Effects may push extra surfaces here; the compositor draws the last one
/// instead of the slot's primary surface.
#[derive(Default)]
pub struct Container {
    surfaces: Vec<Surface>,
    state: Option<Box<dyn Any>>,
}

impl Container {
    /// State of type `T`, created with `Default` on first use or when the
    /// stored state has a different type.
    pub fn state_mut<T: Default + 'static>(&mut self) -> &mut T {
        let fresh = !matches!(&self.state, Some(s) if s.is::<T>());
        if fresh {
            self.state = Some(Box::new(T::default()));
        }
        self.state
            .as_mut()
            .and_then(|s| s.downcast_mut::<T>())
            .unwrap_or_else(|| unreachable!("state was just set to T"))
    }

    pub fn state<T: 'static>(&self) -> Option<&T> {
        self.state.as_ref().and_then(|s| s.downcast_ref::<T>())
    }

    pub fn has_state(&self) -> bool {
        self.state.is_some()
    }

    pub fn push_surface(&mut self, surface: Surface) -> usize {
        self.surfaces.push(surface);
        self.surfaces.len() - 1
    }

    pub fn surface_mut(&mut self, index: usize) -> Option<&mut Surface> {
        self.surfaces.get_mut(index)
    }

    pub fn surfaces(&self) -> &[Surface] {
        &self.surfaces
    }

    pub fn last_surface(&self) -> Option<&Surface> {
        self.surfaces.last()
    }

    pub fn clear(&mut self) {
        self.surfaces.clear();
        self.state = None;
    }
}

/// A visual effect plugin.
///
/// `render` is called once per frame while the slot is active, after the
/// compositor has sized `surface` to the viewport. It must cope with a
/// zero-area surface. Post-process effects get the current composite as
/// `upstream` and write their transformed image into `surface` (or into a
/// container surface); standard effects get `None`.
pub trait Effect {
    fn render(
        &mut self,
        surface: &mut Surface,
        container: &mut Container,
        ctx: &EffectContext<'_>,
        upstream: Option<&Surface>,
    ) -> Result<()>;

    /// Runs once when the slot is switched off. Release everything held in
    /// `container`; the engine clears it afterwards regardless.
    fn cleanup(&mut self, _surface: &mut Surface, _container: &mut Container) -> Result<()> {
        Ok(())
    }
}

/// An effect whose manifest has been parsed and whose plugin was built.
pub struct LoadedEffect {
    pub manifest: EffectManifest,
    pub schema: OptionSchema,
    pub plugin: Box<dyn Effect>,
}

impl LoadedEffect {
    pub fn id(&self) -> &str {
        &self.manifest.id
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn kind(&self) -> EffectKind {
        self.manifest.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter(u32);

    #[test]
    fn container_state_is_typed_and_cleared() {
        let mut c = Container::default();
        c.state_mut::<Counter>().0 += 2;
        c.state_mut::<Counter>().0 += 1;
        assert_eq!(c.state::<Counter>().map(|s| s.0), Some(3));

        // a different type replaces the state
        *c.state_mut::<u8>() = 5;
        assert!(c.state::<Counter>().is_none());

        c.push_surface(Surface::new(1, 1));
        c.clear();
        assert!(!c.has_state());
        assert!(c.last_surface().is_none());
    }
}
