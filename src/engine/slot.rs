use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::audio::features::FeatureFrame;
use crate::effects::{
    Container, EffectContext, EffectKind, FileHandle, LoadedEffect, OptionMap, OptionValue, Options, SharedState,
};
use crate::error::{EngineError, Result};
use crate::render::surface::Surface;

/// One loaded effect bound to its runtime state.
///
/// `index` is the effect's position in load order and never changes. The
/// surface is allocated once and resized in place by the compositor.
pub struct Slot {
    index: usize,
    effect: LoadedEffect,
    active: bool,
    /// Values set by defaults, the user or automix
    options: OptionMap,
    /// File input values, scoped to one activation
    files: OptionMap,
    /// `options` with `files` laid over it, what render sees
    effective: Options,
    surface: Surface,
    container: Container,
    failing: bool,
}

impl Slot {
    pub fn new(index: usize, effect: LoadedEffect) -> Self {
        let options = effect.schema.defaults();
        let mut slot = Self {
            index,
            effect,
            active: false,
            options,
            files: OptionMap::new(),
            effective: Options::default(),
            surface: Surface::default(),
            container: Container::default(),
            failing: false,
        };
        slot.rebuild_options();
        slot
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn effect(&self) -> &LoadedEffect {
        &self.effect
    }

    pub fn id(&self) -> &str {
        self.effect.id()
    }

    pub fn name(&self) -> &str {
        self.effect.name()
    }

    pub fn kind(&self) -> EffectKind {
        self.effect.kind()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Snapshot handed to the next render.
    pub fn options(&self) -> &Options {
        &self.effective
    }

    pub fn file_values(&self) -> &OptionMap {
        &self.files
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// What the compositor draws: the newest container surface if the effect
    /// pushed any, otherwise the primary surface.
    pub fn output(&self) -> &Surface {
        self.container.last_surface().unwrap_or(&self.surface)
    }

    /// Merges `partial` into a copy of the current values and swaps the
    /// snapshot in one step.
    pub fn set_options(&mut self, partial: OptionMap) {
        let mut next = self.options.clone();
        next.extend(partial);
        self.options = next;
        self.rebuild_options();
    }

    pub fn set_file(&mut self, key: &str, file: FileHandle) -> Result<()> {
        if self.effect.manifest.file_input(key).is_none() {
            return Err(EngineError::InvalidSchema(format!(
                "effect '{}' has no file input '{}'",
                self.id(),
                key
            )));
        }
        self.files.insert(key.to_string(), OptionValue::File(file));
        self.rebuild_options();
        Ok(())
    }

    fn rebuild_options(&mut self) {
        let mut merged = self.options.clone();
        merged.extend(self.files.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.effective = Options::new(merged);
    }

    pub(crate) fn activate(&mut self) -> bool {
        if self.active {
            return false;
        }
        self.active = true;
        self.failing = false;
        true
    }

    /// Runs the effect's cleanup once, then drops the container and the
    /// activation's file values. The slot ends up inactive even when cleanup
    /// fails.
    pub(crate) fn deactivate(&mut self) -> Option<Result<()>> {
        if !self.active {
            return None;
        }
        let plugin = &mut self.effect.plugin;
        let (surface, container) = (&mut self.surface, &mut self.container);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| plugin.cleanup(surface, container)));

        self.active = false;
        self.container.clear();
        self.files.clear();
        self.rebuild_options();

        let result = match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(EngineError::Cleanup {
                slot: self.index,
                reason: format!("{:#}", e),
            }),
            Err(payload) => Err(EngineError::Cleanup {
                slot: self.index,
                reason: panic_message(payload.as_ref()),
            }),
        };
        Some(result)
    }

    pub(crate) fn resize(&mut self, width: u32, height: u32) {
        self.surface.resize(width, height);
    }

    /// Calls the plugin with panics contained. `upstream` is the current
    /// composite for post-process effects.
    pub(crate) fn render(
        &mut self,
        features: &FeatureFrame,
        spectrum: &[u8],
        shared: &SharedState,
        upstream: Option<&Surface>,
    ) -> Result<()> {
        let ctx = EffectContext {
            features,
            spectrum,
            options: &self.effective,
            shared,
        };
        let plugin = &mut self.effect.plugin;
        let (surface, container) = (&mut self.surface, &mut self.container);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| plugin.render(surface, container, &ctx, upstream)));

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(EngineError::Render {
                slot: self.index,
                reason: format!("{:#}", e),
            }),
            Err(payload) => Err(EngineError::Render {
                slot: self.index,
                reason: panic_message(payload.as_ref()),
            }),
        }
    }

    /// Records a failed render. True when this starts a new failure streak,
    /// which is when the failure is worth logging.
    pub(crate) fn mark_failed(&mut self) -> bool {
        !std::mem::replace(&mut self.failing, true)
    }

    pub(crate) fn mark_ok(&mut self) {
        self.failing = false;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
