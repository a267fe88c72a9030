//! The frame loop: feature extraction, compositing of active slots in
//! registry order, and automix, behind one `Engine` handle.

pub mod automix;
pub mod compositor;
pub mod registry;
pub mod slot;

#[cfg(test)]
pub(crate) mod test_effects;

use std::collections::VecDeque;
use std::time::Duration;

use crate::audio::features::{FeatureExtractor, FeatureFrame, KickParams};
use crate::audio::spectrum::SpectrumSource;
use crate::effects::{FileHandle, LoadedEffect, OptionMap, SharedState};
use crate::error::Result;
use crate::render::blend::{blend_mode_index, BlendMode, BLEND_MODES, DEFAULT_BLEND_MODE};
use crate::render::surface::Surface;

pub use automix::{Automix, AutomixReport, AutomixSettings};
pub use compositor::{Compositor, FrameReport};
pub use registry::{hotkey_position, SlotInfo, SlotRegistry, HOTKEYS};
pub use slot::Slot;

/// Frame intervals averaged for the fps readout.
const FPS_SAMPLES: usize = 10;

#[derive(Debug, Default)]
pub struct FpsMeter {
    last: Option<Duration>,
    intervals: VecDeque<f32>,
}

impl FpsMeter {
    pub fn tick(&mut self, now: Duration) -> f32 {
        if let Some(last) = self.last {
            let dt = now.saturating_sub(last).as_secs_f32();
            if dt > 0.0 {
                if self.intervals.len() == FPS_SAMPLES {
                    self.intervals.pop_front();
                }
                self.intervals.push_back(dt);
            }
        }
        self.last = Some(now);
        self.fps()
    }

    pub fn fps(&self) -> f32 {
        if self.intervals.is_empty() {
            return 0.0;
        }
        let mean = self.intervals.iter().sum::<f32>() / self.intervals.len() as f32;
        1.0 / mean
    }
}

#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub width: u32,
    pub height: u32,
    pub kick: KickParams,
    /// Blend mode id or label
    pub blend: String,
    pub automix: AutomixSettings,
    pub text: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            kick: KickParams::default(),
            blend: DEFAULT_BLEND_MODE.to_string(),
            automix: AutomixSettings::default(),
            text: String::new(),
        }
    }
}

pub struct Engine {
    extractor: FeatureExtractor,
    registry: SlotRegistry,
    compositor: Compositor,
    automix: Automix,
    shared: SharedState,
    fps: FpsMeter,
    bins: Vec<u8>,
    blend: usize,
}

impl Engine {
    pub fn new(effects: Vec<LoadedEffect>, settings: EngineSettings) -> Result<Self> {
        let blend = blend_mode_index(&settings.blend)?;
        log::info!(
            "Engine with {} effects at {}x{}, blend mode {}",
            effects.len(),
            settings.width,
            settings.height,
            BLEND_MODES[blend].label
        );
        Ok(Self {
            extractor: FeatureExtractor::new(settings.kick),
            registry: SlotRegistry::new(effects),
            compositor: Compositor::new(settings.width, settings.height),
            automix: Automix::new(settings.automix),
            shared: SharedState {
                text: settings.text,
                ..Default::default()
            },
            fps: FpsMeter::default(),
            bins: Vec::new(),
            blend,
        })
    }

    /// Runs one frame at time `now` (time since start).
    ///
    /// Features are extracted once before any slot renders; automix looks at
    /// them after the frame is composited, so its changes show from the next
    /// frame on. With a zero-area viewport the whole frame is skipped.
    pub fn tick(&mut self, source: &mut dyn SpectrumSource, now: Duration) -> FrameReport {
        self.shared.fps = self.fps.tick(now);
        let (width, height) = self.compositor.viewport();
        if width == 0 || height == 0 {
            return FrameReport {
                skipped: true,
                ..Default::default()
            };
        }

        self.bins.resize(source.bin_count(), 0);
        source.fill(&mut self.bins);
        let features = self.extractor.update(&self.bins);
        self.shared.time = now.as_secs_f32();

        let mode = BLEND_MODES[self.blend];
        let (order, slots) = self.registry.split_mut();
        let report = self
            .compositor
            .render_frame(order, slots, &mode, &features, &self.bins, &self.shared);
        self.shared.frame += 1;

        self.automix.observe(&features, now, &mut self.registry);
        report
    }

    /// The composite of the last frame.
    pub fn output(&self) -> &Surface {
        self.compositor.main()
    }

    pub fn list_slots(&self) -> Vec<SlotInfo> {
        self.registry.list()
    }

    pub fn registry(&self) -> &SlotRegistry {
        &self.registry
    }

    pub fn activate(&mut self, index: usize) -> Result<bool> {
        self.registry.activate(index)
    }

    pub fn deactivate(&mut self, index: usize) -> Result<bool> {
        self.registry.deactivate(index)
    }

    pub fn toggle(&mut self, index: usize) -> Result<bool> {
        self.registry.toggle(index)
    }

    pub fn toggle_by_hotkey(&mut self, key: char) -> Option<bool> {
        self.registry.toggle_by_hotkey(hotkey_position(key)?)
    }

    pub fn reorder(&mut self, sequence: &[usize]) -> Result<()> {
        self.registry.reorder(sequence)
    }

    pub fn set_options(&mut self, index: usize, partial: OptionMap) -> Result<()> {
        self.registry.set_options(index, partial)
    }

    pub fn set_file_input(&mut self, index: usize, key: &str, file: FileHandle) -> Result<()> {
        self.registry.set_file_input(index, key, file)
    }

    pub fn blend_mode(&self) -> &'static BlendMode {
        &BLEND_MODES[self.blend]
    }

    /// Applies from the next frame.
    pub fn set_blend_mode(&mut self, name: &str) -> Result<()> {
        self.blend = blend_mode_index(name)?;
        log::info!("Blend mode: {}", BLEND_MODES[self.blend].label);
        Ok(())
    }

    /// Steps through `BLEND_MODES`, stopping at the last entry.
    pub fn next_blend_mode(&mut self) -> &'static BlendMode {
        self.blend = (self.blend + 1).min(BLEND_MODES.len() - 1);
        self.blend_mode()
    }

    /// Steps back through `BLEND_MODES`, stopping at the first entry.
    pub fn previous_blend_mode(&mut self) -> &'static BlendMode {
        self.blend = self.blend.saturating_sub(1);
        self.blend_mode()
    }

    pub fn feature_frame(&self) -> FeatureFrame {
        self.extractor.frame()
    }

    pub fn kick_params(&self) -> KickParams {
        self.extractor.params()
    }

    pub fn set_kick_params(&mut self, params: KickParams) {
        self.extractor.set_params(params);
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.compositor.set_viewport(width, height);
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.compositor.viewport()
    }

    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.shared.text = text.into();
    }

    pub fn automix(&mut self) -> &mut Automix {
        &mut self.automix
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::spectrum::StaticSpectrum;
    use super::test_effects::solid;

    fn engine(width: u32, height: u32) -> Engine {
        let settings = EngineSettings {
            width,
            height,
            ..Default::default()
        };
        Engine::new(vec![solid("a", [255, 0, 0, 255]), solid("b", [0, 0, 255, 255])], settings).unwrap()
    }

    #[test]
    fn ticks_and_composites() {
        let mut e = engine(2, 2);
        e.activate(0).unwrap();
        let mut source = StaticSpectrum::silent(512);
        let report = e.tick(&mut source, Duration::ZERO);
        assert_eq!(report.drawn, 1);
        assert_eq!(e.output().pixel(1, 1), Some([255, 0, 0, 255]));
        assert_eq!(e.shared().frame, 1);
    }

    #[test]
    fn zero_viewport_skips_extraction() {
        let mut e = engine(0, 0);
        let mut source = StaticSpectrum::silent(512);
        source.set_bass(0.9);
        assert!(e.tick(&mut source, Duration::ZERO).skipped);
        assert_eq!(e.feature_frame(), FeatureFrame::default());
        assert_eq!(e.shared().frame, 0);
    }

    #[test]
    fn features_come_from_the_source() {
        let mut e = engine(1, 1);
        let mut source = StaticSpectrum::silent(512);
        e.tick(&mut source, Duration::ZERO);
        source.set_bass(0.5);
        e.tick(&mut source, Duration::from_millis(16));
        let f = e.feature_frame();
        assert!(f.kick);
        assert!((f.bass - 0.5).abs() < 0.01);
    }

    #[test]
    fn blend_mode_steps_clamp() {
        let mut e = engine(1, 1);
        assert_eq!(e.blend_mode().id(), "lighten");
        for _ in 0..20 {
            e.next_blend_mode();
        }
        assert_eq!(e.blend_mode().id(), BLEND_MODES[BLEND_MODES.len() - 1].id());
        for _ in 0..20 {
            e.previous_blend_mode();
        }
        assert_eq!(e.blend_mode().id(), "source-over");
        assert!(e.set_blend_mode("plasma").is_err());
        assert_eq!(e.blend_mode().id(), "source-over");
        e.set_blend_mode("Color Burn").unwrap();
        assert_eq!(e.blend_mode().id(), "color-burn");
    }

    #[test]
    fn hotkeys_toggle_by_order() {
        let mut e = engine(1, 1);
        e.reorder(&[1, 0]).unwrap();
        assert_eq!(e.toggle_by_hotkey('1'), Some(true));
        assert!(e.registry().slot(1).unwrap().is_active());
        assert_eq!(e.toggle_by_hotkey('5'), None);
        assert_eq!(e.toggle_by_hotkey('x'), None);
    }

    #[test]
    fn fps_averages_recent_intervals() {
        let mut meter = FpsMeter::default();
        assert_eq!(meter.tick(Duration::ZERO), 0.0);
        for i in 1..=30 {
            meter.tick(Duration::from_millis(20 * i));
        }
        assert!((meter.fps() - 50.0).abs() < 0.5);
    }

    #[test]
    fn unknown_blend_mode_fails_construction() {
        let settings = EngineSettings {
            blend: "nope".into(),
            ..Default::default()
        };
        assert!(Engine::new(Vec::new(), settings).is_err());
    }
}
