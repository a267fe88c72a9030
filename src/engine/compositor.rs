use crate::audio::features::FeatureFrame;
use crate::effects::{EffectKind, SharedState};
use crate::render::blend::{BlendMode, CompositeOp};
use crate::render::surface::Surface;

/// What happened during one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// The viewport had no area, nothing ran
    pub skipped: bool,
    pub drawn: usize,
    pub failed: usize,
}

/// Owns the main surface and composites active slots onto it in registry
/// order.
pub struct Compositor {
    main: Surface,
    width: u32,
    height: u32,
    operator: CompositeOp,
}

impl Compositor {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            main: Surface::new(width, height),
            width,
            height,
            operator: CompositeOp::SourceOver,
        }
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn viewport(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn main(&self) -> &Surface {
        &self.main
    }

    /// Operator applied to the next draw. Source-over between frames.
    pub fn operator(&self) -> CompositeOp {
        self.operator
    }

    /// Renders and composites one frame.
    ///
    /// The main surface is cleared to the mode's base colour first. Standard
    /// slots are drawn over it with the mode's operator. A post-process slot
    /// gets the composite so far as upstream and its output replaces the
    /// main surface: the base colour is filled again and the output drawn
    /// with source-over before the mode's operator is restored. A slot whose
    /// render fails is left out of this frame.
    pub fn render_frame(
        &mut self,
        order: &[usize],
        slots: &mut [super::slot::Slot],
        mode: &BlendMode,
        features: &FeatureFrame,
        spectrum: &[u8],
        shared: &SharedState,
    ) -> FrameReport {
        let mut report = FrameReport::default();
        if self.width == 0 || self.height == 0 {
            report.skipped = true;
            return report;
        }

        let base = mode.base.rgba();
        self.main.resize(self.width, self.height);
        self.main.fill(base);
        self.operator = mode.op;

        for &index in order {
            let Some(slot) = slots.get_mut(index) else {
                continue;
            };
            if !slot.is_active() {
                continue;
            }
            slot.resize(self.width, self.height);

            let post_process = slot.kind() == EffectKind::PostProcess;
            let upstream = post_process.then_some(&self.main);
            if let Err(e) = slot.render(features, spectrum, shared, upstream) {
                if slot.mark_failed() {
                    log::warn!("{}", e);
                }
                report.failed += 1;
                continue;
            }
            slot.mark_ok();

            if post_process {
                self.operator = CompositeOp::SourceOver;
                self.main.fill(base);
                self.main.draw(slot.output(), self.operator, 1.0);
                self.operator = mode.op;
            } else {
                self.main.draw(slot.output(), self.operator, 1.0);
            }
            report.drawn += 1;
        }

        self.operator = CompositeOp::SourceOver;
        report
    }
}
