use crate::error::{EngineError, Result};

/// Pixel compositing operators, named after their canvas
/// `globalCompositeOperation` identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompositeOp {
    SourceOver,
    Multiply,
    Screen,
    Overlay,
    SoftLight,
    HardLight,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    Lighter,
    Difference,
    Exclusion,
}

impl CompositeOp {
    pub fn id(self) -> &'static str {
        match self {
            Self::SourceOver => "source-over",
            Self::Multiply => "multiply",
            Self::Screen => "screen",
            Self::Overlay => "overlay",
            Self::SoftLight => "soft-light",
            Self::HardLight => "hard-light",
            Self::Darken => "darken",
            Self::Lighten => "lighten",
            Self::ColorDodge => "color-dodge",
            Self::ColorBurn => "color-burn",
            Self::Lighter => "lighter",
            Self::Difference => "difference",
            Self::Exclusion => "exclusion",
        }
    }

    /// Composites one straight-alpha RGBA pixel onto another in place.
    /// `alpha` scales the source coverage (canvas `globalAlpha`).
    pub fn apply(self, dst: &mut [u8], src: &[u8], alpha: f32) {
        let sa = src[3] as f32 / 255.0 * alpha;
        if sa <= 0.0 {
            return;
        }
        let da = dst[3] as f32 / 255.0;

        if self == Self::Lighter {
            let out_a = (sa + da).min(1.0);
            for c in 0..3 {
                let sum = src[c] as f32 / 255.0 * sa + dst[c] as f32 / 255.0 * da;
                dst[c] = unpremultiply(sum.min(1.0), out_a);
            }
            dst[3] = to_byte(out_a);
            return;
        }

        let out_a = sa + da * (1.0 - sa);
        for c in 0..3 {
            let cs = src[c] as f32 / 255.0;
            let cb = dst[c] as f32 / 255.0;
            let mixed = (1.0 - da) * cs + da * self.blend(cb, cs);
            let premultiplied = sa * mixed + da * cb * (1.0 - sa);
            dst[c] = unpremultiply(premultiplied, out_a);
        }
        dst[3] = to_byte(out_a);
    }

    /// Separable blend function B(backdrop, source) on 0.0-1.0 channels.
    fn blend(self, cb: f32, cs: f32) -> f32 {
        match self {
            Self::SourceOver | Self::Lighter => cs,
            Self::Multiply => cb * cs,
            Self::Screen => screen(cb, cs),
            Self::Overlay => hard_light(cs, cb),
            Self::HardLight => hard_light(cb, cs),
            Self::SoftLight => {
                if cs <= 0.5 {
                    cb - (1.0 - 2.0 * cs) * cb * (1.0 - cb)
                } else {
                    let d = if cb <= 0.25 {
                        ((16.0 * cb - 12.0) * cb + 4.0) * cb
                    } else {
                        cb.sqrt()
                    };
                    cb + (2.0 * cs - 1.0) * (d - cb)
                }
            }
            Self::Darken => cb.min(cs),
            Self::Lighten => cb.max(cs),
            Self::ColorDodge => {
                if cb <= 0.0 {
                    0.0
                } else if cs >= 1.0 {
                    1.0
                } else {
                    (cb / (1.0 - cs)).min(1.0)
                }
            }
            Self::ColorBurn => {
                if cb >= 1.0 {
                    1.0
                } else if cs <= 0.0 {
                    0.0
                } else {
                    1.0 - ((1.0 - cb) / cs).min(1.0)
                }
            }
            Self::Difference => (cb - cs).abs(),
            Self::Exclusion => cb + cs - 2.0 * cb * cs,
        }
    }
}

fn screen(cb: f32, cs: f32) -> f32 {
    cb + cs - cb * cs
}

fn hard_light(cb: f32, cs: f32) -> f32 {
    if cs <= 0.5 {
        cb * 2.0 * cs
    } else {
        screen(cb, 2.0 * cs - 1.0)
    }
}

fn unpremultiply(value: f32, alpha: f32) -> u8 {
    if alpha <= 0.0 {
        return 0;
    }
    to_byte(value / alpha)
}

fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Colour the main surface is cleared to before a blend mode is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BaseColor {
    Black,
    White,
}

impl BaseColor {
    pub fn rgba(self) -> [u8; 4] {
        match self {
            Self::Black => [0, 0, 0, 255],
            Self::White => [255, 255, 255, 255],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlendMode {
    pub label: &'static str,
    pub op: CompositeOp,
    pub base: BaseColor,
}

impl BlendMode {
    pub fn id(&self) -> &'static str {
        self.op.id()
    }
}

const fn mode(label: &'static str, op: CompositeOp, base: BaseColor) -> BlendMode {
    BlendMode { label, op, base }
}

/// Selectable blend modes in menu order. Multiplicative operators get a
/// white base, everything else black.
pub const BLEND_MODES: [BlendMode; 13] = [
    mode("Normal", CompositeOp::SourceOver, BaseColor::Black),
    mode("Multiply", CompositeOp::Multiply, BaseColor::White),
    mode("Screen", CompositeOp::Screen, BaseColor::Black),
    mode("Overlay", CompositeOp::Overlay, BaseColor::Black),
    mode("Soft Light", CompositeOp::SoftLight, BaseColor::Black),
    mode("Hard Light", CompositeOp::HardLight, BaseColor::Black),
    mode("Darken", CompositeOp::Darken, BaseColor::Black),
    mode("Lighten", CompositeOp::Lighten, BaseColor::Black),
    mode("Color Dodge", CompositeOp::ColorDodge, BaseColor::Black),
    mode("Color Burn", CompositeOp::ColorBurn, BaseColor::White),
    mode("Lighter", CompositeOp::Lighter, BaseColor::Black),
    mode("Difference", CompositeOp::Difference, BaseColor::Black),
    mode("Exclusion", CompositeOp::Exclusion, BaseColor::Black),
];

pub const DEFAULT_BLEND_MODE: &str = "lighten";

/// Position in `BLEND_MODES` for an operator id (`"soft-light"`) or a
/// label (`"Soft Light"`, case-insensitive).
pub fn blend_mode_index(name: &str) -> Result<usize> {
    let wanted = name.trim();
    BLEND_MODES
        .iter()
        .position(|m| m.id() == wanted || m.label.eq_ignore_ascii_case(wanted))
        .ok_or_else(|| EngineError::UnknownBlendMode(name.to_string()))
}
