use serde::{Deserialize, Serialize};

/// Bins averaged for the bass level (the five lowest).
pub const BASS_BINS: usize = 5;
/// Single-bin tap for the mid level.
pub const MID_BIN: usize = 20;
/// Single-bin tap for the high level.
pub const HIGH_BIN: usize = 60;

/// Per-frame audio features handed to every effect.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FeatureFrame {
    /// Mean of the five lowest magnitude bins, 0.0-1.0
    pub bass: f32,
    /// Bin 20, 0.0-1.0
    pub mid: f32,
    /// Bin 60, 0.0-1.0
    pub high: f32,
    /// Onset flag, held for `KickParams::frames` frames after a trigger
    pub kick: bool,
}

impl FeatureFrame {
    pub fn kick_level(&self) -> f32 {
        if self.kick { 1.0 } else { 0.0 }
    }

    /// Average of the three band levels.
    pub fn level(&self) -> f32 {
        (self.bass + self.mid + self.high) / 3.0
    }
}

/// Tunables for the onset detector. Range clamping happens where the
/// values enter the program (config/CLI), not here.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KickParams {
    /// Minimum bass level for a trigger (0.0-1.0)
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Minimum frame-to-frame bass rise for a trigger (0.0-0.5)
    #[serde(default = "default_diff")]
    pub diff: f32,
    /// Frames the kick stays high after the trigger frame (1-15)
    #[serde(default = "default_frames")]
    pub frames: u32,
}

impl Default for KickParams {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            diff: default_diff(),
            frames: default_frames(),
        }
    }
}

impl KickParams {
    pub fn clamped(self) -> Self {
        Self {
            threshold: self.threshold.clamp(0.0, 1.0),
            diff: self.diff.clamp(0.0, 0.5),
            frames: self.frames.clamp(1, 15),
        }
    }
}

fn default_threshold() -> f32 { 0.2 }
fn default_diff() -> f32 { 0.15 }
fn default_frames() -> u32 { 5 }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KickState {
    Armed,
    Held { frames_held: u32 },
}

/// Turns a byte magnitude spectrum into a `FeatureFrame`, one call per frame.
///
/// The kick is edge triggered on the bass level: a rise larger than
/// `diff` while above `threshold` sets it, and it then stays set for
/// `frames` further frames unless a new trigger restarts the hold.
#[derive(Clone, Debug)]
pub struct FeatureExtractor {
    params: KickParams,
    previous_bass: f32,
    state: KickState,
    frame: FeatureFrame,
}

impl FeatureExtractor {
    pub fn new(params: KickParams) -> Self {
        Self {
            params,
            previous_bass: 0.0,
            state: KickState::Armed,
            frame: FeatureFrame::default(),
        }
    }

    pub fn params(&self) -> KickParams {
        self.params
    }

    /// Takes effect from the next `update` on; the hold counter is kept.
    pub fn set_params(&mut self, params: KickParams) {
        self.params = params;
    }

    pub fn frame(&self) -> FeatureFrame {
        self.frame
    }

    pub fn update(&mut self, bins: &[u8]) -> FeatureFrame {
        let bass = bass_level(bins);
        let mid = bin_level(bins, MID_BIN);
        let high = bin_level(bins, HIGH_BIN);
        let kick = self.step_kick(bass);

        self.frame = FeatureFrame { bass, mid, high, kick };
        self.frame
    }

    /// Runs only the onset state machine on an already-normalised bass value.
    pub fn step_kick(&mut self, bass: f32) -> bool {
        let delta = bass - self.previous_bass;
        self.previous_bass = bass;
        let triggered = delta > self.params.diff && bass > self.params.threshold;

        self.state = match self.state {
            _ if triggered => KickState::Held { frames_held: 0 },
            KickState::Held { frames_held } if frames_held >= self.params.frames => KickState::Armed,
            KickState::Held { frames_held } => KickState::Held { frames_held: frames_held + 1 },
            KickState::Armed => KickState::Armed,
        };

        matches!(self.state, KickState::Held { .. })
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(KickParams::default())
    }
}

fn bass_level(bins: &[u8]) -> f32 {
    let sum: u32 = (0..BASS_BINS).map(|i| bins.get(i).copied().unwrap_or(0) as u32).sum();
    sum as f32 / (BASS_BINS as f32 * 255.0)
}

fn bin_level(bins: &[u8], index: usize) -> f32 {
    bins.get(index).copied().unwrap_or(0) as f32 / 255.0
}
