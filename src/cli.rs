use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "vjgen", about = "Audio-reactive VJ engine rendering layered effects to video")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: Option<PathBuf>,

    /// Config file (defaults to ./vjgen.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output video file
    #[arg(short, long, default_value = "output.mp4")]
    pub output: PathBuf,

    /// Video width in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Video height in pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Frames per second
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// H.264 CRF quality (0-51, lower = better)
    #[arg(long, default_value_t = 18)]
    pub crf: u32,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// Effects to activate at start, in composite order (comma-separated ids)
    #[arg(short, long, value_delimiter = ',')]
    pub effects: Vec<String>,

    /// Blend mode id or label (e.g. lighten, multiply, "Soft Light")
    #[arg(short, long)]
    pub blend: Option<String>,

    /// Composite order as slot indices (comma-separated, all slots)
    #[arg(long, value_delimiter = ',')]
    pub order: Vec<usize>,

    /// Effect option override, repeatable: effect.key=value
    #[arg(long = "option", value_name = "EFFECT.KEY=VALUE")]
    pub options: Vec<String>,

    /// Font file handed to effects that declare a "font" input
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// Text shown by the text effect
    #[arg(long)]
    pub text: Option<String>,

    /// Let kicks switch effects on and off
    #[arg(long)]
    pub automix: bool,

    /// Seed for automix and option randomisation
    #[arg(long)]
    pub seed: Option<u64>,

    /// Kick threshold override (0.0-1.0)
    #[arg(long)]
    pub kick_threshold: Option<f32>,

    /// Kick rise override (0.0-0.5)
    #[arg(long)]
    pub kick_diff: Option<f32>,

    /// Frames a kick stays high (1-15)
    #[arg(long)]
    pub kick_frames: Option<u32>,

    /// List available effects and exit
    #[arg(long)]
    pub list_effects: bool,
}

/// One `effect.key=value` override.
#[derive(Debug, PartialEq, Eq)]
pub struct OptionOverride<'a> {
    pub effect: &'a str,
    pub key: &'a str,
    pub value: &'a str,
}

pub fn parse_option_override(raw: &str) -> Option<OptionOverride<'_>> {
    let (target, value) = raw.split_once('=')?;
    let (effect, key) = target.split_once('.')?;
    if effect.is_empty() || key.is_empty() {
        return None;
    }
    Some(OptionOverride { effect, key, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_overrides_split_on_first_dot_and_equals() {
        assert_eq!(
            parse_option_override("spectrum_bars.color=#ff0000"),
            Some(OptionOverride {
                effect: "spectrum_bars",
                key: "color",
                value: "#ff0000"
            })
        );
        assert_eq!(
            parse_option_override("text.caption=a=b").map(|o| o.value),
            Some("a=b")
        );
        assert_eq!(parse_option_override("bars=3"), None);
        assert_eq!(parse_option_override(".bars=3"), None);
        assert_eq!(parse_option_override("spectrum_bars.bars"), None);
    }

    #[test]
    fn parses_lists_and_repeats() {
        let cli = Cli::parse_from([
            "vjgen",
            "song.wav",
            "--effects",
            "spectrum_bars,trail",
            "--order",
            "2,0,1",
            "--option",
            "trail.decay=0.2",
            "--option",
            "mosaic.size=8",
            "--automix",
        ]);
        assert_eq!(cli.effects, vec!["spectrum_bars", "trail"]);
        assert_eq!(cli.order, vec![2, 0, 1]);
        assert_eq!(cli.options.len(), 2);
        assert!(cli.automix);
        assert_eq!(cli.width, 1280);
    }
}
