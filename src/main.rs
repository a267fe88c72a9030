mod cli;
mod config;
mod encode;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use cli::{parse_option_override, Cli};
use config::Config;
use encode::ffmpeg::{EncodeSettings, FfmpegEncoder};
use vjgen::audio::decode::decode_audio;
use vjgen::audio::features::KickParams;
use vjgen::audio::spectrum::PcmSpectrum;
use vjgen::effects::catalog::{builtin_effects, load_all, load_effect};
use vjgen::effects::{FileHandle, OptionKind, OptionMap, OptionValue};
use vjgen::{Engine, EngineSettings};

/// File input key the built-in text effect reads its font from.
const FONT_INPUT: &str = "font";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let cfg = match config::find_config(cli.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            Err(err) => {
                log::warn!("{:#}", err);
                Config::default()
            }
        },
        None => Config::default(),
    };

    // Config values apply only when the CLI is at its default
    if cli.width == 1280 { cli.width = cfg.output.width; }
    if cli.height == 720 { cli.height = cfg.output.height; }
    if cli.fps == 30 { cli.fps = cfg.output.fps; }
    if cli.crf == 18 { cli.crf = cfg.output.crf; }
    if cli.codec == "libx264" { cli.codec = cfg.output.codec.clone(); }
    if cli.effects.is_empty() && !cfg.effects.is_empty() {
        cli.effects = cfg.effects.clone();
    }
    if cli.blend.is_none() {
        cli.blend = cfg.blend.clone();
    }
    if cli.text.is_none() {
        cli.text = cfg.text.clone();
    }

    if cli.list_effects {
        print_effects();
        return Ok(());
    }

    let input = cli.input.as_ref().context("Input audio file is required")?;
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }
    if cli.width == 0 || cli.height == 0 || cli.fps == 0 {
        anyhow::bail!("Width, height and fps must be non-zero");
    }

    log::info!("vjgen - audio-reactive VJ engine");
    log::info!("Input: {}", input.display());
    log::info!("Output: {}", cli.output.display());
    log::info!("Resolution: {}x{} @ {}fps", cli.width, cli.height, cli.fps);

    log::info!("Decoding audio...");
    let audio = decode_audio(input)?;
    let mut spectrum = PcmSpectrum::new(audio, cfg.audio);
    let duration = spectrum.duration();
    let total_frames = (duration * cli.fps as f32).ceil() as u64;
    log::info!("Total frames: {}, Duration: {:.1}s", total_frames, duration);

    let mut automix = cfg.automix.clone();
    automix.enabled |= cli.automix;
    if cli.seed.is_some() {
        automix.seed = cli.seed;
    }

    let settings = EngineSettings {
        width: cli.width,
        height: cli.height,
        kick: kick_params(&cli, cfg.kick),
        blend: cli.blend.clone().unwrap_or_else(|| EngineSettings::default().blend),
        automix,
        text: cli.text.clone().unwrap_or_default(),
    };
    let mut engine = Engine::new(load_all(), settings).context("Failed to set up the engine")?;

    apply_options(&mut engine, &cfg, &cli.options);
    activate_effects(&mut engine, &cli.effects)?;
    if !cli.order.is_empty() {
        engine
            .reorder(&cli.order)
            .with_context(|| format!("Rejected --order {:?}", cli.order))?;
    }

    let font = cli
        .font
        .as_deref()
        .map(FileHandle::open)
        .transpose()
        .context("Failed to load font")?;

    for slot in engine.list_slots() {
        log::info!(
            "Slot {} [{}] {} ({}){}",
            slot.position,
            slot.index,
            slot.name,
            slot.kind.label(),
            if slot.active { " active" } else { "" }
        );
    }

    log::info!("Starting FFmpeg encoder...");
    let mut encoder = FfmpegEncoder::new(
        &cli.output,
        input,
        &EncodeSettings {
            width: cli.width,
            height: cli.height,
            fps: cli.fps,
            codec: cli.codec.clone(),
            crf: cli.crf,
        },
    )?;

    let pb = ProgressBar::new(total_frames);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
            .context("Invalid progress template")?
            .progress_chars("=>-"),
    );

    let mut failed_frames = 0u64;
    for frame in 0..total_frames {
        let seconds = frame as f64 / cli.fps as f64;
        if let Some(font) = &font {
            attach_font(&mut engine, font);
        }
        spectrum.seek(seconds as f32);
        let report = engine.tick(&mut spectrum, Duration::from_secs_f64(seconds));
        if report.failed > 0 {
            failed_frames += 1;
        }
        encoder.write_frame(engine.output().pixels())?;
        pb.set_position(frame + 1);
    }

    pb.finish_with_message("Rendering complete");
    if failed_frames > 0 {
        log::warn!("{} frames had at least one failing effect", failed_frames);
    }

    log::info!("Finishing encoding...");
    encoder.finish()?;

    log::info!("Done! Output: {}", cli.output.display());
    Ok(())
}

fn kick_params(cli: &Cli, from_config: KickParams) -> KickParams {
    KickParams {
        threshold: cli.kick_threshold.unwrap_or(from_config.threshold),
        diff: cli.kick_diff.unwrap_or(from_config.diff),
        frames: cli.kick_frames.unwrap_or(from_config.frames),
    }
    .clamped()
}

/// Config option tables first, then `--option` overrides on top.
fn apply_options(engine: &mut Engine, cfg: &Config, overrides: &[String]) {
    for slot in engine.list_slots() {
        let options = cfg.effect_options(&slot.id);
        if !options.is_empty() {
            if let Err(e) = engine.set_options(slot.index, options) {
                log::warn!("{}", e);
            }
        }
    }

    for raw in overrides {
        let Some(o) = parse_option_override(raw) else {
            log::warn!("Ignoring malformed --option {:?} (expected effect.key=value)", raw);
            continue;
        };
        let Some(index) = engine.registry().find(o.effect) else {
            log::warn!("Ignoring --option {:?}: no effect '{}'", raw, o.effect);
            continue;
        };
        let mut partial = OptionMap::new();
        partial.insert(o.key.to_string(), OptionValue::parse(o.value));
        if let Err(e) = engine.set_options(index, partial) {
            log::warn!("{}", e);
        }
    }
}

/// Activates `ids` and moves them to the front of the order, in the order
/// given. Unknown ids are skipped with a warning.
fn activate_effects(engine: &mut Engine, ids: &[String]) -> Result<()> {
    let mut front = Vec::new();
    for id in ids {
        match engine.registry().find(id) {
            Some(index) if !front.contains(&index) => {
                engine.activate(index)?;
                front.push(index);
            }
            Some(_) => {}
            None => log::warn!("Unknown effect '{}'", id),
        }
    }
    if front.is_empty() {
        return Ok(());
    }
    let rest: Vec<usize> = engine
        .registry()
        .order()
        .iter()
        .copied()
        .filter(|i| !front.contains(i))
        .collect();
    front.extend(rest);
    engine.reorder(&front)?;
    Ok(())
}

/// Re-attaches the font to active slots that take one. Deactivation clears
/// file inputs, so slots switched back on by automix need it again.
fn attach_font(engine: &mut Engine, font: &FileHandle) {
    let needing: Vec<usize> = engine
        .registry()
        .slots()
        .iter()
        .filter(|s| s.is_active())
        .filter(|s| s.effect().manifest.file_input(FONT_INPUT).is_some())
        .filter(|s| !s.file_values().contains_key(FONT_INPUT))
        .map(|s| s.index())
        .collect();
    for index in needing {
        if let Err(e) = engine.set_file_input(index, FONT_INPUT, font.clone()) {
            log::warn!("{}", e);
        }
    }
}

fn print_effects() {
    println!("Available effects:");
    for builtin in builtin_effects() {
        let effect = match load_effect(builtin.id) {
            Ok(effect) => effect,
            Err(e) => {
                println!("  {:<16} (failed to load: {})", builtin.id, e);
                continue;
            }
        };
        let manifest = &effect.manifest;
        println!(
            "  {:<16} {:<12} {} - {}",
            manifest.id,
            manifest.kind().label(),
            manifest.name,
            manifest.description
        );
        for (name, spec) in effect.schema.iter() {
            let kind = match &spec.kind {
                OptionKind::Range { min, max, step } => match step {
                    Some(step) => format!("{}..{} step {}", min, max, step),
                    None => format!("{}..{}", min, max),
                },
                OptionKind::Boolean => "bool".to_string(),
                OptionKind::Choice { choices } => choices.join("|"),
                OptionKind::Color => "color".to_string(),
                OptionKind::Text => "text".to_string(),
            };
            println!("      {:<14} {:<24} default {}", name, kind, spec.default);
        }
        for input in &manifest.file_inputs {
            println!("      {:<14} file ({})", input.key, input.accept);
        }
    }
}
