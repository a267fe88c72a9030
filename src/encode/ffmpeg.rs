use anyhow::{Context, Result};
use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

/// Video settings handed to ffmpeg.
#[derive(Clone, Debug)]
pub struct EncodeSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub crf: u32,
}

/// Pipes raw RGBA frames into an ffmpeg child and muxes in the source audio.
pub struct FfmpegEncoder {
    child: Child,
    frame_len: usize,
    frames: u64,
}

impl FfmpegEncoder {
    pub fn new(output_path: &Path, input_audio: &Path, settings: &EncodeSettings) -> Result<Self> {
        let args = build_args(output_path, input_audio, settings);

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}",
            settings.width,
            settings.height,
            settings.fps,
            settings.codec
        );

        Ok(Self {
            child,
            frame_len: settings.width as usize * settings.height as usize * 4,
            frames: 0,
        })
    }

    pub fn write_frame(&mut self, rgba_pixels: &[u8]) -> Result<()> {
        if rgba_pixels.len() != self.frame_len {
            anyhow::bail!(
                "Frame {} has {} bytes, expected {}",
                self.frames,
                rgba_pixels.len(),
                self.frame_len
            );
        }
        let stdin = self.child.stdin.as_mut().context("FFmpeg stdin not available")?;
        stdin.write_all(rgba_pixels).context("Failed to write frame to ffmpeg")?;
        self.frames += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        // EOF on stdin ends the stream
        drop(self.child.stdin.take());

        let output = self.child.wait_with_output().context("Failed to wait for ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
        }

        log::info!("FFmpeg encoding complete ({} frames)", self.frames);
        Ok(())
    }
}

fn build_args(output_path: &Path, input_audio: &Path, settings: &EncodeSettings) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-y",
        "-f",
        "rawvideo",
        "-pixel_format",
        "rgba",
        "-video_size",
    ]
    .iter()
    .map(OsString::from)
    .collect();

    args.push(format!("{}x{}", settings.width, settings.height).into());
    args.push("-framerate".into());
    args.push(settings.fps.to_string().into());
    args.push("-i".into());
    args.push("pipe:0".into());
    args.push("-i".into());
    args.push(input_audio.as_os_str().to_owned());
    args.push("-c:v".into());
    args.push(settings.codec.clone().into());
    args.push("-pix_fmt".into());
    args.push("yuv420p".into());
    args.push("-crf".into());
    args.push(settings.crf.to_string().into());
    args.push("-preset".into());
    args.push("medium".into());
    args.push("-c:a".into());
    args.push("aac".into());
    args.push("-b:a".into());
    args.push("192k".into());
    args.push("-shortest".into());
    args.push(output_path.as_os_str().to_owned());
    args
}
