use super::ffmpeg::{probe, run_tool, AudioProbe};
use super::{AssemblyError, AudioAssembler, MergedAudio};
use crate::domain::tts::AudioEncoding;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct ProgramSettings {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub min_intro_secs: f64,
    pub min_outro_secs: f64,
    pub fade_secs: f64,
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ProgramSettings {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            min_intro_secs: 2.0,
            min_outro_secs: 2.0,
            fade_secs: 1.0,
            scratch_dir: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProgramError {
    #[error("intro is {actual:.2}s, shorter than the {min:.2}s minimum")]
    IntroTooShort { actual: f64, min: f64 },
    #[error("outro is {actual:.2}s, shorter than the {min:.2}s minimum")]
    OutroTooShort { actual: f64, min: f64 },
    #[error("program assembly does not support {0} audio")]
    UnsupportedEncoding(AudioEncoding),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

/// Wraps merged content with faded intro and outro tracks.
///
/// Intro and outro are re-encoded at the content's sample rate and channel
/// layout so the inner assembler can join all three without re-encoding.
pub struct ProgramAssembler {
    inner: Arc<dyn AudioAssembler>,
    settings: ProgramSettings,
}

impl ProgramAssembler {
    pub fn new(inner: Arc<dyn AudioAssembler>, settings: ProgramSettings) -> Self {
        Self { inner, settings }
    }

    pub fn settings(&self) -> &ProgramSettings {
        &self.settings
    }

    pub async fn assemble_program(
        &self,
        intro: Vec<u8>,
        content: Vec<u8>,
        outro: Vec<u8>,
        encoding: AudioEncoding,
    ) -> Result<MergedAudio, ProgramError> {
        let codec = encoder_for(encoding).ok_or(ProgramError::UnsupportedEncoding(encoding))?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("program-");
        let work_dir = match &self.settings.scratch_dir {
            Some(parent) => builder.tempdir_in(parent).map_err(AssemblyError::from)?,
            None => builder.tempdir().map_err(AssemblyError::from)?,
        };
        let ext = encoding.extension();

        let intro_path = write(work_dir.path(), &format!("intro.{}", ext), &intro).await?;
        let content_path = write(work_dir.path(), &format!("content.{}", ext), &content).await?;
        let outro_path = write(work_dir.path(), &format!("outro.{}", ext), &outro).await?;

        let intro_probe = probe(&self.settings.ffprobe, &intro_path).await?;
        let content_probe = probe(&self.settings.ffprobe, &content_path).await?;
        let outro_probe = probe(&self.settings.ffprobe, &outro_path).await?;

        check_durations(&intro_probe, &outro_probe, &self.settings)?;

        let intro_faded = work_dir.path().join(format!("intro-faded.{}", ext));
        let outro_faded = work_dir.path().join(format!("outro-faded.{}", ext));
        self.fade(&intro_path, &intro_faded, &intro_probe, &content_probe, codec).await?;
        self.fade(&outro_path, &outro_faded, &outro_probe, &content_probe, codec).await?;

        let intro = tokio::fs::read(&intro_faded).await.map_err(AssemblyError::from)?;
        let outro = tokio::fs::read(&outro_faded).await.map_err(AssemblyError::from)?;

        tracing::info!(
            intro_secs = intro_probe.duration_secs,
            content_secs = content_probe.duration_secs,
            outro_secs = outro_probe.duration_secs,
            sample_rate = content_probe.sample_rate,
            "Assembling program"
        );

        let merged = self.inner.assemble(vec![intro, content, outro], encoding).await?;
        Ok(merged)
    }

    async fn fade(
        &self,
        input: &Path,
        output: &Path,
        track: &AudioProbe,
        content: &AudioProbe,
        codec: &str,
    ) -> Result<(), AssemblyError> {
        let mut command = Command::new(&self.settings.ffmpeg);
        command
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(input)
            .arg("-af")
            .arg(fade_filter(track.duration_secs, self.settings.fade_secs))
            .arg("-ar")
            .arg(content.sample_rate.to_string())
            .arg("-ac")
            .arg(content.channels.to_string())
            .args(["-c:a", codec, "-y"])
            .arg(output);
        run_tool("ffmpeg", &mut command).await?;
        Ok(())
    }
}

async fn write(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf, AssemblyError> {
    let path = dir.join(name);
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

fn check_durations(intro: &AudioProbe, outro: &AudioProbe, settings: &ProgramSettings) -> Result<(), ProgramError> {
    if intro.duration_secs < settings.min_intro_secs {
        return Err(ProgramError::IntroTooShort {
            actual: intro.duration_secs,
            min: settings.min_intro_secs,
        });
    }
    if outro.duration_secs < settings.min_outro_secs {
        return Err(ProgramError::OutroTooShort {
            actual: outro.duration_secs,
            min: settings.min_outro_secs,
        });
    }
    Ok(())
}

/// ffmpeg encoder matching the output encoding; headerless streams cannot be probed
fn encoder_for(encoding: AudioEncoding) -> Option<&'static str> {
    match encoding {
        AudioEncoding::Mp3 => Some("libmp3lame"),
        AudioEncoding::OggOpus => Some("libopus"),
        AudioEncoding::Linear16 => Some("pcm_s16le"),
        AudioEncoding::Pcm | AudioEncoding::Mulaw => None,
    }
}

/// Fade in over the first `fade` seconds and out over the last `fade` seconds.
/// Short tracks get at most half their length per fade.
pub fn fade_filter(duration: f64, fade: f64) -> String {
    let fade = fade.min(duration / 2.0).max(0.0);
    let out_start = (duration - fade).max(0.0);
    format!(
        "afade=t=in:st=0:d={:.3},afade=t=out:st={:.3}:d={:.3}",
        fade, out_start, fade
    )
}
