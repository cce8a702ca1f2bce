use super::{AssemblyError, AudioAssembler, MergedAudio};
use crate::domain::tts::AudioEncoding;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tempfile::TempDir;
use tokio::process::Command;

/// Container-aware concatenation through the ffmpeg concat demuxer.
///
/// Every buffer is written to a private temp dir together with an ordered
/// manifest; the dir is removed when the call returns, on every path.
#[derive(Debug, Clone)]
pub struct FfmpegConcatAssembler {
    ffmpeg: PathBuf,
    scratch_dir: Option<PathBuf>,
}

impl FfmpegConcatAssembler {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            scratch_dir: None,
        }
    }

    /// Create temp dirs under `dir` instead of the system temp location
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn ffmpeg(&self) -> &Path {
        &self.ffmpeg
    }

    pub(crate) fn temp_dir(&self) -> Result<TempDir, AssemblyError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("concat-");
        let dir = match &self.scratch_dir {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    /// Concatenate files already on disk into `output`, without re-encoding
    pub(crate) async fn concat_files(&self, work_dir: &Path, inputs: &[PathBuf], output: &Path) -> Result<(), AssemblyError> {
        let manifest_path = work_dir.join("manifest.txt");
        tokio::fs::write(&manifest_path, manifest(inputs)).await?;

        let mut command = Command::new(&self.ffmpeg);
        command
            .args(["-hide_banner", "-loglevel", "error", "-f", "concat", "-safe", "0", "-i"])
            .arg(&manifest_path)
            .args(["-c", "copy", "-y"])
            .arg(output);
        run_tool("ffmpeg", &mut command).await?;
        Ok(())
    }
}

#[async_trait]
impl AudioAssembler for FfmpegConcatAssembler {
    async fn assemble(&self, buffers: Vec<Vec<u8>>, encoding: AudioEncoding) -> Result<MergedAudio, AssemblyError> {
        if buffers.is_empty() {
            return Err(AssemblyError::Empty);
        }
        if buffers.len() == 1 {
            let bytes = buffers.into_iter().next().unwrap_or_default();
            return Ok(MergedAudio::new(bytes, 1, encoding));
        }

        let work_dir = self.temp_dir()?;
        let segment_count = buffers.len();
        let mut inputs = Vec::with_capacity(segment_count);
        for (position, buffer) in buffers.into_iter().enumerate() {
            let path = work_dir
                .path()
                .join(format!("part-{:05}.{}", position, encoding.extension()));
            tokio::fs::write(&path, buffer).await?;
            inputs.push(path);
        }

        let output = work_dir.path().join(format!("merged.{}", encoding.extension()));
        self.concat_files(work_dir.path(), &inputs, &output).await?;
        let bytes = tokio::fs::read(&output).await?;

        tracing::debug!(
            segment_count,
            merged_size = bytes.len(),
            encoding = %encoding,
            "Audio merged with ffmpeg concat demuxer"
        );

        Ok(MergedAudio::new(bytes, segment_count, encoding))
    }
}

/// Ordered concat-demuxer manifest; single quotes inside paths are escaped
pub fn manifest(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| format!("file '{}'\n", path.to_string_lossy().replace('\'', r"'\''")))
        .collect()
}

/// Run an external tool to completion, turning a nonzero exit into an error with stderr
pub(crate) async fn run_tool(tool: &'static str, command: &mut Command) -> Result<Output, AssemblyError> {
    let output = command
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| AssemblyError::Spawn { tool, source })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        tracing::error!(tool, status = %output.status, stderr = %stderr, "External tool failed");
        return Err(AssemblyError::ToolFailed {
            tool,
            status: output.status.to_string(),
            stderr,
        });
    }

    Ok(output)
}

/// Stream properties reported by ffprobe
#[derive(Debug, Clone, PartialEq)]
pub struct AudioProbe {
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u32,
    pub codec: String,
}

pub async fn probe(ffprobe: &Path, file: &Path) -> Result<AudioProbe, AssemblyError> {
    let mut command = Command::new(ffprobe);
    command
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "-select_streams",
            "a:0",
        ])
        .arg(file);
    let output = run_tool("ffprobe", &mut command).await?;
    parse_probe(&output.stdout)
}

fn parse_probe(stdout: &[u8]) -> Result<AudioProbe, AssemblyError> {
    let bad = |message: &str| AssemblyError::Probe {
        tool: "ffprobe",
        message: message.to_string(),
    };

    let json: serde_json::Value = serde_json::from_slice(stdout).map_err(|e| bad(&e.to_string()))?;
    let stream = json["streams"]
        .as_array()
        .and_then(|streams| streams.first())
        .ok_or_else(|| bad("no audio stream"))?;

    let duration_secs = json["format"]["duration"]
        .as_str()
        .or_else(|| stream["duration"].as_str())
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| bad("missing duration"))?;
    let sample_rate = stream["sample_rate"]
        .as_str()
        .and_then(|r| r.parse::<u32>().ok())
        .ok_or_else(|| bad("missing sample_rate"))?;
    let channels = stream["channels"]
        .as_u64()
        .and_then(|c| u32::try_from(c).ok())
        .ok_or_else(|| bad("missing channels"))?;
    let codec = stream["codec_name"].as_str().unwrap_or("unknown").to_string();

    Ok(AudioProbe {
        duration_secs,
        sample_rate,
        channels,
        codec,
    })
}
