// Job configuration: the wizard-equivalent draft, its finalized immutable
// form, and the optional TOML defaults file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::engine::error::EncodeError;
use crate::engine::presets::{self, EncoderInfo};
use crate::engine::probe::parse_timespec;

/// Hardware execution context for encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Backend {
    /// Software encoding (best quality)
    Cpu,
    /// NVIDIA NVENC
    Nvidia,
    /// AMD AMF
    Amd,
    /// Intel QSV
    Intel,
}

impl Backend {
    pub fn is_cpu(self) -> bool {
        matches!(self, Backend::Cpu)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "cpu" => Some(Backend::Cpu),
            "nvidia" => Some(Backend::Nvidia),
            "amd" => Some(Backend::Amd),
            "intel" => Some(Backend::Intel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Video,
    Gif,
    Apng,
    Avif,
}

impl OutputMode {
    /// Palette-based outputs need a palettegen stage before the final encode.
    pub fn needs_palette(self) -> bool {
        matches!(self, OutputMode::Gif)
    }

    /// GIF and APNG never use two-pass rate control; video and animated
    /// AVIF may, subject to backend and target.
    pub fn single_pass_only(self) -> bool {
        matches!(self, OutputMode::Gif | OutputMode::Apng)
    }
}

/// Size target, or the quality-mode sentinel when no size was given.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeTarget {
    Megabytes(f64),
    Quality,
}

/// Mutable in-progress job settings, assembled from CLI flags and the
/// defaults file. `finalize` validates everything once and produces the
/// immutable `JobConfig` the orchestrator runs with.
#[derive(Debug, Clone)]
pub struct JobDraft {
    pub input: PathBuf,
    pub mode: OutputMode,
    pub size_mb: Option<f64>,
    pub resolution: String,
    pub fps: String,
    pub trim: Option<(String, String)>,
    pub backend: Backend,
    pub codec_id: Option<String>,
    pub quality_level: u8,
    pub crf_level: u8,
    pub custom_output: Option<PathBuf>,
    pub verbose: bool,
}

/// Finalized, validated job configuration. Built exactly once; the pipeline
/// never re-validates any of these fields.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub input: PathBuf,
    pub mode: OutputMode,
    pub target: SizeTarget,
    pub resolution: String,
    pub fps: String,
    pub trim: Option<(String, String)>,
    pub backend: Backend,
    pub codec: &'static EncoderInfo,
    /// Encoding speed preset, 0 (fastest) to 4 (slowest/best).
    pub quality_level: u8,
    /// Quality slider for quality mode, 0 (best) to 10 (smallest).
    pub crf_level: u8,
    pub custom_output: Option<PathBuf>,
    pub verbose: bool,
}

impl JobDraft {
    pub fn finalize(self) -> Result<JobConfig, EncodeError> {
        if fs::metadata(&self.input).is_err() {
            return Err(EncodeError::Config(format!(
                "input file not found: {}",
                self.input.display()
            )));
        }

        let target = match self.size_mb {
            Some(mb) if mb.is_finite() && mb > 0.0 => SizeTarget::Megabytes(mb),
            Some(mb) => {
                return Err(EncodeError::Config(format!(
                    "target size must be a positive number of MB, got {mb}"
                )));
            }
            None => SizeTarget::Quality,
        };

        if self.quality_level > 4 {
            return Err(EncodeError::Config(format!(
                "quality level must be 0-4, got {}",
                self.quality_level
            )));
        }
        if self.crf_level > 10 {
            return Err(EncodeError::Config(format!(
                "CRF level must be 0-10, got {}",
                self.crf_level
            )));
        }

        if !self.fps.is_empty() {
            match self.fps.parse::<f64>() {
                Ok(f) if f > 0.0 && f.is_finite() => {}
                _ => {
                    return Err(EncodeError::Config(format!(
                        "fps must be a positive number, got {:?}",
                        self.fps
                    )));
                }
            }
        }

        if let Some((start, end)) = &self.trim {
            let s = parse_timespec(start);
            let e = parse_timespec(end);
            if !s.is_finite() || !e.is_finite() || s < 0.0 || e <= s {
                return Err(EncodeError::Config(format!(
                    "trim range {start:?}..{end:?} is not a valid forward range"
                )));
            }
        }

        let codec = presets::select_encoder(self.backend, self.mode, self.codec_id.as_deref())?;

        Ok(JobConfig {
            input: self.input,
            mode: self.mode,
            target,
            resolution: self.resolution.trim().to_string(),
            fps: self.fps.trim().to_string(),
            trim: self.trim,
            backend: self.backend,
            codec,
            quality_level: self.quality_level,
            crf_level: self.crf_level,
            custom_output: self.custom_output,
            verbose: self.verbose,
        })
    }
}

/// Persistent defaults, loaded from the platform config directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default hardware backend ("cpu", "nvidia", "amd", "intel")
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Default encoding speed preset (0-4)
    #[serde(default = "default_quality_level")]
    pub quality_level: u8,

    /// Default CRF slider position for quality mode (0-10)
    #[serde(default = "default_crf_level")]
    pub crf_level: u8,
}

fn default_backend() -> String {
    "cpu".to_string()
}

fn default_quality_level() -> u8 {
    2
}

fn default_crf_level() -> u8 {
    5
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            quality_level: default_quality_level(),
            crf_level: default_crf_level(),
        }
    }
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        let dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(dir.join("vshrink").join("config.toml"))
    }

    /// Load the defaults file, falling back to built-in defaults when it
    /// does not exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}
