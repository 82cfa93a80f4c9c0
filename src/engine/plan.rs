// Plan renderer: one tested path from a job to ordered argument vectors
//
// Every stage's argv is assembled here, nowhere else, so flag ordering and
// quoting are exercised through a single function.

use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::error::EncodeError;
use super::filters;
use super::presets;
use super::probe::MediaInfo;
use super::progress::StageLabel;
use super::rate::{AUDIO_RATE_KBIT, RateControl};
use crate::config::{JobConfig, OutputMode, SizeTarget};

/// One subprocess invocation: its stage label and full ordered argv
/// (program name excluded).
#[derive(Debug, Clone)]
pub struct PlannedStage {
    pub label: StageLabel,
    pub args: Vec<String>,
}

/// Temporary artifacts a plan creates: the two-pass statistics log prefix
/// and the palette image. Named with a uuid so concurrent runs cannot
/// collide; removed on every exit path by the pipeline's scope guard.
#[derive(Debug, Clone, Default)]
pub struct TempArtifacts {
    pub passlog_prefix: Option<PathBuf>,
    pub palette: Option<PathBuf>,
}

impl TempArtifacts {
    /// Concrete files this run may leave behind.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        if let Some(prefix) = &self.passlog_prefix {
            // libvpx/x264 write these variants next to the prefix
            files.push(with_suffix(prefix, "-0.log"));
            files.push(with_suffix(prefix, ".log"));
            files.push(with_suffix(prefix, "-0.log.mbtree"));
        }
        if let Some(palette) = &self.palette {
            files.push(palette.clone());
        }
        files
    }

    pub fn remove_all(&self) {
        for file in self.files() {
            let _ = std::fs::remove_file(file);
        }
    }
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// The complete derived plan for a job: resolved output, filter chain, and
/// the ordered stage list.
#[derive(Debug, Clone)]
pub struct EncodePlan {
    pub output_path: PathBuf,
    pub filter_chain: String,
    pub format_args: Vec<String>,
    pub stages: Vec<PlannedStage>,
    pub pass_count: u8,
    pub temp: TempArtifacts,
}

fn null_output_target() -> &'static str {
    if cfg!(windows) { "NUL" } else { "/dev/null" }
}

/// Stdout carries the machine-readable progress stream; stderr stays the
/// human diagnostic channel.
fn stage_preamble(config: &JobConfig) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-nostats", "-progress", "pipe:1", "-y"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    if let Some((start, end)) = &config.trim {
        args.extend(["-ss".to_string(), start.clone(), "-to".to_string(), end.clone()]);
    }
    args
}

fn output_extension(config: &JobConfig) -> &'static str {
    match config.mode {
        OutputMode::Gif => ".gif",
        OutputMode::Apng => ".png",
        OutputMode::Avif => ".avif",
        OutputMode::Video => config.codec.ext,
    }
}

/// Resolve the output path and its container flags: an input-adjacent
/// default name, or the caller's path paired with an explicit format flag.
fn resolve_output(config: &JobConfig) -> (PathBuf, Vec<String>) {
    let ext = output_extension(config);
    let mut format_args = Vec::new();

    let output = match &config.custom_output {
        Some(path) => {
            let format_flag = match config.mode {
                OutputMode::Avif => "avif".to_string(),
                OutputMode::Apng => "apng".to_string(),
                OutputMode::Gif => "gif".to_string(),
                OutputMode::Video => ext.trim_start_matches('.').to_string(),
            };
            format_args.extend(["-f".to_string(), format_flag]);
            path.clone()
        }
        None => {
            let stem = config
                .input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "output".to_string());
            let dir = config.input.parent().unwrap_or_else(|| Path::new("."));
            dir.join(format!("{stem}_shrunk{ext}"))
        }
    };

    // mp4 output should be streamable without a second remux
    if ext == ".mp4" && config.mode == OutputMode::Video {
        format_args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    }

    (output, format_args)
}

fn audio_args(config: &JobConfig, media: &MediaInfo) -> Vec<String> {
    if !media.has_audio || config.mode == OutputMode::Avif {
        return vec!["-an".to_string()];
    }
    let codec = if config.codec.ext == ".mp4" { "aac" } else { "libopus" };
    vec![
        "-c:a".to_string(),
        codec.to_string(),
        "-b:a".to_string(),
        format!("{AUDIO_RATE_KBIT}k"),
    ]
}

fn push_str(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

/// Render the full stage list for a job. The only entry point; dry-run and
/// the pipeline both go through here.
pub fn build_plan(
    config: &JobConfig,
    media: &MediaInfo,
    rate: RateControl,
    temp_dir: &Path,
) -> Result<EncodePlan, EncodeError> {
    let (output_path, format_args) = resolve_output(config);
    let filter_chain = filters::motion_chain(&config.resolution, &config.fps);
    let input = config.input.to_string_lossy().into_owned();
    let output = output_path.to_string_lossy().into_owned();

    let mut temp = TempArtifacts::default();
    let mut stages = Vec::new();
    let mut pass_count = 1u8;

    match config.mode {
        OutputMode::Gif => {
            let (generate, consume) = filters::palette_chains(&config.resolution, &config.fps);
            let palette = temp_dir.join(format!("vshrink_palette_{}.png", Uuid::new_v4()));

            let mut pal_args = stage_preamble(config);
            push_str(&mut pal_args, &["-i"]);
            pal_args.push(input.clone());
            push_str(&mut pal_args, &["-vf"]);
            pal_args.push(generate);
            pal_args.push(palette.to_string_lossy().into_owned());
            stages.push(PlannedStage { label: StageLabel::Palette, args: pal_args });

            let mut enc_args = stage_preamble(config);
            push_str(&mut enc_args, &["-i"]);
            enc_args.push(input);
            push_str(&mut enc_args, &["-i"]);
            enc_args.push(palette.to_string_lossy().into_owned());
            push_str(&mut enc_args, &["-lavfi"]);
            enc_args.push(consume);
            enc_args.extend(format_args.iter().cloned());
            enc_args.push(output);
            stages.push(PlannedStage { label: StageLabel::Encode, args: enc_args });

            temp.palette = Some(palette);
        }

        OutputMode::Apng => {
            let mut args = stage_preamble(config);
            push_str(&mut args, &["-i"]);
            args.push(input);
            push_str(&mut args, &["-vf"]);
            args.push(filter_chain.clone());
            push_str(&mut args, &["-c:v", "apng", "-plays", "0"]);
            args.extend(format_args.iter().cloned());
            args.push(output);
            stages.push(PlannedStage { label: StageLabel::Encode, args });
        }

        OutputMode::Video | OutputMode::Avif => {
            let entry = presets::preset_for(config.codec.id, config.backend)?;
            let speed = entry.speed_args(config.quality_level);
            let audio = audio_args(config, media);

            let mut pixel_args = vec!["-pix_fmt".to_string(), "yuv420p".to_string()];
            if config.mode == OutputMode::Avif {
                push_str(&mut pixel_args, &["-still-picture", "0"]);
            }

            let two_pass = config.backend.is_cpu()
                && matches!(config.target, SizeTarget::Megabytes(_))
                && !config.mode.single_pass_only();

            match (rate, config.backend.is_cpu()) {
                (RateControl::Quality, true) => {
                    let mut args = stage_preamble(config);
                    push_str(&mut args, &["-i"]);
                    args.push(input);
                    push_str(&mut args, &["-c:v", config.codec.id]);
                    args.extend(pixel_args);
                    args.extend(speed);
                    args.extend(entry.quality_args(config.crf_level));
                    push_str(&mut args, &["-vf"]);
                    args.push(filter_chain.clone());
                    args.extend(audio);
                    args.extend(format_args.iter().cloned());
                    args.push(output);
                    stages.push(PlannedStage { label: StageLabel::Encode, args });
                }

                (RateControl::VideoKbit(kbit), true) if two_pass => {
                    let prefix = temp_dir.join(format!("vshrink_pass_{}", Uuid::new_v4()));
                    let prefix_str = prefix.to_string_lossy().into_owned();
                    let rate_arg = format!("{kbit}k");

                    let mut pass1 = stage_preamble(config);
                    push_str(&mut pass1, &["-i"]);
                    pass1.push(input.clone());
                    push_str(&mut pass1, &["-c:v", config.codec.id, "-b:v"]);
                    pass1.push(rate_arg.clone());
                    push_str(&mut pass1, &["-pass", "1", "-passlogfile"]);
                    pass1.push(prefix_str.clone());
                    push_str(&mut pass1, &["-an", "-vf"]);
                    pass1.push(filter_chain.clone());
                    pass1.extend(pixel_args.iter().cloned());
                    pass1.extend(speed.iter().cloned());
                    push_str(&mut pass1, &["-f", "null", null_output_target()]);
                    stages.push(PlannedStage { label: StageLabel::Pass1, args: pass1 });

                    let mut pass2 = stage_preamble(config);
                    push_str(&mut pass2, &["-i"]);
                    pass2.push(input);
                    push_str(&mut pass2, &["-c:v", config.codec.id, "-b:v"]);
                    pass2.push(rate_arg);
                    push_str(&mut pass2, &["-pass", "2", "-passlogfile"]);
                    pass2.push(prefix_str);
                    push_str(&mut pass2, &["-vf"]);
                    pass2.push(filter_chain.clone());
                    pass2.extend(pixel_args);
                    pass2.extend(speed);
                    pass2.extend(audio);
                    pass2.extend(format_args.iter().cloned());
                    pass2.push(output);
                    stages.push(PlannedStage { label: StageLabel::Pass2, args: pass2 });

                    temp.passlog_prefix = Some(prefix);
                    pass_count = 2;
                }

                // CPU with a bitrate but a single-pass-only format (GIF and
                // APNG never reach here; this arm is unreachable for them).
                (RateControl::VideoKbit(kbit), true) => {
                    let mut args = stage_preamble(config);
                    push_str(&mut args, &["-i"]);
                    args.push(input);
                    push_str(&mut args, &["-c:v", config.codec.id, "-b:v"]);
                    args.push(format!("{kbit}k"));
                    push_str(&mut args, &["-vf"]);
                    args.push(filter_chain.clone());
                    args.extend(pixel_args);
                    args.extend(speed);
                    args.extend(audio);
                    args.extend(format_args.iter().cloned());
                    args.push(output);
                    stages.push(PlannedStage { label: StageLabel::Encode, args });
                }

                (rate, false) => {
                    let mut args = stage_preamble(config);
                    push_str(&mut args, &["-hwaccel", "auto", "-i"]);
                    args.push(input);
                    push_str(&mut args, &["-c:v", config.codec.id]);
                    match rate {
                        RateControl::VideoKbit(kbit) => {
                            push_str(&mut args, &["-b:v"]);
                            args.push(format!("{kbit}k"));
                            push_str(&mut args, &["-maxrate"]);
                            args.push(format!("{kbit}k"));
                            push_str(&mut args, &["-bufsize"]);
                            args.push(format!("{}k", kbit * 2));
                        }
                        RateControl::Quality => {}
                    }
                    push_str(&mut args, &["-vf"]);
                    args.push(filter_chain.clone());
                    args.extend(pixel_args);
                    args.extend(speed);
                    match rate {
                        RateControl::Quality => args.extend(entry.quality_args(config.crf_level)),
                        RateControl::VideoKbit(_) => push_str(&mut args, entry.size_mode_args()),
                    }
                    args.extend(audio);
                    args.extend(format_args.iter().cloned());
                    args.push(output);
                    stages.push(PlannedStage { label: StageLabel::Encode, args });
                }
            }
        }
    }

    Ok(EncodePlan {
        output_path,
        filter_chain,
        format_args,
        stages,
        pass_count,
        temp,
    })
}

/// Shell-safe rendering of a stage for dry-run output and the debug log.
pub fn format_stage(program: &str, stage: &PlannedStage) -> String {
    let mut parts = vec![program.to_string()];
    parts.extend(stage.args.iter().map(|arg| {
        shlex::try_quote(arg)
            .map(|q| q.into_owned())
            .unwrap_or_else(|_| arg.clone())
    }));
    parts.join(" ")
}
