use anyhow::{Context, Result, bail};
use std::io::Write;
use std::sync::OnceLock;
use std::time::Duration;

use vshrink::cli::{self, Cli, Commands};
use vshrink::config::{Backend, Config, JobDraft, OutputMode};
use vshrink::engine::pipeline::{Pipeline, PipelineEvent, plan_only};
use vshrink::engine::presets::validate_registry;
use vshrink::engine::probe::{ffmpeg_version, ffprobe_version, probe_media};
use vshrink::engine::worker::{CancelToken, spawn_pipeline};
use vshrink::engine::format_stage;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    validate_registry().context("encoder registry is inconsistent")?;

    let cli = cli::parse();

    match &cli.command {
        Some(Commands::CheckFfmpeg) => return check_ffmpeg(),
        Some(Commands::Probe { file }) => {
            let info = probe_media(file)?;
            println!("{}", file.display());
            println!("  duration: {:.3}s", info.duration_s);
            println!("  audio:    {}", if info.has_audio { "yes" } else { "no" });
            return Ok(());
        }
        Some(Commands::InitConfig) => return init_config(),
        None => {}
    }

    let Some(input) = cli.input.clone() else {
        bail!("no input file given (see --help)");
    };

    let defaults = Config::load().unwrap_or_default().defaults;
    let draft = draft_from_cli(&cli, input, &defaults)?;
    let job = draft.finalize()?;

    let mut pipeline = Pipeline::new(job);
    if let Ok(dir) = std::env::var("VSHRINK_TMPDIR") {
        pipeline = pipeline.with_temp_dir(dir);
    }

    if cli.dry_run {
        let plan = plan_only(&pipeline)?;
        for stage in &plan.stages {
            println!("# {}", stage.label.as_str());
            println!("{}", format_stage(pipeline.engine_program(), stage));
        }
        return Ok(());
    }

    run_job(pipeline)
}

fn draft_from_cli(
    cli: &Cli,
    input: std::path::PathBuf,
    defaults: &vshrink::config::DefaultsConfig,
) -> Result<JobDraft> {
    let mode = if cli.gif {
        OutputMode::Gif
    } else if cli.apng {
        OutputMode::Apng
    } else if cli.avif {
        OutputMode::Avif
    } else {
        OutputMode::Video
    };

    let backend = match cli.backend {
        Some(b) => b,
        None => Backend::from_name(&defaults.backend).unwrap_or(Backend::Cpu),
    };

    let trim = cli.trim.as_ref().map(|pair| (pair[0].clone(), pair[1].clone()));

    Ok(JobDraft {
        input,
        mode,
        size_mb: cli.size,
        resolution: cli.res.clone(),
        fps: cli.fps.clone(),
        trim,
        backend,
        codec_id: cli.codec.clone(),
        quality_level: cli.quality.unwrap_or(defaults.quality_level),
        crf_level: cli.crf.unwrap_or(defaults.crf_level),
        custom_output: cli.output.clone(),
        verbose: cli.verbose,
    })
}

/// Drive the event loop: one line per stage, a rewritten progress line
/// while a stage runs.
fn run_job(pipeline: Pipeline) -> Result<()> {
    let handle = spawn_pipeline(pipeline);
    install_interrupt(handle.cancel.clone());

    let mut current_stage: &'static str = "";
    let mut outcome: Option<Result<()>> = None;
    for event in &handle.events {
        match event {
            PipelineEvent::StageStarted { label, fraction } => {
                if !current_stage.is_empty() {
                    println!();
                }
                current_stage = label;
                tracing::debug!(stage = label, fraction, "stage started");
                print!("{label}...");
                let _ = std::io::stdout().flush();
            }
            PipelineEvent::Progress(sample) => {
                print!(
                    "\r{current_stage}: {:5.1}%{}",
                    sample.fraction * 100.0,
                    format_eta(sample.eta)
                );
                let _ = std::io::stdout().flush();
            }
            PipelineEvent::Done { output, size_mb } => {
                println!();
                println!("Done: {} ({size_mb:.2} MB)", output.display());
                outcome = Some(Ok(()));
                break;
            }
            PipelineEvent::Failed { error } => {
                println!();
                outcome = Some(Err(error.into()));
                break;
            }
        }
    }

    handle.join();
    outcome.unwrap_or_else(|| Err(anyhow::anyhow!("pipeline ended without a terminal event")))
}

fn format_eta(eta: Option<Duration>) -> String {
    match eta {
        Some(d) => {
            let secs = d.as_secs();
            format!("  ETA {:02}:{:02}", secs / 60, secs % 60)
        }
        None => String::new(),
    }
}

static ACTIVE_CANCEL: OnceLock<CancelToken> = OnceLock::new();

#[cfg(unix)]
extern "C" fn on_sigint(_: libc::c_int) {
    // The token is all-atomic, safe to poke from here. A second interrupt
    // while already cancelling hard-exits.
    if let Some(token) = ACTIVE_CANCEL.get() {
        if !token.is_cancelled() {
            token.cancel();
            return;
        }
    }
    unsafe { libc::_exit(130) }
}

/// Route Ctrl-C to pipeline cancellation so the running ffmpeg is
/// terminated and temp artifacts are cleaned up.
fn install_interrupt(cancel: CancelToken) {
    let _ = ACTIVE_CANCEL.set(cancel);
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGINT, on_sigint as libc::sighandler_t);
    }
}

fn check_ffmpeg() -> Result<()> {
    println!("ffmpeg:  {}", ffmpeg_version()?);
    println!("ffprobe: {}", ffprobe_version()?);
    Ok(())
}

fn init_config() -> Result<()> {
    let path = Config::config_path()?;
    if path.exists() {
        println!("Config file: {}", path.display());
        return Ok(());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let contents = toml::to_string_pretty(&Config::default())?;
    std::fs::write(&path, contents)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created default config: {}", path.display());
    Ok(())
}
