// Pipeline: probe, plan, run each stage, finalize
//
// Owns the subprocess lifecycle. Progress flows out through a rendezvous
// channel so the producer blocks until the consumer has taken each event.

use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc::SyncSender;
use std::thread;

use super::error::EncodeError;
use super::log;
use super::plan::{self, EncodePlan, PlannedStage, TempArtifacts};
use super::probe::{self, effective_duration};
use super::progress::{ProgressSample, StageMonitor};
use super::rate;
use super::worker::CancelToken;
use crate::config::JobConfig;

/// Event stream a running pipeline emits, in order: zero or more stage
/// starts and progress ticks, then exactly one terminal `Done` or `Failed`.
#[derive(Debug)]
pub enum PipelineEvent {
    StageStarted {
        label: &'static str,
        /// Overall fraction at the moment this stage begins.
        fraction: f64,
    },
    Progress(ProgressSample),
    Done {
        output: PathBuf,
        size_mb: f64,
    },
    Failed {
        error: EncodeError,
    },
}

/// One encoding run, configured and ready to execute. The program names and
/// temp directory are swappable so tests can substitute stub executables.
pub struct Pipeline {
    config: JobConfig,
    engine: String,
    prober: String,
    temp_dir: PathBuf,
}

/// Removes temp artifacts when the run leaves scope, on every exit path.
struct TempGuard(TempArtifacts);

impl Drop for TempGuard {
    fn drop(&mut self) {
        self.0.remove_all();
    }
}

impl Pipeline {
    pub fn new(config: JobConfig) -> Self {
        Self {
            config,
            engine: "ffmpeg".to_string(),
            prober: "ffprobe".to_string(),
            temp_dir: std::env::temp_dir(),
        }
    }

    pub fn with_engine(mut self, program: impl Into<String>) -> Self {
        self.engine = program.into();
        self
    }

    pub fn with_prober(mut self, program: impl Into<String>) -> Self {
        self.prober = program.into();
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// Run to completion on the current thread, emitting events as it goes.
    /// Always ends with exactly one terminal event.
    pub fn run(self, events: &SyncSender<PipelineEvent>, cancel: &CancelToken) {
        match self.execute(events, cancel) {
            Ok((output, size_mb)) => {
                let _ = events.send(PipelineEvent::Done { output, size_mb });
            }
            Err(error) => {
                let _ = events.send(PipelineEvent::Failed { error });
            }
        }
    }

    fn execute(
        &self,
        events: &SyncSender<PipelineEvent>,
        cancel: &CancelToken,
    ) -> Result<(PathBuf, f64), EncodeError> {
        let config = &self.config;

        send(events, PipelineEvent::StageStarted { label: "probe", fraction: 0.0 })?;
        let media = probe::probe_media_with(&self.prober, &config.input)?;
        let duration = effective_duration(&media, &config.trim);

        let rate = rate::resolve_rate(config.target, duration, media.has_audio)?;
        let plan = plan::build_plan(config, &media, rate, &self.temp_dir)?;
        if config.verbose {
            log::log_plan(&self.engine, &plan);
        }

        let guard = TempGuard(plan.temp.clone());
        let total = plan.stages.len();

        for (index, stage) in plan.stages.iter().enumerate() {
            send(
                events,
                PipelineEvent::StageStarted {
                    label: stage.label.as_str(),
                    fraction: index as f64 / total as f64,
                },
            )?;
            self.run_stage(stage, duration, events, cancel)?;
        }

        send(events, PipelineEvent::StageStarted { label: "finalize", fraction: 1.0 })?;
        drop(guard);

        let meta = std::fs::metadata(&plan.output_path).map_err(|source| {
            EncodeError::Resource { path: plan.output_path.clone(), source }
        })?;
        Ok((plan.output_path.clone(), meta.len() as f64 / 1_048_576.0))
    }

    fn run_stage(
        &self,
        stage: &PlannedStage,
        total_s: f64,
        events: &SyncSender<PipelineEvent>,
        cancel: &CancelToken,
    ) -> Result<(), EncodeError> {
        if cancel.is_cancelled() {
            return Err(EncodeError::Cancelled);
        }

        let mut child = Command::new(&self.engine)
            .args(&stage.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EncodeError::Stage {
                stage: stage.label.as_str(),
                log: format!("failed to launch {}: {e}", self.engine),
            })?;

        cancel.register(child.id());

        // Collect stderr on its own thread so a chatty subprocess cannot
        // deadlock against the progress reader.
        let stderr = child.stderr.take();
        let stderr_thread = thread::spawn(move || {
            let mut buf = String::new();
            if let Some(mut pipe) = stderr {
                let _ = pipe.read_to_string(&mut buf);
            }
            buf
        });

        let mut consumer_gone = false;
        if let Some(stdout) = child.stdout.take() {
            let mut monitor = StageMonitor::new(stage.label, total_s);
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if let Some(sample) = monitor.feed_line(&line) {
                    if events.send(PipelineEvent::Progress(sample)).is_err() {
                        consumer_gone = true;
                        break;
                    }
                }
            }
        }

        if consumer_gone || cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            cancel.unregister();
            return Err(EncodeError::Cancelled);
        }

        let status = child.wait().map_err(|e| EncodeError::Stage {
            stage: stage.label.as_str(),
            log: format!("wait failed: {e}"),
        })?;
        cancel.unregister();

        let stderr_log = stderr_thread.join().unwrap_or_default();

        if cancel.is_cancelled() {
            return Err(EncodeError::Cancelled);
        }
        if !status.success() {
            return Err(EncodeError::Stage {
                stage: stage.label.as_str(),
                log: stderr_log,
            });
        }
        Ok(())
    }
}

fn send(events: &SyncSender<PipelineEvent>, event: PipelineEvent) -> Result<(), EncodeError> {
    events.send(event).map_err(|_| EncodeError::Cancelled)
}

/// Usable by dry-run: probe and plan without executing anything.
pub fn plan_only(pipeline: &Pipeline) -> Result<EncodePlan, EncodeError> {
    let config = &pipeline.config;
    let media = probe::probe_media_with(&pipeline.prober, &config.input)?;
    let duration = effective_duration(&media, &config.trim);
    let rate = rate::resolve_rate(config.target, duration, media.has_audio)?;
    plan::build_plan(config, &media, rate, &pipeline.temp_dir)
}

impl Pipeline {
    pub fn engine_program(&self) -> &str {
        &self.engine
    }
}
