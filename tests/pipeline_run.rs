// Pipeline behavior against stub ffmpeg/ffprobe executables: event
// ordering, temp artifact cleanup, failure reporting and cancellation.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

use vshrink::config::{Backend, JobDraft, OutputMode};
use vshrink::engine::error::EncodeError;
use vshrink::engine::pipeline::{Pipeline, PipelineEvent};
use vshrink::engine::worker::spawn_pipeline;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn stub_ffprobe(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "ffprobe",
        r#"echo '{"streams":[{"codec_type":"video"},{"codec_type":"audio"}],"format":{"duration":"2.0"}}'"#,
    )
}

/// Stub encoder: creates any requested passlog, streams two progress
/// ticks, touches the output (last argument) and exits clean.
fn stub_ffmpeg_ok(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "ffmpeg",
        r#"prev=""
prefix=""
out=""
for a in "$@"; do
  if [ "$prev" = "-passlogfile" ]; then prefix="$a"; fi
  prev="$a"
  out="$a"
done
if [ -n "$prefix" ]; then : > "$prefix-0.log"; : > "$prefix.log"; fi
echo "out_time_us=1000000"
echo "out_time_us=2000000"
echo "progress=end"
if [ "$out" != "/dev/null" ]; then : > "$out"; fi
exit 0"#,
    )
}

fn draft(dir: &TempDir) -> JobDraft {
    let input = dir.path().join("clip.mp4");
    fs::write(&input, b"not a real video").unwrap();
    JobDraft {
        input,
        mode: OutputMode::Video,
        size_mb: Some(1.0),
        resolution: String::new(),
        fps: String::new(),
        trim: None,
        backend: Backend::Cpu,
        codec_id: None,
        quality_level: 0,
        crf_level: 5,
        custom_output: None,
        verbose: false,
    }
}

fn pipeline(dir: &TempDir, ffmpeg: &Path, temp: &Path) -> Pipeline {
    let ffprobe = stub_ffprobe(dir.path());
    Pipeline::new(draft(dir).finalize().unwrap())
        .with_engine(ffmpeg.to_string_lossy().into_owned())
        .with_prober(ffprobe.to_string_lossy().into_owned())
        .with_temp_dir(temp)
}

fn leftover_temp_files(temp: &Path) -> Vec<PathBuf> {
    fs::read_dir(temp)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect()
}

#[test]
fn two_pass_run_emits_ordered_events_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let ffmpeg = stub_ffmpeg_ok(dir.path());

    let handle = spawn_pipeline(pipeline(&dir, &ffmpeg, temp.path()));

    let mut labels = Vec::new();
    let mut progress_ticks = 0;
    let mut done = None;
    for event in &handle.events {
        match event {
            PipelineEvent::StageStarted { label, .. } => labels.push(label),
            PipelineEvent::Progress(_) => progress_ticks += 1,
            PipelineEvent::Done { output, size_mb } => {
                done = Some((output, size_mb));
                break;
            }
            PipelineEvent::Failed { error } => panic!("unexpected failure: {error}"),
        }
    }
    handle.join();

    assert_eq!(
        labels,
        vec!["probe", "pass 1 (analysis)", "pass 2 (encode)", "finalize"]
    );
    assert_eq!(progress_ticks, 4, "two ticks per encode stage");

    let (output, _size) = done.expect("terminal Done event");
    assert!(output.exists());
    assert_eq!(
        output.file_name().unwrap().to_str().unwrap(),
        "clip_shrunk.webm"
    );

    // The stub created passlog files in the temp dir; the guard must have
    // removed them.
    assert!(leftover_temp_files(temp.path()).is_empty());
}

#[test]
fn stage_failure_reports_stderr_and_still_cleans_up() {
    let dir = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let ffmpeg = write_script(
        dir.path(),
        "ffmpeg",
        r#"prev=""
for a in "$@"; do
  if [ "$prev" = "-passlogfile" ]; then : > "$a-0.log"; fi
  prev="$a"
done
echo "out_time_us=1000000"
echo "boom: encoder exploded" >&2
exit 2"#,
    );

    let handle = spawn_pipeline(pipeline(&dir, &ffmpeg, temp.path()));

    let mut failure = None;
    for event in &handle.events {
        match event {
            PipelineEvent::Done { .. } => panic!("job should have failed"),
            PipelineEvent::Failed { error } => {
                failure = Some(error);
                break;
            }
            _ => {}
        }
    }
    handle.join();

    match failure.expect("terminal Failed event") {
        EncodeError::Stage { stage, log } => {
            assert_eq!(stage, "pass 1 (analysis)");
            assert!(log.contains("boom: encoder exploded"));
        }
        other => panic!("expected a stage error, got {other}"),
    }
    assert!(leftover_temp_files(temp.path()).is_empty());
}

#[test]
fn probe_failure_is_terminal_before_any_encode() {
    let dir = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    let ffprobe = write_script(dir.path(), "ffprobe", "echo 'no such stream' >&2\nexit 1");
    let ffmpeg = write_script(dir.path(), "ffmpeg", "echo 'should never run' >&2\nexit 1");

    let p = Pipeline::new(draft(&dir).finalize().unwrap())
        .with_engine(ffmpeg.to_string_lossy().into_owned())
        .with_prober(ffprobe.to_string_lossy().into_owned())
        .with_temp_dir(temp.path());
    let handle = spawn_pipeline(p);

    let mut labels = Vec::new();
    let mut failure = None;
    for event in &handle.events {
        match event {
            PipelineEvent::StageStarted { label, .. } => labels.push(label),
            PipelineEvent::Failed { error } => {
                failure = Some(error);
                break;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    handle.join();

    assert_eq!(labels, vec!["probe"]);
    assert!(matches!(failure, Some(EncodeError::Probe(_))));
}

#[test]
fn cancellation_kills_the_running_stage() {
    let dir = TempDir::new().unwrap();
    let temp = TempDir::new().unwrap();
    // Emits one tick then blocks; only a signal can end it early.
    let ffmpeg = write_script(
        dir.path(),
        "ffmpeg",
        "echo \"out_time_us=500000\"\nexec sleep 30",
    );

    let handle = spawn_pipeline(pipeline(&dir, &ffmpeg, temp.path()));

    let started = Instant::now();
    let mut cancelled = false;
    let mut failure = None;
    for event in &handle.events {
        match event {
            PipelineEvent::Progress(_) if !cancelled => {
                handle.cancel.cancel();
                cancelled = true;
            }
            PipelineEvent::Done { .. } => panic!("cancelled job must not complete"),
            PipelineEvent::Failed { error } => {
                failure = Some(error);
                break;
            }
            _ => {}
        }
    }
    handle.join();

    assert!(matches!(failure, Some(EncodeError::Cancelled)));
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "cancel must not wait out the subprocess"
    );
    assert!(leftover_temp_files(temp.path()).is_empty());
}
