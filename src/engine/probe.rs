// Input probing using ffprobe

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;

use super::error::EncodeError;

/// What the rest of the engine needs to know about the source: how long it
/// runs and whether an audio allocation must be carved out of the budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaInfo {
    /// Container duration in seconds; 0.0 when the container reports none.
    pub duration_s: f64,
    pub has_audio: bool,
}

#[derive(Debug, Deserialize)]
struct ProbeDoc {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Probe a media file with ffprobe. Read-only; a nonzero exit or an
/// unparsable document is fatal to the job.
pub fn probe_media(path: &Path) -> Result<MediaInfo, EncodeError> {
    probe_media_with("ffprobe", path)
}

/// Same as `probe_media` but with an explicit inspector program, so the
/// pipeline can be exercised against a stub.
pub fn probe_media_with(program: &str, path: &Path) -> Result<MediaInfo, EncodeError> {
    let output = Command::new(program)
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .output()
        .map_err(|e| EncodeError::Probe(format!("failed to run {program}: {e}")))?;

    if !output.status.success() {
        return Err(EncodeError::Probe(format!(
            "{program} exited with {} for {}: {}",
            output.status,
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    parse_probe_doc(&String::from_utf8_lossy(&output.stdout))
}

/// Parse an ffprobe JSON document into `MediaInfo`.
pub fn parse_probe_doc(json: &str) -> Result<MediaInfo, EncodeError> {
    let doc: ProbeDoc = serde_json::from_str(json)
        .map_err(|e| EncodeError::Probe(format!("unparsable probe document: {e}")))?;

    let duration_s = doc
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let has_audio = doc
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(MediaInfo {
        duration_s,
        has_audio,
    })
}

/// Parse a wall-clock spec like "00:01:30", "1:30", "90" or "5s" into
/// seconds. Unparsable segments count as zero, matching the lenient trim
/// handling the CLI historically had; validation happens at config time.
pub fn parse_timespec(spec: &str) -> f64 {
    let spec = spec.trim().trim_end_matches('s');
    let mut seconds = 0.0;
    let mut multiplier = 1.0;
    for part in spec.rsplit(':') {
        seconds += part.parse::<f64>().unwrap_or(0.0) * multiplier;
        multiplier *= 60.0;
    }
    seconds
}

/// Effective duration of the encode: the trim window when one is set, the
/// probed container duration otherwise.
pub fn effective_duration(info: &MediaInfo, trim: &Option<(String, String)>) -> f64 {
    if let Some((start, end)) = trim {
        let s = parse_timespec(start);
        let e = parse_timespec(end);
        if e > s {
            return e - s;
        }
    }
    info.duration_s
}

/// Check if ffmpeg is available and return its version line
pub fn ffmpeg_version() -> Result<String> {
    tool_version("ffmpeg")
}

/// Check if ffprobe is available and return its version line
pub fn ffprobe_version() -> Result<String> {
    tool_version("ffprobe")
}

fn tool_version(tool: &str) -> Result<String> {
    let output = Command::new(tool)
        .arg("-version")
        .output()
        .with_context(|| format!("Failed to execute {tool}. Is {tool} installed and in PATH?"))?;

    if !output.status.success() {
        anyhow::bail!("{tool} command failed with status: {}", output.status);
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    let first_line = version_output.lines().next().unwrap_or("Unknown version");

    Ok(first_line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_duration_and_audio_presence() {
        let json = r#"{
            "streams": [
                {"codec_type": "video"},
                {"codec_type": "audio"}
            ],
            "format": {"duration": "123.456"}
        }"#;

        let info = parse_probe_doc(json).unwrap();
        assert_eq!(info.duration_s, 123.456);
        assert!(info.has_audio);
    }

    #[test]
    fn video_only_source_has_no_audio() {
        let json = r#"{
            "streams": [{"codec_type": "video"}],
            "format": {"duration": "60"}
        }"#;

        let info = parse_probe_doc(json).unwrap();
        assert_eq!(info.duration_s, 60.0);
        assert!(!info.has_audio);
    }

    #[test]
    fn missing_duration_reads_as_zero() {
        let info = parse_probe_doc(r#"{"streams": [], "format": {}}"#).unwrap();
        assert_eq!(info.duration_s, 0.0);
    }

    #[test]
    fn garbage_document_is_a_probe_error() {
        assert!(matches!(
            parse_probe_doc("not json"),
            Err(EncodeError::Probe(_))
        ));
    }

    #[test]
    fn timespec_formats() {
        assert_eq!(parse_timespec("90"), 90.0);
        assert_eq!(parse_timespec("5s"), 5.0);
        assert_eq!(parse_timespec("1:30"), 90.0);
        assert_eq!(parse_timespec("00:01:30"), 90.0);
        assert_eq!(parse_timespec("01:00:00"), 3600.0);
    }

    #[test]
    fn trim_window_overrides_container_duration() {
        let info = MediaInfo {
            duration_s: 300.0,
            has_audio: false,
        };
        let trim = Some(("00:01:00".to_string(), "00:02:30".to_string()));
        assert_eq!(effective_duration(&info, &trim), 90.0);
        assert_eq!(effective_duration(&info, &None), 300.0);
    }

    #[test]
    fn inverted_trim_window_falls_back_to_container_duration() {
        let info = MediaInfo {
            duration_s: 300.0,
            has_audio: false,
        };
        let trim = Some(("10s".to_string(), "5s".to_string()));
        assert_eq!(effective_duration(&info, &trim), 300.0);
    }
}
