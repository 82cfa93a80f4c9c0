// Progress monitor: ffmpeg's key=value stream → fraction and ETA

use std::time::{Duration, Instant};

/// Label for one discrete subprocess stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageLabel {
    Palette,
    Encode,
    Pass1,
    Pass2,
}

impl StageLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            StageLabel::Palette => "palette generation",
            StageLabel::Encode => "encode",
            StageLabel::Pass1 => "pass 1 (analysis)",
            StageLabel::Pass2 => "pass 2 (encode)",
        }
    }
}

/// One progress tick. Ephemeral; each sample supersedes the previous one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSample {
    /// Completion fraction in [0, 1].
    pub fraction: f64,
    /// Estimated time remaining; only published once the fraction clears a
    /// 1% noise floor.
    pub eta: Option<Duration>,
    pub stage: StageLabel,
}

/// Parser for ffmpeg's `-progress` output (line-oriented key=value).
/// Only the elapsed-time key is consumed; unrecognized lines are ignored.
#[derive(Debug, Default, Clone)]
pub struct ProgressParser {
    pub out_time_us: u64,
    pub is_complete: bool,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a single line. Returns true when the line advanced the clock.
    pub fn parse_line(&mut self, line: &str) -> bool {
        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "out_time_us" => {
                    if let Ok(us) = value.trim().parse::<u64>() {
                        self.out_time_us = us;
                        return true;
                    }
                }
                "progress" => {
                    if value.trim() == "end" {
                        self.is_complete = true;
                    }
                }
                _ => {}
            }
        }
        false
    }

    pub fn out_time_s(&self) -> f64 {
        self.out_time_us as f64 / 1_000_000.0
    }
}

/// Per-stage monitor: wraps the parser with the stage label, the expected
/// total duration and a wall clock, producing clamped, monotone samples.
#[derive(Debug)]
pub struct StageMonitor {
    stage: StageLabel,
    total_s: f64,
    started: Instant,
    last_fraction: f64,
    parser: ProgressParser,
}

impl StageMonitor {
    pub fn new(stage: StageLabel, total_s: f64) -> Self {
        Self {
            stage,
            total_s,
            started: Instant::now(),
            last_fraction: 0.0,
            parser: ProgressParser::new(),
        }
    }

    /// Feed one line of subprocess output. Returns a sample only when the
    /// elapsed-time key advanced.
    pub fn feed_line(&mut self, line: &str) -> Option<ProgressSample> {
        let elapsed_wall = self.started.elapsed().as_secs_f64();
        self.feed_line_at(line, elapsed_wall)
    }

    /// Deterministic core of `feed_line`: the wall-clock elapsed seconds are
    /// passed in so the math is testable without sleeping.
    fn feed_line_at(&mut self, line: &str, elapsed_wall: f64) -> Option<ProgressSample> {
        if !self.parser.parse_line(line) {
            return None;
        }

        let raw = if self.total_s > 0.0 {
            self.parser.out_time_s() / self.total_s
        } else {
            0.0
        };
        // Clamp, and never move backwards within a stage.
        let fraction = raw.clamp(0.0, 1.0).max(self.last_fraction);
        self.last_fraction = fraction;

        let eta = if fraction > 0.01 {
            let remaining = (elapsed_wall * (1.0 / fraction - 1.0)).max(0.0);
            Some(Duration::from_secs_f64(remaining))
        } else {
            None
        };

        Some(ProgressSample {
            fraction,
            eta,
            stage: self.stage,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.parser.is_complete
    }
}
