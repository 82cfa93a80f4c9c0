// Debug log file for rendered commands and stage transitions.

use anyhow::Result;
use chrono::Local;
use std::io::Write;

use super::plan::{EncodePlan, format_stage};

/// Append a timestamped line to vshrink.log in the current directory,
/// creating the file if needed. Only called on the verbose path.
pub fn write_debug_log(message: &str) -> Result<()> {
    use std::fs::OpenOptions;

    let log_path = std::env::current_dir()?.join("vshrink.log");
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    writeln!(file, "[{}] {}", timestamp, message)?;
    Ok(())
}

/// Log every rendered stage of a plan, one shell-quoted command per line.
pub fn log_plan(program: &str, plan: &EncodePlan) {
    for stage in &plan.stages {
        let _ = write_debug_log(&format!(
            "{}: {}",
            stage.label.as_str(),
            format_stage(program, stage)
        ));
    }
}
