use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Backend;

#[derive(Parser)]
#[command(name = "vshrink")]
#[command(about = "Shrink videos to a target size, GIF, APNG or AVIF", long_about = None)]
pub struct Cli {
    /// Input video file
    #[arg(value_name = "INPUT")]
    pub input: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Target output size in MB (omit for quality mode)
    #[arg(short, long)]
    pub size: Option<f64>,

    /// Resolution: a divisor like "2" or "1.5", or an explicit "1280x720"
    #[arg(long, default_value = "")]
    pub res: String,

    /// Output frame rate cap
    #[arg(long, default_value = "")]
    pub fps: String,

    /// Produce an animated GIF instead of video
    #[arg(long, conflicts_with_all = ["apng", "avif"])]
    pub gif: bool,

    /// Produce an animated PNG instead of video
    #[arg(long, conflicts_with_all = ["gif", "avif"])]
    pub apng: bool,

    /// Produce an animated AVIF instead of video
    #[arg(long, conflicts_with_all = ["gif", "apng"])]
    pub avif: bool,

    /// Hardware backend (defaults to the config file, then cpu)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Encoder id, e.g. libx264 or hevc_nvenc (defaults per backend)
    #[arg(long)]
    pub codec: Option<String>,

    /// Encoding speed preset, 0 (fastest) to 4 (slowest/best)
    #[arg(short, long)]
    pub quality: Option<u8>,

    /// Quality slider for quality mode, 0 (best) to 10 (smallest)
    #[arg(long)]
    pub crf: Option<u8>,

    /// Output path (defaults to <input>_shrunk with the right extension)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Trim window: start and end timestamps, e.g. --trim 0:05 0:35
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    pub trim: Option<Vec<String>>,

    /// Show the ffmpeg commands without executing them
    #[arg(long)]
    pub dry_run: bool,

    /// Log rendered commands to vshrink.log
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check if ffmpeg and ffprobe are installed
    CheckFfmpeg,

    /// Probe a video file and report duration and audio presence
    Probe {
        /// Path to the video file
        file: PathBuf,
    },

    /// Show config status and location, or create default config if missing
    InitConfig,
}

pub fn parse() -> Cli {
    Cli::parse()
}
