// Error taxonomy for the encoding engine

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can sink a job. All variants are fatal to the current
/// job; there are no automatic retries.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Bad user input (size/resolution/fps/CRF/trim), caught before any
    /// subprocess is launched.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// ffprobe exited nonzero or returned an unusable document.
    #[error("probe failed: {0}")]
    Probe(String),

    /// An encode/palette subprocess exited nonzero. Carries the stage name
    /// and the captured stderr verbatim.
    #[error("{stage} failed:\n{log}")]
    Stage { stage: &'static str, log: String },

    /// The output artifact could not be inspected after an apparently
    /// successful encode.
    #[error("cannot stat output {path}: {source}")]
    Resource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The job was cancelled mid-flight.
    #[error("job cancelled")]
    Cancelled,
}
