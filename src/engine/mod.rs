// Core encoding engine - independent of the CLI front end

pub mod error;
pub mod filters;
pub mod log;
pub mod plan;
pub mod pipeline;
pub mod presets;
pub mod probe;
pub mod progress;
pub mod rate;
pub mod worker;

pub use error::EncodeError;
pub use pipeline::{Pipeline, PipelineEvent};
pub use plan::{EncodePlan, PlannedStage, build_plan, format_stage};
pub use probe::{MediaInfo, probe_media};
pub use progress::{ProgressSample, StageLabel};
pub use rate::{RateControl, resolve_rate};
pub use worker::{CancelToken, PipelineHandle, spawn_pipeline};
