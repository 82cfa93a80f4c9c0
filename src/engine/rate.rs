// Parameter resolver: turn a size budget into a concrete video bitrate

use super::error::EncodeError;
use crate::config::SizeTarget;

/// Fixed allocation for the audio track when the source has one.
pub const AUDIO_RATE_KBIT: u32 = 128;

/// Floor for the video rate; below this the encode degenerates into mush.
const MIN_VIDEO_RATE_BIT: f64 = 50.0 * 1024.0;

/// Safety margin left for container overhead.
const CONTAINER_MARGIN: f64 = 0.95;

/// Resolved rate control for the encode stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateControl {
    /// Explicit bitrate target in kbit/s.
    VideoKbit(u32),
    /// Quality-driven mode; the preset mapper supplies CRF/CQ flags instead.
    Quality,
}

/// Resolve the size target into a video bitrate.
///
/// Budget math: `size_MB × 8 × 1024 × 1024` bits, minus 128 kbit/s × duration
/// when audio is present, divided by duration, with a 5% container margin and
/// a 50 kbit/s floor, truncated to integer kbit/s.
///
/// A non-positive duration cannot support the division, so an explicit size
/// target is rejected outright rather than producing a garbage rate.
pub fn resolve_rate(
    target: SizeTarget,
    duration_s: f64,
    has_audio: bool,
) -> Result<RateControl, EncodeError> {
    let mb = match target {
        SizeTarget::Quality => return Ok(RateControl::Quality),
        SizeTarget::Megabytes(mb) => mb,
    };

    if duration_s <= 0.0 {
        return Err(EncodeError::Config(
            "source duration is unknown or zero; a size target cannot be resolved \
             (omit --size to encode in quality mode)"
                .to_string(),
        ));
    }

    let target_bits = mb * 8_388_608.0; // 8 * 1024 * 1024
    let audio_bits_per_s = if has_audio {
        (AUDIO_RATE_KBIT * 1024) as f64
    } else {
        0.0
    };

    let total_rate = target_bits / duration_s;
    let video_rate = ((total_rate - audio_bits_per_s) * CONTAINER_MARGIN).max(MIN_VIDEO_RATE_BIT);

    Ok(RateControl::VideoKbit((video_rate / 1024.0) as u32))
}
