// Preset mapper: (codec, backend) → speed presets and quality flags
//
// Table-driven and side-effect free. Every encoder the catalog exposes must
// resolve to a preset entry; `validate_registry` is run at startup so a gap
// is a configuration error, never a runtime surprise.

use super::error::EncodeError;
use crate::config::{Backend, OutputMode};

/// One encoder the user can pick: display label, ffmpeg library id, and the
/// container extension its output defaults to.
#[derive(Debug, PartialEq, Eq)]
pub struct EncoderInfo {
    pub label: &'static str,
    pub id: &'static str,
    pub ext: &'static str,
}

const CPU_ENCODERS: &[EncoderInfo] = &[
    EncoderInfo { label: "AV1 (SVT-AV1, balanced)", id: "libsvtav1", ext: ".webm" },
    EncoderInfo { label: "AV1 (AOM, reference/slow)", id: "libaom-av1", ext: ".webm" },
    EncoderInfo { label: "AV1 (rav1e)", id: "librav1e", ext: ".webm" },
    EncoderInfo { label: "VP9", id: "libvpx-vp9", ext: ".webm" },
    EncoderInfo { label: "H.264 (fast)", id: "libx264", ext: ".mp4" },
    EncoderInfo { label: "H.265 (high efficiency)", id: "libx265", ext: ".mp4" },
];

const NVIDIA_ENCODERS: &[EncoderInfo] = &[
    EncoderInfo { label: "H.264 (NVENC)", id: "h264_nvenc", ext: ".mp4" },
    EncoderInfo { label: "HEVC (NVENC)", id: "hevc_nvenc", ext: ".mp4" },
    EncoderInfo { label: "AV1 (NVENC, RTX 40xx+)", id: "av1_nvenc", ext: ".webm" },
];

const AMD_ENCODERS: &[EncoderInfo] = &[
    EncoderInfo { label: "H.264 (AMF)", id: "h264_amf", ext: ".mp4" },
    EncoderInfo { label: "HEVC (AMF)", id: "hevc_amf", ext: ".mp4" },
    EncoderInfo { label: "AV1 (AMF, RX 7000+)", id: "av1_amf", ext: ".webm" },
];

const INTEL_ENCODERS: &[EncoderInfo] = &[
    EncoderInfo { label: "H.264 (QSV)", id: "h264_qsv", ext: ".mp4" },
    EncoderInfo { label: "HEVC (QSV)", id: "hevc_qsv", ext: ".mp4" },
    EncoderInfo { label: "VP9 (QSV)", id: "vp9_qsv", ext: ".webm" },
    EncoderInfo { label: "AV1 (QSV, Arc GPU)", id: "av1_qsv", ext: ".webm" },
];

/// Encoder catalog for a backend.
pub fn encoders_for(backend: Backend) -> &'static [EncoderInfo] {
    match backend {
        Backend::Cpu => CPU_ENCODERS,
        Backend::Nvidia => NVIDIA_ENCODERS,
        Backend::Amd => AMD_ENCODERS,
        Backend::Intel => INTEL_ENCODERS,
    }
}

/// Resolve the encoder for a job. AVIF output restricts the catalog to
/// AV1-family encoders; `None` picks the backend's first (recommended) entry.
pub fn select_encoder(
    backend: Backend,
    mode: OutputMode,
    codec_id: Option<&str>,
) -> Result<&'static EncoderInfo, EncodeError> {
    let candidates: Vec<&'static EncoderInfo> = encoders_for(backend)
        .iter()
        .filter(|e| mode != OutputMode::Avif || e.id.contains("av1"))
        .collect();

    match codec_id {
        None => candidates.first().copied().ok_or_else(|| {
            EncodeError::Config(format!("no encoder available for {backend:?} in {mode:?} mode"))
        }),
        Some(id) => candidates
            .iter()
            .find(|e| e.id == id)
            .copied()
            .ok_or_else(|| {
                EncodeError::Config(format!(
                    "codec {id:?} is not available for {backend:?} in {mode:?} mode (options: {})",
                    candidates.iter().map(|e| e.id).collect::<Vec<_>>().join(", ")
                ))
            }),
    }
}

/// How a codec family expresses "encode at this constant quality".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityStyle {
    /// `-crf N`
    Crf,
    /// `-crf N -b:v 0` (libvpx-vp9 needs the explicit zero bitrate)
    CrfZeroBitrate,
    /// `-rc vbr -cq N` (NVENC)
    NvencCq,
    /// `-rc cqp -qp_i N -qp_p N` (AMF)
    AmfCqp,
    /// `-global_quality N` (QSV)
    QsvGlobalQuality,
}

/// Affine mapping from the 0-10 quality slider onto a codec family's native
/// constant-quality range.
#[derive(Debug, Clone, Copy)]
pub struct QualityCurve {
    pub base: f64,
    pub step: f64,
}

impl QualityCurve {
    pub fn value(&self, slider: u8) -> u32 {
        (self.base + self.step * slider as f64) as u32
    }
}

/// Preset row for one (codec, backend) pair: the speed flag with its five
/// levels (fastest → slowest), always-on extra flags, and the quality curve.
#[derive(Debug)]
pub struct PresetEntry {
    pub speed_flag: &'static str,
    pub speed_levels: [&'static str; 5],
    pub extra_args: &'static [&'static str],
    pub quality: QualityCurve,
    pub style: QualityStyle,
}

impl PresetEntry {
    /// Speed arguments for a 0-4 quality level.
    pub fn speed_args(&self, level: u8) -> Vec<String> {
        let mut args = vec![
            self.speed_flag.to_string(),
            self.speed_levels[level as usize].to_string(),
        ];
        args.extend(self.extra_args.iter().map(|s| s.to_string()));
        args
    }

    /// Constant-quality arguments for a 0-10 CRF slider.
    pub fn quality_args(&self, slider: u8) -> Vec<String> {
        let n = self.quality.value(slider).to_string();
        match self.style {
            QualityStyle::Crf => vec!["-crf".into(), n],
            QualityStyle::CrfZeroBitrate => vec!["-crf".into(), n, "-b:v".into(), "0".into()],
            QualityStyle::NvencCq => vec!["-rc".into(), "vbr".into(), "-cq".into(), n],
            QualityStyle::AmfCqp => vec![
                "-rc".into(),
                "cqp".into(),
                "-qp_i".into(),
                n.clone(),
                "-qp_p".into(),
                n,
            ],
            QualityStyle::QsvGlobalQuality => vec!["-global_quality".into(), n],
        }
    }

    /// Extra rate-control plumbing for size-target mode. NVENC wants its
    /// rate controller pinned to vbr with the quality cap released.
    pub fn size_mode_args(&self) -> &'static [&'static str] {
        match self.style {
            QualityStyle::NvencCq => &["-rc", "vbr", "-cq", "0"],
            _ => &[],
        }
    }
}

const HW_CURVE: QualityCurve = QualityCurve { base: 19.0, step: 1.5 };

/// Look up the preset row for a (codec, backend) pair.
pub fn preset_for(codec_id: &str, backend: Backend) -> Result<&'static PresetEntry, EncodeError> {
    let entry = match (backend, codec_id) {
        (Backend::Cpu, "libvpx-vp9") => &PresetEntry {
            speed_flag: "-speed",
            speed_levels: ["8", "7", "6", "4", "1"],
            extra_args: &["-row-mt", "1", "-tile-columns", "2"],
            quality: QualityCurve { base: 20.0, step: 2.5 },
            style: QualityStyle::CrfZeroBitrate,
        },
        (Backend::Cpu, "libaom-av1") => &PresetEntry {
            speed_flag: "-cpu-used",
            speed_levels: ["8", "7", "6", "4", "3"],
            extra_args: &["-row-mt", "1", "-tiles", "2x2"],
            quality: QualityCurve { base: 20.0, step: 3.0 },
            style: QualityStyle::Crf,
        },
        (Backend::Cpu, "libsvtav1") => &PresetEntry {
            speed_flag: "-preset",
            speed_levels: ["12", "10", "8", "6", "4"],
            extra_args: &[],
            quality: QualityCurve { base: 20.0, step: 3.0 },
            style: QualityStyle::Crf,
        },
        (Backend::Cpu, "librav1e") => &PresetEntry {
            speed_flag: "-speed",
            speed_levels: ["10", "8", "6", "4", "2"],
            extra_args: &[],
            quality: QualityCurve { base: 60.0, step: 8.0 },
            style: QualityStyle::Crf,
        },
        (Backend::Cpu, "libx264") => &PresetEntry {
            speed_flag: "-preset",
            speed_levels: ["ultrafast", "veryfast", "faster", "medium", "veryslow"],
            extra_args: &[],
            quality: QualityCurve { base: 18.0, step: 1.5 },
            style: QualityStyle::Crf,
        },
        (Backend::Cpu, "libx265") => &PresetEntry {
            speed_flag: "-preset",
            speed_levels: ["ultrafast", "veryfast", "fast", "medium", "veryslow"],
            extra_args: &[],
            quality: QualityCurve { base: 20.0, step: 1.6 },
            style: QualityStyle::Crf,
        },
        (Backend::Nvidia, "h264_nvenc" | "hevc_nvenc" | "av1_nvenc") => &PresetEntry {
            speed_flag: "-preset",
            speed_levels: ["p1", "p2", "p4", "p6", "p7"],
            extra_args: &[],
            quality: HW_CURVE,
            style: QualityStyle::NvencCq,
        },
        (Backend::Amd, "h264_amf" | "hevc_amf") => &PresetEntry {
            speed_flag: "-quality",
            speed_levels: ["speed", "speed", "balanced", "quality", "quality"],
            extra_args: &[],
            quality: HW_CURVE,
            style: QualityStyle::AmfCqp,
        },
        (Backend::Amd, "av1_amf") => &PresetEntry {
            speed_flag: "-quality",
            speed_levels: ["speed", "balanced", "quality", "high_quality", "high_quality"],
            extra_args: &[],
            quality: HW_CURVE,
            style: QualityStyle::AmfCqp,
        },
        (Backend::Intel, "h264_qsv" | "hevc_qsv" | "vp9_qsv" | "av1_qsv") => &PresetEntry {
            speed_flag: "-preset",
            speed_levels: ["veryfast", "faster", "balanced", "slow", "veryslow"],
            extra_args: &[],
            quality: HW_CURVE,
            style: QualityStyle::QsvGlobalQuality,
        },
        _ => {
            return Err(EncodeError::Config(format!(
                "no preset mapping for codec {codec_id:?} on backend {backend:?}"
            )));
        }
    };
    Ok(entry)
}

/// Startup check: every (codec, backend) pair the catalog exposes must have
/// a preset row. Fails fast on gaps instead of surprising at encode time.
pub fn validate_registry() -> Result<(), EncodeError> {
    for backend in [Backend::Cpu, Backend::Nvidia, Backend::Amd, Backend::Intel] {
        for encoder in encoders_for(backend) {
            preset_for(encoder.id, backend)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_complete() {
        validate_registry().unwrap();
    }

    #[test]
    fn unknown_pair_is_a_config_error() {
        assert!(preset_for("libvpx-vp9", Backend::Nvidia).is_err());
        assert!(preset_for("made_up", Backend::Cpu).is_err());
    }

    #[test]
    fn software_quality_curves_hit_their_documented_ranges() {
        // slider endpoints per codec family
        let cases: &[(&str, u32, u32)] = &[
            ("libvpx-vp9", 20, 45),
            ("libaom-av1", 20, 50),
            ("libsvtav1", 20, 50),
            ("librav1e", 60, 140),
            ("libx264", 18, 33),
            ("libx265", 20, 36),
        ];
        for &(id, low, high) in cases {
            let entry = preset_for(id, Backend::Cpu).unwrap();
            assert_eq!(entry.quality.value(0), low, "{id} at slider 0");
            assert_eq!(entry.quality.value(10), high, "{id} at slider 10");
        }
    }

    #[test]
    fn hardware_quality_curve_spans_19_to_34() {
        let entry = preset_for("h264_nvenc", Backend::Nvidia).unwrap();
        assert_eq!(entry.quality.value(0), 19);
        assert_eq!(entry.quality.value(10), 34);
    }

    #[test]
    fn vpx_quality_mode_pins_bitrate_to_zero() {
        let entry = preset_for("libvpx-vp9", Backend::Cpu).unwrap();
        let args = entry.quality_args(4);
        assert_eq!(args, vec!["-crf", "30", "-b:v", "0"]);
    }

    #[test]
    fn amf_emits_both_qp_flags() {
        let entry = preset_for("hevc_amf", Backend::Amd).unwrap();
        let args = entry.quality_args(0);
        assert_eq!(args, vec!["-rc", "cqp", "-qp_i", "19", "-qp_p", "19"]);
    }

    #[test]
    fn speed_levels_run_fastest_to_slowest() {
        let entry = preset_for("libsvtav1", Backend::Cpu).unwrap();
        assert_eq!(entry.speed_args(0), vec!["-preset", "12"]);
        assert_eq!(entry.speed_args(4), vec!["-preset", "4"]);

        let vp9 = preset_for("libvpx-vp9", Backend::Cpu).unwrap();
        assert_eq!(
            vp9.speed_args(2),
            vec!["-speed", "6", "-row-mt", "1", "-tile-columns", "2"]
        );
    }

    #[test]
    fn avif_selection_filters_non_av1() {
        let e = select_encoder(Backend::Cpu, OutputMode::Avif, None).unwrap();
        assert!(e.id.contains("av1"));
        assert!(select_encoder(Backend::Cpu, OutputMode::Avif, Some("libx265")).is_err());
    }

    #[test]
    fn default_selection_is_first_catalog_entry() {
        assert_eq!(
            select_encoder(Backend::Nvidia, OutputMode::Video, None).unwrap().id,
            "h264_nvenc"
        );
    }
}
