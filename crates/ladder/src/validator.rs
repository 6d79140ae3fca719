use log::debug;
use serde::Serialize;
use crate::config::{QualityTarget, ValidationPolicy};
use crate::error::ValidationError;
use crate::inspector::StreamInfo;

/// Inclusive bitrate range in bits/sec
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BitrateBand {
    pub min_bps: f64,
    pub max_bps: f64,
}

impl BitrateBand {
    pub fn contains(&self, bps: u64) -> bool {
        let bps = bps as f64;
        bps >= self.min_bps && bps <= self.max_bps
    }
}

impl std::fmt::Display for BitrateBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.0}-{:.0} bps", self.min_bps, self.max_bps)
    }
}

impl ValidationPolicy {
    /// Accepted video bitrate range for a target.
    ///
    /// Lower bound is capped so high-bitrate rungs still accept efficient sources.
    pub fn video_band(&self, target_kbps: u32) -> BitrateBand {
        let target_bps = target_kbps as f64 * 1000.0;
        BitrateBand {
            min_bps: (target_bps * self.video_bitrate_min_ratio).min(self.video_bitrate_floor_cap_bps as f64),
            max_bps: target_bps * self.video_bitrate_max_ratio,
        }
    }

    pub fn audio_band(&self, target_kbps: u32) -> BitrateBand {
        let target_bps = target_kbps as f64 * 1000.0;
        BitrateBand {
            min_bps: target_bps * self.audio_bitrate_min_ratio,
            max_bps: target_bps * self.audio_bitrate_max_ratio,
        }
    }

    fn accepts_video_codec(&self, codec: &str) -> bool {
        self.accepted_video_codecs.iter().any(|c| c.eq_ignore_ascii_case(codec))
    }

    fn accepts_audio_codec(&self, codec: &str) -> bool {
        self.accepted_audio_codecs.iter().any(|c| c.eq_ignore_ascii_case(codec))
    }
}

/// Outcome of every individual check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidationChecks {
    pub video_codec: bool,
    pub resolution: bool,
    pub container: bool,
    pub video_bitrate: bool,
    pub audio_codec: bool,
    pub audio_bitrate: bool,
}

impl ValidationChecks {
    pub fn video_valid(&self) -> bool {
        self.video_codec && self.resolution && self.container && self.video_bitrate
    }

    pub fn audio_valid(&self) -> bool {
        self.audio_codec && self.audio_bitrate
    }

    /// Names of failed checks, in declaration order
    pub fn failed(&self) -> Vec<&'static str> {
        [
            ("video_codec", self.video_codec),
            ("resolution", self.resolution),
            ("container", self.container),
            ("video_bitrate", self.video_bitrate),
            ("audio_codec", self.audio_codec),
            ("audio_bitrate", self.audio_bitrate),
        ]
        .into_iter()
        .filter(|(_, passed)| !passed)
        .map(|(name, _)| name)
        .collect()
    }

    fn all_failed() -> Self {
        Self {
            video_codec: false,
            resolution: false,
            container: false,
            video_bitrate: false,
            audio_codec: false,
            audio_bitrate: false,
        }
    }
}

/// Whether a source meets one rung closely enough to skip re-encoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationVerdict {
    checks: ValidationChecks,
    video_valid: bool,
    audio_valid: bool,
    can_copy_video: bool,
    needs_video_transcoding: bool,
    needs_audio_transcoding: bool,
    is_valid: bool,
    needs_transcoding: bool,
    reason: Option<String>,
}

impl ValidationVerdict {
    fn from_checks(checks: ValidationChecks, reason: impl FnOnce(&ValidationChecks, bool, bool, bool) -> String) -> Self {
        let video_valid = checks.video_valid();
        let audio_valid = checks.audio_valid();
        let is_valid = video_valid && audio_valid;
        let can_copy_video = video_valid && checks.container;
        let needs_video_transcoding = !video_valid;
        let needs_audio_transcoding = !audio_valid;

        let reason = if is_valid {
            None
        } else {
            Some(reason(&checks, can_copy_video, needs_video_transcoding, needs_audio_transcoding))
        };

        Self {
            checks,
            video_valid,
            audio_valid,
            can_copy_video,
            needs_video_transcoding,
            needs_audio_transcoding,
            is_valid,
            needs_transcoding: !is_valid,
            reason,
        }
    }

    /// Verdict for a rung that couldn't be analyzed: assume the worst, transcode
    pub fn analysis_failed(message: impl std::fmt::Display) -> Self {
        Self {
            checks: ValidationChecks::all_failed(),
            video_valid: false,
            audio_valid: false,
            can_copy_video: false,
            needs_video_transcoding: true,
            needs_audio_transcoding: true,
            is_valid: false,
            needs_transcoding: true,
            reason: Some(format!("Error analyzing video: {}", message)),
        }
    }

    pub fn checks(&self) -> &ValidationChecks {
        &self.checks
    }

    pub fn video_valid(&self) -> bool {
        self.video_valid
    }

    pub fn audio_valid(&self) -> bool {
        self.audio_valid
    }

    pub fn can_copy_video(&self) -> bool {
        self.can_copy_video
    }

    pub fn needs_video_transcoding(&self) -> bool {
        self.needs_video_transcoding
    }

    pub fn needs_audio_transcoding(&self) -> bool {
        self.needs_audio_transcoding
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn needs_transcoding(&self) -> bool {
        self.needs_transcoding
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// Something that can judge one rung against a source.
///
/// The aggregator is written against this so a rung that can't be analyzed
/// shows up as an error verdict instead of aborting the ladder.
pub trait RungValidator {
    fn validate_rung(&self, info: &StreamInfo, target: &QualityTarget) -> Result<ValidationVerdict, ValidationError>;
}

/// Compares a source against ladder rungs using a [`ValidationPolicy`]
pub struct QualityValidator<'a> {
    policy: &'a ValidationPolicy,
}

impl<'a> QualityValidator<'a> {
    pub fn new(policy: &'a ValidationPolicy) -> Self {
        QualityValidator { policy }
    }

    /// Validate one rung. Never fails; failed checks end up in the verdict.
    pub fn validate(&self, info: &StreamInfo, target: &QualityTarget) -> ValidationVerdict {
        let policy = self.policy;
        let video = &info.video;

        let video_codec = policy.accepts_video_codec(&video.codec);

        let height_diff = video.height.abs_diff(target.height);
        let width_diff = target.width.map(|w| video.width.abs_diff(w)).unwrap_or(0);
        let resolution = height_diff <= policy.resolution_tolerance_px
            && width_diff <= policy.resolution_tolerance_px;

        let container = info.container_format.contains(policy.required_container.as_str());

        // Missing metadata isn't non-compliance
        let video_band = policy.video_band(target.video_bitrate_kbps);
        let video_bitrate = video
            .known_bitrate_bps()
            .map(|bps| video_band.contains(bps))
            .unwrap_or(true);

        let audio_band = policy.audio_band(target.audio_bitrate_kbps);
        let (audio_codec, audio_bitrate) = match &info.audio {
            Some(audio) => (
                policy.accepts_audio_codec(&audio.codec),
                audio.known_bitrate_bps().map(|bps| audio_band.contains(bps)).unwrap_or(true),
            ),
            None => (true, true),
        };

        let checks = ValidationChecks {
            video_codec,
            resolution,
            container,
            video_bitrate,
            audio_codec,
            audio_bitrate,
        };

        let verdict = ValidationVerdict::from_checks(checks, |checks, can_copy, needs_video, needs_audio| {
            let target_resolution = match target.width {
                Some(w) => format!("{}x{}", w, target.height),
                None => format!("auto x{}", target.height),
            };
            let source_bitrate = video
                .known_bitrate_bps()
                .map(|bps| format!("{} bps", bps))
                .unwrap_or_else(|| "unknown".to_string());

            let mut parts = vec![
                format!("Failed checks: {}", checks.failed().join(", ")),
                format!("resolution: source {}, target {}", info.resolution(), target_resolution),
                format!(
                    "video bitrate: source {}, target {} bps (allowed {})",
                    source_bitrate,
                    target.video_bitrate_kbps as u64 * 1000,
                    video_band
                ),
            ];
            if let Some(audio) = &info.audio {
                let audio_bitrate = audio
                    .known_bitrate_bps()
                    .map(|bps| format!("{} bps", bps))
                    .unwrap_or_else(|| "unknown".to_string());
                parts.push(format!(
                    "audio: source {} {}, target {} bps (allowed {})",
                    audio.codec,
                    audio_bitrate,
                    target.audio_bitrate_kbps as u64 * 1000,
                    audio_band
                ));
            }
            parts.push(format!("container: {}", info.container_format));
            parts.push(format!(
                "can_copy_video={}, needs_video_transcoding={}, needs_audio_transcoding={}",
                can_copy, needs_video, needs_audio
            ));
            parts.join(" | ")
        });

        debug!(
            "Rung {}: valid={}, video_valid={}, audio_valid={}",
            target.label(),
            verdict.is_valid(),
            verdict.video_valid(),
            verdict.audio_valid()
        );

        verdict
    }
}

impl RungValidator for QualityValidator<'_> {
    fn validate_rung(&self, info: &StreamInfo, target: &QualityTarget) -> Result<ValidationVerdict, ValidationError> {
        if target.height == 0 || target.video_bitrate_kbps == 0 {
            return Err(ValidationError::InvalidTarget {
                label: target.label(),
                message: "height and video bitrate must be non-zero".to_string(),
            });
        }
        if info.video.width == 0 || info.video.height == 0 {
            return Err(ValidationError::UnreadableSource(format!(
                "video stream {} reports {}",
                info.video.index,
                info.resolution()
            )));
        }
        Ok(self.validate(info, target))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::inspector::{AudioStream, VideoStream};
    use proptest::prelude::*;

    pub(crate) fn source(
        codec: &str,
        width: u32,
        height: u32,
        bitrate_bps: Option<u64>,
        audio: Option<(&str, Option<u64>)>,
    ) -> StreamInfo {
        StreamInfo {
            container_format: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            duration_seconds: 600.0,
            video: VideoStream {
                index: 0,
                codec: codec.to_string(),
                width,
                height,
                bitrate_bps,
                frame_rate: Some(30.0),
            },
            audio: audio.map(|(codec, bitrate_bps)| AudioStream {
                index: 1,
                codec: codec.to_string(),
                bitrate_bps,
                channels: Some(2),
            }),
            audio_streams: if audio.is_some() { vec![1] } else { vec![] },
            subtitle_streams: vec![],
        }
    }

    fn target_720() -> QualityTarget {
        QualityTarget::new(720, Some(1280), 2500, 128)
    }

    #[test]
    fn test_compliant_source_is_valid() {
        let policy = ValidationPolicy::default();
        let validator = QualityValidator::new(&policy);
        let info = source("h264", 1280, 720, Some(2_400_000), Some(("aac", Some(128_000))));

        let verdict = validator.validate(&info, &target_720());
        assert!(verdict.is_valid());
        assert!(!verdict.needs_transcoding());
        assert!(verdict.can_copy_video());
        assert!(!verdict.needs_video_transcoding());
        assert!(!verdict.needs_audio_transcoding());
        assert!(verdict.reason().is_none());
    }

    #[test]
    fn test_resolution_tolerance_boundary() {
        let policy = ValidationPolicy::default();
        let validator = QualityValidator::new(&policy);
        let target = QualityTarget::new(720, None, 2500, 128);

        let at_722 = validator.validate(&source("h264", 1280, 722, None, None), &target);
        assert!(at_722.checks().resolution);

        let at_723 = validator.validate(&source("h264", 1280, 723, None, None), &target);
        assert!(!at_723.checks().resolution);
        assert!(at_723.needs_video_transcoding());

        let at_718 = validator.validate(&source("h264", 1280, 718, None, None), &target);
        assert!(at_718.checks().resolution);
    }

    #[test]
    fn test_width_checked_only_when_set() {
        let policy = ValidationPolicy::default();
        let validator = QualityValidator::new(&policy);
        let info = source("h264", 960, 720, None, None);

        assert!(!validator.validate(&info, &target_720()).checks().resolution);
        let height_only = QualityTarget::new(720, None, 2500, 128);
        assert!(validator.validate(&info, &height_only).checks().resolution);
    }

    #[test]
    fn test_codec_and_container_checks() {
        let policy = ValidationPolicy::default();
        let validator = QualityValidator::new(&policy);

        let hevc = validator.validate(&source("hevc", 1280, 720, None, None), &target_720());
        assert!(!hevc.checks().video_codec);
        assert!(!hevc.can_copy_video());

        let mut mkv = source("h264", 1280, 720, None, None);
        mkv.container_format = "matroska,webm".to_string();
        let verdict = validator.validate(&mkv, &target_720());
        assert!(!verdict.checks().container);
        assert!(!verdict.video_valid());
        assert!(!verdict.can_copy_video());

        let opus = validator.validate(&source("h264", 1280, 720, None, Some(("opus", None))), &target_720());
        assert!(!opus.checks().audio_codec);
        assert!(opus.video_valid());
        assert!(opus.needs_audio_transcoding());
        assert!(!opus.needs_video_transcoding());
        assert!(opus.needs_transcoding());
    }

    #[test]
    fn test_video_bitrate_band() {
        let policy = ValidationPolicy::default();
        let validator = QualityValidator::new(&policy);

        // 5000 kbps target: lower bound capped at 1 Mbps, upper 15 Mbps
        let band = policy.video_band(5000);
        assert_eq!(band.min_bps, 1_000_000.0);
        assert_eq!(band.max_bps, 15_000_000.0);

        // 1000 kbps target: lower bound 20% = 200 kbps
        let band = policy.video_band(1000);
        assert_eq!(band.min_bps, 200_000.0);
        assert_eq!(band.max_bps, 3_000_000.0);

        let target = QualityTarget::new(1080, Some(1920), 5000, 192);
        let low = validator.validate(&source("h264", 1920, 1080, Some(999_999), None), &target);
        assert!(!low.checks().video_bitrate);
        let edge = validator.validate(&source("h264", 1920, 1080, Some(1_000_000), None), &target);
        assert!(edge.checks().video_bitrate);
        let top = validator.validate(&source("h264", 1920, 1080, Some(15_000_000), None), &target);
        assert!(top.checks().video_bitrate);
        let high = validator.validate(&source("h264", 1920, 1080, Some(15_000_001), None), &target);
        assert!(!high.checks().video_bitrate);
    }

    #[test]
    fn test_audio_bitrate_band() {
        let policy = ValidationPolicy::default();
        let validator = QualityValidator::new(&policy);
        let target = target_720();

        let ok = validator.validate(&source("h264", 1280, 720, None, Some(("mp3", Some(64_000)))), &target);
        assert!(ok.checks().audio_bitrate);
        let low = validator.validate(&source("h264", 1280, 720, None, Some(("aac", Some(63_999)))), &target);
        assert!(!low.checks().audio_bitrate);
        let high = validator.validate(&source("h264", 1280, 720, None, Some(("aac", Some(256_001)))), &target);
        assert!(!high.checks().audio_bitrate);
    }

    #[test]
    fn test_no_audio_is_audio_valid() {
        let policy = ValidationPolicy::default();
        let validator = QualityValidator::new(&policy);
        let verdict = validator.validate(&source("h264", 1280, 720, None, None), &target_720());
        assert!(verdict.audio_valid());
        assert!(verdict.checks().audio_codec);
        assert!(verdict.checks().audio_bitrate);
    }

    #[test]
    fn test_reason_lists_failures_and_measurements() {
        let policy = ValidationPolicy::default();
        let validator = QualityValidator::new(&policy);
        let info = source("hevc", 1920, 1080, Some(20_000_000), Some(("aac", Some(128_000))));

        let verdict = validator.validate(&info, &target_720());
        let reason = verdict.reason().unwrap();
        assert!(reason.starts_with("Failed checks: video_codec, resolution, video_bitrate |"));
        assert!(reason.contains("resolution: source 1920x1080, target 1280x720"));
        assert!(reason.contains("video bitrate: source 20000000 bps, target 2500000 bps (allowed 500000-7500000 bps)"));
        assert!(reason.contains("container: mov,mp4,m4a,3gp,3g2,mj2"));
        assert!(reason.ends_with("can_copy_video=false, needs_video_transcoding=true, needs_audio_transcoding=false"));
    }

    #[test]
    fn test_analysis_failed_verdict() {
        let verdict = ValidationVerdict::analysis_failed("probe exploded");
        assert!(!verdict.is_valid());
        assert!(verdict.needs_transcoding());
        assert!(verdict.needs_video_transcoding());
        assert!(!verdict.can_copy_video());
        assert_eq!(verdict.reason(), Some("Error analyzing video: probe exploded"));
    }

    #[test]
    fn test_rung_validator_rejects_degenerate_target() {
        let policy = ValidationPolicy::default();
        let validator = QualityValidator::new(&policy);
        let info = source("h264", 1280, 720, None, None);
        let bad = QualityTarget::new(0, None, 2500, 128);
        assert!(matches!(
            validator.validate_rung(&info, &bad),
            Err(ValidationError::InvalidTarget { .. })
        ));
        assert!(validator.validate_rung(&info, &target_720()).is_ok());
    }

    #[test]
    fn test_rung_validator_rejects_dimensionless_source() {
        let policy = ValidationPolicy::default();
        let validator = QualityValidator::new(&policy);
        let info = source("h264", 0, 720, None, None);
        match validator.validate_rung(&info, &target_720()) {
            Err(ValidationError::UnreadableSource(msg)) => assert_eq!(msg, "video stream 0 reports 0x720"),
            other => panic!("Expected unreadable source, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_policy_is_honored() {
        let policy = ValidationPolicy {
            resolution_tolerance_px: 0,
            accepted_video_codecs: vec!["hevc".to_string()],
            ..ValidationPolicy::default()
        };
        let validator = QualityValidator::new(&policy);
        let verdict = validator.validate(&source("HEVC", 1280, 721, None, None), &target_720());
        assert!(verdict.checks().video_codec);
        assert!(!verdict.checks().resolution);
    }

    fn arb_source() -> impl Strategy<Value = StreamInfo> {
        (
            prop_oneof![Just("h264"), Just("hevc"), Just("libx264"), Just("vp9")],
            100u32..4000,
            100u32..2500,
            prop::option::of(0u64..40_000_000),
            prop::option::of((prop_oneof![Just("aac"), Just("mp3"), Just("opus")], prop::option::of(0u64..600_000))),
        )
            .prop_map(|(codec, w, h, br, audio)| source(codec, w, h, br, audio))
    }

    fn arb_target() -> impl Strategy<Value = QualityTarget> {
        (144u32..2200, prop::option::of(200u32..4000), 100u32..20_000, 32u32..512)
            .prop_map(|(h, w, vb, ab)| QualityTarget::new(h, w, vb, ab))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Derived flags always agree with the individual checks
        #[test]
        fn prop_verdict_invariants(info in arb_source(), target in arb_target()) {
            let policy = ValidationPolicy::default();
            let verdict = QualityValidator::new(&policy).validate(&info, &target);

            prop_assert_eq!(verdict.is_valid(), verdict.video_valid() && verdict.audio_valid());
            prop_assert_eq!(verdict.needs_transcoding(), !verdict.is_valid());
            prop_assert_eq!(verdict.can_copy_video(), verdict.video_valid() && verdict.checks().container);
            prop_assert_eq!(verdict.reason().is_some(), !verdict.is_valid());
        }

        /// Same inputs, same verdict
        #[test]
        fn prop_validation_is_deterministic(info in arb_source(), target in arb_target()) {
            let policy = ValidationPolicy::default();
            let validator = QualityValidator::new(&policy);
            prop_assert_eq!(validator.validate(&info, &target), validator.validate(&info, &target));
        }

        /// Sources within ±2 px of the target height pass, ±3 or more fail
        #[test]
        fn prop_resolution_tolerance(height in 10u32..2200, offset in -6i64..=6) {
            let policy = ValidationPolicy::default();
            let target = QualityTarget::new(height, None, 2500, 128);
            let src_height = (height as i64 + offset) as u32;
            let verdict = QualityValidator::new(&policy)
                .validate(&source("h264", 1280, src_height, None, None), &target);
            prop_assert_eq!(verdict.checks().resolution, offset.abs() <= 2);
        }

        /// Missing or zero bitrates never fail the bitrate checks
        #[test]
        fn prop_bitrate_absence_is_permissive(
            target in arb_target(),
            video_br in prop_oneof![Just(None), Just(Some(0u64))],
            audio_br in prop_oneof![Just(None), Just(Some(0u64))],
        ) {
            let policy = ValidationPolicy::default();
            let info = source("h264", 1280, 720, video_br, Some(("aac", audio_br)));
            let verdict = QualityValidator::new(&policy).validate(&info, &target);
            prop_assert!(verdict.checks().video_bitrate);
            prop_assert!(verdict.checks().audio_bitrate);
        }
    }
}
