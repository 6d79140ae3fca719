use log::debug;
use serde::Serialize;
use crate::config::{EncodeProfile, QualityProfile, QualityTarget};
use crate::inspector::{StreamInfo, SubtitleStream};
use crate::validator::ValidationVerdict;

const VIDEO_ENCODER: &str = "libx264";
const AUDIO_ENCODER: &str = "aac";
const AUDIO_CHANNELS: u32 = 2;
const SUBTITLE_ENCODER: &str = "mov_text";
/// 4:2:0 plays everywhere
const PIXEL_FORMAT: &str = "yuv420p";

/// How the video stream of a rung is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum VideoMode {
    /// Bitstream copy, no re-encode
    Copy,
    Transcode { tier: QualityProfile },
}

/// Encoder options for one rung, grouped by stream type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodeParameterSet {
    pub video_mode: VideoMode,
    pub video: Vec<String>,
    pub audio: Vec<String>,
    pub subtitle: Vec<String>,
}

impl EncodeParameterSet {
    pub fn is_stream_copy(&self) -> bool {
        self.video_mode == VideoMode::Copy
    }

    /// Video, then audio, then subtitle options
    pub fn tokens(&self) -> Vec<String> {
        self.video
            .iter()
            .chain(self.audio.iter())
            .chain(self.subtitle.iter())
            .cloned()
            .collect()
    }
}

/// Everything needed to build one rung's parameters
#[derive(Debug, Clone, Copy)]
pub struct RungRequest<'a> {
    pub target: &'a QualityTarget,
    /// Position in the produced ladder, 0 = lowest
    pub rung_index: usize,
    pub ladder_len: usize,
    pub video_stream_index: u32,
    pub audio_streams: &'a [u32],
    pub subtitle_streams: &'a [SubtitleStream],
    /// Source description, when available
    pub original: Option<&'a StreamInfo>,
    /// This rung matches the source's own resolution
    pub is_original_resolution: bool,
    pub verdict: &'a ValidationVerdict,
}

impl RungRequest<'_> {
    fn is_top_rung(&self) -> bool {
        self.ladder_len > 0 && self.rung_index + 1 == self.ladder_len
    }
}

/// Builds ffmpeg output options for ladder rungs
pub struct ParameterBuilder<'a> {
    profile: &'a EncodeProfile,
}

impl<'a> ParameterBuilder<'a> {
    pub fn new(profile: &'a EncodeProfile) -> Self {
        ParameterBuilder { profile }
    }

    pub fn build(&self, req: &RungRequest<'_>) -> EncodeParameterSet {
        let (video_mode, video) = self.video_options(req);
        let audio = audio_options(req);
        let subtitle = subtitle_options(req);

        debug!(
            "Rung {}: {:?}, {} video / {} audio / {} subtitle tokens",
            req.target.label(),
            video_mode,
            video.len(),
            audio.len(),
            subtitle.len()
        );

        EncodeParameterSet {
            video_mode,
            video,
            audio,
            subtitle,
        }
    }

    /// Only the top rung may use the high tier, and only when it's enabled
    pub fn tier_for(&self, req: &RungRequest<'_>) -> QualityProfile {
        if req.is_top_rung() && self.profile.active_quality_profile == QualityProfile::High {
            QualityProfile::High
        } else {
            QualityProfile::Standard
        }
    }

    fn video_options(&self, req: &RungRequest<'_>) -> (VideoMode, Vec<String>) {
        let map = format!("0:{}", req.video_stream_index);

        if !req.verdict.needs_video_transcoding() && req.is_original_resolution && req.original.is_some() {
            return (
                VideoMode::Copy,
                vec!["-map".to_string(), map, "-c:v".to_string(), "copy".to_string()],
            );
        }

        let tier = self.tier_for(req);
        let target = req.target;

        let scale = match target.width {
            Some(width) => format!("scale={}:{}", width, target.height),
            // -2 keeps the aspect ratio with an even width
            None => format!("scale=-2:{}", target.height),
        };

        let rate = format!("{}k", capped_video_kbps(req));

        let args = vec![
            "-map".to_string(),
            map,
            "-c:v".to_string(),
            VIDEO_ENCODER.to_string(),
            "-profile:v".to_string(),
            self.profile.profile.get(tier).clone(),
            "-crf".to_string(),
            self.profile.crf.get(tier).to_string(),
            "-vf".to_string(),
            scale,
            "-pix_fmt".to_string(),
            PIXEL_FORMAT.to_string(),
            "-maxrate".to_string(),
            rate.clone(),
            "-bufsize".to_string(),
            rate,
        ];

        (VideoMode::Transcode { tier }, args)
    }
}

/// Rate cap in kbps. On the source's own resolution, never exceed what the source used.
///
/// The source rate is rounded to the nearest kbps; anything under 1 kbps caps at `1k`.
pub fn capped_video_kbps(req: &RungRequest<'_>) -> u64 {
    let target_kbps = req.target.video_bitrate_kbps as u64;
    if !req.is_original_resolution {
        return target_kbps;
    }

    match req.original.and_then(|info| info.video.known_bitrate_bps()) {
        Some(bps) => source_kbps(bps).min(target_kbps),
        None => target_kbps,
    }
}

fn source_kbps(bps: u64) -> u64 {
    (bps.saturating_add(500) / 1000).max(1)
}

fn audio_options(req: &RungRequest<'_>) -> Vec<String> {
    if req.audio_streams.is_empty() {
        return Vec::new();
    }

    let mut args = Vec::new();
    for index in req.audio_streams {
        args.push("-map".to_string());
        args.push(format!("0:{}", index));
    }
    args.push("-c:a".to_string());
    args.push(AUDIO_ENCODER.to_string());
    args.push("-ac".to_string());
    args.push(AUDIO_CHANNELS.to_string());
    args.push("-b:a".to_string());
    args.push(format!("{}k", req.target.audio_bitrate_kbps));
    args
}

fn subtitle_options(req: &RungRequest<'_>) -> Vec<String> {
    let text_streams: Vec<&SubtitleStream> = req.subtitle_streams.iter().filter(|s| s.is_text()).collect();

    // Say so explicitly; the muxer default differs between ffmpeg versions
    if text_streams.is_empty() {
        return vec!["-sn".to_string()];
    }

    let mut args = Vec::new();
    for stream in text_streams {
        args.push("-map".to_string());
        args.push(format!("0:{}", stream.index));
    }
    args.push("-c:s".to_string());
    args.push(SUBTITLE_ENCODER.to_string());
    args
}
