//! Stream inspection: turns a probe result into a typed [`StreamInfo`].

use std::path::Path;
use std::time::Duration;
use log::{debug, info};
use serde::Serialize;
use crate::config::PipelineConfig;
use crate::error::InspectError;
use crate::ffprobe::{self, FFProbeData, FFProbeStream};

/// Codec used by cover-art / thumbnail streams
const COVER_ART_CODEC: &str = "mjpeg";

/// Subtitle codecs that are bitmaps and can't become MP4 text subtitles
const BITMAP_SUBTITLE_CODECS: &[&str] = &["hdmv_pgs_subtitle", "dvd_subtitle", "dvb_subtitle", "xsub"];

/// Primary video stream of the source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoStream {
    pub index: u32,
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub bitrate_bps: Option<u64>,
    pub frame_rate: Option<f64>,
}

impl VideoStream {
    /// Measured bitrate, treating 0 as unknown
    pub fn known_bitrate_bps(&self) -> Option<u64> {
        self.bitrate_bps.filter(|bps| *bps > 0)
    }
}

/// Primary audio stream of the source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioStream {
    pub index: u32,
    pub codec: String,
    pub bitrate_bps: Option<u64>,
    pub channels: Option<u32>,
}

impl AudioStream {
    pub fn known_bitrate_bps(&self) -> Option<u64> {
        self.bitrate_bps.filter(|bps| *bps > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtitleStream {
    pub index: u32,
    pub codec: String,
}

impl SubtitleStream {
    pub fn is_text(&self) -> bool {
        !BITMAP_SUBTITLE_CODECS.contains(&self.codec.as_str())
    }
}

/// What the pipeline knows about a source file. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamInfo {
    pub container_format: String,
    pub duration_seconds: f64,
    pub video: VideoStream,
    pub audio: Option<AudioStream>,
    /// Indices of every audio stream, primary first
    pub audio_streams: Vec<u32>,
    pub subtitle_streams: Vec<SubtitleStream>,
}

impl StreamInfo {
    /// Build from a parsed probe result.
    ///
    /// Fails with [`InspectError::NoVideoStream`] when every video stream is
    /// missing or is cover art.
    pub fn from_probe(data: &FFProbeData) -> Result<Self, InspectError> {
        let video = data
            .streams
            .iter()
            .find(|s| is_primary_video_candidate(s))
            .ok_or(InspectError::NoVideoStream)?;

        let audio = data.streams.iter().find(|s| s.is_type("audio"));

        let audio_streams = data
            .streams
            .iter()
            .filter(|s| s.is_type("audio"))
            .map(|s| s.index)
            .collect();

        let subtitle_streams = data
            .streams
            .iter()
            .filter(|s| s.is_type("subtitle"))
            .map(|s| SubtitleStream {
                index: s.index,
                codec: codec_of(s),
            })
            .collect();

        Ok(StreamInfo {
            container_format: data.format.format_name.clone(),
            duration_seconds: data.format.duration_secs().unwrap_or(0.0),
            video: VideoStream {
                index: video.index,
                codec: codec_of(video),
                width: video.width.unwrap_or(0),
                height: video.height.unwrap_or(0),
                bitrate_bps: video.bitrate_bps(),
                frame_rate: video.frame_rate(),
            },
            audio: audio.map(|a| AudioStream {
                index: a.index,
                codec: codec_of(a),
                bitrate_bps: a.bitrate_bps(),
                channels: a.channels,
            }),
            audio_streams,
            subtitle_streams,
        })
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.video.width, self.video.height)
    }
}

fn is_primary_video_candidate(stream: &FFProbeStream) -> bool {
    stream.is_type("video")
        && stream.codec_name.as_deref() != Some(COVER_ART_CODEC)
        && !stream.is_attached_picture()
}

fn codec_of(stream: &FFProbeStream) -> String {
    stream.codec_name.clone().unwrap_or_default().to_lowercase()
}

/// Probe a file and build its [`StreamInfo`]
pub async fn inspect(cfg: &PipelineConfig, file_path: &Path) -> Result<StreamInfo, InspectError> {
    let timeout = Duration::from_secs(cfg.probe_timeout_secs);
    let data = ffprobe::probe_file(&cfg.ffprobe_bin, file_path, timeout).await?;
    let info = StreamInfo::from_probe(&data)?;

    info!(
        "🔍 Inspected {}: {} {} in {}, audio: {}, subtitles: {}",
        file_path.display(),
        info.video.codec,
        info.resolution(),
        info.container_format,
        info.audio.as_ref().map(|a| a.codec.as_str()).unwrap_or("none"),
        info.subtitle_streams.len()
    );
    debug!("Stream info: {:?}", info);

    Ok(info)
}
