use std::env;
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One rung of the quality ladder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityTarget {
    /// Output height in pixels
    pub height: u32,
    /// Output width in pixels; `None` keeps the source aspect ratio
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Target video bitrate in kbps
    pub video_bitrate_kbps: u32,
    /// Target audio bitrate in kbps
    pub audio_bitrate_kbps: u32,
}

impl QualityTarget {
    pub fn new(height: u32, width: Option<u32>, video_bitrate_kbps: u32, audio_bitrate_kbps: u32) -> Self {
        Self {
            height,
            width,
            video_bitrate_kbps,
            audio_bitrate_kbps,
        }
    }

    /// Short display label, e.g. `720p`
    pub fn label(&self) -> String {
        format!("{}p", self.height)
    }
}

/// Ordered set of target qualities, ascending by height
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualityLadder {
    pub rungs: Vec<QualityTarget>,
}

impl QualityLadder {
    pub fn new(rungs: Vec<QualityTarget>) -> Self {
        Self { rungs }
    }

    pub fn len(&self) -> usize {
        self.rungs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rungs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QualityTarget> {
        self.rungs.iter()
    }
}

impl Default for QualityLadder {
    fn default() -> Self {
        Self::new(vec![
            QualityTarget::new(480, Some(854), 1000, 128),
            QualityTarget::new(720, Some(1280), 2500, 128),
            QualityTarget::new(1080, Some(1920), 5000, 192),
        ])
    }
}

/// Encode quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityProfile {
    Standard,
    High,
}

impl std::fmt::Display for QualityProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityProfile::Standard => write!(f, "standard"),
            QualityProfile::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for QualityProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "standard" => Ok(QualityProfile::Standard),
            "high" => Ok(QualityProfile::High),
            other => anyhow::bail!("Unknown quality profile: {} (expected \"standard\" or \"high\")", other),
        }
    }
}

/// A value per quality tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSettings<T> {
    pub standard: T,
    pub high: T,
}

impl<T> TierSettings<T> {
    pub fn get(&self, tier: QualityProfile) -> &T {
        match tier {
            QualityProfile::Standard => &self.standard,
            QualityProfile::High => &self.high,
        }
    }
}

/// Global, rung-independent encode settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeProfile {
    /// Which tier the top rung may use
    pub active_quality_profile: QualityProfile,
    /// x264 constant rate factor per tier
    pub crf: TierSettings<u8>,
    /// H.264 profile per tier (e.g. "main", "high")
    pub profile: TierSettings<String>,
}

impl Default for EncodeProfile {
    fn default() -> Self {
        Self {
            active_quality_profile: QualityProfile::Standard,
            crf: TierSettings { standard: 23, high: 18 },
            profile: TierSettings {
                standard: "main".to_string(),
                high: "high".to_string(),
            },
        }
    }
}

/// Tolerances and accepted sets used by the quality validator.
///
/// The bands are empirically chosen; they are policy, not derived limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    /// Max pixel difference per dimension
    pub resolution_tolerance_px: u32,
    /// Lower video bound as a fraction of the target bitrate
    pub video_bitrate_min_ratio: f64,
    /// Lower video bound never exceeds this many bits/sec
    pub video_bitrate_floor_cap_bps: u64,
    /// Upper video bound as a multiple of the target bitrate
    pub video_bitrate_max_ratio: f64,
    pub audio_bitrate_min_ratio: f64,
    pub audio_bitrate_max_ratio: f64,
    pub accepted_video_codecs: Vec<String>,
    pub accepted_audio_codecs: Vec<String>,
    /// Substring the container format name must contain
    pub required_container: String,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            resolution_tolerance_px: 2,
            video_bitrate_min_ratio: 0.2,
            video_bitrate_floor_cap_bps: 1_000_000,
            video_bitrate_max_ratio: 3.0,
            audio_bitrate_min_ratio: 0.5,
            audio_bitrate_max_ratio: 2.0,
            accepted_video_codecs: vec!["h264".to_string(), "libx264".to_string()],
            accepted_audio_codecs: vec!["aac".to_string(), "mp3".to_string()],
            required_container: "mp4".to_string(),
        }
    }
}

/// Configuration for the transcode ladder pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Target qualities, ascending by height
    pub ladder: QualityLadder,
    /// CRF / H.264 profile settings
    pub encode_profile: EncodeProfile,
    /// Validator tolerances
    pub validation: ValidationPolicy,
    /// Path to ffprobe binary
    pub ffprobe_bin: PathBuf,
    /// Upper bound on a single probe invocation
    pub probe_timeout_secs: u64,
    /// Drop rungs taller than the source
    pub skip_upscale: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl PipelineConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            ladder: QualityLadder::default(),
            encode_profile: EncodeProfile::default(),
            validation: ValidationPolicy::default(),
            ffprobe_bin: PathBuf::from("ffprobe"),
            probe_timeout_secs: 30,
            skip_upscale: true,
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                // TOML by extension, JSON otherwise
                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            } else {
                log::warn!("Config file not found, using defaults: {}", config_path.display());
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// - LADDER_QUALITY_PROFILE -> encode_profile.active_quality_profile
    /// - FFPROBE_BIN -> ffprobe_bin
    /// - PROBE_TIMEOUT_SECS -> probe_timeout_secs
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = env::var("LADDER_QUALITY_PROFILE") {
            self.encode_profile.active_quality_profile = val
                .parse::<QualityProfile>()
                .context("Invalid LADDER_QUALITY_PROFILE")?;
        }

        if let Ok(val) = env::var("FFPROBE_BIN") {
            if !val.trim().is_empty() {
                self.ffprobe_bin = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("PROBE_TIMEOUT_SECS") {
            self.probe_timeout_secs = val
                .parse::<u64>()
                .with_context(|| format!("Invalid PROBE_TIMEOUT_SECS: {}", val))?;
        }

        Ok(())
    }

    /// Reject ladders the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.ladder.is_empty() {
            anyhow::bail!("Quality ladder must contain at least one rung");
        }

        let mut previous: Option<u32> = None;
        for rung in self.ladder.iter() {
            if rung.height == 0 {
                anyhow::bail!("Ladder rung has zero height");
            }
            if rung.width == Some(0) {
                anyhow::bail!("Ladder rung {} has zero width", rung.label());
            }
            if rung.video_bitrate_kbps == 0 || rung.audio_bitrate_kbps == 0 {
                anyhow::bail!("Ladder rung {} has a zero bitrate", rung.label());
            }
            if let Some(prev) = previous {
                if rung.height <= prev {
                    anyhow::bail!(
                        "Ladder must be strictly ascending by height ({}p follows {}p)",
                        rung.height, prev
                    );
                }
            }
            previous = Some(rung.height);
        }

        if self.probe_timeout_secs == 0 {
            anyhow::bail!("probe_timeout_secs must be greater than zero");
        }

        self.validation.validate().context("Invalid validation policy")?;

        Ok(())
    }
}

impl ValidationPolicy {
    /// Reject bands and codec sets that would fail every rung
    pub fn validate(&self) -> Result<()> {
        check_band("video", self.video_bitrate_min_ratio, self.video_bitrate_max_ratio)?;
        check_band("audio", self.audio_bitrate_min_ratio, self.audio_bitrate_max_ratio)?;

        if self.accepted_video_codecs.iter().all(|c| c.trim().is_empty()) {
            anyhow::bail!("accepted_video_codecs must name at least one codec");
        }
        if self.accepted_audio_codecs.iter().all(|c| c.trim().is_empty()) {
            anyhow::bail!("accepted_audio_codecs must name at least one codec");
        }

        Ok(())
    }
}

fn check_band(kind: &str, min_ratio: f64, max_ratio: f64) -> Result<()> {
    if !min_ratio.is_finite() || !max_ratio.is_finite() {
        anyhow::bail!("{} bitrate ratios must be finite numbers", kind);
    }
    if min_ratio < 0.0 {
        anyhow::bail!("{} bitrate min ratio must not be negative ({})", kind, min_ratio);
    }
    if max_ratio <= 0.0 {
        anyhow::bail!("{} bitrate max ratio must be positive ({})", kind, max_ratio);
    }
    if min_ratio > max_ratio {
        anyhow::bail!(
            "{} bitrate min ratio {} exceeds max ratio {}",
            kind, min_ratio, max_ratio
        );
    }
    Ok(())
}
