use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use tokio::process::Command;
use crate::error::ProbeError;

/// Complete ffprobe output structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FFProbeData {
    #[serde(default)]
    pub streams: Vec<FFProbeStream>,
    #[serde(default)]
    pub format: FFProbeFormat,
}

/// Format-level metadata from ffprobe
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FFProbeFormat {
    #[serde(default)]
    pub format_name: String,
    pub duration: Option<String>,
}

/// Stream-level metadata from ffprobe
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FFProbeStream {
    pub index: u32,
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bit_rate: Option<String>,
    pub channels: Option<u32>,
    pub r_frame_rate: Option<String>,
    pub disposition: Option<HashMap<String, i32>>,
}

impl FFProbeStream {
    pub fn is_type(&self, codec_type: &str) -> bool {
        self.codec_type.as_deref() == Some(codec_type)
    }

    /// Embedded cover art shows up as a single-frame video stream
    pub fn is_attached_picture(&self) -> bool {
        self.disposition
            .as_ref()
            .and_then(|d| d.get("attached_pic"))
            .map(|v| *v == 1)
            .unwrap_or(false)
    }

    /// Bitrate in bits/sec; ffprobe reports it as a string and sometimes "N/A"
    pub fn bitrate_bps(&self) -> Option<u64> {
        self.bit_rate.as_deref().and_then(|s| s.trim().parse::<u64>().ok())
    }

    /// Parse `r_frame_rate` ("30000/1001" or "25")
    pub fn frame_rate(&self) -> Option<f64> {
        parse_rational(self.r_frame_rate.as_deref()?)
    }
}

impl FFProbeFormat {
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration.as_deref().and_then(|s| s.trim().parse::<f64>().ok())
    }
}

fn parse_rational(value: &str) -> Option<f64> {
    match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => value.trim().parse().ok(),
    }
}

/// Parse the JSON document produced by `ffprobe -print_format json`
pub fn parse_ffprobe_json(json_str: &str) -> Result<FFProbeData, ProbeError> {
    Ok(serde_json::from_str(json_str)?)
}

/// Run ffprobe on a file and parse the JSON output
///
/// The process is killed if it does not finish within `timeout`.
pub async fn probe_file(ffprobe_bin: &Path, file_path: &Path, timeout: Duration) -> Result<FFProbeData, ProbeError> {
    use log::debug;

    // Verify file exists before trying to probe
    if !file_path.exists() {
        return Err(ProbeError::FileNotFound(file_path.to_path_buf()));
    }

    debug!("Executing ffprobe for: {}", file_path.display());

    let mut cmd = Command::new(ffprobe_bin);
    cmd.arg("-v")
        .arg("error")
        .arg("-print_format")
        .arg("json")
        .arg("-show_streams")
        .arg("-show_format")
        .arg(file_path)
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(result) => result.map_err(|source| ProbeError::Spawn {
            bin: ffprobe_bin.to_path_buf(),
            source,
        })?,
        Err(_) => {
            return Err(ProbeError::Timeout {
                path: file_path.to_path_buf(),
                secs: timeout.as_secs(),
            });
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::Failed {
            path: file_path.to_path_buf(),
            exit_code: output.status.code().unwrap_or(-1),
            stderr: stderr.trim().to_string(),
        });
    }

    let json_str = String::from_utf8(output.stdout)?;
    parse_ffprobe_json(&json_str)
}
