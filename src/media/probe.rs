//! FFprobe wrapper for input inspection.

use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::EncoderError;

/// Result of probing a media file.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// General media information.
    pub info: MediaInfo,
    /// Streams found in the file, in container order.
    pub streams: Vec<StreamSummary>,
}

/// General media file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Container format as reported by ffprobe (e.g. "mov,mp4,m4a,3gp,3g2,mj2").
    pub format: String,
    /// Duration in seconds, when known.
    pub duration: Option<f64>,
    /// File size in bytes.
    pub size: u64,
    /// Overall bitrate in bits per second.
    pub bitrate: u64,
}

/// Summary of a single stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSummary {
    /// Stream index.
    pub index: usize,
    /// "audio", "video", "subtitle", ...
    pub codec_type: String,
    /// Codec name.
    pub codec: String,
    /// Whether this is an attached picture (e.g. cover art in an mp3).
    pub is_attached_picture: bool,
}

impl ProbeResult {
    /// Returns true if the file has at least one audio stream.
    pub fn has_audio(&self) -> bool {
        self.streams.iter().any(|s| s.codec_type == "audio")
    }

    /// Returns true if any stream is embedded cover art.
    pub fn has_attached_picture(&self) -> bool {
        self.streams.iter().any(|s| s.is_attached_picture)
    }
}

/// Probes a media file using ffprobe.
pub async fn probe(ffprobe: &Path, path: &Path) -> Result<ProbeResult, EncoderError> {
    let probe_err = |message: String| EncoderError::ProbeFailed {
        path: path.to_path_buf(),
        message,
    };

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| probe_err(format!("failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(probe_err(stderr.trim().to_string()));
    }

    let json: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| probe_err(format!("unparsable ffprobe output: {}", e)))?;

    parse_probe_output(&json).ok_or_else(|| probe_err("no media streams found".to_string()))
}

/// Parses ffprobe JSON output into structured data.
fn parse_probe_output(json: &serde_json::Value) -> Option<ProbeResult> {
    let format = json.get("format")?;
    let streams = json.get("streams")?.as_array()?;

    let info = MediaInfo {
        format: format
            .get("format_name")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string(),
        duration: format
            .get("duration")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok()),
        size: format
            .get("size")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        bitrate: format
            .get("bit_rate")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
    };

    let streams: Vec<StreamSummary> = streams.iter().filter_map(parse_stream).collect();
    if streams.is_empty() {
        return None;
    }

    Some(ProbeResult { info, streams })
}

fn parse_stream(stream: &serde_json::Value) -> Option<StreamSummary> {
    Some(StreamSummary {
        index: stream.get("index")?.as_u64()? as usize,
        codec_type: stream.get("codec_type")?.as_str()?.to_string(),
        codec: stream
            .get("codec_name")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string(),
        is_attached_picture: stream
            .get("disposition")
            .and_then(|d| d.get("attached_pic"))
            .and_then(|v| v.as_i64())
            == Some(1),
    })
}
