//! Requested output options as submitted by callers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::capability::{self, CategoryType, ParameterType};

/// Desired output: container format plus per-stream settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscoderOpts {
    /// Output format name from the capability registry (e.g. "mp4").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Per-stream settings.
    #[serde(default)]
    pub stream: StreamOpts,
}

/// Per-stream settings. An absent stream means "encoder default".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamOpts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioStreamOpts>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoStreamOpts>,
}

/// Audio stream settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioStreamOpts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<BitRate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,

    /// Sample rate in Hz.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,

    /// ffmpeg sample format name (e.g. "s16").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_format: Option<String>,
}

/// Video stream settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStreamOpts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bit_rate: Option<BitRate>,

    #[serde(default, alias = "frameRate", skip_serializing_if = "Option::is_none")]
    pub frames_per_second: Option<f64>,

    /// ffmpeg pixel format name (e.g. "yuv420p").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_format: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// A bit rate given either in bits per second or as an ffmpeg size string ("2M", "128k").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BitRate {
    Bits(u64),
    Spec(String),
}

impl fmt::Display for BitRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitRate::Bits(bits) => write!(f, "{}", bits),
            BitRate::Spec(spec) => f.write_str(spec),
        }
    }
}

impl TranscoderOpts {
    /// Parses options from their serialized JSON form.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Registry category of the requested format, if the format is known.
    pub fn category(&self) -> Option<CategoryType> {
        self.format
            .as_deref()
            .and_then(capability::format)
            .map(|info| info.category)
    }
}

impl AudioStreamOpts {
    /// Lists the set fields together with the registry parameter each maps to.
    pub fn parameters(&self) -> Vec<(&'static str, ParameterType)> {
        let mut set = Vec::new();
        if self.codec.is_some() {
            set.push(("codec", ParameterType::Codec));
        }
        if self.bit_rate.is_some() {
            set.push(("bitRate", ParameterType::BitRate));
        }
        if self.channels.is_some() {
            set.push(("channels", ParameterType::ChannelCount));
        }
        if self.sample_rate.is_some() {
            set.push(("sampleRate", ParameterType::SampleRate));
        }
        if self.sample_format.is_some() {
            set.push(("sampleFormat", ParameterType::SampleFormat));
        }
        set
    }
}

impl VideoStreamOpts {
    /// Lists the set fields together with the registry parameter each maps to.
    pub fn parameters(&self) -> Vec<(&'static str, ParameterType)> {
        let mut set = Vec::new();
        if self.codec.is_some() {
            set.push(("codec", ParameterType::Codec));
        }
        if self.bit_rate.is_some() {
            set.push(("bitRate", ParameterType::BitRate));
        }
        if self.frames_per_second.is_some() {
            set.push(("framesPerSecond", ParameterType::FramesPerSecond));
        }
        if self.pixel_format.is_some() {
            set.push(("pixelFormat", ParameterType::PixelFormat));
        }
        if self.width.is_some() {
            set.push(("width", ParameterType::Width));
        }
        if self.height.is_some() {
            set.push(("height", ParameterType::Height));
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_document() {
        let opts = TranscoderOpts::parse(
            r#"{"format":"mp4","stream":{"video":{"codec":"avc","width":1280,"height":720},
                "audio":{"codec":"aac","bitRate":128000}}}"#,
        )
        .unwrap();

        assert_eq!(opts.format.as_deref(), Some("mp4"));
        let video = opts.stream.video.as_ref().unwrap();
        assert_eq!((video.width, video.height), (Some(1280), Some(720)));
        let audio = opts.stream.audio.as_ref().unwrap();
        assert_eq!(audio.bit_rate, Some(BitRate::Bits(128000)));
        assert_eq!(opts.category(), Some(CategoryType::Video));
    }

    #[test]
    fn bit_rate_accepts_strings() {
        let opts =
            TranscoderOpts::parse(r#"{"format":"mp3","stream":{"audio":{"bitRate":"192k"}}}"#)
                .unwrap();
        let audio = opts.stream.audio.unwrap();
        assert_eq!(audio.bit_rate.unwrap().to_string(), "192k");
    }

    #[test]
    fn frame_rate_alias() {
        let opts =
            TranscoderOpts::parse(r#"{"format":"webm","stream":{"video":{"frameRate":29.97}}}"#)
                .unwrap();
        assert_eq!(opts.stream.video.unwrap().frames_per_second, Some(29.97));
    }

    #[test]
    fn missing_stream_defaults_to_empty() {
        let opts = TranscoderOpts::parse(r#"{"format":"flac"}"#).unwrap();
        assert_eq!(opts.stream, StreamOpts::default());
        assert_eq!(opts.category(), Some(CategoryType::Audio));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(TranscoderOpts::parse(r#"{"format": "mp4", "stream": "#).is_err());
        assert!(TranscoderOpts::parse(r#"{"stream":{"audio":{"channels":"two"}}}"#).is_err());
    }

    #[test]
    fn reports_set_parameters() {
        let audio = AudioStreamOpts {
            codec: Some("aac".into()),
            sample_rate: Some(44100),
            ..Default::default()
        };
        assert_eq!(
            audio.parameters(),
            vec![("codec", ParameterType::Codec), ("sampleRate", ParameterType::SampleRate)]
        );
    }
}
