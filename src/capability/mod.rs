//! Static registry of supported output formats, codecs, and parameters.
//!
//! The matrix is closed: every category, format, codec, and parameter is a
//! variant of a compile-time enum and every lookup resolves into an immutable
//! table in [`tables`]. Lookups by name return `None` for anything outside the
//! matrix, which callers treat as invalid input.

pub mod syntax;
pub mod tables;
pub mod validate;

use std::fmt;

use serde::Serialize;

pub use validate::{validate, validate_json};

/// Shape of the value a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Bool,
    Int,
    IntList,
    IntRange,
    Float,
    FloatList,
    FloatRange,
    Str,
    StrList,
}

/// Abstract output parameters understood by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    /// Container format.
    Format,
    Codec,
    Profile,
    Quality,
    BitRate,
    BitDepth,
    SampleRate,
    SampleFormat,
    ChannelCount,
    ChannelFormat,
    CompressionLevel,
    Width,
    Height,
    PixelFormat,
    FramesPerSecond,
}

impl ParameterType {
    pub const ALL: [ParameterType; 15] = [
        ParameterType::Format,
        ParameterType::Codec,
        ParameterType::Profile,
        ParameterType::Quality,
        ParameterType::BitRate,
        ParameterType::BitDepth,
        ParameterType::SampleRate,
        ParameterType::SampleFormat,
        ParameterType::ChannelCount,
        ParameterType::ChannelFormat,
        ParameterType::CompressionLevel,
        ParameterType::Width,
        ParameterType::Height,
        ParameterType::PixelFormat,
        ParameterType::FramesPerSecond,
    ];

    /// Looks up a parameter by its wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.info().name == name)
    }
}

/// Media categories that group formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryType {
    Audio,
    Video,
    Image,
}

impl CategoryType {
    pub const ALL: [CategoryType; 3] = [CategoryType::Audio, CategoryType::Video, CategoryType::Image];

    pub fn as_str(self) -> &'static str {
        match self {
            CategoryType::Audio => "audio",
            CategoryType::Video => "video",
            CategoryType::Image => "image",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

/// Output container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatType {
    Mp3,
    M4a,
    Mp4,
    Mov,
    Ogg,
    Opus,
    Wav,
    Flac,
    Mkv,
    Webm,
    Webp,
    Gif,
    Png,
    Jpg,
}

impl FormatType {
    pub const ALL: [FormatType; 14] = [
        FormatType::Mp3,
        FormatType::M4a,
        FormatType::Mp4,
        FormatType::Mov,
        FormatType::Ogg,
        FormatType::Opus,
        FormatType::Wav,
        FormatType::Flac,
        FormatType::Mkv,
        FormatType::Webm,
        FormatType::Webp,
        FormatType::Gif,
        FormatType::Png,
        FormatType::Jpg,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FormatType::Mp3 => "mp3",
            FormatType::M4a => "m4a",
            FormatType::Mp4 => "mp4",
            FormatType::Mov => "mov",
            FormatType::Ogg => "ogg",
            FormatType::Opus => "opus",
            FormatType::Wav => "wav",
            FormatType::Flac => "flac",
            FormatType::Mkv => "mkv",
            FormatType::Webm => "webm",
            FormatType::Webp => "webp",
            FormatType::Gif => "gif",
            FormatType::Png => "png",
            FormatType::Jpg => "jpg",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

/// Stream codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecType {
    // Audio
    Mp3,
    Aac,
    Pcm,
    Flac,
    Opus,
    Vorbis,
    // Video
    Vp8,
    Vp9,
    /// H.264
    Avc,
    /// H.265
    Hevc,
    // Image
    Gif,
    Jpg,
    Png,
    Webp,
}

impl CodecType {
    pub const ALL: [CodecType; 14] = [
        CodecType::Mp3,
        CodecType::Aac,
        CodecType::Pcm,
        CodecType::Flac,
        CodecType::Opus,
        CodecType::Vorbis,
        CodecType::Vp8,
        CodecType::Vp9,
        CodecType::Avc,
        CodecType::Hevc,
        CodecType::Gif,
        CodecType::Jpg,
        CodecType::Png,
        CodecType::Webp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CodecType::Mp3 => "mp3",
            CodecType::Aac => "aac",
            CodecType::Pcm => "pcm",
            CodecType::Flac => "flac",
            CodecType::Opus => "opus",
            CodecType::Vorbis => "vorbis",
            CodecType::Vp8 => "vp8",
            CodecType::Vp9 => "vp9",
            CodecType::Avc => "avc",
            CodecType::Hevc => "hevc",
            CodecType::Gif => "gif",
            CodecType::Jpg => "jpg",
            CodecType::Png => "png",
            CodecType::Webp => "webp",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

macro_rules! impl_display_as_str {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

impl_display_as_str!(CategoryType, FormatType, CodecType);

/// Kinds of elementary streams a format can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Audio,
    Video,
    Image,
}

/// Registry entry for a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParameterInfo {
    pub name: &'static str,
    pub data_type: DataType,
}

/// Registry entry for a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryInfo {
    pub formats: &'static [FormatType],
    pub parameters: &'static [ParameterType],
}

impl CategoryInfo {
    /// Returns true if the parameter is meaningful for this category.
    pub fn accepts(&self, parameter: ParameterType) -> bool {
        self.parameters.contains(&parameter)
    }
}

/// Registry entry for a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatInfo {
    pub category: CategoryType,
    pub audio: &'static [CodecType],
    pub video: &'static [CodecType],
    pub image: &'static [CodecType],
    /// Canonical file extension when it differs from the format name.
    pub extension: Option<&'static str>,
}

impl FormatInfo {
    /// Returns the codecs allowed for a stream kind.
    pub fn codecs(&self, kind: StreamKind) -> &'static [CodecType] {
        match kind {
            StreamKind::Audio => self.audio,
            StreamKind::Video => self.video,
            StreamKind::Image => self.image,
        }
    }

    /// Returns true if `codec` (by name) is allowed for the stream kind.
    pub fn allows(&self, kind: StreamKind, codec: &str) -> bool {
        self.codecs(kind).iter().any(|c| c.as_str() == codec)
    }

    /// Returns the file extension, falling back to the format name.
    pub fn extension_or<'a>(&self, format_name: &'a str) -> &'a str {
        self.extension.unwrap_or(format_name)
    }
}

/// Looks up a parameter by name.
pub fn parameter(name: &str) -> Option<&'static ParameterInfo> {
    ParameterType::from_name(name).map(ParameterType::info)
}

/// Looks up a category by name.
pub fn category(name: &str) -> Option<&'static CategoryInfo> {
    CategoryType::from_name(name).map(CategoryType::info)
}

/// Looks up a format by name.
pub fn format(name: &str) -> Option<&'static FormatInfo> {
    FormatType::from_name(name).map(FormatType::info)
}

/// Returns the file extension for a format name, if the format exists.
pub fn extension_for(format_name: &str) -> Option<&str> {
    format(format_name).map(|info| info.extension_or(format_name))
}
