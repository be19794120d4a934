//! Immutable capability tables.

use super::{
    CategoryInfo, CategoryType, CodecType, DataType, FormatInfo, FormatType, ParameterInfo,
    ParameterType,
};

const NONE: &[CodecType] = &[];

impl ParameterType {
    /// Returns the registry entry for this parameter.
    pub fn info(self) -> &'static ParameterInfo {
        match self {
            ParameterType::Format => &ParameterInfo { name: "format", data_type: DataType::StrList },
            ParameterType::Codec => &ParameterInfo { name: "codec", data_type: DataType::StrList },
            ParameterType::Profile => &ParameterInfo { name: "profile", data_type: DataType::StrList },
            ParameterType::Quality => &ParameterInfo { name: "quality", data_type: DataType::IntList },
            ParameterType::BitRate => &ParameterInfo { name: "bitrate", data_type: DataType::IntList },
            ParameterType::BitDepth => &ParameterInfo { name: "bitdepth", data_type: DataType::IntList },
            ParameterType::SampleRate => &ParameterInfo { name: "sample_rate", data_type: DataType::StrList },
            ParameterType::SampleFormat => &ParameterInfo { name: "sample_format", data_type: DataType::StrList },
            ParameterType::ChannelCount => &ParameterInfo { name: "channel_count", data_type: DataType::Int },
            ParameterType::ChannelFormat => &ParameterInfo { name: "channel_format", data_type: DataType::StrList },
            ParameterType::CompressionLevel => &ParameterInfo { name: "compression_level", data_type: DataType::IntRange },
            ParameterType::Width => &ParameterInfo { name: "width", data_type: DataType::Int },
            ParameterType::Height => &ParameterInfo { name: "height", data_type: DataType::Int },
            ParameterType::PixelFormat => &ParameterInfo { name: "pixel_format", data_type: DataType::StrList },
            ParameterType::FramesPerSecond => &ParameterInfo { name: "frames_per_second", data_type: DataType::FloatList },
        }
    }
}

static AUDIO: CategoryInfo = CategoryInfo {
    formats: &[
        FormatType::Mp3,
        FormatType::M4a,
        FormatType::Ogg,
        FormatType::Opus,
        FormatType::Flac,
        FormatType::Wav,
    ],
    parameters: &[
        ParameterType::Codec,
        ParameterType::Profile,
        ParameterType::BitRate,
        ParameterType::BitDepth,
        ParameterType::SampleRate,
        ParameterType::SampleFormat,
        ParameterType::ChannelCount,
        ParameterType::ChannelFormat,
        ParameterType::CompressionLevel,
    ],
};

static VIDEO: CategoryInfo = CategoryInfo {
    formats: &[FormatType::Mp4, FormatType::Mov, FormatType::Mkv, FormatType::Webm],
    parameters: &[
        ParameterType::Codec,
        ParameterType::Profile,
        ParameterType::BitRate,
        ParameterType::Width,
        ParameterType::Height,
        ParameterType::PixelFormat,
        ParameterType::FramesPerSecond,
    ],
};

static IMAGE: CategoryInfo = CategoryInfo {
    formats: &[FormatType::Gif, FormatType::Png, FormatType::Jpg, FormatType::Webp],
    parameters: &[
        ParameterType::Codec,
        ParameterType::Profile,
        ParameterType::Quality,
        ParameterType::Width,
        ParameterType::Height,
        ParameterType::PixelFormat,
        // animated gif
        ParameterType::FramesPerSecond,
    ],
};

impl CategoryType {
    /// Returns the registry entry for this category.
    pub fn info(self) -> &'static CategoryInfo {
        match self {
            CategoryType::Audio => &AUDIO,
            CategoryType::Video => &VIDEO,
            CategoryType::Image => &IMAGE,
        }
    }
}

const fn audio_format(codecs: &'static [CodecType]) -> FormatInfo {
    FormatInfo {
        category: CategoryType::Audio,
        audio: codecs,
        video: NONE,
        image: NONE,
        extension: None,
    }
}

const fn video_format(audio: &'static [CodecType], video: &'static [CodecType]) -> FormatInfo {
    FormatInfo {
        category: CategoryType::Video,
        audio,
        video,
        image: NONE,
        extension: None,
    }
}

const fn image_format(codecs: &'static [CodecType]) -> FormatInfo {
    FormatInfo {
        category: CategoryType::Image,
        audio: NONE,
        video: NONE,
        image: codecs,
        extension: None,
    }
}

static MP3: FormatInfo = audio_format(&[CodecType::Mp3]);
static M4A: FormatInfo = audio_format(&[CodecType::Aac]);
static OGG: FormatInfo = audio_format(&[CodecType::Opus, CodecType::Vorbis]);
static OPUS: FormatInfo = audio_format(&[CodecType::Opus]);
static WAV: FormatInfo = audio_format(&[CodecType::Pcm]);
static FLAC: FormatInfo = audio_format(&[CodecType::Flac]);

static MP4: FormatInfo = video_format(&[CodecType::Aac], &[CodecType::Avc, CodecType::Hevc]);
static MOV: FormatInfo = video_format(&[CodecType::Aac], &[CodecType::Avc, CodecType::Hevc]);
static MKV: FormatInfo = video_format(
    &[
        CodecType::Mp3,
        CodecType::Aac,
        CodecType::Opus,
        CodecType::Vorbis,
        CodecType::Flac,
        CodecType::Pcm,
    ],
    &[CodecType::Avc, CodecType::Hevc, CodecType::Vp9],
);
static WEBM: FormatInfo = video_format(&[CodecType::Opus], &[CodecType::Vp9]);

static GIF: FormatInfo = image_format(&[CodecType::Gif]);
static PNG: FormatInfo = image_format(&[CodecType::Png]);
static JPG: FormatInfo = image_format(&[CodecType::Jpg]);
static WEBP: FormatInfo = image_format(&[CodecType::Webp]);

impl FormatType {
    /// Returns the registry entry for this format.
    pub fn info(self) -> &'static FormatInfo {
        match self {
            FormatType::Mp3 => &MP3,
            FormatType::M4a => &M4A,
            FormatType::Mp4 => &MP4,
            FormatType::Mov => &MOV,
            FormatType::Ogg => &OGG,
            FormatType::Opus => &OPUS,
            FormatType::Wav => &WAV,
            FormatType::Flac => &FLAC,
            FormatType::Mkv => &MKV,
            FormatType::Webm => &WEBM,
            FormatType::Webp => &WEBP,
            FormatType::Gif => &GIF,
            FormatType::Png => &PNG,
            FormatType::Jpg => &JPG,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::StreamKind;

    #[test]
    fn mp3_only_carries_mp3_audio() {
        let mp3 = FormatType::Mp3.info();
        assert_eq!(mp3.codecs(StreamKind::Audio), &[CodecType::Mp3]);
        assert!(mp3.codecs(StreamKind::Video).is_empty());
    }

    #[test]
    fn mkv_is_the_widest_container() {
        let mkv = FormatType::Mkv.info();
        assert_eq!(mkv.codecs(StreamKind::Audio).len(), 6);
        assert!(mkv.allows(StreamKind::Video, "vp9"));
    }

    #[test]
    fn image_formats_carry_no_audio() {
        for fmt in CategoryType::Image.info().formats {
            assert!(fmt.info().audio.is_empty(), "{}", fmt);
            assert_eq!(fmt.info().image.len(), 1);
        }
    }
}
