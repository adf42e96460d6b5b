// types.rs - Stream descriptor types shared with the decoder
use serde::{Deserialize, Serialize};

/// FFmpeg codec id of `rawvideo`.
pub const CODEC_ID_RAWVIDEO: i32 = 13;

pub const PIX_FMT_YUV420P: i32 = 0;
pub const PIX_FMT_YUVJ420P: i32 = 12;

pub const COLOR_RANGE_JPEG: i32 = 2;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaType {
    Video,
    Audio,
    Data,
    Subtitle,
    Attachment,
    Unknown,
}

impl MediaType {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => MediaType::Video,
            1 => MediaType::Audio,
            2 => MediaType::Data,
            3 => MediaType::Subtitle,
            4 => MediaType::Attachment,
            _ => MediaType::Unknown,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            MediaType::Video => 0,
            MediaType::Audio => 1,
            MediaType::Data => 2,
            MediaType::Subtitle => 3,
            MediaType::Attachment => 4,
            MediaType::Unknown => u8::MAX,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Video => "video",
            MediaType::Audio => "audio",
            MediaType::Data => "data",
            MediaType::Subtitle => "subtitle",
            MediaType::Attachment => "attachment",
            MediaType::Unknown => "unknown",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct CodecParameters {
    pub codec_type: i32,
    pub codec_id: i32,
    pub codec_tag: u32,
    pub bit_rate: i64,
    pub bits_per_coded_sample: i32,
    pub bits_per_raw_sample: i32,
    pub profile: i32,
    pub level: i32,
    /// Hex encoded, two characters per byte.
    pub extradata: Option<String>,
    pub extradata_size: i32,
    pub format: i32,
    pub width: u32,
    pub height: u32,
    pub field_order: i32,
    pub color_range: i32,
    pub color_primaries: i32,
    pub color_trc: i32,
    pub color_space: i32,
    pub chroma_location: i32,
    pub sample_aspect_ratio: Rational,
    pub video_delay: i32,
}

impl CodecParameters {
    /// Decodes the hex `extradata` field, ignoring trailing odd nibbles.
    pub fn extradata_bytes(&self) -> Vec<u8> {
        let Some(hex) = self.extradata.as_deref() else {
            return Vec::new();
        };
        let size = usize::try_from(self.extradata_size).unwrap_or(0);
        hex.as_bytes()
            .chunks_exact(2)
            .take(size)
            .filter_map(|pair| {
                std::str::from_utf8(pair)
                    .ok()
                    .and_then(|s| u8::from_str_radix(s, 16).ok())
            })
            .collect()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SubStreamInfo {
    pub codecpar: CodecParameters,
}

/// Stream descriptor as published by the proxy, one entry per media type.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct StreamInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<SubStreamInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<SubStreamInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<SubStreamInfo>,
}

impl StreamInfo {
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn subs(&self) -> impl Iterator<Item = (MediaType, &CodecParameters)> {
        [
            (MediaType::Video, &self.video),
            (MediaType::Audio, &self.audio),
            (MediaType::Subtitle, &self.subtitle),
        ]
        .into_iter()
        .filter_map(|(kind, sub)| sub.as_ref().map(|s| (kind, &s.codecpar)))
    }
}
