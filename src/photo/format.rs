use serde::Serialize;
use std::str::FromStr;

/// Image formats accepted as attendance evidence.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum ImageFormat {
    #[strum(to_string = "jpg", serialize = "jpeg")]
    Jpg,
    #[strum(to_string = "png")]
    Png,
    #[strum(to_string = "gif")]
    Gif,
    #[strum(to_string = "webp")]
    Webp,
}

type Matcher = fn(&[u8]) -> bool;

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const GIF_MAGIC: &[u8] = b"GIF8";

fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.starts_with(JPEG_MAGIC)
}

fn is_png(bytes: &[u8]) -> bool {
    bytes.starts_with(PNG_MAGIC)
}

fn is_gif(bytes: &[u8]) -> bool {
    bytes.starts_with(GIF_MAGIC)
}

// RIFF <u32 size> WEBP
fn is_webp(bytes: &[u8]) -> bool {
    bytes.starts_with(b"RIFF") && bytes.get(8..12) == Some(b"WEBP".as_slice())
}

const SIGNATURES: &[(ImageFormat, Matcher)] = &[
    (ImageFormat::Jpg, is_jpeg),
    (ImageFormat::Png, is_png),
    (ImageFormat::Gif, is_gif),
    (ImageFormat::Webp, is_webp),
];

impl ImageFormat {
    /// Identifies the format from the leading magic bytes, if any signature matches.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        SIGNATURES
            .iter()
            .find(|(_, matches)| matches(bytes))
            .map(|(format, _)| *format)
    }

    /// Parses a declared extension or `image/<fmt>` subtype (`.JPEG`, `png`, ...).
    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::from_str(ext.trim().trim_start_matches('.')).ok()
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
        }
    }
}
