//! Inline image payloads.
//!
//! An image carried inline is either a data URI
//! (`data:<mime>;base64,<payload>`) or a bare base64 string.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;

use super::error::{AppError, Result};

/// Extension used whenever the MIME type is absent or unrecognized.
pub const DEFAULT_IMAGE_EXT: &str = "png";

/// Padding-agnostic engine for last-resort decoding.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Shape of an inline image payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePayload<'a> {
    /// `data:` URI; `data` is empty when the URI has no comma.
    DataUri {
        mime: Option<&'a str>,
        data: &'a str,
        raw: &'a str,
    },
    /// Bare base64 with no type information.
    Bare(&'a str),
}

impl<'a> ImagePayload<'a> {
    /// Classify a raw payload string.
    #[must_use]
    pub fn parse(raw: &'a str) -> Self {
        let trimmed = raw.trim();
        match trimmed.strip_prefix("data:") {
            Some(rest) => {
                let (header, data) = rest.split_once(',').unwrap_or((rest, ""));
                let mime = header
                    .split(';')
                    .next()
                    .map(str::trim)
                    .filter(|m| !m.is_empty());
                Self::DataUri {
                    mime,
                    data,
                    raw: trimmed,
                }
            }
            None => Self::Bare(trimmed),
        }
    }

    /// Declared MIME type, if any.
    #[must_use]
    pub const fn mime(&self) -> Option<&'a str> {
        match self {
            Self::DataUri { mime, .. } => *mime,
            Self::Bare(_) => None,
        }
    }

    /// Extension for export bundles: `jpeg` -> `jpg`, `png` -> `png`, else `png`.
    #[must_use]
    pub fn export_extension(&self) -> &'static str {
        match self.mime().map(str::to_ascii_lowercase).as_deref() {
            Some("image/jpeg" | "image/jpg") => "jpg",
            _ => DEFAULT_IMAGE_EXT,
        }
    }

    /// Extension for uploaded assets, which also keep GIFs.
    #[must_use]
    pub fn asset_extension(&self) -> &'static str {
        match self.mime().map(str::to_ascii_lowercase).as_deref() {
            Some("image/gif") => "gif",
            _ => self.export_extension(),
        }
    }

    /// Decode the base64 body.
    ///
    /// # Errors
    /// Returns `Decode` if the body is empty or not valid base64.
    pub fn decode(&self) -> Result<Vec<u8>> {
        match self {
            Self::DataUri { data, .. } => decode_base64(data),
            Self::Bare(data) => decode_base64(data),
        }
    }

    /// Last-resort decode of the whole value: characters outside the base64
    /// alphabet are dropped and padding is optional.
    ///
    /// # Errors
    /// Returns `Decode` if nothing decodable remains.
    pub fn decode_lenient(&self) -> Result<Vec<u8>> {
        let raw = match self {
            Self::DataUri { raw, .. } => raw,
            Self::Bare(data) => data,
        };
        let filtered: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '+' || *c == '/')
            .collect();
        if filtered.is_empty() {
            return Err(AppError::Decode {
                message: "no base64 characters in image payload".into(),
                source: None,
            });
        }
        LENIENT
            .decode(filtered.as_bytes())
            .map_err(|e| AppError::decode("undecodable image payload", e))
    }
}

/// Decode standard base64, tolerating embedded whitespace.
///
/// # Errors
/// Returns `Decode` if the input is empty or malformed.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(AppError::Decode {
            message: "empty image payload".into(),
            source: None,
        });
    }
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| AppError::decode("invalid base64 image payload", e))
}

/// Encode raw image bytes as a data URI, guessing the MIME type from a
/// file extension.
#[must_use]
pub fn encode_data_uri(extension: Option<&str>, bytes: &[u8]) -> String {
    let mime = match extension.map(str::to_ascii_lowercase).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    };
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_uri() {
        let payload = ImagePayload::parse("data:image/jpeg;base64,AAAA");
        assert_eq!(payload.mime(), Some("image/jpeg"));
        assert_eq!(payload.export_extension(), "jpg");
        assert_eq!(payload.decode().unwrap(), vec![0, 0, 0]);
    }

    #[test]
    fn test_parse_bare() {
        let payload = ImagePayload::parse("  AAAA\n");
        assert_eq!(payload, ImagePayload::Bare("AAAA"));
        assert_eq!(payload.export_extension(), "png");
    }

    #[test]
    fn test_extension_defaults() {
        assert_eq!(ImagePayload::parse("data:image/png;base64,AA==").export_extension(), "png");
        assert_eq!(ImagePayload::parse("data:image/webp;base64,AA==").export_extension(), "png");
        assert_eq!(ImagePayload::parse("data:;base64,AA==").export_extension(), "png");
        assert_eq!(ImagePayload::parse("data:image/gif;base64,AA==").export_extension(), "png");
        assert_eq!(ImagePayload::parse("data:image/gif;base64,AA==").asset_extension(), "gif");
    }

    #[test]
    fn test_data_uri_without_comma() {
        let payload = ImagePayload::parse("data:image/png;base64");
        assert!(payload.decode().is_err());
        // "dataimage/pngbase64" still yields bytes
        assert!(payload.decode_lenient().is_ok());
    }

    #[test]
    fn test_lenient_accepts_unpadded() {
        let payload = ImagePayload::parse("data:image/png;base64,AAA");
        assert!(payload.decode().is_err());
        assert!(!payload.decode_lenient().unwrap().is_empty());
    }

    #[test]
    fn test_lenient_gives_up_without_alphabet() {
        let payload = ImagePayload::parse("@@@ ###");
        assert!(payload.decode().is_err());
        assert!(payload.decode_lenient().is_err());
        // five significant characters cannot form whole bytes
        assert!(ImagePayload::parse("AAAAA").decode_lenient().is_err());
    }

    #[test]
    fn test_encode_data_uri() {
        let uri = encode_data_uri(Some("JPG"), &[0, 0, 0]);
        assert_eq!(uri, "data:image/jpeg;base64,AAAA");

        let payload = ImagePayload::parse(&uri);
        assert_eq!(payload.export_extension(), "jpg");
        assert_eq!(payload.decode().unwrap(), vec![0, 0, 0]);

        assert!(encode_data_uri(None, &[1]).starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_base64("not base64!!").is_err());
        assert!(decode_base64("   ").is_err());
    }
}
