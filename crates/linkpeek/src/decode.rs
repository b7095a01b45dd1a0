//! Byte-to-text decoding strategies for fetched HTML bodies.

use serde::{Deserialize, Serialize};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// How raw response bytes are turned into text before HTML parsing.
///
/// `Latin1` maps every byte to one character and never fails. Non-ASCII
/// UTF-8 metadata comes out mis-decoded under it; pick `Utf8` or
/// `Utf8Lossy` when that matters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextDecoding {
    #[default]
    Latin1,
    Ascii,
    Utf8,
    Utf8Lossy,
}

impl TextDecoding {
    /// Decode `bytes`, or `None` if they are invalid under this strategy.
    ///
    /// A leading UTF-8 byte order mark is dropped first under every strategy;
    /// single-byte decoding would otherwise turn it into text ahead of the
    /// markup.
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        match self {
            TextDecoding::Latin1 => Some(bytes.iter().map(|&b| b as char).collect()),
            TextDecoding::Ascii => {
                if bytes.is_ascii() {
                    Some(bytes.iter().map(|&b| b as char).collect())
                } else {
                    None
                }
            }
            TextDecoding::Utf8 => std::str::from_utf8(bytes).ok().map(str::to_string),
            TextDecoding::Utf8Lossy => Some(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TextDecoding::Latin1 => "latin1",
            TextDecoding::Ascii => "ascii",
            TextDecoding::Utf8 => "utf8",
            TextDecoding::Utf8Lossy => "utf8_lossy",
        }
    }
}

impl std::str::FromStr for TextDecoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "latin1" | "iso_8859_1" => Ok(TextDecoding::Latin1),
            "ascii" => Ok(TextDecoding::Ascii),
            "utf8" | "utf_8" => Ok(TextDecoding::Utf8),
            "utf8_lossy" => Ok(TextDecoding::Utf8Lossy),
            other => Err(format!("unknown text decoding: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAFE_UTF8: &[u8] = "café".as_bytes();

    #[test]
    fn test_latin1_is_one_char_per_byte() {
        let text = TextDecoding::Latin1.decode(CAFE_UTF8).unwrap();
        assert_eq!(text.chars().count(), CAFE_UTF8.len());
        assert_eq!(text, "cafÃ©");
    }

    #[test]
    fn test_ascii_rejects_high_bytes() {
        assert_eq!(TextDecoding::Ascii.decode(b"plain"), Some("plain".into()));
        assert!(TextDecoding::Ascii.decode(CAFE_UTF8).is_none());
    }

    #[test]
    fn test_utf8_variants() {
        assert_eq!(TextDecoding::Utf8.decode(CAFE_UTF8), Some("café".into()));
        assert!(TextDecoding::Utf8.decode(&[0xff, 0xfe]).is_none());
        assert_eq!(
            TextDecoding::Utf8Lossy.decode(&[b'a', 0xff]),
            Some("a\u{fffd}".into())
        );
    }

    #[test]
    fn test_leading_bom_is_dropped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"<html>");
        for decoding in [
            TextDecoding::Latin1,
            TextDecoding::Ascii,
            TextDecoding::Utf8,
            TextDecoding::Utf8Lossy,
        ] {
            assert_eq!(decoding.decode(&bytes).as_deref(), Some("<html>"));
        }
        // Only a leading mark is special.
        let inner = [b'a', 0xEF, 0xBB, 0xBF];
        assert_eq!(
            TextDecoding::Latin1.decode(&inner).unwrap().chars().count(),
            4
        );
    }

    #[test]
    fn test_from_str() {
        assert_eq!("utf-8".parse::<TextDecoding>(), Ok(TextDecoding::Utf8));
        assert_eq!(
            "UTF8-Lossy".parse::<TextDecoding>(),
            Ok(TextDecoding::Utf8Lossy)
        );
        assert!("ebcdic".parse::<TextDecoding>().is_err());
    }
}
