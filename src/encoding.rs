use crate::error::{GutterError, Result};
use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};
use log::warn;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Declared encoding of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferEncoding {
    Text {
        encoding: &'static Encoding,
        bom: bool,
    },
    /// Binary view; never tracked.
    Hexadecimal,
}

impl Default for BufferEncoding {
    fn default() -> Self {
        BufferEncoding::Text {
            encoding: UTF_8,
            bom: false,
        }
    }
}

impl BufferEncoding {
    /// Parse an editor label (`UTF-8 with BOM`, `Western (Windows 1252)`) or a
    /// codec name (`utf-8-sig`, `utf_16_le`, `cp1252`).
    pub fn try_from_label(label: &str) -> Result<Self> {
        let normalized = label.trim().to_lowercase();
        if normalized == "hexadecimal" {
            return Ok(BufferEncoding::Hexadecimal);
        }
        if normalized.is_empty() || normalized == "undefined" {
            return Ok(Self::default());
        }

        let (name, mut bom) = match normalized.strip_suffix(" with bom") {
            Some(name) => (name.to_string(), true),
            None => (normalized.clone(), false),
        };
        // "Western (Windows 1252)" names the codec inside the parentheses.
        let name = match (name.find('('), name.rfind(')')) {
            (Some(open), Some(close)) if open < close => name[open + 1..close].to_string(),
            _ => name,
        };
        let mut name = name.trim().replace(['_', ' '], "-");
        if let Some(base) = name.strip_suffix("-sig") {
            bom = true;
            name = base.to_string();
        }

        let encoding = match name.as_str() {
            "utf-16-le" | "utf-16le" => Some(UTF_16LE),
            "utf-16-be" | "utf-16be" => Some(UTF_16BE),
            _ => Encoding::for_label(name.as_bytes())
                .or_else(|| Encoding::for_label(name.replace('-', "").as_bytes())),
        };

        match encoding {
            Some(encoding) => Ok(BufferEncoding::Text { encoding, bom }),
            None => Err(GutterError::EncodingUnsupported(label.to_string())),
        }
    }

    /// Like [`try_from_label`](Self::try_from_label) but unknown labels fall
    /// back to UTF-8.
    pub fn from_label(label: &str) -> Self {
        Self::try_from_label(label).unwrap_or_else(|e| {
            warn!("{e}, falling back to UTF-8");
            Self::default()
        })
    }

    pub fn is_trackable(&self) -> bool {
        !matches!(self, BufferEncoding::Hexadecimal)
    }

    /// Encode buffer text, prefixing the BOM when the encoding asks for one.
    /// Text the encoding cannot represent is written as UTF-8 instead.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        let (encoding, bom) = match *self {
            BufferEncoding::Text { encoding, bom } => (encoding, bom),
            BufferEncoding::Hexadecimal => return text.as_bytes().to_vec(),
        };

        if encoding == UTF_16LE || encoding == UTF_16BE {
            let little_endian = encoding == UTF_16LE;
            let mut bytes = Vec::with_capacity(text.len() * 2 + 2);
            let mut push = |unit: u16| {
                if little_endian {
                    bytes.extend_from_slice(&unit.to_le_bytes());
                } else {
                    bytes.extend_from_slice(&unit.to_be_bytes());
                }
            };
            if bom {
                push(0xFEFF);
            }
            text.encode_utf16().for_each(&mut push);
            return bytes;
        }

        if encoding == UTF_8 {
            let mut bytes = Vec::with_capacity(text.len() + 3);
            if bom {
                bytes.extend_from_slice(UTF8_BOM);
            }
            bytes.extend_from_slice(text.as_bytes());
            return bytes;
        }

        let (encoded, _, had_errors) = encoding.encode(text);
        if had_errors {
            warn!(
                "Buffer text is not representable in {}, writing UTF-8",
                encoding.name()
            );
            return text.as_bytes().to_vec();
        }
        encoded.into_owned()
    }

    /// Decode bytes produced in this encoding, falling back to lossy UTF-8.
    pub fn decode(&self, bytes: &[u8]) -> String {
        if let BufferEncoding::Text { encoding, .. } = *self {
            if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes)
            {
                return text.into_owned();
            }
        }
        String::from_utf8_lossy(bytes).into_owned()
    }
}
