/// Encoding detection for source files and catalogs
use std::io::{self, Read};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Utf8Bom,
    Utf16Le,
    Utf16Be,
    Latin1,
}

pub const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Newline {
    #[default]
    Lf,
    Crlf,
}

impl Newline {
    /// Turns `\n`-separated text back into this style
    pub fn apply(self, text: String) -> String {
        match self {
            Self::Lf => text,
            Self::Crlf => text.replace('\n', "\r\n"),
        }
    }
}

/// File content decoded to UTF-8 with `\r\n` folded to `\n`
#[derive(Debug, Clone)]
pub struct DecodedText {
    pub text: String,
    pub encoding: Encoding,
    pub newline: Newline,
}

impl DecodedText {
    pub fn read_file(path: &Path) -> Result<Self, io::Error> {
        let mut file = std::fs::File::open(path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Self::decode(&bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, io::Error> {
        let encoding = detect_encoding(bytes);
        let newline = detect_newline(bytes);
        let text = decode_with(bytes, encoding)?;
        let text = match newline {
            Newline::Crlf => text.replace("\r\n", "\n"),
            Newline::Lf => text,
        };
        Ok(Self {
            text,
            encoding,
            newline,
        })
    }
}

pub fn detect_encoding(content: &[u8]) -> Encoding {
    if content.starts_with(UTF8_BOM) {
        return Encoding::Utf8Bom;
    }
    if content.starts_with(&[0xFF, 0xFE]) {
        return Encoding::Utf16Le;
    }
    if content.starts_with(&[0xFE, 0xFF]) {
        return Encoding::Utf16Be;
    }
    if std::str::from_utf8(content).is_ok() {
        return Encoding::Utf8;
    }
    Encoding::Latin1
}

fn detect_newline(content: &[u8]) -> Newline {
    if content.windows(2).any(|window| window == b"\r\n") {
        Newline::Crlf
    } else {
        Newline::Lf
    }
}

fn decode_with(bytes: &[u8], encoding: Encoding) -> Result<String, io::Error> {
    let invalid =
        |err: &dyn std::fmt::Display| io::Error::new(io::ErrorKind::InvalidData, err.to_string());
    match encoding {
        Encoding::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|e| invalid(&e)),
        Encoding::Utf8Bom => String::from_utf8(bytes[3..].to_vec()).map_err(|e| invalid(&e)),
        Encoding::Utf16Le | Encoding::Utf16Be => {
            let units: Vec<u16> = bytes[2..]
                .chunks_exact(2)
                .map(|chunk| match encoding {
                    Encoding::Utf16Le => u16::from_le_bytes([chunk[0], chunk[1]]),
                    _ => u16::from_be_bytes([chunk[0], chunk[1]]),
                })
                .collect();
            String::from_utf16(&units).map_err(|e| invalid(&e))
        }
        // Latin1 bytes map one to one onto U+0000..U+00FF
        Encoding::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}
