//! Upload format detection from magic bytes.
//!
//! Extensions lie; the first bytes don't. The filename is only used to
//! describe what was rejected.

use std::io::Cursor;

use serde::{Deserialize, Serialize};

/// Document families the pipeline accepts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Unsupported,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Unsupported => "unsupported",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormatDetection {
    pub mime_type: String,
    pub format: DocumentFormat,
    pub size_bytes: u64,
}

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

pub fn detect_format(bytes: &[u8], filename: Option<&str>) -> FormatDetection {
    let size_bytes = bytes.len() as u64;

    let (mime_type, format) = match bytes {
        // %PDF
        [0x25, 0x50, 0x44, 0x46, ..] => ("application/pdf".to_string(), DocumentFormat::Pdf),
        // PK\x03\x04, and a WordprocessingML main part inside
        [0x50, 0x4B, 0x03, 0x04, ..] if is_docx_container(bytes) => {
            (DOCX_MIME.to_string(), DocumentFormat::Docx)
        }
        _ => (guess_mime(filename), DocumentFormat::Unsupported),
    };

    FormatDetection {
        mime_type,
        format,
        size_bytes,
    }
}

fn is_docx_container(bytes: &[u8]) -> bool {
    zip::ZipArchive::new(Cursor::new(bytes))
        .map(|archive| archive.file_names().any(|n| n == "word/document.xml"))
        .unwrap_or(false)
}

fn guess_mime(filename: Option<&str>) -> String {
    filename
        .and_then(|name| mime_guess::from_path(name).first())
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::{Cursor, Write};

    /// Minimal zip holding the given parts.
    pub fn zip_with(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            for (name, body) in parts {
                zip.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_pdf_by_magic_bytes() {
        let detection = detect_format(b"%PDF-1.7\n...", Some("referral.bin"));
        assert_eq!(detection.format, DocumentFormat::Pdf);
        assert_eq!(detection.mime_type, "application/pdf");
        assert_eq!(detection.size_bytes, 12);
    }

    #[test]
    fn detects_docx_only_with_word_part() {
        let docx = fixtures::zip_with(&[("word/document.xml", "<w:document/>")]);
        assert_eq!(detect_format(&docx, None).format, DocumentFormat::Docx);

        let plain_zip = fixtures::zip_with(&[("readme.txt", "hello")]);
        assert_eq!(
            detect_format(&plain_zip, Some("archive.zip")).format,
            DocumentFormat::Unsupported
        );
    }

    #[test]
    fn unsupported_uses_filename_for_mime() {
        let detection = detect_format(&[0xFF, 0xD8, 0xFF, 0xE0], Some("scan.jpg"));
        assert_eq!(detection.format, DocumentFormat::Unsupported);
        assert_eq!(detection.mime_type, "image/jpeg");

        let detection = detect_format(b"hello", None);
        assert_eq!(detection.mime_type, "application/octet-stream");
    }
}
