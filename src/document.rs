//! Uploaded documents: the plan and the knowledge-base files.
//!
//! A document is a name, a declared media type, and a byte source. File-backed
//! sources are read lazily, at the pipeline stage that needs the bytes, so
//! that a truncated or vanished file is reported by that stage (as a
//! rasterization or encoding failure) rather than up front.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Media type of an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    Pdf,
    Png,
    Jpeg,
    Webp,
    /// Any other MIME type, kept verbatim.
    Other(String),
}

impl MediaType {
    /// The MIME string sent to the analysis service.
    pub fn as_str(&self) -> &str {
        match self {
            MediaType::Pdf => "application/pdf",
            MediaType::Png => "image/png",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Webp => "image/webp",
            MediaType::Other(s) => s,
        }
    }

    /// Parse a MIME string such as `"image/jpeg"` (parameters are ignored).
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => MediaType::Pdf,
            "image/png" => MediaType::Png,
            "image/jpeg" | "image/jpg" => MediaType::Jpeg,
            "image/webp" => MediaType::Webp,
            _ => MediaType::Other(essence),
        }
    }

    /// Infer from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(MediaType::Pdf),
            "png" => Some(MediaType::Png),
            "jpg" | "jpeg" => Some(MediaType::Jpeg),
            "webp" => Some(MediaType::Webp),
            _ => None,
        }
    }

    /// Detect the type from leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            Some(MediaType::Pdf)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(MediaType::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(MediaType::Jpeg)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(MediaType::Webp)
        } else {
            None
        }
    }

    /// Page-based formats are rasterised; everything else is sent as-is.
    pub fn is_page_based(&self) -> bool {
        matches!(self, MediaType::Pdf)
    }

    /// Whether the type is an `image/*` type.
    pub fn is_image(&self) -> bool {
        self.as_str().starts_with("image/")
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a document's bytes come from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// Bytes already in memory (uploads, downloads).
    Memory(Vec<u8>),
    /// A local file, read when needed.
    File(PathBuf),
}

/// A document handed to the pipeline by its caller.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    /// Display name used in progress messages and errors.
    pub name: String,
    /// Declared media type.
    pub media_type: MediaType,
    /// Byte source.
    pub source: DocumentSource,
}

impl UploadedDocument {
    /// A document whose bytes are already in memory.
    pub fn from_bytes(name: impl Into<String>, media_type: MediaType, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type,
            source: DocumentSource::Memory(bytes),
        }
    }

    /// A document backed by a local file. The name is the file name.
    pub fn from_file(path: impl Into<PathBuf>, media_type: MediaType) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            media_type,
            source: DocumentSource::File(path),
        }
    }

    /// Read the complete contents.
    ///
    /// For file sources the number of bytes read must match the size the
    /// file reported when opened; anything shorter is `UnexpectedEof`.
    pub async fn read_bytes(&self) -> io::Result<Vec<u8>> {
        match &self.source {
            DocumentSource::Memory(bytes) => Ok(bytes.clone()),
            DocumentSource::File(path) => read_file_in_full(path).await,
        }
    }
}

async fn read_file_in_full(path: &Path) -> io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    let expected = file.metadata().await?.len();
    let buf = read_expected_len(&mut file, expected).await?;
    debug!("Read {} bytes from {}", buf.len(), path.display());
    Ok(buf)
}

/// Read `reader` to the end; fewer than `expected` bytes is `UnexpectedEof`.
async fn read_expected_len<R>(reader: &mut R, expected: u64) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(expected as usize);
    reader.read_to_end(&mut buf).await?;

    if (buf.len() as u64) < expected {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("read {} of {} bytes", buf.len(), expected),
        ));
    }
    Ok(buf)
}
