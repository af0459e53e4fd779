//! Input resolution: turn a user-supplied path or URL into an `UploadedDocument`.
//!
//! Local files stay file-backed (read later by the stage that needs them);
//! URLs are downloaded into memory. In both cases the media type comes from
//! the magic bytes when they are recognisable, else from the extension (or
//! the `Content-Type` header for downloads), so a `.pdf` that is really a
//! JPEG is still sent correctly.

use crate::document::{MediaType, UploadedDocument};
use crate::error::BomError;
use std::io::Read;
use std::path::PathBuf;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a path or URL into a document.
pub async fn resolve_document(
    input: &str,
    timeout_secs: u64,
) -> Result<UploadedDocument, BomError> {
    if input.trim().is_empty() {
        return Err(BomError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Resolve a local file path, validating existence and sniffing its type.
fn resolve_local(path_str: &str) -> Result<UploadedDocument, BomError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(BomError::FileNotFound { path });
    }

    let mut magic = [0u8; 12];
    let n = match std::fs::File::open(&path) {
        Ok(mut f) => f.read(&mut magic).unwrap_or(0),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(BomError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(BomError::FileNotFound { path });
        }
    };

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(MediaType::from_extension);
    let media_type = MediaType::sniff(&magic[..n])
        .or(extension)
        .ok_or_else(|| BomError::UnsupportedMediaType {
            name: path.display().to_string(),
            media_type: "unknown".to_string(),
        })?;

    debug!("Resolved local {}: {}", media_type, path.display());
    Ok(UploadedDocument::from_file(path, media_type))
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<UploadedDocument, BomError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| BomError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            BomError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            BomError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(BomError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let header_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(MediaType::from_mime);
    let filename = extract_filename(url);

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            BomError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            BomError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    let extension = filename
        .rsplit_once('.')
        .and_then(|(_, ext)| MediaType::from_extension(ext));
    let media_type = MediaType::sniff(&bytes)
        .or(extension)
        .or(header_type)
        .ok_or_else(|| BomError::UnsupportedMediaType {
            name: url.to_string(),
            media_type: "unknown".to_string(),
        })?;

    info!("Downloaded {} bytes ({})", bytes.len(), media_type);
    Ok(UploadedDocument::from_bytes(
        filename,
        media_type,
        bytes.to_vec(),
    ))
}

/// Extract a reasonable filename from the URL path.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded".to_string()
}
