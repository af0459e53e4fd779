//! Error types for the plan2bom library.
//!
//! Every failure in a generation run is terminal: there are no retries and no
//! partial results. Errors are grouped into an [`ErrorKind`] so callers can
//! pick a message or exit code per category without matching every variant:
//!
//! * **Input**: the plan or a knowledge file could not be located.
//! * **Rasterization**: page 1 of the plan could not be rendered.
//! * **Encoding**: a document could not be read in full.
//! * **Service**: the external model call failed (network, auth, quota).
//! * **InvalidResponseFormat**: the model answered, but not with a valid
//!   bill of materials.
//!
//! Rasterization and encoding errors always happen before any network call.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the plan2bom library.
#[derive(Debug, Error)]
pub enum BomError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The document is neither a PDF nor an image the service accepts.
    #[error("Unsupported media type '{media_type}' for '{name}'")]
    UnsupportedMediaType { name: String, media_type: String },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// Page 1 of the plan could not be rendered.
    #[error("Could not analyze plan '{document}': {source}")]
    Rasterization {
        document: String,
        #[source]
        source: RenderError,
    },

    /// A document could not be read in full before encoding.
    #[error("Could not read '{document}': {source}")]
    Encoding {
        document: String,
        #[source]
        source: std::io::Error,
    },

    /// The external analysis service failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The configured chat provider could not be created.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The service reply was not a schema-conformant bill of materials.
    ///
    /// `detail` (parser diagnostics) and `raw` (the offending text) are kept
    /// for logging only; the display message never includes them.
    #[error("The AI returned an invalid response format. Check the logs for details.")]
    InvalidResponseFormat { detail: String, raw: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure category of a [`BomError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Rasterization,
    Encoding,
    Service,
    InvalidResponseFormat,
    Configuration,
    Internal,
}

impl BomError {
    /// The failure category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BomError::FileNotFound { .. }
            | BomError::PermissionDenied { .. }
            | BomError::InvalidInput { .. }
            | BomError::DownloadFailed { .. }
            | BomError::DownloadTimeout { .. }
            | BomError::UnsupportedMediaType { .. } => ErrorKind::Input,
            BomError::Rasterization { .. } => ErrorKind::Rasterization,
            BomError::Encoding { .. } => ErrorKind::Encoding,
            BomError::Service(_) | BomError::ProviderNotConfigured { .. } => ErrorKind::Service,
            BomError::InvalidResponseFormat { .. } => ErrorKind::InvalidResponseFormat,
            BomError::InvalidConfig(_) => ErrorKind::Configuration,
            BomError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Why page 1 of a PDF could not be turned into a [`crate::pipeline::render::RasterImage`].
#[derive(Debug, Error)]
pub enum RenderError {
    /// No pdfium library could be loaded.
    #[error(
        "failed to bind to pdfium library: {0}\n\
Install pdfium or set PDFIUM_LIB_PATH=/path/to/libpdfium."
    )]
    Binding(String),

    /// The bytes are not a readable PDF.
    #[error("document is corrupt or not a PDF: {0}")]
    Load(String),

    /// The PDF is encrypted and no password was configured.
    #[error("document is encrypted and requires a password")]
    PasswordRequired,

    /// The configured password was rejected.
    #[error("wrong password for encrypted document")]
    WrongPassword,

    /// The PDF has zero pages.
    #[error("document has no pages")]
    NoPages,

    /// pdfium failed while drawing page 1.
    #[error("page 1 could not be rendered: {0}")]
    Render(String),

    /// The rendered bitmap could not be compressed.
    #[error("rendered page could not be compressed: {0}")]
    Compress(#[from] image::ImageError),
}

/// A failed round-trip to the external analysis service.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    /// HTTP 401/403: the credential was rejected.
    #[error("Authentication error from '{service}': {message}")]
    Auth { service: String, message: String },

    /// HTTP 429: quota or rate limit exhausted.
    #[error("Rate limit exceeded for '{service}'")]
    RateLimited {
        service: String,
        retry_after_secs: Option<u64>,
    },

    /// The call did not complete within the configured timeout.
    #[error("Request to '{service}' timed out after {secs}s")]
    Timeout { service: String, secs: u64 },

    /// Any other non-success HTTP status.
    #[error("'{service}' returned HTTP {status}: {message}")]
    Api {
        service: String,
        status: u16,
        message: String,
    },

    /// Connection, TLS, or body-decoding failure.
    #[error("Could not reach '{service}': {message}")]
    Transport { service: String, message: String },

    /// The service refused the prompt.
    #[error("'{service}' blocked the request: {reason}")]
    Blocked { service: String, reason: String },

    /// The service answered without any text.
    #[error("'{service}' returned an empty response")]
    EmptyResponse { service: String },

    /// A chat provider returned an error.
    #[error("LLM API error: {message}")]
    Provider { message: String },
}
