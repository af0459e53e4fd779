//! Binary encoding: raw bytes → base64 `EncodedAsset`.
//!
//! Multimodal APIs take images inline as base64 inside the JSON request
//! body. Standard (padded) base64 is what Gemini's `inlineData.data` and the
//! chat providers' data-URIs expect.

use crate::document::{MediaType, UploadedDocument};
use crate::error::BomError;
use crate::pipeline::render::RasterImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A media type plus base64 payload, ready to embed in a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedAsset {
    pub media_type: String,
    pub data: String,
}

impl EncodedAsset {
    /// Decode the payload back to the original bytes.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}

/// Encode bytes already in memory.
pub fn encode_bytes(bytes: &[u8], media_type: &MediaType) -> EncodedAsset {
    let data = STANDARD.encode(bytes);
    debug!(
        "Encoded {} bytes of {} → {} bytes base64",
        bytes.len(),
        media_type,
        data.len()
    );
    EncodedAsset {
        media_type: media_type.as_str().to_string(),
        data,
    }
}

/// Encode a rendered page.
pub fn encode_raster(image: &RasterImage) -> EncodedAsset {
    encode_bytes(&image.bytes, &image.media_type())
}

/// Read a document in full and encode it under its declared media type.
pub async fn encode_document(document: &UploadedDocument) -> Result<EncodedAsset, BomError> {
    let bytes = document
        .read_bytes()
        .await
        .map_err(|source| BomError::Encoding {
            document: document.name.clone(),
            source,
        })?;
    Ok(encode_bytes(&bytes, &document.media_type))
}
