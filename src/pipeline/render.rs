//! Plan rasterisation: render page 1 of a PDF plan into one compressed image.
//!
//! ## Why only page 1?
//!
//! Plan sets put the floor plan with the HVAC layout on the first sheet;
//! later sheets are details and schedules that confuse the model's piping
//! estimate. Exactly one [`RasterImage`] is produced per plan, always from
//! page 1, however many pages the PDF has.
//!
//! ## Why a trait?
//!
//! The pdfium library is a process-wide native dependency. Hiding it behind
//! [`PageRasterizer`] lets the generator take it as an injected capability
//! and lets tests substitute a rasterizer that returns fixed pixels.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is CPU-bound and not async-safe. [`rasterize_first_page`] moves the
//! call onto Tokio's blocking pool so worker threads never stall on it.

use crate::document::MediaType;
use crate::error::{BomError, RenderError};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Compression applied to a rendered page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    /// Lossy, small; the default for analysis requests.
    Jpeg { quality: u8 },
    /// Lossless; used for previews.
    Png,
}

impl RasterFormat {
    pub fn media_type(&self) -> MediaType {
        match self {
            RasterFormat::Jpeg { .. } => MediaType::Jpeg,
            RasterFormat::Png => MediaType::Png,
        }
    }
}

/// How page 1 is rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    /// Scale factor relative to the page's natural size (72 DPI).
    pub scale: f32,
    /// Floor for the effective scale; the pixel cap never pushes below it.
    pub min_scale: f32,
    /// Cap on the longest edge in pixels.
    pub max_pixels: u32,
    /// Output compression.
    pub format: RasterFormat,
    /// Password for encrypted PDFs.
    pub password: Option<String>,
}

/// A rendered, compressed page.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub format: RasterFormat,
    /// Scale the page was actually rendered at.
    pub scale: f32,
    /// Compressed image bytes in `format`.
    pub bytes: Vec<u8>,
}

impl RasterImage {
    /// Compress a decoded bitmap into a `RasterImage`.
    pub fn from_image(
        image: &DynamicImage,
        format: RasterFormat,
        scale: f32,
    ) -> Result<Self, RenderError> {
        let bytes = compress_raster(image, format)?;
        Ok(Self {
            width: image.width(),
            height: image.height(),
            format,
            scale,
            bytes,
        })
    }

    pub fn media_type(&self) -> MediaType {
        self.format.media_type()
    }
}

impl RenderOptions {
    /// Scale to render a `width` x `height` pt page at.
    ///
    /// The requested scale is reduced until the longest edge fits
    /// `max_pixels`, but never below `min_scale`: a large sheet at the
    /// minimum scale may exceed the cap.
    pub fn effective_scale(&self, width_pt: f32, height_pt: f32) -> f32 {
        let longest = width_pt.max(height_pt);
        let capped = if longest > 0.0 {
            self.scale.min(self.max_pixels as f32 / longest)
        } else {
            self.scale
        };
        capped.max(self.min_scale)
    }
}

/// Compress a bitmap as JPEG (alpha dropped) or PNG.
pub fn compress_raster(
    image: &DynamicImage,
    format: RasterFormat,
) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    match format {
        RasterFormat::Jpeg { quality } => {
            let rgb = image.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            encoder.encode_image(&rgb)?;
        }
        RasterFormat::Png => {
            image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        }
    }
    debug!("Compressed {:?} → {} bytes", format, buf.len());
    Ok(buf)
}

/// Renders the first page of a page-based document.
pub trait PageRasterizer: Send + Sync {
    /// Render page 1 of `pdf`. Called from a blocking thread.
    fn render_first_page(
        &self,
        pdf: &[u8],
        options: &RenderOptions,
    ) -> Result<RasterImage, RenderError>;
}

/// [`PageRasterizer`] backed by pdfium.
///
/// Binds to the library named by `PDFIUM_LIB_PATH` (or an explicit path),
/// falling back to the system library. The binding and the loaded document
/// live only for the duration of one call.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// Use `PDFIUM_LIB_PATH` if set, else the system library.
    pub fn new() -> Self {
        let library_path = std::env::var_os("PDFIUM_LIB_PATH")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        Self { library_path }
    }

    /// Bind to a specific pdfium shared library.
    pub fn with_library(path: impl Into<PathBuf>) -> Self {
        Self {
            library_path: Some(path.into()),
        }
    }

    fn bind(&self) -> Result<Pdfium, RenderError> {
        let bindings = match &self.library_path {
            Some(path) => Pdfium::bind_to_library(path.to_string_lossy().to_string()),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| RenderError::Binding(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn render_first_page(
        &self,
        pdf: &[u8],
        options: &RenderOptions,
    ) -> Result<RasterImage, RenderError> {
        let pdfium = self.bind()?;
        let password = options.password.as_deref();

        let document = pdfium
            .load_pdf_from_byte_slice(pdf, password)
            .map_err(|e| {
                let err_str = format!("{:?}", e);
                if err_str.contains("Password") || err_str.contains("password") {
                    if password.is_some() {
                        RenderError::WrongPassword
                    } else {
                        RenderError::PasswordRequired
                    }
                } else {
                    RenderError::Load(err_str)
                }
            })?;

        let pages = document.pages();
        if pages.len() == 0 {
            return Err(RenderError::NoPages);
        }
        info!("PDF loaded: {} pages, rendering page 1", pages.len());

        let page = pages
            .get(0)
            .map_err(|e| RenderError::Render(format!("{:?}", e)))?;
        let scale = options.effective_scale(page.width().value, page.height().value);
        if scale < options.scale {
            debug!(
                "Page 1 is {}x{} pt; scale {} lowered to {} to fit {} px",
                page.width().value,
                page.height().value,
                options.scale,
                scale,
                options.max_pixels
            );
        }

        let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| RenderError::Render(format!("{:?}", e)))?;

        let image = bitmap.as_image();
        debug!("Rendered page 1 → {}x{} px", image.width(), image.height());

        RasterImage::from_image(&image, options.format, scale)
    }
}

/// Run `rasterizer` on a blocking thread and attribute failures to `document`.
pub async fn rasterize_first_page(
    rasterizer: Arc<dyn PageRasterizer>,
    document: &str,
    pdf: Vec<u8>,
    options: RenderOptions,
) -> Result<RasterImage, BomError> {
    let result =
        tokio::task::spawn_blocking(move || rasterizer.render_first_page(&pdf, &options))
            .await
            .map_err(|e| BomError::Internal(format!("Render task panicked: {}", e)))?;

    result.map_err(|source| BomError::Rasterization {
        document: document.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red_square(size: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(size, size, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn jpeg_compression_round_trips_dimensions() {
        let raster =
            RasterImage::from_image(&red_square(16), RasterFormat::Jpeg { quality: 90 }, 1.5)
                .unwrap();
        assert_eq!((raster.width, raster.height), (16, 16));
        assert_eq!(raster.media_type(), MediaType::Jpeg);
        assert_eq!(MediaType::sniff(&raster.bytes), Some(MediaType::Jpeg));
        let decoded = image::load_from_memory(&raster.bytes).unwrap();
        assert_eq!(decoded.width(), 16);
    }

    #[test]
    fn png_compression_is_lossless() {
        let img = red_square(8);
        let bytes = compress_raster(&img, RasterFormat::Png).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.to_rgba8(), img.to_rgba8());
    }

    fn options(scale: f32, min_scale: f32, max_pixels: u32) -> RenderOptions {
        RenderOptions {
            scale,
            min_scale,
            max_pixels,
            format: RasterFormat::Jpeg { quality: 90 },
            password: None,
        }
    }

    #[test]
    fn letter_page_keeps_requested_scale() {
        // 612 x 792 pt at 2.0 is 1224 x 1584 px, well under the cap.
        assert_eq!(options(2.0, 1.5, 4096).effective_scale(612.0, 792.0), 2.0);
    }

    #[test]
    fn cap_lowers_scale_on_medium_sheets() {
        // ARCH D (1728 x 2592 pt) at 2.0 would be 5184 px tall.
        let scale = options(2.0, 1.5, 4096).effective_scale(1728.0, 2592.0);
        assert!((scale - 4096.0 / 2592.0).abs() < 1e-4);
        assert!(scale >= 1.5);
    }

    #[test]
    fn cap_never_drops_below_minimum_scale() {
        // ARCH E (2592 x 3456 pt): fitting 4096 px would need about 1.19.
        let scale = options(1.5, 1.5, 4096).effective_scale(2592.0, 3456.0);
        assert_eq!(scale, 1.5);
        assert_eq!((3456.0 * scale) as u32, 5184);
    }

    #[test]
    fn preview_scale_may_go_below_analysis_minimum() {
        let scale = options(0.5, 0.0, 1024).effective_scale(2592.0, 3456.0);
        assert!((scale - 1024.0 / 3456.0).abs() < 1e-4);
    }

    struct FailingRasterizer;

    impl PageRasterizer for FailingRasterizer {
        fn render_first_page(
            &self,
            _pdf: &[u8],
            _options: &RenderOptions,
        ) -> Result<RasterImage, RenderError> {
            Err(RenderError::NoPages)
        }
    }

    #[tokio::test]
    async fn rasterize_attributes_errors_to_document() {
        let options = RenderOptions {
            scale: 1.5,
            min_scale: 1.5,
            max_pixels: 1024,
            format: RasterFormat::Png,
            password: None,
        };
        let err = rasterize_first_page(Arc::new(FailingRasterizer), "plano.pdf", vec![], options)
            .await
            .unwrap_err();
        match err {
            BomError::Rasterization { document, source } => {
                assert_eq!(document, "plano.pdf");
                assert!(matches!(source, RenderError::NoPages));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
