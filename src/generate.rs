//! The generator: one plan plus knowledge files in, one bill of materials out.
//!
//! [`BomGenerator`] owns the two injected capabilities (a page rasterizer and
//! an analysis service) and runs the stages strictly in sequence:
//!
//! ```text
//! plan ──▶ rasterize (PDF) / read (image) ──▶ encode ─┐
//! knowledge[0..n] ──▶ encode, one at a time ──────────┼─▶ compose ──▶ analyze ──▶ validate
//! ```
//!
//! Every failure is terminal for the run. Rasterization and encoding happen
//! before the service is contacted, so a bad plan or an unreadable knowledge
//! file never costs a request.

use crate::config::PipelineConfig;
use crate::document::{MediaType, UploadedDocument};
use crate::error::{BomError, RenderError};
use crate::output::{BillOfMaterials, GenerationStats};
use crate::pipeline::compose::compose_request;
use crate::pipeline::encode::{self, EncodedAsset};
use crate::pipeline::render::{self, PageRasterizer, RasterImage};
use crate::pipeline::validate::parse_bill_items;
use crate::progress::ProgressReporter;
use crate::service::AnalysisService;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A displayable picture of the plan's first page.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanPreview {
    /// Pixel size; 0x0 when an image plan's header could not be decoded.
    pub width: u32,
    pub height: u32,
    pub media_type: MediaType,
    pub bytes: Vec<u8>,
}

impl From<RasterImage> for PlanPreview {
    fn from(raster: RasterImage) -> Self {
        Self {
            width: raster.width,
            height: raster.height,
            media_type: raster.media_type(),
            bytes: raster.bytes,
        }
    }
}

/// Runs the plan-to-bill-of-materials pipeline.
///
/// Cheap to share: wrap it in an `Arc` and call [`generate`](Self::generate)
/// from as many tasks as needed. Runs do not share state.
pub struct BomGenerator {
    rasterizer: Arc<dyn PageRasterizer>,
    service: Arc<dyn AnalysisService>,
    config: PipelineConfig,
}

impl BomGenerator {
    pub fn new(
        rasterizer: Arc<dyn PageRasterizer>,
        service: Arc<dyn AnalysisService>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            rasterizer,
            service,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn service_name(&self) -> &str {
        self.service.name()
    }

    /// Analyse `plan` with `knowledge` as reference material.
    ///
    /// Progress messages go to `progress` as each stage starts or ends.
    /// Messages already reported stay reported when a later stage fails.
    pub async fn generate(
        &self,
        plan: UploadedDocument,
        knowledge: Vec<UploadedDocument>,
        progress: &dyn ProgressReporter,
    ) -> Result<BillOfMaterials, BomError> {
        let total_start = Instant::now();
        let service_name = self.service.name().to_string();
        info!(
            "Starting analysis of '{}' with {} knowledge file(s)",
            plan.name,
            knowledge.len()
        );

        progress.on_progress(&format!("Initializing AI service ({service_name})..."));

        // Every reference part is an image part; anything else is refused
        // before the plan is rendered.
        if let Some(doc) = knowledge.iter().find(|d| !d.media_type.is_image()) {
            return Err(BomError::UnsupportedMediaType {
                name: doc.name.clone(),
                media_type: doc.media_type.to_string(),
            });
        }

        // ── Step 1: Plan → primary asset ─────────────────────────────────
        let render_start = Instant::now();
        let plan_rasterized = plan.media_type.is_page_based();
        let primary = self.encode_plan(&plan, progress).await?;
        let render_duration_ms = render_start.elapsed().as_millis() as u64;

        // ── Step 2: Knowledge files, strictly in order ───────────────────
        let reference_count = knowledge.len();
        let mut references = Vec::with_capacity(reference_count);
        for doc in &knowledge {
            progress.on_progress(&format!("Processing knowledge file: {}...", doc.name));
            references.push(encode::encode_document(doc).await?);
        }
        progress.on_progress("All knowledge files processed.");

        // ── Step 3: Compose ──────────────────────────────────────────────
        let request = compose_request(self.config.instructions(), primary, references);
        let payload_bytes = request.payload_bytes();
        debug!(
            "Composed request: {} parts, {} bytes base64",
            request.parts().len(),
            payload_bytes
        );

        // ── Step 4: Dispatch ─────────────────────────────────────────────
        progress.on_progress(&format!("Sending data to {service_name} for analysis..."));
        let service_start = Instant::now();
        let response = self.service.analyze(&request).await?;
        let service_duration_ms = service_start.elapsed().as_millis() as u64;
        info!(
            "{} answered in {}ms ({} chars)",
            service_name,
            service_duration_ms,
            response.text.len()
        );

        // ── Step 5: Validate ─────────────────────────────────────────────
        progress.on_progress("AI analysis complete. Parsing results...");
        let items = parse_bill_items(&response.text)?;
        progress.on_progress("Successfully parsed results.");

        let stats = GenerationStats {
            reference_count,
            plan_rasterized,
            payload_bytes,
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            render_duration_ms,
            service_duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };
        info!(
            "Bill of materials ready: {} items in {}ms",
            items.len(),
            stats.total_duration_ms
        );

        Ok(BillOfMaterials { items, stats })
    }

    /// Render a small PNG of the plan's first page for display.
    ///
    /// Image plans are not re-encoded; their bytes come back unchanged with
    /// the dimensions read from the header, or 0x0 when the header cannot be
    /// decoded.
    pub async fn preview(&self, plan: &UploadedDocument) -> Result<PlanPreview, BomError> {
        if plan.media_type.is_page_based() {
            let bytes = read_page_document(plan).await?;
            let raster = render::rasterize_first_page(
                Arc::clone(&self.rasterizer),
                &plan.name,
                bytes,
                self.config.preview_render_options(),
            )
            .await?;
            return Ok(PlanPreview::from(raster));
        }

        if !plan.media_type.is_image() {
            return Err(BomError::UnsupportedMediaType {
                name: plan.name.clone(),
                media_type: plan.media_type.to_string(),
            });
        }
        let bytes = plan.read_bytes().await.map_err(|source| BomError::Encoding {
            document: plan.name.clone(),
            source,
        })?;
        let (width, height) = match image::load_from_memory(&bytes) {
            Ok(decoded) => (decoded.width(), decoded.height()),
            Err(e) => {
                warn!("Could not read dimensions of '{}': {}", plan.name, e);
                (0, 0)
            }
        };

        Ok(PlanPreview {
            width,
            height,
            media_type: plan.media_type.clone(),
            bytes,
        })
    }

    async fn encode_plan(
        &self,
        plan: &UploadedDocument,
        progress: &dyn ProgressReporter,
    ) -> Result<EncodedAsset, BomError> {
        if plan.media_type.is_page_based() {
            progress.on_progress(&format!("Processing PDF plan: {}...", plan.name));
            let bytes = read_page_document(plan).await?;
            let raster = render::rasterize_first_page(
                Arc::clone(&self.rasterizer),
                &plan.name,
                bytes,
                self.config.analysis_render_options(),
            )
            .await?;
            info!(
                "Rendered page 1 of '{}': {}x{} at scale {}",
                plan.name, raster.width, raster.height, raster.scale
            );
            progress.on_progress("PDF converted to image for analysis.");
            Ok(encode::encode_raster(&raster))
        } else if plan.media_type.is_image() {
            progress.on_progress(&format!("Processing image plan: {}...", plan.name));
            let asset = encode::encode_document(plan).await?;
            progress.on_progress("Image plan encoded for analysis.");
            Ok(asset)
        } else {
            Err(BomError::UnsupportedMediaType {
                name: plan.name.clone(),
                media_type: plan.media_type.to_string(),
            })
        }
    }
}

/// An unreadable PDF cannot be rendered, so read failures count as
/// rasterization failures here.
async fn read_page_document(plan: &UploadedDocument) -> Result<Vec<u8>, BomError> {
    plan.read_bytes()
        .await
        .map_err(|e| BomError::Rasterization {
            document: plan.name.clone(),
            source: RenderError::Load(e.to_string()),
        })
}
