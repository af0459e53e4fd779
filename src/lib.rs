//! # plan2bom
//!
//! Generate an HVAC bill of materials ("Catálogo de Conceptos") from a floor
//! plan using a vision-capable generative model.
//!
//! ## Why this crate?
//!
//! Take-offs from 2D plans are slow and error-prone by hand: piping runs,
//! insulation, refrigerant and mounting hardware all have to be measured and
//! counted. This crate renders the plan's first sheet to an image, sends it
//! together with any reference images (catalogues, price lists, previous
//! take-offs) to a model constrained to answer with a fixed JSON schema, and
//! re-validates the answer before handing back typed [`BillItem`]s.
//!
//! ## Pipeline Overview
//!
//! ```text
//! plan (PDF or image) + knowledge files
//!  │
//!  ├─ 1. Render    page 1 of a PDF via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 2. Encode    plan image and each knowledge file → base64
//!  ├─ 3. Compose   instructions + plan + references + response schema
//!  ├─ 4. Analyze   one call to Gemini (or any edgequake-llm provider)
//!  └─ 5. Validate  JSON array of {codigo, descripcion, unidad, cantidad}
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use plan2bom::{
//!     BomGenerator, GeminiConfig, GeminiService, MediaType, PdfiumRasterizer,
//!     PipelineConfig, ProgressLog, UploadedDocument,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = GeminiService::new(std::env::var("GEMINI_API_KEY")?, GeminiConfig::default())?;
//!     let generator = BomGenerator::new(
//!         Arc::new(PdfiumRasterizer::new()),
//!         Arc::new(service),
//!         PipelineConfig::default(),
//!     );
//!
//!     let plan = UploadedDocument::from_file("plano.pdf", MediaType::Pdf);
//!     let log = ProgressLog::new();
//!     let bom = generator.generate(plan, vec![], &log).await?;
//!     for item in &bom.items {
//!         println!("{} {} {} {}", item.code, item.description, item.unit, item.quantity);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `plan2bom` binary (clap + indicatif + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! plan2bom = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod generate;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod service;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GeminiConfig, GeminiConfigBuilder, PipelineConfig, PipelineConfigBuilder};
pub use document::{MediaType, UploadedDocument};
pub use error::{BomError, ErrorKind, RenderError, ServiceError};
pub use generate::{BomGenerator, PlanPreview};
pub use output::{BillItem, BillOfMaterials, GenerationStats};
pub use pipeline::input::resolve_document;
pub use pipeline::render::{PageRasterizer, PdfiumRasterizer, RasterFormat, RasterImage};
pub use progress::{NoopProgress, ProgressEntry, ProgressFn, ProgressLog, ProgressReporter};
pub use service::{AnalysisService, GeminiService, LlmProviderService, ServiceResponse};
