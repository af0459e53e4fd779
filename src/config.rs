//! Configuration types for bill-of-materials generation.
//!
//! Two structs cover the two halves of a run:
//!
//! * [`PipelineConfig`]: how the plan is rasterised and which instructions
//!   are sent. Shared by every run of a [`crate::BomGenerator`].
//! * [`GeminiConfig`]: how the Gemini REST client talks to the service.
//!
//! Both are built through a builder whose setters clamp values into their
//! valid ranges and whose `build()` rejects anything still out of range.

use crate::error::BomError;
use crate::pipeline::render::{RasterFormat, RenderOptions};
use serde::{Deserialize, Serialize};

/// Smallest render scale that keeps small labels on a plan legible.
pub const MIN_RENDER_SCALE: f32 = 1.5;

/// Largest render scale accepted.
pub const MAX_RENDER_SCALE: f32 = 4.0;

/// Pipeline configuration.
///
/// # Example
/// ```rust
/// use plan2bom::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .render_scale(2.0)
///     .jpeg_quality(85)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Scale factor applied to page 1 of a PDF plan. Range: 1.5–4.0. Default: 1.5.
    ///
    /// At 1.0 a letter-size page is 612 × 792 px and dimension labels on a
    /// floor plan become unreadable; 1.5 is the smallest scale at which the
    /// model can still read them.
    pub render_scale: f32,

    /// Longest-edge cap for the rendered plan in pixels. Default: 4096.
    ///
    /// Lowers `render_scale` on large sheets, but never below
    /// [`MIN_RENDER_SCALE`]; an A0 sheet at 1.5× stays over the cap.
    pub max_rendered_pixels: u32,

    /// JPEG quality for the rendered plan. Range: 1–100. Default: 90.
    pub jpeg_quality: u8,

    /// Scale used by [`crate::BomGenerator::preview`]. Default: 0.5.
    pub preview_scale: f32,

    /// Password for encrypted plan PDFs.
    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// Instruction template override. If None, uses [`crate::prompts::DEFAULT_INSTRUCTIONS`].
    pub instructions: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            render_scale: MIN_RENDER_SCALE,
            max_rendered_pixels: 4096,
            jpeg_quality: 90,
            preview_scale: 0.5,
            password: None,
            instructions: None,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Render options for the analysis image.
    pub fn analysis_render_options(&self) -> RenderOptions {
        RenderOptions {
            scale: self.render_scale,
            min_scale: MIN_RENDER_SCALE,
            max_pixels: self.max_rendered_pixels,
            format: RasterFormat::Jpeg {
                quality: self.jpeg_quality,
            },
            password: self.password.clone(),
        }
    }

    /// Render options for the low-resolution preview.
    pub fn preview_render_options(&self) -> RenderOptions {
        RenderOptions {
            scale: self.preview_scale,
            min_scale: 0.1,
            max_pixels: self.max_rendered_pixels,
            format: RasterFormat::Png,
            password: self.password.clone(),
        }
    }

    /// The instruction text sent with every request.
    pub fn instructions(&self) -> &str {
        self.instructions
            .as_deref()
            .unwrap_or(crate::prompts::DEFAULT_INSTRUCTIONS)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn render_scale(mut self, scale: f32) -> Self {
        self.config.render_scale = scale.clamp(MIN_RENDER_SCALE, MAX_RENDER_SCALE);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(256);
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.config.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn preview_scale(mut self, scale: f32) -> Self {
        self.config.preview_scale = scale.clamp(0.1, 2.0);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn instructions(mut self, text: impl Into<String>) -> Self {
        self.config.instructions = Some(text.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, BomError> {
        let c = &self.config;
        if !c.render_scale.is_finite()
            || c.render_scale < MIN_RENDER_SCALE
            || c.render_scale > MAX_RENDER_SCALE
        {
            return Err(BomError::InvalidConfig(format!(
                "render scale must be {MIN_RENDER_SCALE}–{MAX_RENDER_SCALE}, got {}",
                c.render_scale
            )));
        }
        if c.jpeg_quality == 0 || c.jpeg_quality > 100 {
            return Err(BomError::InvalidConfig(format!(
                "JPEG quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if let Some(ref text) = c.instructions {
            if text.trim().is_empty() {
                return Err(BomError::InvalidConfig(
                    "instructions must not be empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

/// Default Gemini model.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-pro";

/// Default Gemini REST endpoint.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Configuration for [`crate::service::gemini::GeminiService`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// Model identifier. Default: `gemini-2.5-pro`.
    pub model: String,

    /// REST base URL, without a trailing slash.
    pub base_url: String,

    /// Whole-request timeout in seconds. Default: 300.
    ///
    /// Reasoning models routinely spend over a minute on a dense plan.
    pub timeout_secs: u64,

    /// Sampling temperature. If None, the service default applies.
    pub temperature: Option<f32>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            timeout_secs: 300,
            temperature: None,
        }
    }
}

impl GeminiConfig {
    /// Create a new builder for `GeminiConfig`.
    pub fn builder() -> GeminiConfigBuilder {
        GeminiConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`GeminiConfig`].
#[derive(Debug)]
pub struct GeminiConfigBuilder {
    config: GeminiConfig,
}

impl GeminiConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs.max(1);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = Some(t.clamp(0.0, 2.0));
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GeminiConfig, BomError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(BomError::InvalidConfig("model must not be empty".into()));
        }
        if !(c.base_url.starts_with("http://") || c.base_url.starts_with("https://")) {
            return Err(BomError::InvalidConfig(format!(
                "base URL must be HTTP or HTTPS, got '{}'",
                c.base_url
            )));
        }
        Ok(self.config)
    }
}
