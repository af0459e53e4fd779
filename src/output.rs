//! Output types: the validated bill of materials and run statistics.

use serde::{Deserialize, Serialize};

/// One line of the bill of materials.
///
/// Serialised with the service's Spanish field names so the JSON produced
/// by the CLI matches what the model was asked to emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BillItem {
    /// Consecutive zero-padded code, `"001"`, `"002"`, …
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "descripcion")]
    pub description: String,
    /// Unit of measurement (`m`, `pza`, `kg`, `lote`, …).
    #[serde(rename = "unidad")]
    pub unit: String,
    /// Non-negative quantity.
    #[serde(rename = "cantidad")]
    pub quantity: f64,
}

/// Timing and usage figures for one generation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Number of knowledge files sent with the plan.
    pub reference_count: usize,
    /// Whether the plan went through the rasterizer.
    pub plan_rasterized: bool,
    /// Total base64 bytes sent.
    pub payload_bytes: usize,
    /// Prompt tokens, when the service reports them.
    pub input_tokens: Option<u64>,
    /// Completion tokens, when the service reports them.
    pub output_tokens: Option<u64>,
    pub render_duration_ms: u64,
    pub service_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Successful result of a generation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillOfMaterials {
    /// Items in the order the service returned them.
    pub items: Vec<BillItem>,
    pub stats: GenerationStats,
}

impl BillOfMaterials {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn into_items(self) -> Vec<BillItem> {
        self.items
    }
}
