//! Instruction template and response schema for bill-of-materials generation.
//!
//! Both are fixed for the life of a generator. The template tells the model
//! what to look for on an HVAC plan and how to answer; the schema is attached
//! to every request so services that support schema-constrained generation
//! (Gemini) can enforce it, and is embedded into the system message for chat
//! providers that cannot.
//!
//! Field names stay in Spanish (`codigo`, `descripcion`, `unidad`,
//! `cantidad`) because they are the columns of a Mexican *Catálogo de
//! Conceptos* and existing consumers of the JSON depend on them.

use serde_json::{json, Value};

/// Default instructions sent as the first part of every request.
///
/// Used when [`crate::config::PipelineConfig::instructions`] is `None`.
pub const DEFAULT_INSTRUCTIONS: &str = r#"You are an expert HVAC engineer specializing in creating a bill of materials (Catálogo de Conceptos) from 2D plans. Your task is to analyze the provided plan and generate a detailed list of materials required for the air conditioning installation.

Instructions:
1. Analyze the main plan image provided. It is the first image in this request.
2. Identify all evaporator units (indoor units, often marked as 'EVAP' or similar) and condenser units (outdoor units, often marked as 'COND' or similar).
3. For each evaporator-condenser pair, trace the path of the refrigerant piping.
4. Estimate the length of the piping in meters. Assume a standard architectural scale if none is provided.
5. Refer to any additional 'knowledge base' images that follow the plan. They are examples of past projects and their required materials. Use them to understand the typical components needed for different types of installations (copper tubing sizes, insulation, wiring, mounting brackets, drain pipes).
6. Based on the identified units, piping distances, and the knowledge base, create a comprehensive bill of materials ('Catálogo de Conceptos').
7. The output must be a JSON array of objects. Do not include any text, markdown, or explanations before or after the JSON array. Each object must adhere to the provided schema.
8. Example items to include: refrigerant copper tubing (specify diameter if possible), thermal insulation for tubing, electrical wiring (low and high voltage), PVC drain pipe, mounting brackets for condensers, wall sleeves.
9. Generate a consecutive code for each item starting from '001'.
10. Quantities must be non-negative numbers."#;

/// The response-shape constraint attached to every request.
///
/// Uses the OpenAPI-subset type names (`ARRAY`, `OBJECT`, …) that Gemini's
/// `responseSchema` expects.
pub fn response_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "codigo": {
                    "type": "STRING",
                    "description": "A consecutive numeric code for the concept, e.g., \"001\", \"002\"."
                },
                "descripcion": {
                    "type": "STRING",
                    "description": "Detailed description of the concept or material."
                },
                "unidad": {
                    "type": "STRING",
                    "description": "The unit of measurement for the concept (e.g., \"m\", \"pza\", \"kg\", \"lote\")."
                },
                "cantidad": {
                    "type": "NUMBER",
                    "description": "The quantity of the material required."
                }
            },
            "required": ["codigo", "descripcion", "unidad", "cantidad"],
            "propertyOrdering": ["codigo", "descripcion", "unidad", "cantidad"]
        }
    })
}

/// System message for chat providers without schema enforcement.
pub fn instructions_with_schema(instructions: &str, schema: &Value) -> String {
    let schema_text = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "{instructions}\n\nRespond with a single JSON value that conforms to this schema:\n{schema_text}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_requires_all_four_fields() {
        let schema = response_schema();
        assert_eq!(schema["type"], "ARRAY");
        let required = schema["items"]["required"].as_array().unwrap();
        assert_eq!(required.len(), 4);
        assert_eq!(schema["items"]["properties"]["cantidad"]["type"], "NUMBER");
        assert_eq!(schema["items"]["properties"]["codigo"]["type"], "STRING");
    }

    #[test]
    fn instructions_mention_output_contract() {
        assert!(DEFAULT_INSTRUCTIONS.contains("JSON array"));
        assert!(DEFAULT_INSTRUCTIONS.contains("'001'"));
    }

    #[test]
    fn schema_embedded_in_system_message() {
        let msg = instructions_with_schema("Do the thing.", &response_schema());
        assert!(msg.starts_with("Do the thing."));
        assert!(msg.contains("\"descripcion\""));
    }
}
