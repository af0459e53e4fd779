//! Response validation: service text → `Vec<BillItem>`.
//!
//! Schema-constrained generation narrows what the model can emit but is not
//! a guarantee, and chat providers without schema support have no
//! constraint at all. Every response is therefore re-checked here:
//!
//! 1. Trim, and strip one outer ```` ```json ```` fence if present.
//! 2. Parse as JSON; the top level must be an array.
//! 3. Each element must be an object with exactly `codigo`, `descripcion`,
//!    `unidad` (strings) and `cantidad` (finite, non-negative number).
//!
//! One bad element rejects the whole response. Items are returned in the
//! order received, without sorting or de-duplication.

use crate::error::BomError;
use crate::output::BillItem;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{error, warn};

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?\s*\n(.*)\n```\s*$").unwrap());

fn strip_json_fences(input: &str) -> &str {
    match RE_OUTER_FENCES.captures(input) {
        Some(caps) => caps.get(1).map_or(input, |m| m.as_str().trim()),
        None => input,
    }
}

/// Parse and validate the raw text returned by the analysis service.
pub fn parse_bill_items(raw: &str) -> Result<Vec<BillItem>, BomError> {
    let text = strip_json_fences(raw.trim());

    let value: Value = serde_json::from_str(text)
        .map_err(|e| invalid(raw, format!("response is not JSON: {e}")))?;

    let elements = match value {
        Value::Array(elements) => elements,
        other => {
            return Err(invalid(
                raw,
                format!("expected a JSON array, got {}", json_kind(&other)),
            ))
        }
    };

    let mut items = Vec::with_capacity(elements.len());
    for (idx, element) in elements.into_iter().enumerate() {
        let item: BillItem = serde_json::from_value(element)
            .map_err(|e| invalid(raw, format!("item {idx}: {e}")))?;

        if !item.quantity.is_finite() || item.quantity < 0.0 {
            return Err(invalid(
                raw,
                format!("item {idx}: quantity must be non-negative, got {}", item.quantity),
            ));
        }
        items.push(item);
    }

    check_code_sequence(&items);
    Ok(items)
}

/// Warn when codes are not `001`, `002`, … in order. Not fatal.
fn check_code_sequence(items: &[BillItem]) {
    for (idx, item) in items.iter().enumerate() {
        let expected = format!("{:03}", idx + 1);
        if item.code != expected {
            warn!(
                "Item {} has code '{}', expected '{}'; keeping service order",
                idx, item.code, expected
            );
            return;
        }
    }
}

fn invalid(raw: &str, detail: String) -> BomError {
    error!(detail = %detail, raw = %raw, "Failed to parse analysis response");
    BomError::InvalidResponseFormat {
        detail,
        raw: raw.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
