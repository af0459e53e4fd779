//! Request composition: instructions + plan + references + schema.
//!
//! An [`AnalysisRequest`] can only be built by [`compose_request`], so every
//! request has exactly one instruction part first, exactly one primary-plan
//! part second, and zero or more reference parts after that. Services map
//! the parts onto their own wire format in this order.

use crate::pipeline::encode::EncodedAsset;
use crate::prompts::response_schema;
use serde::Serialize;
use serde_json::Value;

/// What an image part represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssetRole {
    /// The floor plan under analysis.
    PrimaryPlan,
    /// Knowledge-base material from past projects.
    Reference,
}

/// One part of an [`AnalysisRequest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RequestPart {
    Instructions(String),
    Image { role: AssetRole, asset: EncodedAsset },
}

/// A complete request for the analysis service.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    parts: Vec<RequestPart>,
    response_schema: Value,
}

impl AnalysisRequest {
    /// All parts in send order.
    pub fn parts(&self) -> &[RequestPart] {
        &self.parts
    }

    /// The instruction text.
    pub fn instructions(&self) -> &str {
        match &self.parts[0] {
            RequestPart::Instructions(text) => text,
            RequestPart::Image { .. } => unreachable!("first part is always instructions"),
        }
    }

    /// The primary plan asset.
    pub fn primary(&self) -> &EncodedAsset {
        match &self.parts[1] {
            RequestPart::Image { asset, .. } => asset,
            RequestPart::Instructions(_) => unreachable!("second part is always the plan"),
        }
    }

    /// Reference assets, in the order given.
    pub fn references(&self) -> impl Iterator<Item = &EncodedAsset> {
        self.parts[2..].iter().filter_map(|part| match part {
            RequestPart::Image { asset, .. } => Some(asset),
            RequestPart::Instructions(_) => None,
        })
    }

    /// Every image, primary first.
    pub fn images(&self) -> impl Iterator<Item = &EncodedAsset> {
        std::iter::once(self.primary()).chain(self.references())
    }

    /// The response-shape constraint.
    pub fn response_schema(&self) -> &Value {
        &self.response_schema
    }

    /// Total base64 payload size, for logging.
    pub fn payload_bytes(&self) -> usize {
        self.images().map(|a| a.data.len()).sum()
    }
}

/// Build the request for one generation run.
pub fn compose_request(
    instructions: &str,
    primary: EncodedAsset,
    references: Vec<EncodedAsset>,
) -> AnalysisRequest {
    let mut parts = Vec::with_capacity(2 + references.len());
    parts.push(RequestPart::Instructions(instructions.to_string()));
    parts.push(RequestPart::Image {
        role: AssetRole::PrimaryPlan,
        asset: primary,
    });
    parts.extend(references.into_iter().map(|asset| RequestPart::Image {
        role: AssetRole::Reference,
        asset,
    }));

    AnalysisRequest {
        parts,
        response_schema: response_schema(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(tag: &str) -> EncodedAsset {
        EncodedAsset {
            media_type: "image/png".into(),
            data: tag.into(),
        }
    }

    #[test]
    fn instructions_first_then_primary_then_references() {
        let req = compose_request("analyze", asset("plan"), vec![asset("r1"), asset("r2")]);
        let parts = req.parts();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], RequestPart::Instructions("analyze".into()));
        assert!(matches!(
            &parts[1],
            RequestPart::Image { role: AssetRole::PrimaryPlan, asset } if asset.data == "plan"
        ));
        assert!(parts[2..]
            .iter()
            .all(|p| matches!(p, RequestPart::Image { role: AssetRole::Reference, .. })));
        let refs: Vec<_> = req.references().map(|a| a.data.as_str()).collect();
        assert_eq!(refs, vec!["r1", "r2"]);
    }

    #[test]
    fn no_references_is_valid() {
        let req = compose_request("analyze", asset("plan"), vec![]);
        assert_eq!(req.parts().len(), 2);
        assert_eq!(req.instructions(), "analyze");
        assert_eq!(req.primary().data, "plan");
        assert_eq!(req.references().count(), 0);
        assert_eq!(req.images().count(), 1);
    }

    #[test]
    fn schema_is_attached() {
        let req = compose_request("analyze", asset("plan"), vec![]);
        assert_eq!(req.response_schema()["type"], "ARRAY");
    }

    #[test]
    fn payload_counts_all_images() {
        let req = compose_request("x", asset("abcd"), vec![asset("ef")]);
        assert_eq!(req.payload_bytes(), 6);
    }
}
