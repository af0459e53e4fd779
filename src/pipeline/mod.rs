//! Pipeline stages for plan-to-bill-of-materials generation.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and the rasterizer or service can be swapped without
//! touching the other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ compose ──▶ (service) ──▶ validate
//! (path/URL) (pdfium)  (base64)   (request)                 (BillItem)
//! ```
//!
//! 1. [`input`]:    resolve a path or URL into an `UploadedDocument`
//! 2. [`render`]:   rasterise page 1 of a PDF plan; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`encode`]:   base64-wrap the plan image and each knowledge file
//! 4. [`compose`]:  assemble instructions, plan, references and schema
//! 5. [`validate`]: re-check the service's JSON against the schema

pub mod compose;
pub mod encode;
pub mod input;
pub mod render;
pub mod validate;
