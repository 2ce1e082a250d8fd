//! Internal pipeline stages.
//!
//! Each stage is independently testable. The orchestrator in
//! [`crate::qa`] drives them in sequence:
//!
//! ```text
//! input → render ─┬─ (qa dpi) → standardize → select ─┐
//!                 │            ├─ image_span           │
//!                 │            └─ text_span (fallback) │
//!                 │                                    ▼
//!                 └─ (display dpi) ──────────► refine → highlight
//! ```
//!
//! Model calls in `image_span`, `text_span` and `refine` are bounded by
//! [`budget::Budget`]; the bundled model capabilities live in `llm`.

pub mod budget;
pub mod encode;
pub mod highlight;
pub mod image_span;
pub mod input;
pub mod llm;
pub mod refine;
pub mod render;
pub mod select;
pub mod standardize;
pub mod text_span;
