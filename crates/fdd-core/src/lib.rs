//! # FDD Core
//!
//! Core types for the Franchise Disclosure Document pipeline.
//!
//! An FDD is split into 25 logical sections: a cover/introduction block
//! (item 0), the 23 regulated disclosure items, and a trailing
//! appendix/exhibits block (item 24). This crate holds everything the
//! pipeline stages share:
//!
//! - [`layout`] - the page/block model produced by the layout analyzer,
//!   plus the ingestor that parses its JSON output
//! - [`catalog`] - canonical item names, accepted variations, keyword
//!   signatures, and per-item reference data
//! - [`boundary`] - section candidates and boundaries with invariant checks
//! - [`artifact`] - segmented section PDFs and their validation reports
//! - [`extraction`] - typed per-item extraction responses
//! - [`schema`] - wire-level JSON schemas handed to model backends

pub mod artifact;
pub mod boundary;
pub mod catalog;
pub mod extraction;
pub mod layout;
pub mod schema;

pub use artifact::{sha256_hex, ExtractionStatus, SectionArtifact, ValidationReport};
pub use boundary::{
    verify_boundaries, BoundaryViolation, DetectionMethod, SectionBoundary, SectionCandidate,
};
pub use catalog::{canonical_name, variations, Complexity, ITEM_COUNT, LAST_ITEM};
pub use extraction::{ExtractionResult, ItemData, SchemaViolation};
pub use layout::{parse_layout, Block, BlockKind, LayoutDocument, LayoutError, LayoutPage};
