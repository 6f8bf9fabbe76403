//! Forward, single-pass extraction of tag-nested markup.
//!
//! [`EventStream`] tokenizes a document, [`StructuralExtractor`] interprets a
//! declarative [`ShapeDescriptor`] over those events, and source adapters in
//! [`crate::sources`] turn the resulting sections into typed records.

mod events;
mod machine;
mod shape;

pub use events::{EventStream, ExtractionEvent};
pub use machine::{Entry, ExtractedDocument, Section, StructuralExtractor, extract};
pub use shape::{Gate, SectionMarker, ShapeDescriptor, TagMatcher};
