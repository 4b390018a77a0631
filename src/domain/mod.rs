//! Domain types shared across pipeline stages.

pub mod classes;
pub mod source;

pub use classes::{BACKGROUND_CLASS_ID, ClassInfo, ClassRegistry};
pub use source::{SessionMetadata, SourceKind, SourceRecord, SpatialTransform};
