//! Core types shared across the diff pipeline.

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use identifier::QualifiedName;
pub use schema::{Column, TableSchema};
pub use traits::{Projection, Relation, SourceReader, TargetWriter};
pub use value::{row_to_json, Batch, SqlNullType, SqlValue};
