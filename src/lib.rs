//! AIRR Reference Library
//!
//! Reads, writes and validates data that conforms to the AIRR standard for
//! immune-receptor repertoire sequencing.
//!
//! ## Features
//!
//! - **Schema Registry**: Object definitions loaded once and shared, with `$ref` cycles resolved by name
//! - **Typed Tabular I/O**: Streaming TSV reader/writer that converts booleans and numbers per the schema
//! - **Hierarchical Validation**: Recursive checks of YAML/JSON objects with dotted error paths
//! - **File Operations**: Merge, derive and batch-validate rearrangement files; read and write AIRR documents
//!
//! ## Architecture
//!
//! ```text
//! specs/airr-schema.yaml ──► SchemaRegistry ──► SchemaDefinition (Arc, cached by name)
//!                                  │
//!          ┌───────────────────────┼────────────────────────┐
//!          ▼                       ▼                        ▼
//!   TabularReader/Writer       Validator                interface
//!   (coerce, row shape)    (objects, arrays, refs)   (merge, documents)
//! ```

pub mod coerce;
pub mod config;
pub mod error;
pub mod interface;
pub mod registry;
pub mod schema;
pub mod tabular;
pub mod validator;
pub mod version;

pub use coerce::{CoercionError, CoercionMode};
pub use config::AirrConfig;
pub use error::{AirrError, Result, ValidationError};
pub use interface::{AirrDocument, DataFormat, DocumentReport, FileReport};
pub use registry::SchemaRegistry;
pub use schema::{FieldSpec, MiairrLevel, SchemaDefinition, SchemaInfo, TypeSpec, TypeTag};
pub use tabular::{ReaderOptions, Record, RowShapePolicy, TabularReader, TabularWriter, WriterOptions};
pub use validator::{ValidationOptions, ValidationWarning, Validator, WarningKind};
pub use version::SchemaVersion;
