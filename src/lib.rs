//! # gallery-mediation
//!
//! Request mediation core of the gallery GraphQL gateway.
//!
//! ## Features
//!
//! - **Global IDs** - Opaque `Type:component[:component...]` identifiers and
//!   table dispatch to per-type node fetch handlers
//! - **Error Remapping** - Domain errors turned into schema-declared
//!   `...OrError` union members
//! - **Redaction** - `@scrub`-driven redaction of query text and variables for
//!   logs and traces
//! - **Request Reporter** - async-graphql extension wiring redaction and
//!   per-request diagnostics into every request
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gallery_mediation::{MediationConfig, NodeRegistry, SchemaView};
//!
//! let config = MediationConfig::default();
//! let schema = Arc::new(SchemaView::parse(SDL, &config)?);
//! let nodes = NodeRegistry::builder()
//!     .unary("Collection", |ctx: AppContext, dbid| async move { ctx.collection(&dbid).await })
//!     .build()?;
//! nodes.validate(&schema);
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod extension;
pub mod http;
pub mod id;
pub mod node;
pub mod redact;
pub mod remap;
pub mod schema;

pub use config::MediationConfig;
pub use diagnostics::{Diagnostic, DiagnosticSink, RequestDiagnostics, TracingSink};
pub use error::{DomainError, ErrorKind};
pub use extension::RequestReporter;
pub use http::{graphql_handler, RequestId};
pub use id::{GlobalId, GlobalIdentity, InvalidIdFormat};
pub use node::{NodeHandler, NodeRegistry};
pub use redact::{RedactError, RedactedRequest, Redactor};
pub use remap::ErrorRemapper;
pub use schema::SchemaView;

use thiserror::Error;

/// Errors detected while assembling the mediation core at startup
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid schema: {0}")]
    Schema(String),

    #[error("Invalid @{directive} on '{type_name}': {reason}")]
    GlobalIdDirective {
        directive: String,
        type_name: String,
        reason: String,
    },

    #[error("More than one node handler registered for '{0}'")]
    DuplicateHandler(String),

    #[error("No handler registered for node type '{0}'")]
    MissingHandler(String),

    #[error("Handler for '{type_name}' takes {handler} ID component(s) but the schema declares {schema}")]
    ArityMismatch {
        type_name: String,
        handler: usize,
        schema: usize,
    },

    #[error("Remapping target '{0}' is not a union in the schema")]
    NotAUnion(String),

    #[error("More than one remapping of {kind} errors for '{type_name}'")]
    DuplicateRemapping { kind: ErrorKind, type_name: String },
}

/// Result type for startup operations
pub type Result<T> = std::result::Result<T, ConfigError>;
