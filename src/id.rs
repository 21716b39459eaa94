//! Opaque global IDs.
//!
//! Every referencable entity is identified by `"<TypeTag>:<c1>[:<c2>...]"`,
//! e.g. `Collection:2Jq1b3` or `CollectionToken:<tokenId>:<collectionId>`.
//! This exact shape is a compatibility contract with API clients which
//! persist and send back these IDs: changing the delimiter or tag naming is a
//! breaking change.
//!
//! Component values are assumed to never contain the delimiter. IDs are
//! never stored, they are recomputed from an entity's natural identifier
//! fields whenever the entity is serialized.

use std::{fmt, str::FromStr};

use async_graphql::ID;

use crate::error::{DomainError, ErrorKind};


pub const DELIMITER: char = ':';

/// An ID that could not be resolved to a node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidIdFormat {
    #[error("no ID components specified after type name")]
    NoComponents,

    #[error("unrecognized type name '{0}'")]
    UnknownType(String),

    #[error("wrong number of components for '{type_name}' ID (expected {expected}, got {supplied})")]
    Arity {
        type_name: String,
        expected: usize,
        supplied: usize,
    },
}

impl From<InvalidIdFormat> for DomainError {
    fn from(err: InvalidIdFormat) -> Self {
        DomainError::new(ErrorKind::InvalidIdFormat, err.to_string())
    }
}

/// Joins `type_name` and `components` into the wire format.
///
/// Nothing is validated here: callers are trusted to pass a non-empty list of
/// delimiter-free values. Use [`GlobalId::new`] for untrusted input.
///
/// An empty list is caught by a debug assertion only. In release builds it
/// yields the bare type name, which never decodes
/// ([`InvalidIdFormat::NoComponents`]).
pub fn encode<S: AsRef<str>>(type_name: &str, components: &[S]) -> String {
    debug_assert!(!components.is_empty(), "global ID for '{type_name}' without components");

    let mut out = String::from(type_name);
    for component in components {
        out.push(DELIMITER);
        out.push_str(component.as_ref());
    }
    out
}

/// A parsed global ID. Parsing only checks the syntax; whether the type tag
/// exists and the component count fits is decided by the node registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GlobalId {
    type_name: String,
    components: Vec<String>,
}

impl GlobalId {
    pub fn new<I, S>(type_name: impl Into<String>, components: I) -> Result<Self, InvalidIdFormat>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let components = components.into_iter().map(Into::into).collect::<Vec<_>>();
        if components.is_empty() {
            return Err(InvalidIdFormat::NoComponents);
        }

        Ok(Self { type_name: type_name.into(), components })
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }
}

impl FromStr for GlobalId {
    type Err = InvalidIdFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(DELIMITER);

        // `split` always yields at least one item.
        let type_name = parts.next().unwrap_or_default();
        Self::new(type_name, parts)
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&encode(&self.type_name, &self.components))
    }
}

/// Implemented by entities that can be refetched through a global ID. The
/// implementor only names its type tag and which of its fields are the ID
/// components; formatting lives in one place.
pub trait GlobalIdentity {
    const TYPE_NAME: &'static str;

    /// The natural identifier values, in the order declared by the schema.
    fn id_components(&self) -> Vec<String>;

    fn global_id(&self) -> ID {
        ID(encode(Self::TYPE_NAME, &self.id_components()))
    }
}
