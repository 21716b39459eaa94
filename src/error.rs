//! Domain error taxonomy.
//!
//! Resolvers and node handlers report failures as [`DomainError`]. The kind is
//! deliberately coarse: the same `NotFound` error becomes a different union
//! member depending on which field produced it (see [`crate::remap`]). Errors
//! that are not remapped turn into ordinary field errors carrying their kind
//! as an extension.

use std::fmt;

use async_graphql::ErrorExtensions;


/// Classification of a domain error. `Custom` keeps the set open for kinds
/// defined outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    InvalidIdFormat,
    NotAuthorized,
    AuthenticationFailed,
    AlreadyExists,
    UnknownAction,
    Internal,
    Custom(&'static str),
}

impl ErrorKind {
    /// Machine readable name, sent to clients in the `kind` extension.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::InvalidInput => "INVALID_INPUT",
            Self::InvalidIdFormat => "INVALID_ID_FORMAT",
            Self::NotAuthorized => "NOT_AUTHORIZED",
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::UnknownAction => "UNKNOWN_ACTION",
            Self::Internal => "INTERNAL_SERVER_ERROR",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by resolvers and node handlers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DomainError {
    pub kind: ErrorKind,
    pub message: String,

    /// Optional stable key the frontend can use to pick a translated message.
    pub key: Option<&'static str>,
}

impl DomainError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), key: None }
    }

    pub fn with_key(mut self, key: &'static str) -> Self {
        self.key = Some(key);
        self
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl ErrorExtensions for DomainError {
    fn extend(&self) -> async_graphql::Error {
        async_graphql::Error::new_with_source(self.clone()).extend_with(|_, ext| {
            ext.set("kind", self.kind.as_str());
            if let Some(key) = self.key {
                ext.set("key", key);
            }
        })
    }
}


// ===== Helper macros to easily create errors ==================================================

/// Creates a `DomainError` with a `format!` like syntax.
#[macro_export]
macro_rules! domain_err {
    ($kind:ident, key = $key:literal, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::error::DomainError::new($crate::error::ErrorKind::$kind, format!($fmt $(, $arg)*))
            .with_key($key)
    };
    ($kind:ident, $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::error::DomainError::new($crate::error::ErrorKind::$kind, format!($fmt $(, $arg)*))
    };
}

#[macro_export]
macro_rules! not_found {
    ($($t:tt)+) => { $crate::domain_err!(NotFound, $($t)*) };
}

#[macro_export]
macro_rules! invalid_input {
    ($($t:tt)+) => { $crate::domain_err!(InvalidInput, $($t)*) };
}

#[macro_export]
macro_rules! not_authorized {
    ($($t:tt)+) => { $crate::domain_err!(NotAuthorized, $($t)*) };
}

#[macro_export]
macro_rules! internal_error {
    ($($t:tt)+) => { $crate::domain_err!(Internal, $($t)*) };
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros() {
        let id = "abc";
        let err = crate::not_found!("collection {id} not found");
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.message, "collection abc not found");
        assert_eq!(err.key, None);

        let err = crate::invalid_input!(key = "gallery.name-too-long", "name too long");
        assert_eq!(err.kind, ErrorKind::InvalidInput);
        assert_eq!(err.key, Some("gallery.name-too-long"));
    }

    #[test]
    fn test_into_field_error_keeps_source() {
        let err = DomainError::new(ErrorKind::Custom("SYNC_FAILED"), "sync failed");
        let field_err = err.extend();
        assert_eq!(field_err.message, "sync failed");

        let server_err = field_err.into_server_error(async_graphql::Pos::default());
        assert_eq!(server_err.source::<DomainError>(), Some(&err));
        let ext = server_err.extensions.unwrap();
        assert_eq!(ext.get("kind"), Some(&async_graphql::Value::from("SYNC_FAILED")));
        assert_eq!(ext.get("key"), None);

        let keyed = crate::not_authorized!(key = "auth.required", "log in first").extend();
        let ext = keyed.into_server_error(async_graphql::Pos::default()).extensions.unwrap();
        assert_eq!(ext.get("kind"), Some(&async_graphql::Value::from("NOT_AUTHORIZED")));
        assert_eq!(ext.get("key"), Some(&async_graphql::Value::from("auth.required")));
    }
}
