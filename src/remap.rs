//! Remapping of domain errors into result unions
//!
//! Fields that can fail in expected ways declare a union return type like
//! `CollectionByIdOrError = Collection | ErrCollectionNotFound | ErrInvalidInput`.
//! A failure then does not null out sibling fields: the resolver returns the
//! matching error member instead of a field error.
//!
//! The same domain error needs a different member depending on the union
//! (a `NotFound` is an `ErrCollectionNotFound` in one place and an
//! `ErrTokenNotFound` in another), so the table is keyed by
//! `(error kind, declared union)`. Errors without an entry propagate
//! unchanged. If the schema declares the error interface, only its
//! implementors are valid remapping results.

use std::{any::Any, collections::HashMap, sync::Arc};

use async_graphql::{ErrorExtensions, OutputType};

use crate::{
    diagnostics::{Diagnostic, DiagnosticSink, RequestDiagnostics},
    error::{DomainError, DomainResult, ErrorKind},
    schema::SchemaView,
    ConfigError,
};

type Constructor = Arc<dyn Fn(&DomainError) -> Box<dyn Any + Send> + Send + Sync>;

/// Collects `(kind, union) -> member constructor` entries.
#[derive(Default)]
pub struct ErrorRemapperBuilder {
    table: HashMap<String, HashMap<ErrorKind, Constructor>>,
    duplicate: Option<(ErrorKind, String)>,
}

impl ErrorRemapperBuilder {
    /// Remap errors of `kind` occurring in fields declared to return `U`.
    ///
    /// ```rust,ignore
    /// builder.map(ErrorKind::NotFound, |err| {
    ///     CollectionByIdOrError::ErrCollectionNotFound(ErrCollectionNotFound {
    ///         message: err.message.clone(),
    ///     })
    /// })
    /// ```
    pub fn map<U, F>(mut self, kind: ErrorKind, f: F) -> Self
    where
        U: OutputType + 'static,
        F: Fn(&DomainError) -> U + Send + Sync + 'static,
    {
        let type_name = U::type_name().into_owned();
        let constructor: Constructor = Arc::new(move |err: &DomainError| -> Box<dyn Any + Send> {
            Box::new(f(err))
        });
        let previous = self.table.entry(type_name.clone()).or_default().insert(kind, constructor);
        if previous.is_some() {
            self.duplicate.get_or_insert((kind, type_name));
        }
        self
    }

    /// Checks every target against `schema` and finishes the table.
    pub fn build(
        self,
        schema: Arc<SchemaView>,
        sink: Arc<dyn DiagnosticSink>,
    ) -> crate::Result<ErrorRemapper> {
        if let Some((kind, type_name)) = self.duplicate {
            return Err(ConfigError::DuplicateRemapping { kind, type_name });
        }

        let mut targets = self.table.keys().collect::<Vec<_>>();
        targets.sort();
        if let Some(target) = targets.into_iter().find(|t| schema.union_members(t).is_none()) {
            return Err(ConfigError::NotAUnion(target.clone()));
        }

        Ok(ErrorRemapper { table: self.table, schema, sink })
    }
}

/// The remapping table plus the collaborators needed to report remaps.
pub struct ErrorRemapper {
    table: HashMap<String, HashMap<ErrorKind, Constructor>>,
    schema: Arc<SchemaView>,
    sink: Arc<dyn DiagnosticSink>,
}

impl ErrorRemapper {
    pub fn builder() -> ErrorRemapperBuilder {
        ErrorRemapperBuilder::default()
    }

    /// Whether errors of `kind` have a remapping for fields returning
    /// `declared_type`.
    pub fn is_mapped(&self, kind: ErrorKind, declared_type: &str) -> bool {
        self.table.get(declared_type).is_some_and(|entries| entries.contains_key(&kind))
    }

    /// Turns `err` into a member of `U`, or gives it back untouched if there
    /// is no remapping for `(err.kind, U)`.
    pub fn remap<U: OutputType + 'static>(&self, err: DomainError) -> Result<U, DomainError> {
        match self.try_remap::<U>(&err) {
            Some((value, _)) => Ok(value),
            None => Err(err),
        }
    }

    fn try_remap<U: OutputType + 'static>(&self, err: &DomainError) -> Option<(U, String)> {
        let declared = U::type_name();
        let constructor = self.table.get(declared.as_ref())?.get(&err.kind)?;

        // Entries for `U` are only ever created by `map::<U>`.
        let value: U = *constructor(err).downcast::<U>().ok()?;
        let member = value.introspection_type_name();
        if !self.schema.is_union_member(&declared, &member) {
            tracing::error!(
                kind = %err.kind,
                declared_type = %declared,
                member = %member,
                "remapping produced a type that is not a member of the declared union",
            );
            return None;
        }
        if !self.schema.is_error_type(&member) {
            tracing::error!(
                kind = %err.kind,
                declared_type = %declared,
                member = %member,
                "remapping produced a member that is not an error type",
            );
            return None;
        }

        Some((value, member.into_owned()))
    }

    /// Resolver helper: passes successful values through, remaps errors where
    /// possible and reports every error. Remapped errors are also recorded in
    /// the request's [`RequestDiagnostics`], if the request has one.
    pub async fn resolve<U: OutputType + 'static>(
        &self,
        ctx: &async_graphql::Context<'_>,
        result: DomainResult<U>,
    ) -> async_graphql::Result<U> {
        self.resolve_with(ctx.data_opt::<RequestDiagnostics>(), result).await
    }

    pub async fn resolve_with<U: OutputType + 'static>(
        &self,
        diagnostics: Option<&RequestDiagnostics>,
        result: DomainResult<U>,
    ) -> async_graphql::Result<U> {
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let declared = U::type_name();
        match self.try_remap::<U>(&err) {
            Some((value, member)) => {
                self.sink.report(&Diagnostic::RemappedError {
                    error: &err,
                    declared_type: &declared,
                    member: &member,
                });
                if let Some(diagnostics) = diagnostics {
                    diagnostics.record_remapped(&err, &declared, &member).await;
                }
                Ok(value)
            }
            None => {
                self.sink.report(&Diagnostic::UnmappedError { error: &err, declared_type: &declared });
                Err(err.extend())
            }
        }
    }
}
