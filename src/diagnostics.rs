//! Diagnostic reporting
//!
//! Remapped errors and redaction failures never surface as failed requests,
//! but they must stay visible to operators. Both are reported to a
//! [`DiagnosticSink`]; remapped errors are additionally collected per request
//! in [`RequestDiagnostics`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::DomainError;

/// Something worth reporting to the operational error channel.
#[derive(Debug, Clone, Copy)]
pub enum Diagnostic<'a> {
    /// A domain error was turned into a member of the field's result union.
    RemappedError {
        error: &'a DomainError,
        declared_type: &'a str,
        member: &'a str,
    },

    /// A domain error had no remapping and fails the field.
    UnmappedError {
        error: &'a DomainError,
        declared_type: &'a str,
    },

    /// Redacting a request for logging failed; a placeholder was logged.
    RedactionFailed { reason: &'a str },
}

/// Fire-and-forget receiver of diagnostics (e.g. an error tracker client).
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: &Diagnostic<'_>);
}

/// Sink emitting every diagnostic as a `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: &Diagnostic<'_>) {
        match diagnostic {
            Diagnostic::RemappedError { error, declared_type, member } => tracing::info!(
                kind = %error.kind,
                declared_type,
                member,
                "remapped error: {error}",
            ),
            Diagnostic::UnmappedError { error, declared_type } => tracing::debug!(
                kind = %error.kind,
                declared_type,
                "unmapped error: {error}",
            ),
            Diagnostic::RedactionFailed { reason } => {
                tracing::error!(reason, "failed to redact GraphQL request");
            }
        }
    }
}

/// One remapped error, as kept for the per-request summary.
#[derive(Debug, Clone, Serialize)]
pub struct RemapRecord {
    pub kind: String,
    pub declared_type: String,
    pub member: String,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

/// Per-request diagnostics store. Sibling fields may resolve concurrently, so
/// appends go through a mutex. Cloning shares the store.
#[derive(Debug, Clone, Default)]
pub struct RequestDiagnostics {
    remapped: Arc<Mutex<Vec<RemapRecord>>>,
}

impl RequestDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_remapped(&self, error: &DomainError, declared_type: &str, member: &str) {
        let record = RemapRecord {
            kind: error.kind.to_string(),
            declared_type: declared_type.to_string(),
            member: member.to_string(),
            message: error.message.clone(),
            recorded_at: Utc::now(),
        };
        self.remapped.lock().await.push(record);
    }

    /// Snapshot of the errors remapped so far.
    pub async fn remapped(&self) -> Vec<RemapRecord> {
        self.remapped.lock().await.clone()
    }

    pub async fn remapped_count(&self) -> usize {
        self.remapped.lock().await.len()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Sink remembering a one-line summary of each report.
    #[derive(Default)]
    pub(crate) struct CollectingSink {
        pub(crate) reports: Mutex<Vec<String>>,
    }

    impl DiagnosticSink for CollectingSink {
        fn report(&self, diagnostic: &Diagnostic<'_>) {
            let line = match diagnostic {
                Diagnostic::RemappedError { error, declared_type, member } => {
                    format!("remapped {} {declared_type} {member}", error.kind)
                }
                Diagnostic::UnmappedError { error, declared_type } => {
                    format!("unmapped {} {declared_type}", error.kind)
                }
                Diagnostic::RedactionFailed { reason } => format!("redaction failed: {reason}"),
            };
            self.reports.lock().unwrap().push(line);
        }
    }
}
