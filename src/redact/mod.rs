//! Redaction of sensitive request data before it is logged.
//!
//! Schema elements (input fields, arguments or whole types) carrying the
//! redact directive are sensitive. [`Redactor::redact`] returns a copy of the
//! query text with every sensitive literal replaced by the placeholder, and a
//! copy of the variables with sensitive values replaced the same way.
//!
//! Redaction never fails the request. If anything goes wrong, a failure
//! placeholder is returned in place of the query, the variables are emptied
//! and the failure is reported to the diagnostic sink.

use std::{
    any::Any,
    borrow::Cow,
    collections::HashSet,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use apollo_parser::{Lexer, TokenKind};
use async_graphql::Variables;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::{
    config::MediationConfig,
    diagnostics::{Diagnostic, DiagnosticSink},
    schema::SchemaView,
};

mod query;
mod variables;


/// Byte range in the query text, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Span {
    pub(crate) start: usize,
    pub(crate) end: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum RedactError {
    #[error("failed to parse query: {0}")]
    Parse(String),

    #[error("span {start}..{end} is outside of the query text")]
    SpanOutOfBounds { start: usize, end: usize },

    #[error("failed to serialize variable: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("panicked: {0}")]
    Panic(String),
}

/// The loggable copy of a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedactedRequest {
    pub query: String,
    pub variables: Map<String, JsonValue>,
}

pub struct Redactor {
    schema: Arc<SchemaView>,
    placeholder: String,
    sink: Arc<dyn DiagnosticSink>,
}

impl Redactor {
    pub fn new(schema: Arc<SchemaView>, config: &MediationConfig, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            schema,
            placeholder: config.redact_placeholder.clone(),
            sink,
        }
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Redacts `query` and `variables`. `operation_name` selects whose
    /// variable declarations apply when the document holds several
    /// operations.
    pub fn redact(
        &self,
        query: &str,
        operation_name: Option<&str>,
        variables: &Variables,
    ) -> RedactedRequest {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.try_redact(query, operation_name, variables)
        }))
        .unwrap_or_else(|panic| Err(RedactError::Panic(panic_message(&*panic))));

        outcome.unwrap_or_else(|err| {
            let reason = err.to_string();
            self.sink.report(&Diagnostic::RedactionFailed { reason: &reason });
            RedactedRequest {
                query: format!("<error occurred while redacting query: {reason}>"),
                variables: Map::new(),
            }
        })
    }

    /// Like [`Redactor::redact`], but returns failures to the caller instead
    /// of reporting them.
    pub fn try_redact(
        &self,
        query: &str,
        operation_name: Option<&str>,
        variables: &Variables,
    ) -> Result<RedactedRequest, RedactError> {
        // Already redacted text would not parse. Placeholders are swapped for
        // string literals of the same length so spans stay valid.
        let masked = mask_placeholders(query, &self.placeholder);
        let scan = query::scan(&self.schema, &masked, operation_name)?;

        // A variable referenced in a sensitive position is sensitive as a
        // whole, whatever its declared type.
        let referenced = scan.spans.iter()
            .filter_map(|span| masked.get(span.start..span.end)?.strip_prefix('$'))
            .map(str::to_string)
            .collect::<HashSet<_>>();

        let walk = variables::VariableWalk {
            schema: &self.schema,
            placeholder: &self.placeholder,
            sensitive: &referenced,
        };
        Ok(RedactedRequest {
            variables: walk.redact(&scan.variables, variables)?,
            query: apply_spans(query, scan.spans, &self.placeholder)?,
        })
    }
}

/// Copies `text` with each span replaced by `placeholder`. Spans may arrive
/// in any order and contain duplicates; overlapping spans are merged into the
/// first one.
pub(crate) fn apply_spans(text: &str, mut spans: Vec<Span>, placeholder: &str) -> Result<String, RedactError> {
    spans.sort();
    spans.dedup();

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for Span { start, end } in spans {
        if start < cursor {
            continue;
        }
        let (Some(before), Some(_)) = (text.get(cursor..start), text.get(start..end)) else {
            return Err(RedactError::SpanOutOfBounds { start, end });
        };
        out.push_str(before);
        out.push_str(placeholder);
        cursor = end;
    }
    out.push_str(&text[cursor..]);

    Ok(out)
}

fn mask_placeholders<'a>(query: &'a str, placeholder: &str) -> Cow<'a, str> {
    if placeholder.len() < 2 || !query.contains(placeholder) {
        return Cow::Borrowed(query);
    }

    // Occurrences inside string literals and comments are client text and
    // stay as they are.
    let client_text = Lexer::new(query)
        .filter_map(Result::ok)
        .filter(|token| matches!(token.kind(), TokenKind::StringValue | TokenKind::Comment))
        .map(|token| token.index()..token.index() + token.data().len())
        .collect::<Vec<_>>();

    let literal = format!("\"{}\"", "_".repeat(placeholder.len() - 2));
    let mut out = String::with_capacity(query.len());
    let mut cursor = 0;
    for (start, _) in query.match_indices(placeholder) {
        if start < cursor || client_text.iter().any(|range| range.contains(&start)) {
            continue;
        }
        out.push_str(&query[cursor..start]);
        out.push_str(&literal);
        cursor = start + placeholder.len();
    }
    out.push_str(&query[cursor..]);

    Cow::Owned(out)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic.downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::diagnostics::testing::CollectingSink;

    const SDL: &str = r#"
        scalar Password @scrub
        input Address { street: String, zip: String @scrub }
        input Credentials @scrub { user: String, pin: Int }
        input LoginInput {
            username: String!
            password: String! @scrub
            address: Address @scrub
            tags: [String!]
        }
        type User { id: ID!, name: String }
        type Query { user(id: ID!): User }
        type Mutation {
            login(input: LoginInput!): User
            unlock(code: String @scrub, hint: String): User
            rotate(old: Password, creds: Credentials): User
        }
    "#;

    fn redactor() -> (Redactor, Arc<CollectingSink>) {
        let config = MediationConfig::default();
        let schema = Arc::new(SchemaView::parse(SDL, &config).unwrap());
        let sink = Arc::new(CollectingSink::default());
        (Redactor::new(schema, &config, sink.clone()), sink)
    }

    #[test]
    fn test_literal_in_query() {
        let (redactor, sink) = redactor();
        let out = redactor.redact(
            r#"mutation { login(input: {username: "bob", password: "hunter2"}) { id } }"#,
            None,
            &Variables::default(),
        );
        assert_eq!(out.query, r#"mutation { login(input: {username: "bob", password: <scrubbed>}) { id } }"#);
        assert!(out.variables.is_empty());
        assert!(sink.reports.lock().unwrap().is_empty());
    }

    #[test]
    fn test_composite_keeps_structure() {
        let (redactor, _) = redactor();
        let out = redactor.redact(
            r#"mutation { login(input: {username: "bob", password: "p", address: {street: "Main", zip: ["1", 2]}}) { id } }"#,
            None,
            &Variables::default(),
        );
        assert_eq!(
            out.query,
            r#"mutation { login(input: {username: "bob", password: <scrubbed>, address: {street: <scrubbed>, zip: [<scrubbed>, <scrubbed>]}}) { id } }"#,
        );
    }

    #[test]
    fn test_nested_marks_redact_once() {
        // `zip` is marked itself and sits below the marked `address`.
        let (redactor, _) = redactor();
        let out = redactor.redact(
            r#"mutation { login(input: {username: "u", password: "p", address: {zip: "123"}}) { id } }"#,
            None,
            &Variables::default(),
        );
        assert_eq!(out.query.matches("<scrubbed>").count(), 2);
        assert!(!out.query.contains("<scrubbed><scrubbed>"));
    }

    #[test]
    fn test_arguments_and_marked_types() {
        let (redactor, _) = redactor();
        let out = redactor.redact(
            r#"mutation { unlock(code: "1234", hint: "birthday") { id } rotate(old: "pw", creds: {user: "u", pin: 7}) { id } }"#,
            None,
            &Variables::default(),
        );
        assert_eq!(
            out.query,
            r#"mutation { unlock(code: <scrubbed>, hint: "birthday") { id } rotate(old: <scrubbed>, creds: {user: <scrubbed>, pin: <scrubbed>}) { id } }"#,
        );
    }

    #[test]
    fn test_variables() {
        let (redactor, _) = redactor();
        let variables = Variables::from_json(json!({
            "input": { "username": "bob", "password": "hunter2", "nickname": "b", "tags": ["a"] },
            "code": "1234",
        }));
        let out = redactor.redact(
            "mutation Login($input: LoginInput!, $code: String) { login(input: $input) { id } unlock(code: $code) { id } }",
            Some("Login"),
            &variables,
        );

        assert_eq!(
            out.query,
            "mutation Login($input: LoginInput!, $code: String) { login(input: $input) { id } unlock(code: <scrubbed>) { id } }",
        );
        assert_eq!(JsonValue::Object(out.variables), json!({
            "input": { "username": "bob", "password": "<scrubbed>", "tags": ["a"] },
            "code": "<scrubbed>",
        }));
    }

    #[test]
    fn test_unmarked_query_is_unchanged() {
        let (redactor, _) = redactor();
        let query = "query Q {\n  user(id: \"User:1\") {\n    id # trailing comment\n    name\n  }\n}";
        assert_eq!(redactor.redact(query, None, &Variables::default()).query, query);
    }

    #[test]
    fn test_idempotent() {
        let (redactor, sink) = redactor();
        let query = r#"mutation { login(input: {username: "bob", password: "hunter2", address: {street: "x"}}) { id } }"#;
        let once = redactor.redact(query, None, &Variables::default());
        let twice = redactor.redact(&once.query, None, &Variables::default());
        assert_eq!(once, twice);
        assert!(sink.reports.lock().unwrap().is_empty());
    }

    #[test]
    fn test_placeholder_text_in_string_argument() {
        let (redactor, sink) = redactor();
        let query = r#"mutation {
            unlock(code: "1234", hint: "a <scrubbed> b") { id }
            login(input: {username: "<scrubbed>", password: "hunter2"}) { id } # <scrubbed>
        }"#;
        let once = redactor.redact(query, None, &Variables::default());
        assert_eq!(once.query, r#"mutation {
            unlock(code: <scrubbed>, hint: "a <scrubbed> b") { id }
            login(input: {username: "<scrubbed>", password: <scrubbed>}) { id } # <scrubbed>
        }"#);

        let twice = redactor.redact(&once.query, None, &Variables::default());
        assert_eq!(once, twice);
        assert!(sink.reports.lock().unwrap().is_empty());
    }

    #[test]
    fn test_marked_field_from_earlier_extension() {
        let config = MediationConfig::default();
        let schema = SchemaView::parse(
            r#"
                extend input LoginInput { password: String @scrub }
                input LoginInput { username: String }
                type User { id: ID! }
                type Query { ping: Boolean }
                type Mutation { login(input: LoginInput!): User }
            "#,
            &config,
        ).unwrap();
        let redactor = Redactor::new(Arc::new(schema), &config, Arc::new(CollectingSink::default()));

        let out = redactor.redact(
            r#"mutation { login(input: {username: "u", password: "hunter2"}) { id } }"#,
            None,
            &Variables::default(),
        );
        assert_eq!(out.query, r#"mutation { login(input: {username: "u", password: <scrubbed>}) { id } }"#);
    }

    #[test]
    fn test_mask_placeholders() {
        assert_eq!(mask_placeholders("{ a(x: 1) }", "<scrubbed>"), "{ a(x: 1) }");
        assert_eq!(
            mask_placeholders(r#"{ a(x: <scrubbed>, y: "<scrubbed>") }"#, "<scrubbed>"),
            r#"{ a(x: "________", y: "<scrubbed>") }"#,
        );
    }

    #[test]
    fn test_failure_placeholder() {
        let (redactor, sink) = redactor();
        let variables = Variables::from_json(json!({ "input": { "password": "hunter2" } }));
        let out = redactor.redact("mutation { login(input: {password: \"hunter2\"", None, &variables);

        assert!(out.query.starts_with("<error occurred while redacting query: "));
        assert!(!out.query.contains("hunter2"));
        assert!(out.variables.is_empty());

        let reports = sink.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].starts_with("redaction failed: failed to parse query"));
    }

    #[test]
    fn test_apply_spans() {
        let spans = vec![Span { start: 6, end: 9 }, Span { start: 0, end: 1 }, Span { start: 6, end: 9 }];
        assert_eq!(apply_spans("a bcd efg h", spans, "#").unwrap(), "# bcd # h");

        let out_of_range = apply_spans("abc", vec![Span { start: 2, end: 10 }], "#");
        assert!(matches!(out_of_range, Err(RedactError::SpanOutOfBounds { start: 2, end: 10 })));
    }
}
