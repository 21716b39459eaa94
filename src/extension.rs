//! async-graphql extension logging every request in redacted form
//!
//! Register [`RequestReporter`] on the schema to get, per request:
//! - one `Received GraphQL query` event with redacted query and variables,
//! - a [`RequestDiagnostics`] store in the request data, which
//!   [`ErrorRemapper::resolve`](crate::ErrorRemapper::resolve) records into,
//! - a summary event of all remapped errors once the response is built.

use std::sync::Arc;

use async_graphql::{
    extensions::{Extension, ExtensionContext, ExtensionFactory, NextPrepareRequest, NextRequest},
    Request, Response, ServerResult,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::{
    config::MediationConfig,
    diagnostics::RequestDiagnostics,
    redact::{RedactedRequest, Redactor},
};


pub struct RequestReporter {
    redactor: Arc<Redactor>,
    max_logged_query_bytes: usize,
}

impl RequestReporter {
    pub fn new(redactor: Arc<Redactor>, config: &MediationConfig) -> Self {
        Self {
            redactor,
            max_logged_query_bytes: config.max_logged_query_bytes,
        }
    }
}

impl ExtensionFactory for RequestReporter {
    fn create(&self) -> Arc<dyn Extension> {
        Arc::new(ReporterExtension {
            redactor: self.redactor.clone(),
            max_logged_query_bytes: self.max_logged_query_bytes,
            diagnostics: RequestDiagnostics::new(),
            locator_id: Uuid::new_v4(),
        })
    }
}

struct ReporterExtension {
    redactor: Arc<Redactor>,
    max_logged_query_bytes: usize,
    diagnostics: RequestDiagnostics,

    /// Links the events of one request, in particular an oversized query
    /// logged on its own.
    locator_id: Uuid,
}

#[async_trait::async_trait]
impl Extension for ReporterExtension {
    async fn request(&self, ctx: &ExtensionContext<'_>, next: NextRequest<'_>) -> Response {
        let response = next.run(ctx).await;

        let remapped = self.diagnostics.remapped().await;
        if !remapped.is_empty() {
            let summary = remapped.iter()
                .map(|r| format!("{} as {} ({}): {}", r.kind, r.member, r.declared_type, r.message))
                .collect::<Vec<_>>();
            tracing::info!(
                locator_id = %self.locator_id,
                count = remapped.len(),
                ?summary,
                "GraphQL request returned remapped errors",
            );
        }

        response
    }

    async fn prepare_request(
        &self,
        ctx: &ExtensionContext<'_>,
        request: Request,
        next: NextPrepareRequest<'_>,
    ) -> ServerResult<Request> {
        let RedactedRequest { query, variables } = self.redactor.redact(
            &request.query,
            request.operation_name.as_deref(),
            &request.variables,
        );
        let (query, oversized) = loggable_query(query, self.max_logged_query_bytes, self.locator_id);

        tracing::info!(
            locator_id = %self.locator_id,
            operation_name = request.operation_name.as_deref().unwrap_or_default(),
            variables = %JsonValue::Object(variables),
            query = %query,
            "Received GraphQL query",
        );
        if let Some(full) = oversized {
            tracing::info!(
                locator_id = %self.locator_id,
                query = %full,
                "Full text of oversized GraphQL query",
            );
        }

        next.run(ctx, request.data(self.diagnostics.clone())).await
    }
}

/// Returns the query to put into the main log event and, if it is too large
/// for that, the full query to log separately.
fn loggable_query(query: String, max_bytes: usize, locator_id: Uuid) -> (String, Option<String>) {
    if query.len() <= max_bytes {
        return (query, None);
    }

    let note = format!(
        "<query too large to log inline: {} bytes, logged separately with locator ID {locator_id}>",
        query.len(),
    );
    (note, Some(query))
}

#[cfg(test)]
mod tests {
    use async_graphql::{
        Context, EmptySubscription, InputObject, Object, Schema, SimpleObject, Union, ID,
    };

    use super::*;
    use crate::{
        diagnostics::testing::CollectingSink, ErrorKind, ErrorRemapper, NodeRegistry, SchemaView,
    };

    const SDL: &str = r#"
        interface Node { id: ID! }
        type Collection implements Node { id: ID!, dbid: String! }
        type ErrCollectionNotFound { message: String! }
        type ErrInvalidInput { message: String! }
        union CollectionByIdOrError = Collection | ErrCollectionNotFound | ErrInvalidInput
        input LoginInput { username: String!, password: String! @scrub }
        type Query { collectionById(id: ID!): CollectionByIdOrError, ping: Boolean! }
        type Mutation {
            collectionById(id: ID!): CollectionByIdOrError
            login(input: LoginInput!): Boolean!
            remappedCount: Int!
        }
    "#;

    #[derive(SimpleObject, Clone)]
    struct Collection {
        dbid: String,
    }

    #[derive(SimpleObject)]
    struct ErrCollectionNotFound {
        message: String,
    }

    #[derive(SimpleObject)]
    struct ErrInvalidInput {
        message: String,
    }

    #[derive(Union)]
    enum CollectionByIdOrError {
        Collection(Collection),
        ErrCollectionNotFound(ErrCollectionNotFound),
        ErrInvalidInput(ErrInvalidInput),
    }

    #[derive(InputObject)]
    struct LoginInput {
        username: String,
        password: String,
    }

    struct Query;

    #[Object]
    impl Query {
        async fn ping(&self) -> bool {
            true
        }
    }

    struct Mutation;

    #[Object]
    impl Mutation {
        async fn collection_by_id(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<CollectionByIdOrError> {
            let registry = ctx.data::<NodeRegistry<(), Collection>>()?;
            let remapper = ctx.data::<ErrorRemapper>()?;
            let result = registry.dispatch(&(), &id).await.map(CollectionByIdOrError::Collection);
            remapper.resolve(ctx, result).await
        }

        async fn login(&self, input: LoginInput) -> bool {
            input.username == "bob" && input.password == "hunter2"
        }

        async fn remapped_count(&self, ctx: &Context<'_>) -> async_graphql::Result<usize> {
            Ok(ctx.data::<RequestDiagnostics>()?.remapped_count().await)
        }
    }

    fn schema(sink: Arc<CollectingSink>) -> Schema<Query, Mutation, EmptySubscription> {
        let config = MediationConfig::default();
        let view = Arc::new(SchemaView::parse(SDL, &config).unwrap());

        let registry = NodeRegistry::<(), Collection>::builder()
            .unary("Collection", |_: (), dbid: String| async move {
                if dbid == "abc123" {
                    Ok(Collection { dbid })
                } else {
                    Err(crate::not_found!("collection '{dbid}' not found"))
                }
            })
            .build()
            .unwrap();
        registry.validate(&view);

        let remapper = ErrorRemapper::builder()
            .map(ErrorKind::NotFound, |err| {
                CollectionByIdOrError::ErrCollectionNotFound(ErrCollectionNotFound { message: err.message.clone() })
            })
            .map(ErrorKind::InvalidIdFormat, |err| {
                CollectionByIdOrError::ErrInvalidInput(ErrInvalidInput { message: err.message.clone() })
            })
            .build(view.clone(), sink.clone())
            .unwrap();

        let redactor = Arc::new(Redactor::new(view, &config, sink));
        Schema::build(Query, Mutation, EmptySubscription)
            .data(registry)
            .data(remapper)
            .extension(RequestReporter::new(redactor, &config))
            .finish()
    }

    #[tokio::test]
    async fn test_remapped_errors_are_recorded() {
        let sink = Arc::new(CollectingSink::default());
        let schema = schema(sink.clone());

        let response = schema.execute(r#"
            mutation {
                found: collectionById(id: "Collection:abc123") { ... on Collection { dbid } }
                missing: collectionById(id: "Collection:nope") { ... on ErrCollectionNotFound { message } }
                invalid: collectionById(id: "Collection:abc123:extra") { ... on ErrInvalidInput { message } }
                remappedCount
            }
        "#).await;

        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let data = response.data.into_json().unwrap();
        assert_eq!(data["found"]["dbid"], "abc123");
        assert_eq!(data["missing"]["message"], "collection 'nope' not found");
        assert!(data["invalid"]["message"].as_str().unwrap().contains("expected 1, got 2"));
        assert_eq!(data["remappedCount"], 2);

        let reports = sink.reports.lock().unwrap();
        assert_eq!(*reports, [
            "remapped NOT_FOUND CollectionByIdOrError ErrCollectionNotFound",
            "remapped INVALID_ID_FORMAT CollectionByIdOrError ErrInvalidInput",
        ]);
    }

    #[tokio::test]
    async fn test_each_request_gets_fresh_diagnostics() {
        let schema = schema(Arc::new(CollectingSink::default()));
        let query = r#"mutation { collectionById(id: "Collection:nope") { __typename } remappedCount }"#;

        for _ in 0..2 {
            let data = schema.execute(query).await.data.into_json().unwrap();
            assert_eq!(data["remappedCount"], 1);
        }
    }

    #[tokio::test]
    async fn test_redaction_does_not_affect_execution() {
        let sink = Arc::new(CollectingSink::default());
        let schema = schema(sink.clone());

        let request = Request::new("mutation Login($input: LoginInput!) { login(input: $input) }")
            .operation_name("Login")
            .variables(async_graphql::Variables::from_json(serde_json::json!({
                "input": { "username": "bob", "password": "hunter2" },
            })));
        let data = schema.execute(request).await.data.into_json().unwrap();
        assert_eq!(data["login"], true);

        // A query that fails to parse still reaches the executor, which
        // reports the syntax error itself.
        let response = schema.execute("mutation { login(").await;
        assert!(!response.errors.is_empty());
        let reports = sink.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].starts_with("redaction failed"));
    }

    #[test]
    fn test_loggable_query() {
        let locator = Uuid::new_v4();
        assert_eq!(loggable_query("{ ping }".into(), 8, locator), ("{ ping }".into(), None));

        let (note, full) = loggable_query("{ ping }".into(), 7, locator);
        assert!(note.contains("8 bytes"));
        assert!(note.contains(&locator.to_string()));
        assert_eq!(full.as_deref(), Some("{ ping }"));
    }
}
