//! Axum glue for serving a mediated schema
//!
//! Provides helpers for:
//! - Extracting the request ID from the `x-request-id` header
//! - Attaching it to the GraphQL request and the tracing span
//! - A standard Axum handler for the GraphQL endpoint

use async_graphql::{Context, ObjectType, Request, Response, Schema, SubscriptionType};
use axum::{extract::Extension, http::HeaderMap, Json};
use tracing::Instrument;
use uuid::Uuid;


pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// ID correlating the log events and diagnostics of one HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub Uuid);

/// Extract the request ID from the `x-request-id` header, if it is a UUID.
pub fn extract_request_id(headers: &HeaderMap) -> Option<RequestId> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
        .map(RequestId)
}

/// Standard GraphQL handler
///
/// Uses the caller's request ID or generates one, makes it available to
/// resolvers and runs the request inside a span carrying it. Register
/// [`RequestReporter`](crate::RequestReporter) on the schema to get redacted
/// request logs.
///
/// # Example
///
/// ```rust,no_run
/// use axum::{Router, routing::post};
/// use gallery_mediation::http::graphql_handler;
/// use async_graphql::{EmptyMutation, EmptySubscription};
///
/// # struct Query;
/// # #[async_graphql::Object] impl Query { async fn ping(&self) -> bool { true } }
/// let app: Router = Router::new()
///     .route("/graphql", post(graphql_handler::<Query, EmptyMutation, EmptySubscription>));
/// ```
pub async fn graphql_handler<Query, Mutation, Subscription>(
    Extension(schema): Extension<Schema<Query, Mutation, Subscription>>,
    headers: HeaderMap,
    Json(request): Json<Request>,
) -> Json<Response>
where
    Query: ObjectType + 'static,
    Mutation: ObjectType + 'static,
    Subscription: SubscriptionType + 'static,
{
    let request_id = extract_request_id(&headers).unwrap_or_else(|| RequestId(Uuid::new_v4()));
    let span = tracing::info_span!("graphql_request", request_id = %request_id.0);

    let response = schema.execute(request.data(request_id)).instrument(span).await;
    Json(response)
}

/// Get the request ID from the GraphQL context
pub fn get_request_id(ctx: &Context<'_>) -> Option<RequestId> {
    ctx.data_opt::<RequestId>().copied()
}
