//! Node lookup: global ID dispatch to per-type fetch handlers
//!
//! Every referencable type registers exactly one [`NodeHandler`]. Resolving
//! an ID is a pure table lookup, so a new referencable type only needs a new
//! registry entry and handler, never new dispatch code.

use std::{collections::HashMap, future::Future, time::Duration};

use async_trait::async_trait;

use crate::{
    error::DomainResult,
    id::{GlobalId, InvalidIdFormat},
    schema::SchemaView,
    ConfigError, MediationConfig,
};

/// Fetches one node type by its ID components.
///
/// A missing entity is reported as a `NotFound` [`crate::DomainError`], so
/// that it can be remapped like every other domain error.
#[async_trait]
pub trait NodeHandler<C, N>: Send + Sync {
    /// Number of ID components this handler expects.
    fn arity(&self) -> usize;

    /// Fetch the node. `components.len()` is always equal to `arity()`.
    async fn fetch(&self, ctx: &C, components: Vec<String>) -> DomainResult<N>;
}

/// Adapter for handlers taking a single ID component.
pub struct Unary<F>(pub F);

#[async_trait]
impl<C, N, F, Fut> NodeHandler<C, N> for Unary<F>
where
    C: Clone + Send + Sync + 'static,
    N: Send + 'static,
    F: Fn(C, String) -> Fut + Send + Sync,
    Fut: Future<Output = DomainResult<N>> + Send,
{
    fn arity(&self) -> usize {
        1
    }

    async fn fetch(&self, ctx: &C, components: Vec<String>) -> DomainResult<N> {
        let [id]: [String; 1] = components.try_into()
            .map_err(|c: Vec<String>| crate::internal_error!("unary handler called with {} components", c.len()))?;
        (self.0)(ctx.clone(), id).await
    }
}

/// Adapter for handlers taking two ID components.
pub struct Binary<F>(pub F);

#[async_trait]
impl<C, N, F, Fut> NodeHandler<C, N> for Binary<F>
where
    C: Clone + Send + Sync + 'static,
    N: Send + 'static,
    F: Fn(C, String, String) -> Fut + Send + Sync,
    Fut: Future<Output = DomainResult<N>> + Send,
{
    fn arity(&self) -> usize {
        2
    }

    async fn fetch(&self, ctx: &C, components: Vec<String>) -> DomainResult<N> {
        let [a, b]: [String; 2] = components.try_into()
            .map_err(|c: Vec<String>| crate::internal_error!("binary handler called with {} components", c.len()))?;
        (self.0)(ctx.clone(), a, b).await
    }
}

/// Builder for [`NodeRegistry`]. The registry is written once here and only
/// read afterwards.
pub struct NodeRegistryBuilder<C, N> {
    handlers: HashMap<String, Box<dyn NodeHandler<C, N>>>,
    duplicate: Option<String>,
    timeout: Option<Duration>,
}

impl<C, N> NodeRegistryBuilder<C, N>
where
    C: Send + Sync + 'static,
    N: Send + 'static,
{
    pub fn handler(mut self, type_name: &str, handler: impl NodeHandler<C, N> + 'static) -> Self {
        if self.handlers.insert(type_name.to_string(), Box::new(handler)).is_some() {
            self.duplicate.get_or_insert_with(|| type_name.to_string());
        }
        self
    }

    pub fn unary<F, Fut>(self, type_name: &str, f: F) -> Self
    where
        C: Clone,
        F: Fn(C, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DomainResult<N>> + Send + 'static,
    {
        self.handler(type_name, Unary(f))
    }

    pub fn binary<F, Fut>(self, type_name: &str, f: F) -> Self
    where
        C: Clone,
        F: Fn(C, String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DomainResult<N>> + Send + 'static,
    {
        self.handler(type_name, Binary(f))
    }

    pub fn with_config(mut self, config: &MediationConfig) -> Self {
        self.timeout = config.node_fetch_timeout;
        self
    }

    pub fn build(self) -> crate::Result<NodeRegistry<C, N>> {
        if let Some(type_name) = self.duplicate {
            return Err(ConfigError::DuplicateHandler(type_name));
        }

        Ok(NodeRegistry {
            handlers: self.handlers,
            timeout: self.timeout,
        })
    }
}

/// Table of node fetch handlers keyed by type tag.
pub struct NodeRegistry<C, N> {
    handlers: HashMap<String, Box<dyn NodeHandler<C, N>>>,
    timeout: Option<Duration>,
}

impl<C, N> NodeRegistry<C, N>
where
    C: Send + Sync + 'static,
    N: Send + 'static,
{
    pub fn builder() -> NodeRegistryBuilder<C, N> {
        NodeRegistryBuilder {
            handlers: HashMap::new(),
            duplicate: None,
            timeout: None,
        }
    }

    /// Parses `id` and checks it against the registered handlers.
    pub fn decode(&self, id: &str) -> Result<GlobalId, InvalidIdFormat> {
        let id = id.parse::<GlobalId>()?;
        let handler = self.handlers.get(id.type_name())
            .ok_or_else(|| InvalidIdFormat::UnknownType(id.type_name().to_string()))?;

        if handler.arity() != id.components().len() {
            return Err(InvalidIdFormat::Arity {
                type_name: id.type_name().to_string(),
                expected: handler.arity(),
                supplied: id.components().len(),
            });
        }

        Ok(id)
    }

    /// Resolves a global ID to its node by calling the registered handler.
    pub async fn dispatch(&self, ctx: &C, id: &str) -> DomainResult<N> {
        let id = self.decode(id).inspect_err(|e| tracing::debug!(id, "invalid node ID: {e}"))?;

        // `decode` only succeeds for registered types.
        let Some(handler) = self.handlers.get(id.type_name()) else {
            return Err(InvalidIdFormat::UnknownType(id.type_name().to_string()).into());
        };

        tracing::trace!(type_name = id.type_name(), "fetching node");
        let type_name = id.type_name().to_string();
        let fetch = handler.fetch(ctx, id.components().to_vec());
        match self.timeout {
            None => fetch.await,
            Some(limit) => tokio::time::timeout(limit, fetch).await.unwrap_or_else(|_| {
                tracing::warn!(type_name = %type_name, ?limit, "node fetch timed out");
                Err(crate::internal_error!("fetching '{type_name}' timed out"))
            }),
        }
    }

    /// Checks that every referencable type of `schema` has a handler whose
    /// arity matches the schema's ID declaration.
    pub fn check(&self, schema: &SchemaView) -> crate::Result<()> {
        for ty in schema.referencable_types() {
            let handler = self.handlers.get(&ty.name)
                .ok_or_else(|| ConfigError::MissingHandler(ty.name.clone()))?;

            let declared = schema.id_arity(&ty.name).unwrap_or(1);
            if handler.arity() != declared {
                return Err(ConfigError::ArityMismatch {
                    type_name: ty.name.clone(),
                    handler: handler.arity(),
                    schema: declared,
                });
            }
        }

        Ok(())
    }

    /// Like [`Self::check`], but aborts startup on failure. A node type
    /// without handler is a deployment defect, not a request-time condition.
    pub fn validate(&self, schema: &SchemaView) {
        if let Err(e) = self.check(schema) {
            panic!("node handler validation failed: {e}");
        }
    }
}
