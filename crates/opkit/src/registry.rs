//! The Operation Table (spec §3) plus the duplicate-registration guard
//! spec §8 scenario 3 requires to fail *construction*, not silently drop
//! the second registration the way `ApiIngress::register_operation` does.
//! The `DashMap`-keyed dedup check itself is lifted from that same
//! method; only the failure mode changes.

use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use http::Method;
use indexmap::IndexMap;
use thiserror::Error;

use crate::contracts::{Handler, Middleware};
use crate::operation::Operation;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("operation \"{0}\" is already registered for {1} {2}")]
    DuplicateRoute(String, Method, String),
    #[error("handler id \"{0}\" is already registered")]
    DuplicateHandlerId(String),
    #[error(transparent)]
    Operation(#[from] crate::operation::OperationError),
}

struct Entry {
    operation: Operation,
    handler: Arc<dyn Handler>,
    middleware: Vec<Arc<dyn Middleware>>,
}

/// Mapping from path-template to mapping from method to Operation (spec
/// §3). Built-before-serve, then read-only: the table is swapped into an
/// `ArcSwap` once frozen so concurrent request handling never locks.
pub struct Registry {
    routes: DashMap<(Method, String), ()>,
    handler_ids: DashMap<String, ()>,
    table: IndexMap<String, IndexMap<Method, Entry>>,
    frozen: Option<Arc<FrozenTable>>,
}

/// The read-only view request handling actually dispatches against.
pub struct FrozenTable {
    by_path: IndexMap<String, IndexMap<Method, (Operation, Arc<dyn Handler>, Vec<Arc<dyn Middleware>>)>>,
}

impl FrozenTable {
    pub fn lookup(&self, path: &str, method: &Method) -> Option<(&Operation, &Arc<dyn Handler>, &[Arc<dyn Middleware>])> {
        self.by_path
            .get(path)
            .and_then(|methods| methods.get(method))
            .map(|(op, h, mw)| (op, h, mw.as_slice()))
    }

    /// Methods registered for `path`, used to build a 405's `Allow` header.
    pub fn methods_for(&self, path: &str) -> Vec<Method> {
        self.by_path
            .get(path)
            .map(|methods| methods.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.by_path.values().flat_map(|methods| methods.values().map(|(op, _, _)| op))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            routes: DashMap::new(),
            handler_ids: DashMap::new(),
            table: IndexMap::new(),
            frozen: None,
        }
    }

    /// Inserts a finished operation. Fails the whole build if the
    /// (method, path) pair or the operation id was already registered.
    pub fn register(
        &mut self,
        operation: Operation,
        handler: Arc<dyn Handler>,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> Result<(), RegistryError> {
        if self
            .handler_ids
            .insert(operation.id.clone(), ())
            .is_some()
        {
            return Err(RegistryError::DuplicateHandlerId(operation.id));
        }

        let route_key = (operation.method.clone(), operation.path.clone());
        if self.routes.insert(route_key, ()).is_some() {
            return Err(RegistryError::DuplicateRoute(
                operation.id,
                operation.method,
                operation.path,
            ));
        }

        self.table
            .entry(operation.path.clone())
            .or_default()
            .insert(
                operation.method.clone(),
                Entry {
                    operation,
                    handler,
                    middleware,
                },
            );
        Ok(())
    }

    /// Freezes the table into a read-only snapshot served to all
    /// subsequent requests. Idempotent: calling it again re-derives the
    /// same snapshot from the same table.
    pub fn freeze(&mut self) -> Arc<FrozenTable> {
        let by_path = self
            .table
            .iter()
            .map(|(path, methods)| {
                let methods = methods
                    .iter()
                    .map(|(method, entry)| {
                        (
                            method.clone(),
                            (entry.operation.clone(), entry.handler.clone(), entry.middleware.clone()),
                        )
                    })
                    .collect();
                (path.clone(), methods)
            })
            .collect();
        let frozen = Arc::new(FrozenTable { by_path });
        self.frozen = Some(frozen.clone());
        frozen
    }

    pub fn frozen(&self) -> Option<&Arc<FrozenTable>> {
        self.frozen.as_ref()
    }
}

/// Thin swap-in-place wrapper for deployments that rebuild the table at
/// runtime (e.g. dynamic plugin loading); unused by the reference demo,
/// which freezes once at startup, but kept so an adapter can support it
/// without a breaking change to this type.
pub struct SharedRegistry {
    current: ArcSwap<FrozenTable>,
}

impl SharedRegistry {
    pub fn new(initial: Arc<FrozenTable>) -> Self {
        Self {
            current: ArcSwap::new(initial),
        }
    }

    pub fn load(&self) -> Arc<FrozenTable> {
        self.current.load_full()
    }

    pub fn swap(&self, next: Arc<FrozenTable>) {
        self.current.store(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{OperationBuilder, ParameterDescriptor, ResponseDescriptor};
    use async_trait::async_trait;
    use opkit_schema::{Schema, SchemaOrRef};
    use serde_json::Value;

    struct NoopHandler;

    #[async_trait]
    impl Handler for NoopHandler {
        async fn call(
            &self,
            _ctx: Arc<dyn crate::contracts::RequestContext>,
            _input: Value,
            _writer: &mut dyn crate::contracts::ResponseWriter,
        ) -> Result<(u16, Value), crate::error::HandlerError> {
            Ok((200, Value::Null))
        }
    }

    fn sample_op(path: &str) -> (Operation, Arc<dyn Handler>, Vec<Arc<dyn Middleware>>) {
        OperationBuilder::get(path)
            .param(ParameterDescriptor::path("id", SchemaOrRef::inline(Schema::string())))
            .response(ResponseDescriptor::new(200, "ok"))
            .handler(Arc::new(NoopHandler))
            .build()
            .unwrap()
    }

    #[test]
    fn duplicate_route_fails_registration() {
        let mut registry = Registry::new();
        let (op1, h1, mw1) = sample_op("/things/{id}");
        registry.register(op1, h1, mw1).unwrap();

        let (mut op2, h2, mw2) = sample_op("/things/{id}");
        op2.id = "a_different_id".to_string();
        let err = registry.register(op2, h2, mw2).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateRoute(_, _, _)));
    }

    #[test]
    fn duplicate_handler_id_fails_registration() {
        let mut registry = Registry::new();
        let (op1, h1, mw1) = sample_op("/things/{id}");
        registry.register(op1, h1, mw1).unwrap();

        let (op2, h2, mw2) = sample_op("/other/{id}");
        let err = registry.register(op2, h2, mw2).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateHandlerId(_)));
    }

    #[test]
    fn frozen_table_looks_up_by_path_and_method() {
        let mut registry = Registry::new();
        let (op, h, mw) = sample_op("/things/{id}");
        registry.register(op, h, mw).unwrap();
        let frozen = registry.freeze();

        let (op, _, _) = frozen.lookup("/things/{id}", &Method::GET).expect("registered");
        assert_eq!(op.path, "/things/{id}");
        assert!(frozen.lookup("/things/{id}", &Method::POST).is_none());
    }
}
