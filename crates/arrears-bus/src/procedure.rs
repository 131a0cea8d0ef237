//! Procedure definitions: immutable, scope-qualified contracts.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;

use crate::schema::Schema;

/// Input to [`Scope::define_procedure`](crate::Scope::define_procedure).
#[derive(Debug, Clone)]
pub struct ProcedureSpec {
    pub name: String,
    pub description: Option<String>,
    pub payload: Value,
    pub response: Value,
}

impl ProcedureSpec {
    pub fn new(name: impl Into<String>, payload: Value, response: Value) -> Self {
        Self {
            name: name.into(),
            description: None,
            payload,
            response,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug)]
pub(crate) struct DefinitionInner {
    pub(crate) scope: String,
    pub(crate) name: String,
    pub(crate) qualified_name: String,
    pub(crate) description: Option<String>,
    pub(crate) payload_schema: Schema,
    pub(crate) response_schema: Schema,
}

/// A procedure contract: qualified name plus payload and response schemas.
///
/// `P` and `R` are the Rust types the payload and response decode into; the
/// untyped form `ProcedureDefinition` (both `Value`) is used by tooling and
/// by callers that build payloads dynamically. Clones share one definition.
pub struct ProcedureDefinition<P = Value, R = Value> {
    inner: Arc<DefinitionInner>,
    _types: PhantomData<fn(P) -> R>,
}

impl<P, R> ProcedureDefinition<P, R> {
    pub(crate) fn from_inner(inner: Arc<DefinitionInner>) -> Self {
        Self {
            inner,
            _types: PhantomData,
        }
    }

    pub fn scope_name(&self) -> &str {
        &self.inner.scope
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// `scope:name`, the registry key.
    pub fn qualified_name(&self) -> &str {
        &self.inner.qualified_name
    }

    pub fn description(&self) -> Option<&str> {
        self.inner.description.as_deref()
    }

    pub fn payload_schema(&self) -> &Schema {
        &self.inner.payload_schema
    }

    pub fn response_schema(&self) -> &Schema {
        &self.inner.response_schema
    }

    /// The same contract without its Rust payload/response types.
    pub fn erased(&self) -> ProcedureDefinition {
        ProcedureDefinition::from_inner(self.inner.clone())
    }
}

impl<P, R> Clone for ProcedureDefinition<P, R> {
    fn clone(&self) -> Self {
        Self::from_inner(self.inner.clone())
    }
}

impl<P, R> fmt::Debug for ProcedureDefinition<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcedureDefinition")
            .field("qualified_name", &self.inner.qualified_name)
            .field("description", &self.inner.description)
            .finish_non_exhaustive()
    }
}

impl<P, R> fmt::Display for ProcedureDefinition<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.qualified_name)
    }
}

pub(crate) fn qualify(scope: &str, name: &str) -> String {
    format!("{scope}:{name}")
}
