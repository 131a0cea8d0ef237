//! Scopes: per-module namespaces that mint procedure definitions.

use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::Mutex;

use crate::error::{BusError, BusResult};
use crate::procedure::{DefinitionInner, ProcedureDefinition, ProcedureSpec, qualify};
use crate::schema::Schema;

/// Namespace factory bound to one module.
///
/// Scopes never hold handlers; a definition only becomes callable once the
/// owning module registers a handler for it during setup.
#[derive(Debug, Clone)]
pub struct Scope {
    name: Arc<str>,
    defined: Arc<Mutex<IndexSet<String>>>,
}

impl Scope {
    pub fn new(name: impl Into<String>) -> BusResult<Self> {
        let name = name.into();
        validate_segment(&name)?;
        Ok(Self {
            name: name.into(),
            defined: Arc::new(Mutex::new(IndexSet::new())),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Names defined through this scope so far, in definition order.
    pub fn defined(&self) -> Vec<String> {
        self.defined.lock().iter().cloned().collect()
    }

    pub fn define_procedure<P, R>(&self, spec: ProcedureSpec) -> BusResult<ProcedureDefinition<P, R>> {
        validate_segment(&spec.name)?;
        let qualified_name = qualify(&self.name, &spec.name);

        let payload_schema =
            Schema::compile(spec.payload).map_err(|message| BusError::InvalidSchema {
                procedure: format!("{qualified_name} (payload)"),
                message,
            })?;
        let response_schema =
            Schema::compile(spec.response).map_err(|message| BusError::InvalidSchema {
                procedure: format!("{qualified_name} (response)"),
                message,
            })?;

        if !self.defined.lock().insert(spec.name.clone()) {
            return Err(BusError::DuplicateDefinition {
                procedure: qualified_name,
            });
        }

        Ok(ProcedureDefinition::from_inner(Arc::new(DefinitionInner {
            scope: self.name.to_string(),
            name: spec.name,
            qualified_name,
            description: spec.description,
            payload_schema,
            response_schema,
        })))
    }
}

fn validate_segment(name: &str) -> BusResult<()> {
    let reason = if name.is_empty() {
        "must not be empty"
    } else if name.contains(':') {
        "must not contain ':'"
    } else if name.chars().any(char::is_whitespace) {
        "must not contain whitespace"
    } else {
        return Ok(());
    };
    Err(BusError::InvalidName {
        name: name.to_owned(),
        reason,
    })
}
