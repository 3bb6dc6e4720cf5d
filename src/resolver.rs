//! Variable filtering and set/delete resolution
//!
//! `get`, `set` and `del` all select variables with the same [`FilterSpec`].
//! `set` then resolves the selection to exactly one create or update, and
//! refuses to guess when more than one variable matches.

use std::collections::HashSet;

use crate::error::SvmError;
use crate::gitlab::{NewVariable, Variable, VariableUpdate, DEFAULT_ENVIRONMENT_SCOPE};

/// Which variables a command applies to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSpec {
    /// Keys to match; empty matches every key
    pub keys: HashSet<String>,
    /// Exact, case-sensitive environment scope
    pub environment_scope: Option<String>,
    pub protected: Option<bool>,
}

impl FilterSpec {
    pub fn new<I, S>(keys: I, environment_scope: Option<String>, protected: Option<bool>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            environment_scope,
            protected,
        }
    }

    pub fn matches(&self, variable: &Variable) -> bool {
        if !self.keys.is_empty() && !self.keys.contains(&variable.key) {
            return false;
        }
        if let Some(ref scope) = self.environment_scope {
            if *scope != variable.environment_scope {
                return false;
            }
        }
        if let Some(protected) = self.protected {
            if protected != variable.protected {
                return false;
            }
        }
        true
    }
}

/// Outcome of resolving a `set`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetAction {
    Create(NewVariable),
    Update(VariableUpdate),
}

/// One delete call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteAction {
    pub key: String,
}

/// Variables matching `spec`, in listing order
pub fn filter(variables: &[Variable], spec: &FilterSpec) -> Vec<Variable> {
    variables
        .iter()
        .filter(|v| spec.matches(v))
        .cloned()
        .collect()
}

/// Decide whether `set` creates a variable or updates the single match.
///
/// An update only replaces the value; the matched record keeps its
/// protected flag and environment scope.
pub fn resolve_set(
    matches: &[Variable],
    key: &str,
    value: &str,
    protected: Option<bool>,
    environment_scope: Option<&str>,
) -> Result<SetAction, SvmError> {
    match matches {
        [] => Ok(SetAction::Create(NewVariable {
            key: key.to_string(),
            value: value.to_string(),
            protected: protected.unwrap_or(false),
            environment_scope: environment_scope
                .unwrap_or(DEFAULT_ENVIRONMENT_SCOPE)
                .to_string(),
        })),
        [existing] => Ok(SetAction::Update(VariableUpdate {
            key: existing.key.clone(),
            value: value.to_string(),
            environment_scope: existing.environment_scope.clone(),
        })),
        _ => Err(SvmError::AmbiguousVariable(matches.to_vec())),
    }
}

/// One delete per match
pub fn resolve_delete(matches: &[Variable]) -> Vec<DeleteAction> {
    matches
        .iter()
        .map(|v| DeleteAction { key: v.key.clone() })
        .collect()
}

pub fn resolve_get(matches: Vec<Variable>) -> Vec<Variable> {
    matches
}
