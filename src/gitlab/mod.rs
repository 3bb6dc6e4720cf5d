//! GitLab API access
//!
//! This module provides the API abstraction the variable commands run against
//! and its REST implementation.

mod api;
mod client;
mod types;

pub use api::GitLabApi;
pub use client::{GitLabClient, DEFAULT_PER_PAGE};
pub use types::{Group, NewVariable, Project, User, Variable, VariableOwner, VariableUpdate};

/// Environment scope GitLab assigns when none is given
pub const DEFAULT_ENVIRONMENT_SCOPE: &str = "*";

/// Type alias for API trait object
pub type Api = Box<dyn GitLabApi>;
