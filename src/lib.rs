//! GitLab Secret Variable Manager Library
//!
//! A library for listing, changing, deleting and exporting GitLab CI/CD
//! variables of projects and groups.

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod gitlab;
pub mod resolver;
pub mod variables;

pub use config::Config;
pub use error::SvmError;
pub use gitlab::{GitLabApi, GitLabClient, Variable};
pub use resolver::{filter, resolve_delete, resolve_get, resolve_set, FilterSpec, SetAction};
