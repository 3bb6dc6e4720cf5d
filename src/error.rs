//! Error taxonomy and exit codes
//!
//! Commands return `anyhow::Result` so call sites can attach context. The
//! failures that carry a dedicated exit code are raised as [`SvmError`] and
//! recovered in `main` through [`exit_code_for`].

use thiserror::Error;

use crate::gitlab::Variable;

/// Exit code used when the requested instance cannot be resolved from config
pub const EXIT_CONFIG: u8 = 255;
/// Exit code used when the remote service rejects (or never gets) a credential
pub const EXIT_AUTH: u8 = 254;
/// Exit code used when `set` matches more than one variable
pub const EXIT_AMBIGUOUS: u8 = 1;
/// Exit code for API, network and IO failures
pub const EXIT_FAILURE: u8 = 2;
/// Exit code for commands that exist on the command line but do nothing yet
pub const EXIT_NOT_IMPLEMENTED: u8 = 3;

#[derive(Error, Debug)]
pub enum SvmError {
    #[error("configuration error: {0}")]
    ConfigResolution(String),

    #[error(
        "authentication failed: {0}. In most cases this is an invalid private access token (PAT)"
    )]
    Authentication(String),

    #[error("there is more than one secret variable matching this filter: {}", describe(.0))]
    AmbiguousVariable(Vec<Variable>),

    #[error("GitLab API request failed with status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("'{0}' is not yet implemented")]
    NotImplemented(&'static str),
}

impl SvmError {
    pub fn exit_code(&self) -> u8 {
        match self {
            SvmError::ConfigResolution(_) => EXIT_CONFIG,
            SvmError::Authentication(_) => EXIT_AUTH,
            SvmError::AmbiguousVariable(_) => EXIT_AMBIGUOUS,
            SvmError::Api { .. } => EXIT_FAILURE,
            SvmError::NotImplemented(_) => EXIT_NOT_IMPLEMENTED,
        }
    }
}

/// Map any command failure to the process exit code
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<SvmError>())
        .map(SvmError::exit_code)
        .unwrap_or(EXIT_FAILURE)
}

// Values stay out of the message, the identity triple is enough to tell matches apart.
fn describe(matches: &[Variable]) -> String {
    matches
        .iter()
        .map(|v| {
            format!(
                "[key={}, environment_scope={}, protected={}]",
                v.key, v.environment_scope, v.protected
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}
