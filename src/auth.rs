//! Access token lookup
//!
//! Tokens come from an ordered chain of providers. The first provider that
//! yields a non-empty token wins.

use anyhow::{Context, Result};
use std::io::{BufRead, IsTerminal};
use tracing::debug;

use crate::config::ResolvedInstance;
use crate::error::SvmError;

/// Environment variable holding a personal access token
pub const TOKEN_ENV_VAR: &str = "GITLABPAT";

const PROMPT: &str = "Enter gitlab private access token: ";
// Bounded so a terminal that keeps answering with empty lines cannot loop forever.
const PROMPT_ATTEMPTS: usize = 3;

/// A source of GitLab personal access tokens
pub trait TokenProvider {
    /// Name used in log output
    fn name(&self) -> &'static str;

    /// Return a token, or `None` if this source has none
    fn token(&self) -> Result<Option<String>>;
}

/// Token stored in the config file entry
pub struct ConfigToken(pub Option<String>);

impl TokenProvider for ConfigToken {
    fn name(&self) -> &'static str {
        "config file"
    }

    fn token(&self) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

/// Token read from an environment variable
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvToken {
    fn default() -> Self {
        Self::new(TOKEN_ENV_VAR)
    }
}

impl TokenProvider for EnvToken {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn token(&self) -> Result<Option<String>> {
        Ok(std::env::var(&self.var).ok())
    }
}

/// Token typed in on the terminal, or piped into stdin
pub struct PromptToken;

impl PromptToken {
    /// Read a single line holding the token; `None` on EOF or an empty line
    pub fn from_reader(mut reader: impl BufRead) -> Result<Option<String>> {
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .context("Failed to read access token from stdin")?;
        let token = line.trim();
        Ok((!token.is_empty()).then(|| token.to_string()))
    }
}

impl TokenProvider for PromptToken {
    fn name(&self) -> &'static str {
        "prompt"
    }

    fn token(&self) -> Result<Option<String>> {
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            return Self::from_reader(stdin.lock());
        }

        for _ in 0..PROMPT_ATTEMPTS {
            match rpassword::prompt_password(PROMPT) {
                Ok(token) if !token.trim().is_empty() => return Ok(Some(token.trim().to_string())),
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e).context("Failed to read access token"),
            }
        }
        Ok(None)
    }
}

/// Ordered list of token providers
pub struct TokenChain {
    providers: Vec<Box<dyn TokenProvider>>,
}

impl TokenChain {
    pub fn new(providers: Vec<Box<dyn TokenProvider>>) -> Self {
        Self { providers }
    }

    /// The chain used for an instance.
    ///
    /// Config entries use their stored token, then the environment. URL
    /// instances use the environment, then an interactive prompt.
    pub fn for_instance(instance: &ResolvedInstance) -> Self {
        if instance.from_url {
            Self::new(vec![Box::new(EnvToken::default()), Box::new(PromptToken)])
        } else {
            Self::new(vec![
                Box::new(ConfigToken(instance.private_token.clone())),
                Box::new(EnvToken::default()),
            ])
        }
    }

    /// First non-empty token of the chain
    pub fn resolve(&self) -> Result<String> {
        for provider in &self.providers {
            if let Some(token) = provider.token()?.filter(|t| !t.is_empty()) {
                debug!("Using access token from {}", provider.name());
                return Ok(token);
            }
        }

        Err(SvmError::Authentication(format!(
            "no private access token found (config file, ${} or prompt)",
            TOKEN_ENV_VAR
        ))
        .into())
    }
}
