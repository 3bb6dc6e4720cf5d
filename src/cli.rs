//! CLI parsing and command execution
//!
//! This module handles command-line argument parsing and routes commands to the appropriate handlers.

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::auth::TokenChain;
use crate::config::{self, Config, ResolvedInstance};
use crate::error::SvmError;
use crate::export::{Destination, ExportFormat, Exporter};
use crate::gitlab::{Api, GitLabApi, GitLabClient};
use crate::resolver::FilterSpec;
use crate::variables;

const TRUTHY: [&str; 5] = ["true", "1", "True", "y", "yes"];

#[derive(Parser)]
#[command(name = "gitlabsvm")]
#[command(about = "Manage GitLab CI/CD secret variables of projects and groups", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Verbose logging output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Gitlab instance entry from the config file, or an instance URL
    #[arg(long, env = "GITLABSVM_INSTANCE", global = true)]
    pub gitlab: Option<String>,

    /// Path to configuration file (default: ~/.gitlabsvm.cfg, then /etc/gitlabsvm.cfg)
    #[arg(short, long, env = "GITLABSVM_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Key, environment and protected filters shared by get and del
#[derive(Args, Debug, Clone)]
pub struct FilterArgs {
    /// Key of the secret variable (repeatable; keys are not unique)
    #[arg(long = "key", value_name = "KEY")]
    pub keys: Vec<String>,

    /// Target environment scope, like staging or production
    #[arg(long)]
    pub environment: Option<String>,

    /// Only variables for protected branches (optionally =true/false)
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = parse_flag)]
    pub protected: Option<bool>,
}

impl FilterArgs {
    pub fn to_spec(&self) -> FilterSpec {
        FilterSpec::new(self.keys.clone(), self.environment.clone(), self.protected)
    }
}

/// Output options shared by export and exportgroup
#[derive(Args, Debug, Clone)]
pub struct OutputArgs {
    /// Export comma separated values instead of JSON
    #[arg(long)]
    pub csv: bool,

    /// Write output to a file with a timestamped filename
    #[arg(long)]
    pub file: bool,

    /// Directory for --file output
    #[arg(long, requires = "file")]
    pub output_dir: Option<PathBuf>,
}

impl OutputArgs {
    pub fn exporter(&self) -> Exporter {
        let destination = if self.file {
            Destination::Directory(self.output_dir.clone().unwrap_or_else(|| PathBuf::from(".")))
        } else {
            Destination::Stdout
        };
        Exporter::new(ExportFormat::from_csv_flag(self.csv), destination)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a sample configuration file
    Init {
        /// Output path for the configuration file
        #[arg(short, long, default_value = "gitlabsvm.cfg")]
        output: PathBuf,
    },

    /// Get one or more project variables
    Get {
        /// Project path including groups, e.g. groupname/project
        project: String,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Change or create a project variable
    Set {
        /// Project path including groups, e.g. groupname/project
        project: String,

        /// Key of the secret variable
        #[arg(long)]
        key: String,

        /// Value of the variable
        #[arg(long, allow_hyphen_values = true)]
        value: String,

        /// Target environment scope, like staging or production
        #[arg(long)]
        environment: Option<String>,

        /// Only valid for protected branches (optionally =true/false)
        #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = parse_flag)]
        protected: Option<bool>,
    },

    /// Remove one or more project variables
    Del {
        /// Project path including groups, e.g. groupname/project
        project: String,

        #[command(flatten)]
        filter: FilterArgs,
    },

    /// Print project variables
    Export {
        /// Project path including groups, e.g. groupname/project
        project: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Print group variables, use --all to include all projects of the group
    #[command(name = "exportgroup")]
    ExportGroup {
        /// Group name, e.g. groupname
        group: String,

        /// Include all projects of the group
        #[arg(long)]
        all: bool,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Import variables from a file (not yet implemented)
    Import {
        /// Project or group path
        target: String,

        /// File to import
        file: PathBuf,
    },
}

/// Truthy words enable the flag, anything else disables it
fn parse_flag(value: &str) -> Result<bool, String> {
    Ok(TRUTHY.contains(&value))
}

/// Execute a CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    // Commands that need neither config nor network
    match cli.command {
        Commands::Init { ref output } => {
            Config::create_sample(output)
                .with_context(|| format!("Failed to create sample config at {:?}", output))?;
            println!("Sample configuration created at {:?}", output);
            return Ok(());
        }
        Commands::Import { ref target, ref file } => {
            debug!("Import of {:?} into {} requested", file, target);
            return Err(SvmError::NotImplemented("import").into());
        }
        _ => {}
    }

    let instance = resolve_instance(&cli)?;
    let api = connect(&instance).await?;

    match cli.command {
        Commands::Init { .. } | Commands::Import { .. } => unreachable!(), // Handled above

        Commands::Get { project, filter } => {
            let found = variables::get_variables(api.as_ref(), &project, &filter.to_spec()).await?;
            println!(
                "{}",
                serde_json::to_string(&found).context("Failed to serialize variables")?
            );
        }

        Commands::Set {
            project,
            key,
            value,
            environment,
            protected,
        } => {
            variables::set_variable(
                api.as_ref(),
                &project,
                &key,
                &value,
                environment.as_deref(),
                protected,
            )
            .await?;
        }

        Commands::Del { project, filter } => {
            variables::delete_variables(api.as_ref(), &project, &filter.to_spec()).await?;
        }

        Commands::Export { project, output } => {
            variables::export_project(api.as_ref(), &output.exporter(), &project).await?;
        }

        Commands::ExportGroup { group, all, output } => {
            let total =
                variables::export_group(api.as_ref(), &output.exporter(), &group, all).await?;
            info!("Exported {} variables of group {}", total, group);
        }
    }

    Ok(())
}

/// Load the config file, if any, and pick the instance
fn resolve_instance(cli: &Cli) -> Result<ResolvedInstance> {
    let config_path = config::locate_config(cli.config.as_deref(), &config::default_config_paths())?;
    let config = config_path
        .as_ref()
        .map(Config::from_file)
        .transpose()?;

    config::resolve_instance(cli.gitlab.as_deref(), config.as_ref())
}

/// Build an authenticated client and check that the token is accepted
async fn connect(instance: &ResolvedInstance) -> Result<Api> {
    let token = TokenChain::for_instance(instance).resolve()?;
    let client = GitLabClient::new(&instance.settings, token)
        .with_context(|| format!("Failed to create GitLab client for {}", instance.name))?;

    let user = client
        .current_user()
        .await
        .with_context(|| format!("Failed to communicate with {}", client.instance_url()))?;
    info!(
        "Connected to {} as {} (id {})",
        client.instance_url(),
        user.username,
        user.id
    );

    Ok(Box::new(client))
}
