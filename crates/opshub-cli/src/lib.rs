//! opshubctl library
//!
//! Operator CLI over the per-user cluster access service. Clusters and
//! platform users come from the static directory in the config file; the
//! ledger is the SQLite file named there.

pub mod commands;
pub mod directory;
pub mod error;

pub use error::{Error, Result};

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use opshub_common::AccessConfig;

use commands::{Context, OutputFormat};
use directory::{CliConfig, DEFAULT_CONFIG_FILE};

/// opshubctl - per-user Kubernetes access for OpsHub
#[derive(Parser, Debug)]
#[command(name = "opshubctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file (falls back to $OPSHUB_ACCESS_CONFIG, then ./opshubctl.yaml)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Seconds before cluster calls are abandoned
    #[arg(long, global = true, default_value_t = 30)]
    pub timeout: u64,

    /// Platform user id recorded as the actor of grants and binds
    #[arg(long, global = true, env = "OPSHUB_ACTOR", default_value_t = 0)]
    pub actor: u64,

    /// Output format
    #[arg(long, short = 'o', global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Grant a user access to a cluster and print their kubeconfig
    Grant(commands::credential::CredentialArgs),
    /// Print a fresh kubeconfig for an already granted user
    Credential(commands::credential::CredentialArgs),
    /// Bind a user to a role or cluster role
    Bind(commands::binding::BindArgs),
    /// Remove a user's binding
    Unbind(commands::binding::UnbindArgs),
    /// List recorded bindings on a cluster
    Bindings(commands::binding::BindingsArgs),
    /// List users bound to a permission set
    BoundUsers(commands::binding::BoundUsersArgs),
    /// List granted service identities present on a cluster
    Identities(commands::binding::ClusterArgs),
    /// Revoke a user's credential on a cluster
    Revoke(commands::revoke::RevokeArgs),
    /// Remove every trace of a service identity from a cluster
    RevokeFully(commands::revoke::RevokeFullyArgs),
    /// Clean up and forget a cluster that is being deregistered
    PurgeCluster(commands::binding::ClusterArgs),
}

impl Cli {
    /// Config file path from the flag, the environment or the default name
    pub fn config_path(&self) -> PathBuf {
        AccessConfig::path_from_env(self.config.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Load the config file
    pub fn load_config(&self) -> Result<CliConfig> {
        CliConfig::load(&self.config_path())
    }

    /// Run the CLI command
    pub async fn run(self, config: CliConfig) -> Result<()> {
        let ctx = Context::build(
            config,
            Duration::from_secs(self.timeout),
            self.actor,
            self.output,
        )?;

        let token = ctx.scope.token().clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                token.cancel();
            }
        });

        match self.command {
            Commands::Grant(args) => commands::credential::grant(&ctx, args).await,
            Commands::Credential(args) => commands::credential::existing(&ctx, args).await,
            Commands::Bind(args) => commands::binding::bind(&ctx, args).await,
            Commands::Unbind(args) => commands::binding::unbind(&ctx, args).await,
            Commands::Bindings(args) => commands::binding::list_bindings(&ctx, args).await,
            Commands::BoundUsers(args) => commands::binding::list_bound_users(&ctx, args).await,
            Commands::Identities(args) => commands::binding::list_identities(&ctx, args).await,
            Commands::Revoke(args) => commands::revoke::revoke(&ctx, args).await,
            Commands::RevokeFully(args) => commands::revoke::revoke_fully(&ctx, args).await,
            Commands::PurgeCluster(args) => commands::revoke::purge_cluster(&ctx, args).await,
        }
    }
}
