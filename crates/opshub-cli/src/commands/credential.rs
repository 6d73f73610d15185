//! Credential commands
//!
//! `grant` issues (or re-issues) a user's service identity and prints the
//! kubeconfig; `credential` only mints a fresh token for an identity that is
//! already granted.

use std::path::{Path, PathBuf};

use clap::Args;
use opshub_access::GrantedCredential;

use super::{Context, OutputFormat, TargetArgs};
use crate::Result;

/// Credential command arguments
#[derive(Args, Debug)]
pub struct CredentialArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Write the kubeconfig to this file instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Run the grant command
pub async fn grant(ctx: &Context, args: CredentialArgs) -> Result<()> {
    let credential = ctx
        .service
        .grant_credential(&ctx.scope, args.target.cluster, args.target.user, ctx.actor)
        .await?;
    deliver(ctx, &credential, args.out.as_deref()).await
}

/// Run the credential command
pub async fn existing(ctx: &Context, args: CredentialArgs) -> Result<()> {
    let credential = ctx
        .service
        .existing_credential(&ctx.scope, args.target.cluster, args.target.user)
        .await?;
    deliver(ctx, &credential, args.out.as_deref()).await
}

async fn deliver(ctx: &Context, credential: &GrantedCredential, out: Option<&Path>) -> Result<()> {
    let Some(path) = out else {
        return match ctx.output {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(credential)?);
                Ok(())
            }
            OutputFormat::Table => {
                print!("{}", credential.document);
                Ok(())
            }
        };
    };

    write_private(path, &credential.document).await?;
    eprintln!(
        "Wrote kubeconfig for {}/{} to {}",
        credential.namespace,
        credential.service_identity,
        path.display()
    );
    Ok(())
}

/// Write a file readable only by its owner
async fn write_private(path: &Path, contents: &str) -> Result<()> {
    tokio::fs::write(path, contents).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    Ok(())
}
