//! Revocation and cluster purge commands

use clap::Args;

use super::binding::ClusterArgs;
use super::{Context, TargetArgs};
use crate::Result;

/// Revoke command arguments
#[derive(Args, Debug)]
pub struct RevokeArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

/// Revoke-fully command arguments
#[derive(Args, Debug)]
pub struct RevokeFullyArgs {
    /// Managed cluster id
    #[arg(long)]
    pub cluster: u64,

    /// Service account name to remove
    #[arg(long, short = 's')]
    pub service_account: String,

    /// Platform username whose ledger rows are removed too
    #[arg(long)]
    pub username: String,
}

/// Run the revoke command
pub async fn revoke(ctx: &Context, args: RevokeArgs) -> Result<()> {
    let report = ctx
        .service
        .revocation()
        .revoke_credential(&ctx.scope, args.target.cluster, args.target.user)
        .await?;
    ctx.emit(&report, |r| {
        println!(
            "Revoked {}: {} binding(s) deleted, service account {}",
            r.service_identity,
            r.bindings_deleted,
            if r.identity_deleted { "deleted" } else { "already absent" }
        )
    })
}

/// Run the revoke-fully command
pub async fn revoke_fully(ctx: &Context, args: RevokeFullyArgs) -> Result<()> {
    let report = ctx
        .service
        .revocation()
        .revoke_fully(&ctx.scope, args.cluster, &args.service_account, &args.username)
        .await?;
    ctx.emit(&report, |r| {
        println!(
            "Removed {}: {} cluster role binding(s), {} role binding(s), {} ledger row(s)",
            r.service_identity,
            r.cluster_role_bindings_deleted,
            r.role_bindings_deleted,
            r.ledger_rows_deleted
        );
        if r.identity_deleted_from.is_empty() {
            println!("Service account not found");
        } else {
            println!(
                "Service account deleted from {}",
                r.identity_deleted_from.join(", ")
            );
        }
    })
}

/// Run the purge-cluster command
pub async fn purge_cluster(ctx: &Context, args: ClusterArgs) -> Result<()> {
    let report = ctx
        .service
        .on_cluster_deleted(&ctx.scope, args.cluster)
        .await?;
    ctx.emit(&report, |r| {
        if !r.native_cleanup {
            println!("Cluster {} unreachable, objects left in place", args.cluster);
        }
        println!(
            "Forgot {} identity record(s) and {} binding record(s)",
            r.identities_deleted, r.bindings_deleted
        );
    })
}
