//! Binding commands

use clap::Args;
use opshub_access::BindRequest;
use opshub_ledger::PermissionSetKind;

use super::{format_age, namespace_cell, print_table, Context, TargetArgs};
use crate::Result;

/// A cluster alone
#[derive(Args, Debug, Clone)]
pub struct ClusterArgs {
    /// Managed cluster id
    #[arg(long)]
    pub cluster: u64,
}

/// Bind command arguments
#[derive(Args, Debug)]
pub struct BindArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Role or cluster role name
    #[arg(long, short = 'p')]
    pub permission_set: String,

    /// Namespace to bind in; omit for a cluster-wide binding
    #[arg(long, short = 'n', default_value = "")]
    pub namespace: String,

    /// Kind of the permission set (ClusterRole or Role)
    #[arg(long, default_value = "ClusterRole")]
    pub kind: PermissionSetKind,
}

/// Unbind command arguments
#[derive(Args, Debug)]
pub struct UnbindArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Role or cluster role name
    #[arg(long, short = 'p')]
    pub permission_set: String,

    /// Namespace of the binding; omit for a cluster-wide binding
    #[arg(long, short = 'n', default_value = "")]
    pub namespace: String,
}

/// Bindings command arguments
#[derive(Args, Debug)]
pub struct BindingsArgs {
    /// Managed cluster id
    #[arg(long)]
    pub cluster: u64,

    /// Only this user's bindings
    #[arg(long, short = 'u')]
    pub user: Option<u64>,
}

/// Bound-users command arguments
#[derive(Args, Debug)]
pub struct BoundUsersArgs {
    /// Managed cluster id
    #[arg(long)]
    pub cluster: u64,

    /// Role or cluster role name
    #[arg(long, short = 'p')]
    pub permission_set: String,

    /// Namespace of the binding; omit for cluster scope
    #[arg(long, short = 'n', default_value = "")]
    pub namespace: String,
}

/// Run the bind command
pub async fn bind(ctx: &Context, args: BindArgs) -> Result<()> {
    let request = BindRequest {
        cluster_id: args.target.cluster,
        user_id: args.target.user,
        permission_set: args.permission_set,
        namespace: args.namespace,
        kind: args.kind,
        bound_by: ctx.actor,
    };
    let record = ctx.service.bindings().bind(&ctx.scope, request).await?;
    ctx.emit(&record, |r| {
        println!(
            "Bound user {} to {} {} in {}",
            r.user_id,
            r.kind,
            r.permission_set,
            scope_text(&r.namespace)
        )
    })
}

/// Run the unbind command
pub async fn unbind(ctx: &Context, args: UnbindArgs) -> Result<()> {
    let record = ctx
        .service
        .bindings()
        .unbind(
            &ctx.scope,
            args.target.cluster,
            args.target.user,
            &args.permission_set,
            &args.namespace,
        )
        .await?;
    ctx.emit(&record, |r| {
        println!(
            "Removed binding of user {} to {} in {}",
            r.user_id,
            r.permission_set,
            scope_text(&r.namespace)
        )
    })
}

/// Run the bindings command
pub async fn list_bindings(ctx: &Context, args: BindingsArgs) -> Result<()> {
    let bindings = ctx
        .service
        .bindings()
        .list_user_bindings(args.cluster, args.user)
        .await?;
    ctx.emit(&bindings, |bindings| {
        let rows: Vec<Vec<String>> = bindings
            .iter()
            .map(|b| {
                vec![
                    b.username.clone(),
                    b.real_name.clone(),
                    b.kind.to_string(),
                    b.permission_set.clone(),
                    namespace_cell(&b.namespace),
                    b.bound_by.to_string(),
                    format_age(&b.bound_at),
                ]
            })
            .collect();
        print_table(
            &["USER", "NAME", "KIND", "PERMISSION SET", "NAMESPACE", "BOUND BY", "AGE"],
            &rows,
        );
    })
}

/// Run the bound-users command
pub async fn list_bound_users(ctx: &Context, args: BoundUsersArgs) -> Result<()> {
    let users = ctx
        .service
        .bindings()
        .list_bound_users(args.cluster, &args.permission_set, &args.namespace)
        .await?;
    ctx.emit(&users, |users| {
        let rows: Vec<Vec<String>> = users
            .iter()
            .map(|u| {
                vec![
                    u.user_id.to_string(),
                    u.username.clone(),
                    u.real_name.clone(),
                    u.kind.to_string(),
                    format_age(&u.bound_at),
                ]
            })
            .collect();
        print_table(&["ID", "USER", "NAME", "KIND", "AGE"], &rows);
    })
}

/// Run the identities command
pub async fn list_identities(ctx: &Context, args: ClusterArgs) -> Result<()> {
    let identities = ctx
        .service
        .bindings()
        .list_credential_identities(&ctx.scope, args.cluster)
        .await?;
    ctx.emit(&identities, |identities| {
        let rows: Vec<Vec<String>> = identities
            .iter()
            .map(|i| {
                vec![
                    i.username.clone(),
                    i.real_name.clone(),
                    i.service_identity.clone(),
                    i.namespace.clone(),
                    format_age(&i.created_at),
                ]
            })
            .collect();
        print_table(
            &["USER", "NAME", "SERVICE ACCOUNT", "NAMESPACE", "AGE"],
            &rows,
        );
    })
}

fn scope_text(namespace: &str) -> String {
    if namespace.is_empty() {
        "cluster scope".to_string()
    } else {
        format!("namespace {}", namespace)
    }
}
