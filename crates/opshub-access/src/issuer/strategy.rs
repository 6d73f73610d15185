//! Ordered fallback strategies
//!
//! Token and CA acquisition each try a fixed list of strategies until one
//! yields a value. A miss is recorded and the next strategy runs; an `Err`
//! (an aborted request) stops the chain immediately.

use std::fmt::Display;
use std::future::Future;

use tracing::debug;

use crate::error::{CredentialMaterial, Error};

/// Outcome of one strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Attempt {
    /// The strategy produced a non-empty value
    Found(String),
    /// The strategy produced nothing, with the reason
    Missed(String),
}

impl Attempt {
    /// `Found` for a non-empty value, `Missed(reason)` otherwise
    pub(crate) fn from_option(value: Option<String>, reason: impl Into<String>) -> Self {
        match value {
            Some(v) if !v.trim().is_empty() => Self::Found(v),
            _ => Self::Missed(reason.into()),
        }
    }
}

/// Run `strategies` in order with `attempt` until one finds a value
pub(crate) async fn first_success<S, F, Fut>(
    material: CredentialMaterial,
    strategies: &[S],
    mut attempt: F,
) -> Result<(S, String), Error>
where
    S: Copy + Display,
    F: FnMut(S) -> Fut,
    Fut: Future<Output = Result<Attempt, Error>>,
{
    let mut misses = Vec::with_capacity(strategies.len());
    for &strategy in strategies {
        match attempt(strategy).await? {
            Attempt::Found(value) => {
                debug!(%material, %strategy, "credential material found");
                return Ok((strategy, value));
            }
            Attempt::Missed(reason) => {
                debug!(%material, %strategy, %reason, "strategy missed");
                misses.push(format!("{}: {}", strategy, reason));
            }
        }
    }
    Err(Error::CredentialMaterialMissing {
        material,
        attempts: misses,
    })
}
