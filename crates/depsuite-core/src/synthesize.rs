//! Final reference strings.
//!
//! Entries are resolved on demand, optionally handed to an override policy
//! that decides their loader chains, and rendered as
//! `!loader1!loader2!<literal>` or the bare literal.

use crate::diagnostics::Diagnostics;
use crate::require::{PathWithLoaders, RequireData};
use crate::resolver::{resolve_require, split_loader_chain, ModuleResolver};
use depsuite_util::path::relative_request;
use futures::future::{self, join_all, BoxFuture};
use futures::FutureExt;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace};

/// Failure raised by a host override policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct PolicyError {
    pub message: String,
}

impl PolicyError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Host hook that assigns loader chains to a resolved batch.
///
/// Entries whose path is missing from the returned list are dropped.
pub trait OverridePolicy: Send + Sync {
    fn assign<'a>(
        &'a self,
        batch: &'a [RequireData],
    ) -> BoxFuture<'a, Result<Vec<PathWithLoaders>, PolicyError>>;
}

/// Adapts a synchronous closure into an [`OverridePolicy`].
pub struct FnPolicy<F>(pub F);

impl<F> fmt::Debug for FnPolicy<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnPolicy")
    }
}

impl<F> OverridePolicy for FnPolicy<F>
where
    F: Fn(&[RequireData]) -> Result<Vec<PathWithLoaders>, PolicyError> + Send + Sync,
{
    fn assign<'a>(
        &'a self,
        batch: &'a [RequireData],
    ) -> BoxFuture<'a, Result<Vec<PathWithLoaders>, PolicyError>> {
        future::ready((self.0)(batch)).boxed()
    }
}

/// A synthesized reference with the data behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedRequire {
    pub path: PathBuf,
    pub loaders: Vec<String>,
    /// The string to inject.
    pub reference: String,
}

impl SynthesizedRequire {
    #[must_use]
    pub fn path_with_loaders(&self) -> PathWithLoaders {
        PathWithLoaders {
            path: self.path.clone(),
            loaders: (!self.loaders.is_empty()).then(|| self.loaders.clone()),
        }
    }
}

/// Inputs shared by every entry of one synthesis.
#[derive(Clone, Copy)]
pub struct SynthesisContext<'a> {
    pub resolver: &'a dyn ModuleResolver,
    /// Directory of the requesting file.
    pub requester_dir: &'a Path,
    pub policy: Option<&'a dyn OverridePolicy>,
    /// Ignore policy loaders and use each entry's own chain.
    pub force_override: bool,
    pub sink: Option<&'a dyn Diagnostics>,
}

/// Render a reference from a loader chain and a literal.
///
/// A chain already present in `literal` is replaced by `loaders`, or kept
/// when `loaders` is empty, so feeding output back in is stable.
#[must_use]
pub fn render_reference(loaders: &[String], literal: &str) -> String {
    let (_, resource) = split_loader_chain(literal);
    if loaders.is_empty() {
        return literal.to_string();
    }
    format!("!{}!{resource}", loaders.join("!"))
}

/// Synthesize with the resolved path and chain of every surviving entry.
///
/// Unresolved entries are dropped (the resolver has already warned).
/// Entries resolving to a path already seen are dropped; the first wins.
pub async fn synthesize_detailed(
    entries: Vec<RequireData>,
    ctx: SynthesisContext<'_>,
) -> Result<Vec<SynthesizedRequire>, PolicyError> {
    let mut seen = HashSet::new();
    let resolved: Vec<RequireData> = join_all(
        entries
            .into_iter()
            .map(|entry| resolve_require(ctx.resolver, entry, ctx.requester_dir, ctx.sink)),
    )
    .await
    .into_iter()
    .filter(|entry| match &entry.resolve {
        Some(result) if seen.insert(result.path.clone()) => true,
        Some(_) => {
            trace!(literal = %entry.literal, "already resolved by an earlier entry");
            false
        }
        None => false,
    })
    .collect();

    let assigned = match ctx.policy {
        Some(policy) => Some(policy.assign(&resolved).await?),
        None => None,
    };

    let mut out = Vec::with_capacity(resolved.len());
    for entry in &resolved {
        let Some(result) = &entry.resolve else {
            continue;
        };

        let loaders: Vec<String> = match &assigned {
            Some(assigned) => {
                let Some(item) = assigned.iter().find(|p| p.path == result.path) else {
                    trace!(literal = %entry.literal, "dropped by override policy");
                    continue;
                };
                match item.loaders.as_deref() {
                    Some(loaders) if !loaders.is_empty() && !ctx.force_override => loaders.to_vec(),
                    _ => entry.own_loaders().to_vec(),
                }
            }
            None => entry.own_loaders().to_vec(),
        };

        let literal = if entry.literal.is_empty() {
            relative_request(ctx.requester_dir, &result.path)
        } else {
            entry.literal.clone()
        };

        out.push(SynthesizedRequire {
            path: result.path.clone(),
            reference: render_reference(&loaders, &literal),
            loaders,
        });
    }

    debug!(count = out.len(), "synthesized references");
    Ok(out)
}

/// Synthesize reference strings in input order.
pub async fn synthesize(
    entries: Vec<RequireData>,
    ctx: SynthesisContext<'_>,
) -> Result<Vec<String>, PolicyError> {
    Ok(synthesize_detailed(entries, ctx)
        .await?
        .into_iter()
        .map(|s| s.reference)
        .collect())
}
