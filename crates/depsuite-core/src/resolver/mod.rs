//! Module resolution.
//!
//! The engine talks to resolution through [`ModuleResolver`], so a host can
//! plug in its own service. [`NodeResolver`] is the default filesystem
//! implementation; [`literal`] wraps any resolver with the engine's
//! never-fail contract.

pub mod literal;
mod node;
mod pkg_json_cache;
mod root_most;

use crate::require::ResolveResult;
use futures::future::BoxFuture;
use std::fmt;
use std::path::Path;

pub use literal::{resolve_in_package_context, resolve_literal, resolve_require, PackageContext};
pub use node::{
    is_absolute_path, is_relative, parse_bare_specifier, split_loader_chain, NodeResolver,
    ResolveError, ResolveReasonCode, ResolverConfig, DEFAULT_EXTENSIONS,
    DEFAULT_MODULE_DIRECTORY, PACKAGE_JSON,
};
pub use pkg_json_cache::{DescriptorCache, MemoryDescriptorCache, NoDescriptorCache, PkgJsonStamp};
pub use root_most::{nested_request, range_allows};

/// External module-resolution service.
///
/// Implementations must tolerate unbounded concurrent calls. Synchronous
/// implementations return an already-completed future; their filesystem
/// probing then blocks the calling task until it finishes, so on a
/// current-thread runtime sibling scans wait for it.
pub trait ModuleResolver: Send + Sync + fmt::Debug {
    /// Resolve `request` as if required from a file in `context`.
    fn resolve<'a>(
        &'a self,
        context: &'a Path,
        request: &'a str,
    ) -> BoxFuture<'a, Result<ResolveResult, ResolveError>>;
}
