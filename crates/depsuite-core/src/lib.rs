#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

pub mod annotate;
pub mod cache;
pub mod config;
pub mod convention;
pub mod diagnostics;
pub mod error;
pub mod fs;
pub mod glob;
pub mod inject;
pub mod require;
pub mod resolver;
pub mod scan;
pub mod session;
pub mod sourcemap;
pub mod split;
pub mod synthesize;
pub mod version;

pub use annotate::{annotate, annotation_query, AnnotationProperty, BUNDLE_LOADER_PREFIX};
pub use cache::{CacheStats, DebouncedCache, DEFAULT_DEBOUNCE};
pub use config::{find_config_file, load_config, Config, EngineConfig, CONFIG_FILE};
pub use convention::{discover, Convention, ConventionFn, NamedConvention};
pub use diagnostics::{CollectedDiagnostics, Diagnostics, TracingDiagnostics};
pub use error::Error;
pub use fs::{FileKind, FileStat, FileSystem, MemoryFileSystem, OsFileSystem};
pub use glob::{glob_to_regex, ExpandContext, GlobConfig, GlobExpander, GlobMatch};
pub use inject::{inject, inject_with_callback, wrap_in_require_include, Injected};
pub use require::{
    is_glob, PackageDescriptor, PathWithLoaders, RequireData, RequireDataBase, ResolveResult,
};
pub use resolver::{
    resolve_in_package_context, resolve_literal, resolve_require, ModuleResolver, NodeResolver,
    PackageContext, ResolveError, ResolveReasonCode, ResolverConfig,
};
pub use scan::{DirectoryScanner, ScanOptions, ScannedFile};
pub use session::{BuildSession, FileRequest, PackageScope, Processed};
pub use sourcemap::{SourceMap, SourceMapError};
pub use split::{split_literal, split_request, SplitRequest};
pub use synthesize::{
    render_reference, synthesize, synthesize_detailed, FnPolicy, OverridePolicy, PolicyError,
    SynthesisContext, SynthesizedRequire,
};
pub use version::VERSION;
