//! Load-strategy annotations.
//!
//! `{lazy, chunk}` becomes a bundle-loader entry such as `bundle?lazy&name=vendor`.

use crate::require::RequireData;
use serde::{Deserialize, Serialize};

/// Loader that defers and groups dependencies.
pub const BUNDLE_LOADER_PREFIX: &str = "bundle?";

/// Query part of the bundle annotation. `None` when neither flag is set.
///
/// Composition order is always `lazy`, then `&`, then `name=<chunk>`.
#[must_use]
pub fn annotation_query(lazy: bool, chunk: Option<&str>) -> Option<String> {
    let mut parts = Vec::with_capacity(2);
    if lazy {
        parts.push("lazy".to_string());
    }
    if let Some(chunk) = chunk {
        parts.push(format!("name={chunk}"));
    }
    (!parts.is_empty()).then(|| parts.join("&"))
}

/// Which property of [`RequireData`] receives the annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnnotationProperty {
    Loaders,
    #[default]
    FallbackLoaders,
}

/// Attach a bundle-loader annotation to every entry that needs one.
///
/// Entries without lazy or chunk metadata are left untouched.
#[must_use]
pub fn annotate(entries: Vec<RequireData>, property: AnnotationProperty) -> Vec<RequireData> {
    entries
        .into_iter()
        .map(|mut entry| {
            if let Some(query) = annotation_query(entry.lazy, entry.chunk.as_deref()) {
                let loaders = Some(vec![format!("{BUNDLE_LOADER_PREFIX}{query}")]);
                match property {
                    AnnotationProperty::Loaders => entry.loaders = loaders,
                    AnnotationProperty::FallbackLoaders => entry.fallback_loaders = loaders,
                }
            }
            entry
        })
        .collect()
}
