//! Warning and error channels supplied by the host, one per processed file.

use std::sync::{Mutex, PoisonError};

/// Per-file diagnostics sink.
///
/// Warnings are non-fatal; errors mark the file as failed in the host's eyes
/// but never abort sibling files.
pub trait Diagnostics: Send + Sync {
    fn emit_warning(&self, message: &str);
    fn emit_error(&self, message: &str);
}

/// Sink that forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn emit_warning(&self, message: &str) {
        tracing::warn!("{message}");
    }

    fn emit_error(&self, message: &str) {
        tracing::error!("{message}");
    }
}

/// Sink that records everything it receives.
#[derive(Debug, Default)]
pub struct CollectedDiagnostics {
    warnings: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl CollectedDiagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Diagnostics for CollectedDiagnostics {
    fn emit_warning(&self, message: &str) {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }

    fn emit_error(&self, message: &str) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}
