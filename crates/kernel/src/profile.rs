//! Profiling and statistics seams.
//!
//! The kernel reports timings and metrics through `tracing`; the embedding
//! binary decides where they go by installing a subscriber (or none).

use tracing::span::EnteredSpan;

/// Scoped timing region.
///
/// The returned guard closes the span when dropped, on every exit path
/// including unwinding.
pub fn profile_section(name: &'static str) -> EnteredSpan {
    tracing::info_span!("profile", section = name).entered()
}

/// Record a metric series under `key`.
pub fn stats(key: &'static str, values: &[usize]) {
    tracing::debug!(target: "kernel::stats", key, ?values);
}
