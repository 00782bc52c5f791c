//! Progress-callback trait for per-section assembly events.
//!
//! Inject an [`Arc<dyn AssemblyProgressCallback>`] via
//! [`crate::config::AssemblyConfigBuilder::progress_callback`] to receive
//! events while dynamic sections render and convert.
//!
//! # Example
//!
//! ```rust
//! use docstitch::{AssemblyProgressCallback, AssemblyConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     converted: AtomicUsize,
//! }
//!
//! impl AssemblyProgressCallback for CountingCallback {
//!     fn on_section_complete(&self, name: &str, pdf_len: usize) {
//!         let done = self.converted.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{done}: {name} ({pdf_len} bytes)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { converted: AtomicUsize::new(0) });
//!
//! let config = AssemblyConfig::builder()
//!     .progress_callback(counter as Arc<dyn AssemblyProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the assembly pipeline as it processes each section.
///
/// Dynamic sections render concurrently, so `on_section_start`,
/// `on_section_complete` and `on_section_error` may be called from several
/// tasks at once. Implementations guard shared mutable state themselves.
/// All methods default to no-ops.
pub trait AssemblyProgressCallback: Send + Sync {
    /// Called once after discovery, before any section renders.
    fn on_assembly_start(&self, dynamic_sections: usize, static_sections: usize) {
        let _ = (dynamic_sections, static_sections);
    }

    /// Called just before a dynamic section's template is read.
    fn on_section_start(&self, name: &str) {
        let _ = name;
    }

    /// Called when a dynamic section came back from the converter.
    fn on_section_complete(&self, name: &str, pdf_len: usize) {
        let _ = (name, pdf_len);
    }

    /// Called when a dynamic section failed; the batch continues without it.
    fn on_section_error(&self, name: &str, error: &str) {
        let _ = (name, error);
    }

    /// Called once after merging (or falling back).
    ///
    /// * `total_sections`: sections in the merge order
    /// * `merged_sections`: sections whose pages made it into the output
    fn on_assembly_complete(&self, total_sections: usize, merged_sections: usize) {
        let _ = (total_sections, merged_sections);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AssemblyProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AssemblyConfig`].
pub type ProgressCallback = Arc<dyn AssemblyProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: Mutex<Vec<String>>,
        merged: AtomicUsize,
    }

    impl AssemblyProgressCallback for TrackingCallback {
        fn on_section_start(&self, _name: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_section_complete(&self, _name: &str, _pdf_len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_section_error(&self, name: &str, _error: &str) {
            self.errors.lock().unwrap().push(name.to_string());
        }

        fn on_assembly_complete(&self, _total: usize, merged: usize) {
            self.merged.store(merged, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_assembly_start(3, 1);
        cb.on_section_start("01_dynamic_cover.docx");
        cb.on_section_complete("01_dynamic_cover.docx", 1024);
        cb.on_section_error("03_dynamic_terms.docx", "HTTP 500");
        cb.on_assembly_complete(4, 3);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();

        tracker.on_section_start("01_dynamic_a.docx");
        tracker.on_section_complete("01_dynamic_a.docx", 10);
        tracker.on_section_start("03_dynamic_c.docx");
        tracker.on_section_error("03_dynamic_c.docx", "timeout");
        tracker.on_assembly_complete(3, 2);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(*tracker.errors.lock().unwrap(), vec!["03_dynamic_c.docx"]);
        assert_eq!(tracker.merged.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn arc_dyn_callback_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn AssemblyProgressCallback>();
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_assembly_start(1, 0);
    }
}
