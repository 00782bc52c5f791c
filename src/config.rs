//! Configuration types for section assembly.
//!
//! All assembly behaviour is controlled through [`AssemblyConfig`], built via
//! its [`AssemblyConfigBuilder`]. One struct holds every knob so a config can
//! be shared across worker tasks, logged, and compared between runs.

use crate::error::AssemblyError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;

/// Default Gotenberg base URL used when neither the builder nor
/// `GOTENBERG_API_URL` supplies one.
pub const DEFAULT_CONVERTER_URL: &str = "http://localhost:3000";

/// Configuration for template rendering, conversion and section assembly.
///
/// Built via [`AssemblyConfig::builder()`], [`AssemblyConfig::from_env()`] or
/// [`AssemblyConfig::default()`].
///
/// # Example
/// ```rust
/// use docstitch::AssemblyConfig;
///
/// let config = AssemblyConfig::builder()
///     .converter_url("http://gotenberg:3000")
///     .root_dir("/srv/templates")
///     .max_workers(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AssemblyConfig {
    /// Base URL of the Gotenberg-compatible conversion service.
    /// `/forms/libreoffice/convert` is appended per request.
    pub converter_url: String,

    /// Directory that request paths (`folderName`, `fileName`) are resolved
    /// under. Default: `temp`.
    pub root_dir: PathBuf,

    /// Upper bound on concurrently rendering sections. Default: 6.
    ///
    /// The effective pool size for a request is `min(dynamic_sections, max_workers)`.
    pub max_workers: usize,

    /// HTTP timeout for one conversion call in seconds. Default: 120.
    pub converter_timeout_secs: u64,

    /// Bound on a whole section task (read, render, convert) in seconds.
    /// `None` lets a task run until the converter gives up. Default: 300.
    pub section_timeout_secs: Option<u64>,

    /// Extension of dynamic section templates, without the dot. Default: `docx`.
    pub template_extension: String,

    /// Extension of pre-rendered static sections, without the dot. Default: `pdf`.
    pub pdf_extension: String,

    /// Filename marker of dynamic sections. Default: `_dynamic_`.
    pub dynamic_marker: String,

    /// Filename marker of static sections. Default: `_static_`.
    pub static_marker: String,

    /// Optional per-section progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            converter_url: DEFAULT_CONVERTER_URL.to_string(),
            root_dir: PathBuf::from("temp"),
            max_workers: 6,
            converter_timeout_secs: 120,
            section_timeout_secs: Some(300),
            template_extension: "docx".to_string(),
            pdf_extension: "pdf".to_string(),
            dynamic_marker: "_dynamic_".to_string(),
            static_marker: "_static_".to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AssemblyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssemblyConfig")
            .field("converter_url", &self.converter_url)
            .field("root_dir", &self.root_dir)
            .field("max_workers", &self.max_workers)
            .field("converter_timeout_secs", &self.converter_timeout_secs)
            .field("section_timeout_secs", &self.section_timeout_secs)
            .field("template_extension", &self.template_extension)
            .field("pdf_extension", &self.pdf_extension)
            .field("dynamic_marker", &self.dynamic_marker)
            .field("static_marker", &self.static_marker)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AssemblyProgressCallback>"),
            )
            .finish()
    }
}

impl AssemblyConfig {
    /// Create a new builder for `AssemblyConfig`.
    pub fn builder() -> AssemblyConfigBuilder {
        AssemblyConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults overridden by `GOTENBERG_API_URL`, `DOCSTITCH_ROOT_DIR` and
    /// `DOCSTITCH_MAX_WORKERS` when they are set and non-empty.
    pub fn from_env() -> Result<Self, AssemblyError> {
        let mut builder = Self::builder();

        if let Some(url) = non_empty_env("GOTENBERG_API_URL") {
            builder = builder.converter_url(url);
        }
        if let Some(dir) = non_empty_env("DOCSTITCH_ROOT_DIR") {
            builder = builder.root_dir(dir);
        }
        if let Some(workers) = non_empty_env("DOCSTITCH_MAX_WORKERS") {
            let n = workers.parse::<usize>().map_err(|_| {
                AssemblyError::InvalidConfig(format!(
                    "DOCSTITCH_MAX_WORKERS must be a positive integer, got '{workers}'"
                ))
            })?;
            builder = builder.max_workers(n);
        }

        builder.build()
    }

    /// Full URL of the office-document conversion route.
    pub fn conversion_endpoint(&self) -> String {
        format!(
            "{}/forms/libreoffice/convert",
            self.converter_url.trim_end_matches('/')
        )
    }

    /// Worker pool size for a request with `sections` dynamic sections.
    pub fn worker_count(&self, sections: usize) -> usize {
        sections.min(self.max_workers).max(1)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Builder for [`AssemblyConfig`].
#[derive(Debug)]
pub struct AssemblyConfigBuilder {
    config: AssemblyConfig,
}

impl AssemblyConfigBuilder {
    pub fn converter_url(mut self, url: impl Into<String>) -> Self {
        self.config.converter_url = url.into();
        self
    }

    pub fn root_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.root_dir = dir.into();
        self
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.config.max_workers = n;
        self
    }

    pub fn converter_timeout_secs(mut self, secs: u64) -> Self {
        self.config.converter_timeout_secs = secs;
        self
    }

    pub fn section_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.section_timeout_secs = secs;
        self
    }

    pub fn template_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.template_extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    pub fn pdf_extension(mut self, ext: impl Into<String>) -> Self {
        self.config.pdf_extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    pub fn dynamic_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.dynamic_marker = marker.into();
        self
    }

    pub fn static_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.static_marker = marker.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AssemblyConfig, AssemblyError> {
        let c = &self.config;
        if c.max_workers == 0 {
            return Err(AssemblyError::InvalidConfig(
                "max_workers must be ≥ 1".into(),
            ));
        }
        if c.converter_url.trim().is_empty() {
            return Err(AssemblyError::InvalidConfig(
                "converter_url must not be empty".into(),
            ));
        }
        if !c.converter_url.starts_with("http://") && !c.converter_url.starts_with("https://") {
            return Err(AssemblyError::InvalidConfig(format!(
                "converter_url must be an HTTP/HTTPS URL, got '{}'",
                c.converter_url
            )));
        }
        if c.converter_timeout_secs == 0 || c.section_timeout_secs == Some(0) {
            return Err(AssemblyError::InvalidConfig(
                "timeouts must be at least one second".into(),
            ));
        }
        if c.template_extension.is_empty() || c.pdf_extension.is_empty() {
            return Err(AssemblyError::InvalidConfig(
                "section extensions must not be empty".into(),
            ));
        }
        if c.template_extension.eq_ignore_ascii_case(&c.pdf_extension) {
            return Err(AssemblyError::InvalidConfig(format!(
                "template and PDF extensions must differ, both are '{}'",
                c.pdf_extension
            )));
        }
        if c.dynamic_marker.is_empty() || c.static_marker.is_empty() {
            return Err(AssemblyError::InvalidConfig(
                "section markers must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
