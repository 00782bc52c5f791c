//! # docstitch
//!
//! Fill Word templates with JSON data, convert them to PDF through a
//! Gotenberg service, and stitch multi-section documents together.
//!
//! ## Why this crate?
//!
//! Long business documents (contracts, proposals, reports) are rarely one
//! template. They are a cover page, some boilerplate that never changes, a
//! few data-driven chapters and an appendix. docstitch keeps each part as its
//! own file in a folder and assembles them on request: the data-driven parts
//! are rendered and converted in parallel, the fixed parts are taken as
//! ready-made PDFs, and everything is merged in the order the file names say.
//!
//! ## Pipeline Overview
//!
//! ```text
//! folder/
//!  │
//!  ├─ 1. Discover  classify *_dynamic_*.docx / *_static_*.pdf, order by prefix
//!  ├─ 2. Render    fill each template (spawn_blocking), ≤ 6 at a time
//!  ├─ 3. Convert   POST to Gotenberg /forms/libreoffice/convert
//!  ├─ 4. Load      read static PDFs, concurrently with 2-3
//!  ├─ 5. Merge     lopdf page concatenation, fallback to one section
//!  └─ 6. Encode    Base64 for the JSON response
//! ```
//!
//! A failing section never aborts the batch. Only a request that yields no
//! PDF at all is an error.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docstitch::{assemble_sections, AssemblyConfig, AssemblyRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GOTENBERG_API_URL / DOCSTITCH_ROOT_DIR / DOCSTITCH_MAX_WORKERS
//!     let config = AssemblyConfig::from_env()?;
//!     let request: AssemblyRequest = serde_json::from_str(
//!         r#"{ "folderName": "contract", "data": { "client": "ACME" } }"#,
//!     )?;
//!     let output = assemble_sections(&request, &config).await?;
//!     std::fs::write("contract.pdf", &output.pdf)?;
//!     eprintln!(
//!         "{} sections rendered, {} failed",
//!         output.stats.rendered_sections, output.stats.failed_sections
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docstitch` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docstitch = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod request;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::{
    assemble_sections, assemble_sync, assemble_to_file, assemble_with, process_parallel_sections,
    render_document, render_document_to_file, render_document_with, write_atomic,
};
pub use config::{AssemblyConfig, AssemblyConfigBuilder};
pub use error::{AssemblyError, ConversionError, MergeError, SectionError, TemplateError};
pub use output::{AssemblyOutput, AssemblyStats, DocumentResponse, ProcessedPdf, SectionOutcome};
pub use pipeline::converter::{GotenbergClient, PdfConverter};
pub use pipeline::section::{Section, SectionKind};
pub use pipeline::template::{DocxTemplateEngine, TemplateEngine};
pub use progress::{AssemblyProgressCallback, NoopProgressCallback, ProgressCallback};
pub use request::{AssemblyRequest, DocumentRequest, ImageSpec, InlineImage};
