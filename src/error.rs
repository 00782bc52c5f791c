//! Error types for the docstitch library.
//!
//! The error types reflect distinct failure modes:
//!
//! * [`AssemblyError`] (**fatal**): the request cannot produce a document at
//!   all (missing folder, no templates, nothing rendered). Returned as
//!   `Err(AssemblyError)` from the top-level `assemble*` / `render_document`
//!   functions.
//!
//! * [`SectionError`] (**non-fatal**): a single dynamic section failed to
//!   render or convert. Stored in [`crate::output::SectionOutcome`] so the
//!   batch keeps going; only a batch with zero usable PDFs becomes fatal.
//!
//! * [`TemplateError`]: what the template engine reported. Wrapped in a
//!   [`SectionError::Render`] by the renderer.
//!
//! * [`ConversionError`]: what the office-to-PDF collaborator reported.
//!   Always wrapped in a [`SectionError::Conversion`] before it leaves the
//!   renderer.
//!
//! * [`MergeError`]: the PDF concatenation step failed. Never reaches the
//!   caller: it selects the fallback PDF instead.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docstitch library.
#[derive(Debug, Error)]
pub enum AssemblyError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The sections folder does not exist.
    #[error("Sections folder not found: '{path}'")]
    FolderNotFound { path: PathBuf },

    /// The single-document template does not exist.
    #[error("Template not found: '{path}'")]
    TemplateNotFound { path: PathBuf },

    /// The folder exists but holds no files with the template extension.
    #[error("No .{extension} templates found in '{path}'")]
    NoTemplates { path: PathBuf, extension: String },

    /// The request itself is malformed (empty or escaping path, bad field).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The inline image could not be decoded or has unusable dimensions.
    #[error("Invalid inline image: {0}")]
    InvalidImage(String),

    // ── Output errors ─────────────────────────────────────────────────────
    /// Every section failed or was missing; there is nothing to return.
    #[error("Error processing parallel sections: no PDFs were successfully processed ({failed} failed, {missing} missing)")]
    NoOutput { failed: usize, missing: usize },

    /// Single-document mode: the one section failed.
    #[error(transparent)]
    Section(#[from] SectionError),

    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Reading the sections folder failed for a reason other than absence.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AssemblyError {
    /// HTTP-style status code for the `{status: "error"}` response body.
    pub fn status_code(&self) -> u16 {
        match self {
            AssemblyError::InvalidRequest(_) | AssemblyError::InvalidImage(_) => 400,
            AssemblyError::FolderNotFound { .. }
            | AssemblyError::TemplateNotFound { .. }
            | AssemblyError::NoTemplates { .. } => 404,
            _ => 500,
        }
    }
}

/// A non-fatal error for a single section.
///
/// The coordinator drops the section from the merge and records this
/// alongside its name; sibling sections are unaffected.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum SectionError {
    /// The template file could not be read.
    #[error("Section '{section}': cannot read template: {detail}")]
    TemplateRead { section: String, detail: String },

    /// Filling the template failed (corrupt package, bad XML encoding).
    #[error("Section '{section}': render failed: {detail}")]
    Render { section: String, detail: String },

    /// The conversion service rejected or failed the document.
    #[error("Section '{section}': conversion failed: {detail}")]
    Conversion { section: String, detail: String },

    /// The whole section task exceeded `section_timeout_secs`.
    #[error("Section '{section}': timed out after {secs}s")]
    Timeout { section: String, secs: u64 },
}

impl SectionError {
    /// Name of the section this error belongs to.
    pub fn section(&self) -> &str {
        match self {
            SectionError::TemplateRead { section, .. }
            | SectionError::Render { section, .. }
            | SectionError::Conversion { section, .. }
            | SectionError::Timeout { section, .. } => section,
        }
    }
}

/// Failure reported by an office-to-PDF converter.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Connection refused, DNS failure, broken body stream.
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// The service answered with a non-2xx status.
    #[error("converter returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The HTTP call exceeded the configured timeout.
    #[error("converter call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// 2xx but no bytes.
    #[error("converter returned empty content")]
    EmptyResponse,
}

/// Failure while filling a `.docx` template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template is not a valid .docx package: {0}")]
    Package(#[from] zip::result::ZipError),

    #[error("template package is missing '{0}'")]
    MissingPart(String),

    #[error("part '{part}' is not UTF-8 XML: {source}")]
    Encoding {
        part: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("I/O error while rewriting the package: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while concatenating section PDFs.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("section '{section}' is not a readable PDF: {source}")]
    Pdf {
        section: String,
        #[source]
        source: lopdf::Error,
    },

    #[error("copying pages of section '{section}' failed: {source}")]
    Copy {
        section: String,
        #[source]
        source: lopdf::Error,
    },

    #[error("merged document has no pages")]
    NoPages,

    #[error("failed to serialise merged document: {0}")]
    Save(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_output_mentions_no_pdfs() {
        let e = AssemblyError::NoOutput {
            failed: 2,
            missing: 1,
        };
        let msg = e.to_string();
        assert!(msg.contains("no PDFs were successfully processed"), "got: {msg}");
        assert_eq!(e.status_code(), 500);
    }

    #[test]
    fn not_found_maps_to_404() {
        let e = AssemblyError::FolderNotFound {
            path: PathBuf::from("temp/missing"),
        };
        assert_eq!(e.status_code(), 404);
        assert!(e.to_string().contains("temp/missing"));
    }

    #[test]
    fn invalid_request_maps_to_400() {
        assert_eq!(AssemblyError::InvalidRequest("x".into()).status_code(), 400);
        assert_eq!(AssemblyError::InvalidImage("x".into()).status_code(), 400);
    }

    #[test]
    fn merge_copy_error_names_the_section() {
        let e = MergeError::Copy {
            section: "02_static_terms.docx".into(),
            source: lopdf::Error::ObjectNotFound((7, 0)),
        };
        assert!(e.to_string().contains("02_static_terms.docx"), "got: {e}");
    }

    #[test]
    fn section_error_carries_its_name() {
        let e = SectionError::Timeout {
            section: "02_dynamic_body.docx".into(),
            secs: 30,
        };
        assert_eq!(e.section(), "02_dynamic_body.docx");
        assert!(e.to_string().contains("30s"));
    }

    #[test]
    fn single_document_failure_is_transparent() {
        let e: AssemblyError = SectionError::Conversion {
            section: "letter.docx".into(),
            detail: "converter returned HTTP 503: busy".into(),
        }
        .into();
        assert!(e.to_string().starts_with("Section 'letter.docx'"));
        assert_eq!(e.status_code(), 500);
    }
}
