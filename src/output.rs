//! Output types: per-section PDFs, outcomes, run statistics and the
//! response body returned to service clients.

use crate::error::{AssemblyError, SectionError};
use crate::pipeline::encode;
use crate::pipeline::section::SectionKind;
use serde::{Deserialize, Serialize};

/// PDF bytes produced for one section, dynamic or static.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedPdf {
    /// Ordering name in template form, e.g. `01_dynamic_cover.docx`.
    pub name: String,
    pub kind: SectionKind,
    pub order_key: u64,
    pub bytes: Vec<u8>,
}

/// What happened to one discovered section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionOutcome {
    pub name: String,
    pub kind: SectionKind,
    pub order_key: u64,
    /// Size of the section's PDF, when one was produced or loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_bytes: Option<usize>,
    /// Why a dynamic section produced nothing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SectionError>,
}

impl SectionOutcome {
    /// The section contributed a PDF to the merge input.
    pub fn is_available(&self) -> bool {
        self.pdf_bytes.is_some()
    }

    /// A static section whose PDF could not be loaded.
    pub fn is_missing(&self) -> bool {
        self.pdf_bytes.is_none() && self.error.is_none()
    }
}

/// Aggregate statistics for one assembly run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblyStats {
    pub dynamic_sections: usize,
    pub static_sections: usize,
    /// Dynamic sections rendered and converted.
    pub rendered_sections: usize,
    /// Dynamic sections that failed.
    pub failed_sections: usize,
    /// Static sections whose PDF was loaded.
    pub loaded_static_sections: usize,
    /// Static sections whose PDF was absent or unreadable.
    pub missing_static_sections: usize,
    /// Worker pool size used for the dynamic sections.
    pub workers: usize,
    /// `false` when merging failed and a single section was returned instead.
    pub merged: bool,
    /// Section returned as-is when `merged` is `false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_section: Option<String>,
    pub output_bytes: usize,
    pub render_duration_ms: u64,
    pub merge_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Result of a multi-section assembly.
#[derive(Debug, Clone)]
pub struct AssemblyOutput {
    /// The final PDF: every available section merged in order, or the
    /// fallback section when merging failed.
    pub pdf: Vec<u8>,
    /// One outcome per discovered section, in merge order.
    pub sections: Vec<SectionOutcome>,
    pub stats: AssemblyStats,
}

impl AssemblyOutput {
    /// The final PDF as standard Base64 with padding.
    pub fn to_base64(&self) -> String {
        encode::encode_pdf(&self.pdf)
    }

    /// Sections that failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = &SectionOutcome> {
        self.sections.iter().filter(|s| s.error.is_some())
    }
}

/// JSON body returned by the service.
///
/// ```json
/// { "status": "success", "pdf_base64": "JVBERi0x..." }
/// { "status": "error", "message": "Sections folder not found: 'temp/x'" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DocumentResponse {
    Success { pdf_base64: String },
    Error { message: String },
}

impl DocumentResponse {
    pub fn success(pdf: &[u8]) -> Self {
        DocumentResponse::Success {
            pdf_base64: encode::encode_pdf(pdf),
        }
    }

    /// Build the response body and its HTTP-style status code.
    pub fn from_result(result: Result<Vec<u8>, AssemblyError>) -> (u16, Self) {
        match result {
            Ok(pdf) => (200, Self::success(&pdf)),
            Err(e) => (
                e.status_code(),
                DocumentResponse::Error {
                    message: e.to_string(),
                },
            ),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DocumentResponse::Success { .. })
    }
}
