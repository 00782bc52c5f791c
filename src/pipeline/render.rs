//! Dynamic section rendering: template file → filled `.docx` → PDF bytes.
//!
//! ## Why spawn_blocking?
//!
//! Filling a template unzips, rewrites and re-deflates the whole package.
//! That is CPU-bound work, so it runs on the blocking pool instead of
//! stalling a Tokio worker that other sections' HTTP calls depend on.
//!
//! Nothing is written to disk. The filled document goes straight from
//! memory into the conversion request under a transient name that encodes
//! the section index, so concurrent sections never share a name.

use crate::error::SectionError;
use crate::output::ProcessedPdf;
use crate::pipeline::context::RenderContext;
use crate::pipeline::converter::PdfConverter;
use crate::pipeline::section::Section;
use crate::pipeline::template::TemplateEngine;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Renders and converts one dynamic section at a time. Cheap to clone.
#[derive(Clone)]
pub struct SectionRenderer {
    engine: Arc<dyn TemplateEngine>,
    converter: Arc<dyn PdfConverter>,
}

impl SectionRenderer {
    pub fn new(engine: Arc<dyn TemplateEngine>, converter: Arc<dyn PdfConverter>) -> Self {
        Self { engine, converter }
    }

    /// Produce the PDF for `section`.
    ///
    /// `index` is the section's position among the dynamic sections and only
    /// feeds the transient conversion file name.
    pub async fn render(
        &self,
        index: usize,
        section: &Section,
        context: &RenderContext,
    ) -> Result<ProcessedPdf, SectionError> {
        let start = Instant::now();
        let pdf = self
            .render_path(index, &section.name, &section.source_path, context)
            .await?;
        debug!(
            "Section '{}' rendered → {} bytes PDF in {:?}",
            section.name,
            pdf.len(),
            start.elapsed()
        );

        Ok(ProcessedPdf {
            name: section.name.clone(),
            kind: section.kind,
            order_key: section.order_key,
            bytes: pdf,
        })
    }

    /// Render the template at `path` and convert it, labelling errors with `name`.
    pub async fn render_path(
        &self,
        index: usize,
        name: &str,
        path: &Path,
        context: &RenderContext,
    ) -> Result<Vec<u8>, SectionError> {
        let template = tokio::fs::read(path)
            .await
            .map_err(|e| SectionError::TemplateRead {
                section: name.to_string(),
                detail: format!("{}: {}", path.display(), e),
            })?;

        let engine = Arc::clone(&self.engine);
        let ctx = context.clone();
        let filled = tokio::task::spawn_blocking(move || engine.render(&template, &ctx))
            .await
            .map_err(|e| SectionError::Render {
                section: name.to_string(),
                detail: format!("render task panicked: {e}"),
            })?
            .map_err(|e| SectionError::Render {
                section: name.to_string(),
                detail: e.to_string(),
            })?;

        self.converter
            .convert(&transient_name(index, name), filled)
            .await
            .map_err(|e| SectionError::Conversion {
                section: name.to_string(),
                detail: e.to_string(),
            })
    }
}

/// `section_{index}_{stem}.docx`, with the stem of the section's own name.
fn transient_name(index: usize, name: &str) -> String {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("section");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("docx");
    format!("section_{index}_{stem}.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConversionError, TemplateError};
    use crate::pipeline::section::SectionKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Engine that upper-cases the template bytes.
    struct Shout;

    impl TemplateEngine for Shout {
        fn render(&self, template: &[u8], _: &RenderContext) -> Result<Vec<u8>, TemplateError> {
            Ok(template.to_ascii_uppercase())
        }
    }

    struct Broken;

    impl TemplateEngine for Broken {
        fn render(&self, _: &[u8], _: &RenderContext) -> Result<Vec<u8>, TemplateError> {
            Err(TemplateError::MissingPart("word/document.xml".into()))
        }
    }

    /// Converter that echoes the document and remembers the names it saw.
    #[derive(Default)]
    struct Echo {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl PdfConverter for Echo {
        async fn convert(&self, name: &str, doc: Vec<u8>) -> Result<Vec<u8>, ConversionError> {
            self.seen.lock().unwrap().push(name.to_string());
            if self.fail {
                return Err(ConversionError::Status {
                    status: 500,
                    body: "boom".into(),
                });
            }
            Ok(doc)
        }
    }

    fn section(dir: &Path, name: &str) -> Section {
        Section {
            name: name.to_string(),
            kind: SectionKind::Dynamic,
            order_key: 2,
            source_path: dir.join(name),
        }
    }

    #[tokio::test]
    async fn renders_then_converts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("02_dynamic_body.docx"), b"hello").unwrap();
        let echo = Arc::new(Echo::default());
        let renderer = SectionRenderer::new(Arc::new(Shout), echo.clone());

        let out = renderer
            .render(3, &section(dir.path(), "02_dynamic_body.docx"), &RenderContext::default())
            .await
            .unwrap();

        assert_eq!(out.bytes, b"HELLO");
        assert_eq!(out.order_key, 2);
        assert_eq!(out.name, "02_dynamic_body.docx");
        assert_eq!(
            echo.seen.lock().unwrap().as_slice(),
            ["section_3_02_dynamic_body.docx"]
        );
    }

    #[tokio::test]
    async fn missing_template_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = SectionRenderer::new(Arc::new(Shout), Arc::new(Echo::default()));
        let err = renderer
            .render(0, &section(dir.path(), "01_dynamic_gone.docx"), &RenderContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SectionError::TemplateRead { .. }));
        assert_eq!(err.section(), "01_dynamic_gone.docx");
    }

    #[tokio::test]
    async fn engine_failure_is_a_render_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.docx"), b"x").unwrap();
        let echo = Arc::new(Echo::default());
        let renderer = SectionRenderer::new(Arc::new(Broken), echo.clone());
        let err = renderer
            .render(0, &section(dir.path(), "a.docx"), &RenderContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SectionError::Render { .. }));
        assert!(echo.seen.lock().unwrap().is_empty(), "converter must not be called");
    }

    #[tokio::test]
    async fn converter_failure_is_a_conversion_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.docx"), b"x").unwrap();
        let echo = Arc::new(Echo {
            fail: true,
            ..Default::default()
        });
        let renderer = SectionRenderer::new(Arc::new(Shout), echo);
        let err = renderer
            .render(0, &section(dir.path(), "a.docx"), &RenderContext::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 500"), "got: {err}");
    }

    #[test]
    fn transient_names_are_unique_per_index() {
        assert_eq!(transient_name(0, "01_dynamic_a.docx"), "section_0_01_dynamic_a.docx");
        assert_ne!(transient_name(1, "x.docx"), transient_name(2, "x.docx"));
    }
}
