//! Top-level entry points.
//!
//! * [`assemble_sections`] - the multi-section pipeline: discover, render the
//!   dynamic sections on a worker pool while loading the static ones, merge
//!   in order, fall back to one section if the merge fails.
//! * [`process_parallel_sections`] - the same, answering with Base64 text.
//! * [`render_document`] - single-template mode: one template, one PDF.
//!
//! Every function has a `*_with` twin taking the template engine and the
//! converter explicitly; the plain versions use [`DocxTemplateEngine`] and a
//! [`GotenbergClient`] built from the config.

use crate::config::AssemblyConfig;
use crate::error::AssemblyError;
use crate::output::{AssemblyOutput, AssemblyStats, SectionOutcome};
use crate::pipeline::context::RenderContext;
use crate::pipeline::converter::{GotenbergClient, PdfConverter};
use crate::pipeline::coordinator::render_dynamic_sections;
use crate::pipeline::merge::{collect_in_order, merge_or_fallback};
use crate::pipeline::render::SectionRenderer;
use crate::pipeline::section::{discover_sections, SectionKind};
use crate::pipeline::static_loader::load_static_sections;
use crate::pipeline::template::{DocxTemplateEngine, TemplateEngine};
use crate::request::{resolve_under, AssemblyRequest, DocumentRequest, ImageSpec};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Assemble every section of `request.folder_name` into one PDF.
///
/// # Returns
/// `Ok(AssemblyOutput)` as long as at least one section produced a PDF, even
/// if others failed (see `output.stats.failed_sections`) or the merge fell
/// back to a single section (`output.stats.merged == false`).
///
/// # Errors
/// - [`AssemblyError::InvalidRequest`] / [`AssemblyError::InvalidImage`]
///   for a malformed request
/// - [`AssemblyError::FolderNotFound`] when the folder does not exist
/// - [`AssemblyError::NoTemplates`] when it holds no template files
/// - [`AssemblyError::NoOutput`] when no section produced a PDF
pub async fn assemble_sections(
    request: &AssemblyRequest,
    config: &AssemblyConfig,
) -> Result<AssemblyOutput, AssemblyError> {
    let (engine, converter) = default_collaborators(config)?;
    assemble_with(request, config, engine, converter).await
}

/// [`assemble_sections`] with an explicit template engine and converter.
pub async fn assemble_with(
    request: &AssemblyRequest,
    config: &AssemblyConfig,
    engine: Arc<dyn TemplateEngine>,
    converter: Arc<dyn PdfConverter>,
) -> Result<AssemblyOutput, AssemblyError> {
    let total_start = Instant::now();

    // ── Step 1: Validate the request ─────────────────────────────────────
    let folder = resolve_under(&config.root_dir, &request.folder_name, "folderName")?;
    let context = build_context(&request.data, request.image.as_ref())?;
    info!("Assembling sections from {}", folder.display());

    // ── Step 2: Discover sections ────────────────────────────────────────
    let plan = discover_sections(&folder, config).await?;
    let dynamic: Vec<_> = plan.dynamic_sections().cloned().collect();
    let statics: Vec<_> = plan.static_sections().cloned().collect();
    info!(
        "Found {} dynamic and {} static sections",
        dynamic.len(),
        statics.len()
    );
    debug!("Converter endpoint: {}", config.conversion_endpoint());

    if let Some(ref cb) = config.progress_callback {
        cb.on_assembly_start(dynamic.len(), statics.len());
    }

    // ── Step 3: Render dynamic ∥ load static ─────────────────────────────
    let renderer = SectionRenderer::new(engine, converter);
    let (rendered, loaded) = tokio::join!(
        render_dynamic_sections(&dynamic, &context, &renderer, config),
        load_static_sections(&statics),
    );

    // ── Step 4: Per-section outcomes ─────────────────────────────────────
    let sections: Vec<SectionOutcome> = plan
        .ordering
        .iter()
        .map(|s| {
            let produced = match s.kind {
                SectionKind::Dynamic => rendered.pdfs.get(&s.name),
                SectionKind::Static => loaded.get(&s.name),
            };
            SectionOutcome {
                name: s.name.clone(),
                kind: s.kind,
                order_key: s.order_key,
                pdf_bytes: produced.map(|p| p.bytes.len()),
                error: rendered
                    .failures
                    .iter()
                    .find(|e| s.kind == SectionKind::Dynamic && e.section() == s.name)
                    .cloned(),
            }
        })
        .collect();

    // ── Step 5: Merge in order ───────────────────────────────────────────
    let ordered = collect_in_order(&plan.ordering, &rendered.pdfs, &loaded);
    let failed = rendered.failures.len();
    let missing = statics.len().saturating_sub(loaded.len());
    if ordered.is_empty() {
        return Err(AssemblyError::NoOutput { failed, missing });
    }

    let merge_start = Instant::now();
    let available = ordered.len();
    let merged = tokio::task::spawn_blocking(move || merge_or_fallback(&ordered))
        .await
        .map_err(|e| AssemblyError::Internal(format!("Merge task panicked: {e}")))?
        .ok_or(AssemblyError::NoOutput { failed, missing })?;
    let merge_duration_ms = merge_start.elapsed().as_millis() as u64;

    // ── Step 6: Stats ────────────────────────────────────────────────────
    let stats = AssemblyStats {
        dynamic_sections: dynamic.len(),
        static_sections: statics.len(),
        rendered_sections: rendered.pdfs.len(),
        failed_sections: failed,
        loaded_static_sections: loaded.len(),
        missing_static_sections: missing,
        workers: rendered.workers,
        merged: merged.merged,
        fallback_section: merged.fallback_section.clone(),
        output_bytes: merged.pdf.len(),
        render_duration_ms: rendered.duration_ms,
        merge_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Assembly complete: {}/{} sections, {} pages, {} bytes, {}ms total",
        available,
        plan.len(),
        merged.pages,
        stats.output_bytes,
        stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_assembly_complete(plan.len(), if merged.merged { available } else { 1 });
    }

    Ok(AssemblyOutput {
        pdf: merged.pdf,
        sections,
        stats,
    })
}

/// The multi-section operation as the service exposes it: request fields in,
/// Base64 PDF out.
pub async fn process_parallel_sections(
    folder_name: &str,
    data: Map<String, Value>,
    image: Option<ImageSpec>,
    config: &AssemblyConfig,
) -> Result<String, AssemblyError> {
    let request = AssemblyRequest {
        folder_name: folder_name.to_string(),
        data,
        image,
    };
    Ok(assemble_sections(&request, config).await?.to_base64())
}

/// Assemble and write the PDF to `output_path`.
///
/// The file is written to a temp file in the destination directory and then
/// persisted over `output_path`, so readers never observe a partial PDF.
pub async fn assemble_to_file(
    request: &AssemblyRequest,
    output_path: impl AsRef<Path>,
    config: &AssemblyConfig,
) -> Result<AssemblyStats, AssemblyError> {
    let output = assemble_sections(request, config).await?;
    write_atomic(output_path.as_ref(), output.pdf).await?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`assemble_sections`].
///
/// Creates a temporary tokio runtime internally.
pub fn assemble_sync(
    request: &AssemblyRequest,
    config: &AssemblyConfig,
) -> Result<AssemblyOutput, AssemblyError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| AssemblyError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(assemble_sections(request, config))
}

/// Fill one template and convert it to PDF.
///
/// Unlike the multi-section pipeline there is nothing to fall back to, so a
/// render or conversion failure is returned as [`AssemblyError::Section`].
pub async fn render_document(
    request: &DocumentRequest,
    config: &AssemblyConfig,
) -> Result<Vec<u8>, AssemblyError> {
    let (engine, converter) = default_collaborators(config)?;
    render_document_with(request, config, engine, converter).await
}

/// Render one template and write the PDF atomically to `output_path`.
///
/// Returns the number of bytes written.
pub async fn render_document_to_file(
    request: &DocumentRequest,
    output_path: impl AsRef<Path>,
    config: &AssemblyConfig,
) -> Result<usize, AssemblyError> {
    let pdf = render_document(request, config).await?;
    let len = pdf.len();
    write_atomic(output_path.as_ref(), pdf).await?;
    Ok(len)
}

/// [`render_document`] with an explicit template engine and converter.
pub async fn render_document_with(
    request: &DocumentRequest,
    config: &AssemblyConfig,
    engine: Arc<dyn TemplateEngine>,
    converter: Arc<dyn PdfConverter>,
) -> Result<Vec<u8>, AssemblyError> {
    let path = resolve_under(&config.root_dir, &request.file_name, "fileName")?;
    if request.data.is_empty() {
        return Err(AssemblyError::InvalidRequest(
            "fileName and data are required".into(),
        ));
    }
    let context = build_context(&request.data, request.image.as_ref())?;

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(AssemblyError::TemplateNotFound { path }),
    }

    let start = Instant::now();
    let pdf = SectionRenderer::new(engine, converter)
        .render_path(0, &request.file_name, &path, &context)
        .await?;
    info!(
        "Rendered {} → {} bytes PDF in {:?}",
        request.file_name,
        pdf.len(),
        start.elapsed()
    );
    Ok(pdf)
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn default_collaborators(
    config: &AssemblyConfig,
) -> Result<(Arc<dyn TemplateEngine>, Arc<dyn PdfConverter>), AssemblyError> {
    let client = GotenbergClient::from_config(config)
        .map_err(|e| AssemblyError::InvalidConfig(format!("converter client: {e}")))?;
    Ok((Arc::new(DocxTemplateEngine), Arc::new(client)))
}

/// Decode the image once for the whole request, so a bad image is a request
/// error instead of a failure in every section.
fn build_context(
    data: &Map<String, Value>,
    image: Option<&ImageSpec>,
) -> Result<RenderContext, AssemblyError> {
    let context = RenderContext::new(data.clone());
    Ok(match image.map(ImageSpec::decode).transpose()? {
        Some(img) => context.with_image(img),
        None => context,
    })
}

/// Write `bytes` to `path` without ever exposing a partial file.
///
/// The data goes to a temp file in the destination directory (created if
/// needed) which is then persisted over `path`. The temp file is removed on
/// every failure path.
pub async fn write_atomic(path: &Path, bytes: Vec<u8>) -> Result<(), AssemblyError> {
    let path = path.to_path_buf();
    let write_err = |path: &Path, source: std::io::Error| AssemblyError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| write_err(&path, e))?;

    tokio::task::spawn_blocking(move || {
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| write_err(&path, e))?;
        tmp.write_all(&bytes).map_err(|e| write_err(&path, e))?;
        tmp.as_file().sync_all().map_err(|e| write_err(&path, e))?;
        tmp.persist(&path).map_err(|e| write_err(&path, e.error))?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok::<(), AssemblyError>(())
    })
    .await
    .map_err(|e| AssemblyError::Internal(format!("Write task panicked: {e}")))?
}
