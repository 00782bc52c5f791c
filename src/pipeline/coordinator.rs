//! Parallel execution of the dynamic sections.
//!
//! Every dynamic section becomes one future; `buffer_unordered` keeps at most
//! `min(N, max_workers)` of them in flight. Results come back in completion
//! order and are folded into a map by the single consumer of the stream, so
//! no task ever touches shared mutable state.
//!
//! A failed or timed-out section only removes itself from the result. It is
//! logged, reported to the progress callback and recorded as a
//! [`SectionError`] while its siblings keep running.

use crate::config::AssemblyConfig;
use crate::error::SectionError;
use crate::output::ProcessedPdf;
use crate::pipeline::context::RenderContext;
use crate::pipeline::render::SectionRenderer;
use crate::pipeline::section::Section;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Everything the worker pool produced.
#[derive(Debug, Default)]
pub struct DynamicResults {
    /// Successful sections keyed by section name.
    pub pdfs: HashMap<String, ProcessedPdf>,
    /// Failed sections, in completion order.
    pub failures: Vec<SectionError>,
    /// Pool size actually used.
    pub workers: usize,
    pub duration_ms: u64,
}

/// Render and convert `sections` concurrently.
///
/// Returns once every section has either succeeded or failed.
pub async fn render_dynamic_sections(
    sections: &[Section],
    context: &RenderContext,
    renderer: &SectionRenderer,
    config: &AssemblyConfig,
) -> DynamicResults {
    let start = Instant::now();
    if sections.is_empty() {
        return DynamicResults::default();
    }

    let workers = config.worker_count(sections.len());
    info!(
        "Rendering {} dynamic sections with {} workers",
        sections.len(),
        workers
    );

    let outcomes: Vec<Result<ProcessedPdf, SectionError>> =
        stream::iter(sections.iter().enumerate().map(|(index, section)| {
            let renderer = renderer.clone();
            let context = context.clone();
            let section = section.clone();
            let config = config.clone();
            async move {
                if let Some(ref cb) = config.progress_callback {
                    cb.on_section_start(&section.name);
                }

                let result = run_section(index, &section, &context, &renderer, &config).await;

                if let Some(ref cb) = config.progress_callback {
                    match &result {
                        Ok(pdf) => cb.on_section_complete(&section.name, pdf.bytes.len()),
                        Err(e) => cb.on_section_error(&section.name, &e.to_string()),
                    }
                }
                result
            }
        }))
        .buffer_unordered(workers)
        .collect()
        .await;

    let mut results = DynamicResults {
        workers,
        ..Default::default()
    };
    for outcome in outcomes {
        match outcome {
            Ok(pdf) => {
                results.pdfs.insert(pdf.name.clone(), pdf);
            }
            Err(e) => {
                warn!("{}", e);
                results.failures.push(e);
            }
        }
    }
    results.duration_ms = start.elapsed().as_millis() as u64;

    info!(
        "Dynamic sections done: {} ok, {} failed in {}ms",
        results.pdfs.len(),
        results.failures.len(),
        results.duration_ms
    );
    results
}

/// One section, bounded by `section_timeout_secs` when set.
async fn run_section(
    index: usize,
    section: &Section,
    context: &RenderContext,
    renderer: &SectionRenderer,
    config: &AssemblyConfig,
) -> Result<ProcessedPdf, SectionError> {
    let work = renderer.render(index, section, context);
    match config.section_timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), work)
            .await
            .unwrap_or_else(|_| {
                Err(SectionError::Timeout {
                    section: section.name.clone(),
                    secs,
                })
            }),
        None => work.await,
    }
}
