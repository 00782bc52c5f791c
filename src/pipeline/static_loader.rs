//! Static sections: read pre-rendered PDFs from the sections folder.
//!
//! Reads run concurrently with each other and with the dynamic worker pool.
//! A static section whose file vanished or cannot be read is skipped. It is
//! not an error, the document is merged without it.

use crate::output::ProcessedPdf;
use crate::pipeline::section::Section;
use futures::future::join_all;
use std::collections::HashMap;
use std::io::ErrorKind;
use tracing::{debug, warn};

/// Load every static section that can be read, keyed by section name.
pub async fn load_static_sections(sections: &[Section]) -> HashMap<String, ProcessedPdf> {
    let reads = sections.iter().map(|section| async move {
        match tokio::fs::read(&section.source_path).await {
            Ok(bytes) => Some(ProcessedPdf {
                name: section.name.clone(),
                kind: section.kind,
                order_key: section.order_key,
                bytes,
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(
                    "Static section '{}' has no PDF at {}, skipping",
                    section.name,
                    section.source_path.display()
                );
                None
            }
            Err(e) => {
                warn!(
                    "Static section '{}' unreadable ({}), skipping: {}",
                    section.name,
                    section.source_path.display(),
                    e
                );
                None
            }
        }
    });

    join_all(reads)
        .await
        .into_iter()
        .flatten()
        .map(|pdf| (pdf.name.clone(), pdf))
        .collect()
}
