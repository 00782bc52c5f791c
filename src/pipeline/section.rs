//! Section discovery: list a folder, classify files, compute merge order.
//!
//! A sections folder mixes two kinds of files, told apart purely by name:
//!
//! ```text
//! 01_dynamic_cover.docx   template, rendered against the request data
//! 02_static_terms.pdf     pre-rendered, merged as-is
//! 03_dynamic_annex.docx
//! ```
//!
//! The leading digit run is the order key. Static sections are ordered under
//! their would-be template name (`02_static_terms.docx`) so both kinds share
//! one naming space, while their payload is read from the PDF file.

use crate::config::AssemblyConfig;
use crate::error::AssemblyError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// How a section's PDF is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    /// Template filled with the request data, then converted.
    Dynamic,
    /// Pre-rendered PDF loaded from disk.
    Static,
}

/// One section file and its place in the final document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Ordering name in template form, e.g. `02_static_terms.docx`.
    /// Also the key of the section in the result maps.
    pub name: String,
    pub kind: SectionKind,
    pub order_key: u64,
    /// File that holds the payload: the template for dynamic sections,
    /// the PDF for static ones.
    pub source_path: PathBuf,
}

/// Everything discovery found in one folder.
#[derive(Debug, Clone, Default)]
pub struct SectionPlan {
    /// All sections, ascending by order key; ties keep discovery order.
    pub ordering: Vec<Section>,
}

impl SectionPlan {
    pub fn dynamic_sections(&self) -> impl Iterator<Item = &Section> {
        self.ordering.iter().filter(|s| s.kind == SectionKind::Dynamic)
    }

    pub fn static_sections(&self) -> impl Iterator<Item = &Section> {
        self.ordering.iter().filter(|s| s.kind == SectionKind::Static)
    }

    pub fn dynamic_count(&self) -> usize {
        self.dynamic_sections().count()
    }

    pub fn static_count(&self) -> usize {
        self.static_sections().count()
    }

    pub fn len(&self) -> usize {
        self.ordering.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordering.is_empty()
    }
}

/// Integer from the digits before the first `_`; 0 when that prefix is not
/// purely digits (or does not fit a `u64`).
pub fn order_key(file_name: &str) -> u64 {
    let prefix = file_name.split('_').next().unwrap_or("");
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return 0;
    }
    prefix.parse().unwrap_or(0)
}

/// Classify a single file name, returning its kind when it is a section.
///
/// Dynamic sections are template files carrying the dynamic marker; static
/// sections exist only as PDFs carrying the static marker. Anything else in
/// the folder is not part of the document.
pub fn classify(file_name: &str, config: &AssemblyConfig) -> Option<SectionKind> {
    let ext = extension_of(file_name)?;
    if ext.eq_ignore_ascii_case(&config.template_extension)
        && file_name.contains(&config.dynamic_marker)
    {
        Some(SectionKind::Dynamic)
    } else if ext.eq_ignore_ascii_case(&config.pdf_extension)
        && file_name.contains(&config.static_marker)
    {
        Some(SectionKind::Static)
    } else {
        None
    }
}

fn extension_of(file_name: &str) -> Option<&str> {
    Path::new(file_name).extension().and_then(|e| e.to_str())
}

/// Swap the extension of `file_name` for `ext`.
fn with_extension(file_name: &str, ext: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, _)) => format!("{stem}.{ext}"),
        None => format!("{file_name}.{ext}"),
    }
}

/// List `folder` and build its [`SectionPlan`].
///
/// Discovery order is lexicographic by file name, dynamic sections ahead of
/// static ones; the stable sort by order key keeps that order on ties.
///
/// # Errors
/// - [`AssemblyError::FolderNotFound`] when `folder` is missing or not a directory
/// - [`AssemblyError::NoTemplates`] when no file has the template extension
pub async fn discover_sections(
    folder: &Path,
    config: &AssemblyConfig,
) -> Result<SectionPlan, AssemblyError> {
    match tokio::fs::metadata(folder).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(AssemblyError::FolderNotFound {
                path: folder.to_path_buf(),
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AssemblyError::FolderNotFound {
                path: folder.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(AssemblyError::Io {
                path: folder.to_path_buf(),
                source: e,
            })
        }
    }

    let io_err = |source| AssemblyError::Io {
        path: folder.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(folder).await.map_err(io_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        if !entry.file_type().await.map_err(io_err)?.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => debug!("Skipping non UTF-8 file name {:?}", raw),
        }
    }

    plan_from_names(folder, names, config)
}

/// Pure half of [`discover_sections`]: classify and order a list of names.
pub fn plan_from_names(
    folder: &Path,
    mut names: Vec<String>,
    config: &AssemblyConfig,
) -> Result<SectionPlan, AssemblyError> {
    names.sort();

    let has_templates = names.iter().any(|n| {
        extension_of(n).is_some_and(|e| e.eq_ignore_ascii_case(&config.template_extension))
    });
    if !has_templates {
        return Err(AssemblyError::NoTemplates {
            path: folder.to_path_buf(),
            extension: config.template_extension.clone(),
        });
    }

    let mut dynamic = Vec::new();
    let mut statics = Vec::new();
    for name in names {
        match classify(&name, config) {
            Some(SectionKind::Dynamic) => dynamic.push(Section {
                order_key: order_key(&name),
                source_path: folder.join(&name),
                name,
                kind: SectionKind::Dynamic,
            }),
            Some(SectionKind::Static) => statics.push(Section {
                order_key: order_key(&name),
                name: with_extension(&name, &config.template_extension),
                source_path: folder.join(&name),
                kind: SectionKind::Static,
            }),
            None => debug!("Ignoring non-section file '{}'", name),
        }
    }

    let mut ordering = dynamic;
    ordering.extend(statics);
    ordering.sort_by_key(|s| s.order_key);

    debug!(
        "Discovered {} sections in {}",
        ordering.len(),
        folder.display()
    );
    Ok(SectionPlan { ordering })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn plan(v: &[&str]) -> SectionPlan {
        plan_from_names(Path::new("f"), names(v), &AssemblyConfig::default()).unwrap()
    }

    fn order(p: &SectionPlan) -> Vec<&str> {
        p.ordering.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn order_key_reads_leading_digits() {
        assert_eq!(order_key("01_dynamic_a.docx"), 1);
        assert_eq!(order_key("12_static_b.pdf"), 12);
        assert_eq!(order_key("007_dynamic.docx"), 7);
    }

    #[test]
    fn order_key_defaults_to_zero() {
        assert_eq!(order_key("foo_dynamic_x.docx"), 0);
        assert_eq!(order_key("1a_dynamic_x.docx"), 0);
        assert_eq!(order_key("_dynamic_x.docx"), 0);
        assert_eq!(order_key("99999999999999999999999_dynamic.docx"), 0);
    }

    #[test]
    fn classify_by_marker_and_extension() {
        let c = AssemblyConfig::default();
        assert_eq!(classify("01_dynamic_a.docx", &c), Some(SectionKind::Dynamic));
        assert_eq!(classify("01_dynamic_a.DOCX", &c), Some(SectionKind::Dynamic));
        assert_eq!(classify("02_static_b.pdf", &c), Some(SectionKind::Static));
        // static sections only exist in PDF form
        assert_eq!(classify("02_static_b.docx", &c), None);
        // a converted dynamic section is not a static one
        assert_eq!(classify("01_dynamic_a.pdf", &c), None);
        assert_eq!(classify("notes.txt", &c), None);
        assert_eq!(classify("README", &c), None);
    }

    #[test]
    fn mixed_sections_sort_by_prefix() {
        let p = plan(&["03_dynamic_c.docx", "02_static_b.pdf", "01_dynamic_a.docx"]);
        assert_eq!(
            order(&p),
            vec!["01_dynamic_a.docx", "02_static_b.docx", "03_dynamic_c.docx"]
        );
        assert_eq!(p.dynamic_count(), 2);
        assert_eq!(p.static_count(), 1);
    }

    #[test]
    fn static_payload_comes_from_pdf() {
        let p = plan(&["01_dynamic_a.docx", "02_static_b.pdf"]);
        let s = p.static_sections().next().unwrap();
        assert_eq!(s.name, "02_static_b.docx");
        assert_eq!(s.source_path, Path::new("f").join("02_static_b.pdf"));
        assert_eq!(s.order_key, 2);
    }

    #[test]
    fn orphan_static_is_orderable() {
        let p = plan(&["05_static_appendix.pdf", "01_dynamic_a.docx", "09_dynamic_z.docx"]);
        assert_eq!(
            order(&p),
            vec!["01_dynamic_a.docx", "05_static_appendix.docx", "09_dynamic_z.docx"]
        );
    }

    #[test]
    fn unnumbered_sections_sort_first() {
        let p = plan(&["01_dynamic_a.docx", "foo_dynamic_x.docx"]);
        assert_eq!(order(&p), vec!["foo_dynamic_x.docx", "01_dynamic_a.docx"]);
        assert_eq!(p.ordering[0].order_key, 0);
    }

    #[test]
    fn ties_keep_discovery_order() {
        let p = plan(&["02_static_b.pdf", "02_dynamic_b.docx", "02_dynamic_a.docx"]);
        assert_eq!(
            order(&p),
            vec!["02_dynamic_a.docx", "02_dynamic_b.docx", "02_static_b.docx"]
        );
    }

    #[test]
    fn non_sections_are_ignored() {
        let p = plan(&["01_dynamic_a.docx", "draft.docx", "01_dynamic_a.pdf", "logo.png"]);
        assert_eq!(order(&p), vec!["01_dynamic_a.docx"]);
    }

    #[test]
    fn no_templates_is_an_error() {
        let err = plan_from_names(
            Path::new("f"),
            names(&["01_static_a.pdf", "notes.txt"]),
            &AssemblyConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AssemblyError::NoTemplates { .. }));
    }

    #[test]
    fn templates_without_marker_are_not_empty_input() {
        // The folder has templates, just none marked dynamic.
        let p = plan(&["draft.docx", "02_static_b.pdf"]);
        assert_eq!(p.dynamic_count(), 0);
        assert_eq!(p.static_count(), 1);
    }

    #[tokio::test]
    async fn discover_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_sections(&dir.path().join("nope"), &AssemblyConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AssemblyError::FolderNotFound { .. }));
    }

    #[tokio::test]
    async fn discover_reads_directory() {
        let dir = tempfile::tempdir().unwrap();
        for n in ["02_static_b.pdf", "01_dynamic_a.docx", "03_dynamic_c.docx"] {
            std::fs::write(dir.path().join(n), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("04_dynamic_dir.docx")).unwrap();

        let p = discover_sections(dir.path(), &AssemblyConfig::default())
            .await
            .unwrap();
        assert_eq!(
            order(&p),
            vec!["01_dynamic_a.docx", "02_static_b.docx", "03_dynamic_c.docx"]
        );
    }

    #[tokio::test]
    async fn discover_empty_folder() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_sections(dir.path(), &AssemblyConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AssemblyError::NoTemplates { .. }));
    }
}
