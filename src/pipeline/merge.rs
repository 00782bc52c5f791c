//! Ordered PDF concatenation with a single-section fallback.
//!
//! Each input PDF is parsed with lopdf and its pages are deep-copied into a
//! fresh document, in input order, under one flat page tree.
//!
//! Copying a page must not drag its old page tree along. Every source page id
//! is therefore reserved in the target before anything is copied, so links
//! between pages resolve to the new pages instead of recursing through
//! `Parent` into the source tree. Attributes a page inherits from its tree
//! (`Resources`, `MediaBox`, `CropBox`, `Rotate`) are copied onto the page
//! itself, since the old ancestors are not carried over.

use crate::error::MergeError;
use crate::output::ProcessedPdf;
use crate::pipeline::section::{Section, SectionKind};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Page attributes that may be inherited from an ancestor `Pages` node.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Bound on page-tree depth when resolving inherited attributes.
const MAX_TREE_DEPTH: usize = 64;

/// Result of [`merge_or_fallback`].
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub pdf: Vec<u8>,
    /// `false` when merging failed and a single section is returned.
    pub merged: bool,
    pub fallback_section: Option<String>,
    /// Page count of the merged document; 0 for a fallback.
    pub pages: usize,
}

/// Pick the PDFs to merge, in ordering-list order.
///
/// Each section is looked up in the map of its own kind, so a dynamic and a
/// static section sharing a name each contribute their own PDF. Sections
/// with no result (failed or missing) are skipped.
pub fn collect_in_order(
    ordering: &[Section],
    dynamic: &HashMap<String, ProcessedPdf>,
    statics: &HashMap<String, ProcessedPdf>,
) -> Vec<ProcessedPdf> {
    ordering
        .iter()
        .filter_map(|s| match s.kind {
            SectionKind::Dynamic => dynamic.get(&s.name),
            SectionKind::Static => statics.get(&s.name),
        })
        .cloned()
        .collect()
}

/// The PDF returned when merging fails: the first dynamic section in merge
/// order, or the first static one when no dynamic section succeeded.
pub fn choose_fallback(ordered: &[ProcessedPdf]) -> Option<&ProcessedPdf> {
    ordered
        .iter()
        .find(|p| p.kind == SectionKind::Dynamic)
        .or_else(|| ordered.first())
}

/// Merge `ordered`, falling back to a single section on failure.
///
/// Returns `None` only when `ordered` is empty.
pub fn merge_or_fallback(ordered: &[ProcessedPdf]) -> Option<MergeOutcome> {
    match merge_pdfs(ordered) {
        Ok((pdf, pages)) => Some(MergeOutcome {
            pdf,
            merged: true,
            fallback_section: None,
            pages,
        }),
        Err(e) => {
            let fallback = choose_fallback(ordered)?;
            warn!(
                "Error merging PDFs: {}. Returning section '{}' unmerged",
                e, fallback.name
            );
            Some(MergeOutcome {
                pdf: fallback.bytes.clone(),
                merged: false,
                fallback_section: Some(fallback.name.clone()),
                pages: 0,
            })
        }
    }
}

/// Concatenate the pages of every PDF in `pdfs`, in order.
///
/// Returns the serialised document and its page count.
pub fn merge_pdfs(pdfs: &[ProcessedPdf]) -> Result<(Vec<u8>, usize), MergeError> {
    let mut target = Document::with_version("1.7");
    let pages_id = target.new_object_id();
    let mut kids: Vec<Object> = Vec::new();

    for pdf in pdfs {
        let source = Document::load_mem(&pdf.bytes).map_err(|source| MergeError::Pdf {
            section: pdf.name.clone(),
            source,
        })?;
        let pages = source.get_pages();
        if pages.is_empty() {
            warn!("Section '{}' has no pages", pdf.name);
            continue;
        }

        let mut copier = PageCopier::new(&source, &mut target);
        // BTreeMap keyed by page number, so this is reading order.
        let reserved: Vec<(ObjectId, ObjectId)> =
            pages.values().map(|&id| (id, copier.reserve(id))).collect();
        for (source_id, target_id) in reserved {
            copier
                .copy_page(source_id, target_id, pages_id)
                .map_err(|source| MergeError::Copy {
                    section: pdf.name.clone(),
                    source,
                })?;
            kids.push(Object::Reference(target_id));
        }
        debug!("Copied {} pages from '{}'", pages.len(), pdf.name);
    }

    if kids.is_empty() {
        return Err(MergeError::NoPages);
    }

    let page_count = kids.len();
    target.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
        }),
    );
    let catalog_id = target.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    target.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    target
        .save_to(&mut bytes)
        .map_err(|e| MergeError::Save(e.to_string()))?;
    Ok((bytes, page_count))
}

/// Deep-copies objects from one document into another.
struct PageCopier<'a> {
    source: &'a Document,
    target: &'a mut Document,
    id_map: HashMap<ObjectId, ObjectId>,
}

impl<'a> PageCopier<'a> {
    fn new(source: &'a Document, target: &'a mut Document) -> Self {
        Self {
            source,
            target,
            id_map: HashMap::new(),
        }
    }

    /// Allocate the target id for `source_id` ahead of copying it.
    fn reserve(&mut self, source_id: ObjectId) -> ObjectId {
        let id = self.target.add_object(Object::Null);
        self.id_map.insert(source_id, id);
        id
    }

    fn copy_page(
        &mut self,
        source_id: ObjectId,
        target_id: ObjectId,
        parent: ObjectId,
    ) -> Result<(), lopdf::Error> {
        let mut page = self.source.get_object(source_id)?.as_dict()?.clone();
        for key in INHERITABLE {
            if !page.has(key) {
                if let Some(value) = inherited(self.source, &page, key) {
                    page.set(key.to_vec(), value);
                }
            }
        }
        page.remove(b"Parent");

        let mut page = self.remap_dict(page)?;
        page.set("Parent", parent);
        self.target
            .objects
            .insert(target_id, Object::Dictionary(page));
        Ok(())
    }

    fn copy_object(&mut self, source_id: ObjectId) -> Result<ObjectId, lopdf::Error> {
        if let Some(&id) = self.id_map.get(&source_id) {
            return Ok(id);
        }
        // Reserve before recursing so reference cycles terminate.
        let new_id = self.reserve(source_id);
        let obj = self.source.get_object(source_id)?.clone();
        let obj = self.remap(obj)?;
        self.target.objects.insert(new_id, obj);
        Ok(new_id)
    }

    fn remap(&mut self, obj: Object) -> Result<Object, lopdf::Error> {
        Ok(match obj {
            Object::Reference(id) => Object::Reference(self.copy_object(id)?),
            Object::Array(items) => Object::Array(
                items
                    .into_iter()
                    .map(|o| self.remap(o))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Object::Dictionary(dict) => Object::Dictionary(self.remap_dict(dict)?),
            Object::Stream(mut stream) => {
                stream.dict = self.remap_dict(stream.dict)?;
                Object::Stream(stream)
            }
            other => other,
        })
    }

    fn remap_dict(&mut self, mut dict: Dictionary) -> Result<Dictionary, lopdf::Error> {
        for (_, value) in dict.iter_mut() {
            let taken = std::mem::replace(value, Object::Null);
            *value = self.remap(taken)?;
        }
        Ok(dict)
    }
}

/// Nearest ancestor value of an inheritable page attribute.
fn inherited(doc: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    for _ in 0..MAX_TREE_DEPTH {
        let node = doc.get_object(parent?).and_then(Object::as_dict).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Stream, StringFormat};

    fn text_page(doc: &mut Document, text: &str) -> Object {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![100.into(), 700.into()]),
                Operation::new(
                    "Tj",
                    vec![Object::String(text.as_bytes().to_vec(), StringFormat::Literal)],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        Object::Reference(content_id)
    }

    /// A PDF with one page per label. With `inherit`, resources and media
    /// box live on the `Pages` node instead of each page.
    fn dummy_pdf(labels: &[&str], inherit: bool) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let media_box = Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]);

        let mut kids: Vec<Object> = Vec::new();
        for label in labels {
            let contents = text_page(&mut doc, label);
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => contents,
            };
            if !inherit {
                page.set("Resources", resources_id);
                page.set("MediaBox", media_box.clone());
            }
            kids.push(doc.add_object(page).into());
        }

        let mut pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => labels.len() as i64,
        };
        if inherit {
            pages.set("Resources", resources_id);
            pages.set("MediaBox", media_box);
        }
        doc.objects.insert(pages_id, pages.into());
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn pdf(name: &str, kind: SectionKind, order_key: u64, bytes: Vec<u8>) -> ProcessedPdf {
        ProcessedPdf {
            name: name.into(),
            kind,
            order_key,
            bytes,
        }
    }

    fn page_texts(bytes: &[u8]) -> Vec<String> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|&id| String::from_utf8_lossy(&doc.get_page_content(id).unwrap()).into_owned())
            .collect()
    }

    #[test]
    fn merges_pages_in_input_order() {
        let inputs = vec![
            pdf("01_dynamic_a.docx", SectionKind::Dynamic, 1, dummy_pdf(&["A1"], false)),
            pdf("02_static_b.docx", SectionKind::Static, 2, dummy_pdf(&["B1", "B2"], false)),
            pdf("03_dynamic_c.docx", SectionKind::Dynamic, 3, dummy_pdf(&["C1"], false)),
        ];
        let (bytes, pages) = merge_pdfs(&inputs).unwrap();
        assert_eq!(pages, 4);

        let texts = page_texts(&bytes);
        assert_eq!(texts.len(), 4);
        for (text, expected) in texts.iter().zip(["A1", "B1", "B2", "C1"]) {
            assert!(text.contains(expected), "expected {expected} in {text}");
        }
    }

    #[test]
    fn inherited_attributes_are_flattened() {
        let inputs = vec![pdf(
            "01_static_x.docx",
            SectionKind::Static,
            1,
            dummy_pdf(&["X1", "X2"], true),
        )];
        let (bytes, _) = merge_pdfs(&inputs).unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        for (_, id) in doc.get_pages() {
            let page = doc.get_object(id).unwrap().as_dict().unwrap();
            assert!(page.has(b"Resources"));
            assert!(page.has(b"MediaBox"));
        }
    }

    #[test]
    fn source_page_tree_is_not_copied() {
        let inputs = vec![
            pdf("a", SectionKind::Dynamic, 1, dummy_pdf(&["A1", "A2"], false)),
            pdf("b", SectionKind::Dynamic, 2, dummy_pdf(&["B1"], false)),
        ];
        let (bytes, _) = merge_pdfs(&inputs).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let page_trees = doc
            .objects
            .values()
            .filter_map(|o| o.as_dict().ok())
            .filter(|d| d.get(b"Type").and_then(Object::as_name).ok() == Some(&b"Pages"[..]))
            .count();
        assert_eq!(page_trees, 1);
    }

    #[test]
    fn garbage_input_fails_merge() {
        let inputs = vec![
            pdf("01_dynamic_a.docx", SectionKind::Dynamic, 1, dummy_pdf(&["A1"], false)),
            pdf("02_dynamic_bad.docx", SectionKind::Dynamic, 2, b"not a pdf".to_vec()),
        ];
        let err = merge_pdfs(&inputs).unwrap_err();
        assert!(matches!(err, MergeError::Pdf { ref section, .. } if section == "02_dynamic_bad.docx"));
    }

    #[test]
    fn empty_input_has_no_pages() {
        assert!(matches!(merge_pdfs(&[]), Err(MergeError::NoPages)));
    }

    #[test]
    fn fallback_prefers_first_dynamic() {
        let inputs = vec![
            pdf("01_static_a.docx", SectionKind::Static, 1, b"static".to_vec()),
            pdf("02_dynamic_b.docx", SectionKind::Dynamic, 2, b"garbage-b".to_vec()),
            pdf("03_dynamic_c.docx", SectionKind::Dynamic, 3, b"garbage-c".to_vec()),
        ];
        let out = merge_or_fallback(&inputs).unwrap();
        assert!(!out.merged);
        assert_eq!(out.fallback_section.as_deref(), Some("02_dynamic_b.docx"));
        assert_eq!(out.pdf, b"garbage-b");
    }

    #[test]
    fn fallback_uses_static_when_no_dynamic() {
        let inputs = vec![pdf("01_static_a.docx", SectionKind::Static, 1, b"junk".to_vec())];
        let out = merge_or_fallback(&inputs).unwrap();
        assert_eq!(out.fallback_section.as_deref(), Some("01_static_a.docx"));
        assert!(merge_or_fallback(&[]).is_none());
    }

    #[test]
    fn collect_skips_absent_sections() {
        let section = |name: &str, kind, key| Section {
            name: name.into(),
            kind,
            order_key: key,
            source_path: name.into(),
        };
        let ordering = vec![
            section("01_dynamic_a.docx", SectionKind::Dynamic, 1),
            section("02_static_b.docx", SectionKind::Static, 2),
            section("03_dynamic_failed.docx", SectionKind::Dynamic, 3),
            section("04_static_missing.docx", SectionKind::Static, 4),
        ];
        let mut dynamic = HashMap::new();
        dynamic.insert(
            "01_dynamic_a.docx".to_string(),
            pdf("01_dynamic_a.docx", SectionKind::Dynamic, 1, b"a".to_vec()),
        );
        let mut statics = HashMap::new();
        statics.insert(
            "02_static_b.docx".to_string(),
            pdf("02_static_b.docx", SectionKind::Static, 2, b"b".to_vec()),
        );

        let names: Vec<String> = collect_in_order(&ordering, &dynamic, &statics)
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, ["01_dynamic_a.docx", "02_static_b.docx"]);
    }

    #[test]
    fn collect_looks_up_each_kind_separately() {
        let shared = "01_dynamic_static_x.docx";
        let ordering = vec![
            Section {
                name: shared.into(),
                kind: SectionKind::Dynamic,
                order_key: 1,
                source_path: "01_dynamic_static_x.docx".into(),
            },
            Section {
                name: shared.into(),
                kind: SectionKind::Static,
                order_key: 1,
                source_path: "01_dynamic_static_x.pdf".into(),
            },
        ];
        let dynamic = HashMap::from([(
            shared.to_string(),
            pdf(shared, SectionKind::Dynamic, 1, b"dyn".to_vec()),
        )]);
        let statics = HashMap::from([(
            shared.to_string(),
            pdf(shared, SectionKind::Static, 1, b"stat".to_vec()),
        )]);

        let bytes: Vec<Vec<u8>> = collect_in_order(&ordering, &dynamic, &statics)
            .into_iter()
            .map(|p| p.bytes)
            .collect();
        assert_eq!(bytes, [b"dyn".to_vec(), b"stat".to_vec()]);
    }
}
