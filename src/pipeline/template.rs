//! Template filling: `.docx` package + [`RenderContext`] → filled `.docx`.
//!
//! A `.docx` is a zip of XML parts. Text placeholders (`{{ client.name }}`)
//! live in `word/document.xml` and the header/footer parts. Word freely
//! splits typed text into several runs, so a placeholder can arrive as
//!
//! ```text
//! <w:t>{{ cli</w:t></w:r><w:r><w:t>ent }}</w:t>
//! ```
//!
//! The whole span from the opening to the closing braces is replaced, which
//! drops the run boundary inside it and leaves well-formed XML behind.
//!
//! The inline image is embedded as a `w:drawing` inside the run that held the
//! placeholder, with the picture stored under `word/media/`.

use crate::error::TemplateError;
use crate::pipeline::context::{display_value, ContextValue, RenderContext};
use crate::request::InlineImage;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::io::{Cursor, Read, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Renders a template against a context. Called from a blocking thread.
pub trait TemplateEngine: Send + Sync {
    fn render(&self, template: &[u8], context: &RenderContext) -> Result<Vec<u8>, TemplateError>;
}

const DOCUMENT_PART: &str = "word/document.xml";
const DOCUMENT_RELS: &str = "word/_rels/document.xml.rels";
const CONTENT_TYPES: &str = "[Content_Types].xml";

const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// English Metric Units per inch, the DrawingML length unit.
const EMU_PER_INCH: f64 = 914_400.0;

/// Braces may be split by run markup: `{</w:t>...<w:t>{`.
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{(?:<[^>]*>)*\{(?s:(.*?))\}(?:<[^>]*>)*\}").expect("placeholder regex")
});
static XML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));
static KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z0-9_]+)*$").expect("key regex"));
static HEADER_FOOTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^word/(header|footer)\d*\.xml$").expect("part regex"));
static REL_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r#"Id="rId(\d+)""#).expect("rel id regex"));

/// The bundled engine for Office Open XML word-processing templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxTemplateEngine;

struct PackageEntry {
    name: String,
    data: Vec<u8>,
    is_dir: bool,
}

/// Where the inline image lives inside the package.
struct ImageSlot<'a> {
    rel_id: String,
    media_name: String,
    image: &'a InlineImage,
}

impl TemplateEngine for DocxTemplateEngine {
    fn render(&self, template: &[u8], context: &RenderContext) -> Result<Vec<u8>, TemplateError> {
        let mut entries = read_package(template)?;

        if !entries.iter().any(|e| e.name == DOCUMENT_PART) {
            return Err(TemplateError::MissingPart(DOCUMENT_PART.to_string()));
        }

        let slot = match context.image() {
            Some(image) => Some(ImageSlot {
                rel_id: next_rel_id(entries.iter().find(|e| e.name == DOCUMENT_RELS)),
                media_name: unused_media_name(&entries, image.extension()),
                image,
            }),
            None => None,
        };

        let mut images_placed = 0;
        for entry in entries.iter_mut() {
            let is_document = entry.name == DOCUMENT_PART;
            if !is_document && !HEADER_FOOTER.is_match(&entry.name) {
                continue;
            }
            let xml = part_text(entry)?;
            // Header and footer parts have their own relationship files, so
            // the image is only embedded in the main document body.
            let part_slot = if is_document { slot.as_ref() } else { None };
            let (filled, placed) = fill_placeholders(&xml, context, part_slot);
            images_placed += placed;
            entry.data = filled.into_bytes();
        }

        if let (Some(slot), true) = (slot, images_placed > 0) {
            embed_image(&mut entries, &slot)?;
            debug!(
                "Embedded inline image as {} ({} placements)",
                slot.media_name, images_placed
            );
        }

        write_package(entries)
    }
}

fn read_package(template: &[u8]) -> Result<Vec<PackageEntry>, TemplateError> {
    let mut archive = ZipArchive::new(Cursor::new(template))?;
    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let name = file.name().to_string();
        let is_dir = file.is_dir();
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;
        entries.push(PackageEntry { name, data, is_dir });
    }
    Ok(entries)
}

fn write_package(entries: Vec<PackageEntry>) -> Result<Vec<u8>, TemplateError> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for entry in entries {
        if entry.is_dir {
            writer.add_directory(entry.name, options)?;
        } else {
            writer.start_file(entry.name, options)?;
            writer.write_all(&entry.data)?;
        }
    }
    Ok(writer.finish()?.into_inner())
}

fn part_text(entry: &mut PackageEntry) -> Result<String, TemplateError> {
    String::from_utf8(std::mem::take(&mut entry.data)).map_err(|source| TemplateError::Encoding {
        part: entry.name.clone(),
        source,
    })
}

/// Replace every placeholder in `xml`, returning the new XML and how many
/// times the image was placed.
///
/// Expressions that are not plain dotted keys (filters, calls) are left
/// untouched. Unknown keys render as empty text.
fn fill_placeholders(
    xml: &str,
    context: &RenderContext,
    slot: Option<&ImageSlot<'_>>,
) -> (String, usize) {
    let mut placed = 0;
    let filled = PLACEHOLDER.replace_all(xml, |caps: &Captures<'_>| {
        let inner = XML_TAG.replace_all(&caps[1], "");
        let key = inner.trim();
        if !KEY.is_match(key) {
            debug!("Leaving unsupported expression '{}' as-is", key);
            return caps[0].to_string();
        }
        match context.lookup(key) {
            Some(ContextValue::Json(value)) => xml_escape(&display_value(value)),
            Some(ContextValue::Image(_)) => match slot {
                Some(slot) => {
                    placed += 1;
                    drawing_xml(slot, placed)
                }
                None => String::new(),
            },
            None => {
                debug!("No value for '{}', rendering empty", key);
                String::new()
            }
        }
    });
    (filled.into_owned(), placed)
}

fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn inches_to_emu(inches: f64) -> i64 {
    (inches * EMU_PER_INCH).round() as i64
}

/// Inline picture markup. It closes the surrounding `w:t`, places the
/// drawing in the same run, and reopens a `w:t` for any trailing text.
fn drawing_xml(slot: &ImageSlot<'_>, placement: usize) -> String {
    let cx = inches_to_emu(slot.image.width_in);
    let cy = inches_to_emu(slot.image.height_in);
    let id = 4000 + placement;
    format!(
        concat!(
            r#"</w:t><w:drawing>"#,
            r#"<wp:inline xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" distT="0" distB="0" distL="0" distR="0">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/>"#,
            r#"<wp:docPr id="{id}" name="Picture {id}"/>"#,
            r#"<a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">"#,
            r#"<a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:nvPicPr><pic:cNvPr id="0" name="{name}"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" r:embed="{rel}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
            r#"</pic:pic></a:graphicData></a:graphic></wp:inline>"#,
            r#"</w:drawing><w:t xml:space="preserve">"#,
        ),
        cx = cx,
        cy = cy,
        id = id,
        name = slot.media_name,
        rel = slot.rel_id,
    )
}

/// First relationship id not used by the document part.
fn next_rel_id(rels: Option<&PackageEntry>) -> String {
    let max = rels
        .map(|entry| String::from_utf8_lossy(&entry.data).into_owned())
        .map(|xml| {
            REL_ID
                .captures_iter(&xml)
                .filter_map(|c| c[1].parse::<u64>().ok())
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0);
    format!("rId{}", max + 1)
}

fn unused_media_name(entries: &[PackageEntry], ext: &str) -> String {
    let mut n = 1;
    loop {
        let name = format!("docstitch_image{n}.{ext}");
        let full = format!("word/media/{name}");
        if !entries.iter().any(|e| e.name == full) {
            return name;
        }
        n += 1;
    }
}

/// Store the picture and wire it into the relationship and content-type parts.
fn embed_image(entries: &mut Vec<PackageEntry>, slot: &ImageSlot<'_>) -> Result<(), TemplateError> {
    let relationship = format!(
        r#"<Relationship Id="{}" Type="{}" Target="media/{}"/>"#,
        slot.rel_id, IMAGE_REL_TYPE, slot.media_name
    );
    match entries.iter_mut().find(|e| e.name == DOCUMENT_RELS) {
        Some(rels) => {
            let xml = part_text(rels)?;
            rels.data = insert_before(&xml, "</Relationships>", &relationship)
                .ok_or_else(|| TemplateError::MissingPart(format!("{DOCUMENT_RELS} root element")))?
                .into_bytes();
        }
        None => entries.push(PackageEntry {
            name: DOCUMENT_RELS.to_string(),
            data: format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{RELS_NS}">{relationship}</Relationships>"#
            )
            .into_bytes(),
            is_dir: false,
        }),
    }

    let ext = slot.image.extension();
    let types = entries
        .iter_mut()
        .find(|e| e.name == CONTENT_TYPES)
        .ok_or_else(|| TemplateError::MissingPart(CONTENT_TYPES.to_string()))?;
    let xml = part_text(types)?;
    let registered = Regex::new(&format!(r#"(?i)<Default\s+Extension="{}""#, regex::escape(ext)))
        .map(|re| re.is_match(&xml))
        .unwrap_or(false);
    types.data = if registered {
        xml.into_bytes()
    } else {
        let default = format!(
            r#"<Default Extension="{}" ContentType="{}"/>"#,
            ext,
            slot.image.content_type()
        );
        insert_before(&xml, "</Types>", &default)
            .ok_or_else(|| TemplateError::MissingPart(format!("{CONTENT_TYPES} root element")))?
            .into_bytes()
    };

    entries.push(PackageEntry {
        name: format!("word/media/{}", slot.media_name),
        data: slot.image.bytes.clone(),
        is_dir: false,
    });
    Ok(())
}

fn insert_before(xml: &str, closing_tag: &str, fragment: &str) -> Option<String> {
    let pos = xml.rfind(closing_tag)?;
    let mut out = String::with_capacity(xml.len() + fragment.len());
    out.push_str(&xml[..pos]);
    out.push_str(fragment);
    out.push_str(&xml[pos..]);
    Some(out)
}
