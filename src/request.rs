//! Request payloads accepted by the assembly entry points.
//!
//! Field names follow the JSON the service receives (`folderName`,
//! `fileName`), so a request body deserialises straight into these types.

use crate::error::AssemblyError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Component, Path, PathBuf};

/// Default inline image edge length in inches.
pub const DEFAULT_IMAGE_INCHES: f64 = 2.0;

/// Multi-section request: render every section of `folder_name` against `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssemblyRequest {
    /// Folder under the configured root holding the section files.
    pub folder_name: String,
    /// Shared render context for every dynamic section.
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Optional image bound to the `image_placeholder` key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageSpec>,
}

/// Single-template request: render `file_name` against `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRequest {
    /// Template file under the configured root.
    pub file_name: String,
    /// Must hold at least one key.
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageSpec>,
}

/// Inline image as it arrives on the wire: Base64 content plus a size in inches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSpec {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

/// A decoded inline image, ready to be embedded in a document.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub bytes: Vec<u8>,
    pub width_in: f64,
    pub height_in: f64,
    /// Sniffed from the bytes; one of PNG, JPEG, GIF or BMP.
    pub format: ImageFormat,
}

impl InlineImage {
    /// Wrap raw image bytes, sniffing the format and checking the size.
    pub fn new(bytes: Vec<u8>, width_in: f64, height_in: f64) -> Result<Self, AssemblyError> {
        for (label, v) in [("width", width_in), ("height", height_in)] {
            if !v.is_finite() || v <= 0.0 {
                return Err(AssemblyError::InvalidImage(format!(
                    "{label} must be a positive number of inches, got {v}"
                )));
            }
        }

        let format = image::guess_format(&bytes)
            .map_err(|_| AssemblyError::InvalidImage("unrecognised image format".into()))?;
        if !matches!(
            format,
            ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif | ImageFormat::Bmp
        ) {
            return Err(AssemblyError::InvalidImage(format!(
                "{format:?} images cannot be embedded in a document"
            )));
        }

        Ok(Self {
            bytes,
            width_in,
            height_in,
            format,
        })
    }

    /// File extension used for the embedded media part.
    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("bin")
    }

    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

impl ImageSpec {
    /// Decode the Base64 payload and apply the 2 by 2 inch default size.
    ///
    /// Whitespace and a `data:<mime>;base64,` prefix are tolerated since
    /// browser clients commonly send both.
    pub fn decode(&self) -> Result<InlineImage, AssemblyError> {
        let payload = match self.content.split_once(";base64,") {
            Some((prefix, rest)) if prefix.starts_with("data:") => rest,
            _ => self.content.as_str(),
        };
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        if cleaned.is_empty() {
            return Err(AssemblyError::InvalidImage("image content is empty".into()));
        }

        let bytes = STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|e| AssemblyError::InvalidImage(format!("content is not valid Base64: {e}")))?;

        InlineImage::new(
            bytes,
            self.width.unwrap_or(DEFAULT_IMAGE_INCHES),
            self.height.unwrap_or(DEFAULT_IMAGE_INCHES),
        )
    }
}

/// Resolve a client-supplied relative path under `root`.
///
/// Rejects empty, absolute and parent-escaping paths so a request can never
/// reach outside the configured root directory.
pub fn resolve_under(root: &Path, requested: &str, field: &str) -> Result<PathBuf, AssemblyError> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(AssemblyError::InvalidRequest(format!("{field} is required")));
    }

    let rel = Path::new(trimmed);
    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(AssemblyError::InvalidRequest(format!(
                    "{field} must be a relative path inside the template root, got '{trimmed}'"
                )))
            }
        }
    }

    Ok(root.join(rel))
}
