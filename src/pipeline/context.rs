//! The shared render context handed to every dynamic section.
//!
//! Built once per request and never mutated afterwards, so renderer tasks
//! share it through an `Arc` without any locking. Each section looks values
//! up through the same view; the optional inline image is bound under
//! [`IMAGE_PLACEHOLDER`] next to the JSON data.

use crate::request::InlineImage;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Context key the inline image is bound to.
pub const IMAGE_PLACEHOLDER: &str = "image_placeholder";

/// A value resolved from the context.
#[derive(Debug, Clone, Copy)]
pub enum ContextValue<'a> {
    Json(&'a Value),
    Image(&'a InlineImage),
}

/// Read-only data mapping plus optional inline image.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    data: Arc<Map<String, Value>>,
    image: Option<Arc<InlineImage>>,
}

impl RenderContext {
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            data: Arc::new(data),
            image: None,
        }
    }

    pub fn with_image(mut self, image: InlineImage) -> Self {
        self.image = Some(Arc::new(image));
        self
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn image(&self) -> Option<&InlineImage> {
        self.image.as_deref()
    }

    /// Resolve a dotted path (`customer.address.city`, `items.0.label`).
    ///
    /// The image binding shadows a data key of the same name.
    pub fn lookup(&self, path: &str) -> Option<ContextValue<'_>> {
        let path = path.trim();
        if path == IMAGE_PLACEHOLDER {
            if let Some(img) = self.image.as_deref() {
                return Some(ContextValue::Image(img));
            }
        }

        let mut segments = path.split('.');
        let first = segments.next()?.trim();
        let mut current = self.data.get(first)?;
        for segment in segments {
            let segment = segment.trim();
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(ContextValue::Json(current))
    }
}

/// Text rendering of a JSON value as it appears in the document.
///
/// Strings print verbatim, null prints nothing, containers print as compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> RenderContext {
        let data = json!({
            "client": "ACME",
            "total": 12.5,
            "paid": false,
            "address": { "city": "Lyon" },
            "items": [{ "label": "Widget" }],
            "image_placeholder": "shadowed"
        });
        RenderContext::new(data.as_object().unwrap().clone())
    }

    fn text(ctx: &RenderContext, path: &str) -> Option<String> {
        match ctx.lookup(path)? {
            ContextValue::Json(v) => Some(display_value(v)),
            ContextValue::Image(_) => Some("<image>".into()),
        }
    }

    #[test]
    fn lookup_top_level_and_nested() {
        let c = ctx();
        assert_eq!(text(&c, "client").as_deref(), Some("ACME"));
        assert_eq!(text(&c, " address.city ").as_deref(), Some("Lyon"));
        assert_eq!(text(&c, "items.0.label").as_deref(), Some("Widget"));
        assert_eq!(text(&c, "total").as_deref(), Some("12.5"));
        assert_eq!(text(&c, "paid").as_deref(), Some("false"));
    }

    #[test]
    fn lookup_missing_is_none() {
        let c = ctx();
        assert!(c.lookup("nope").is_none());
        assert!(c.lookup("address.zip").is_none());
        assert!(c.lookup("items.3.label").is_none());
        assert!(c.lookup("client.name").is_none());
    }

    #[test]
    fn image_binding_shadows_data() {
        let c = ctx();
        assert_eq!(text(&c, IMAGE_PLACEHOLDER).as_deref(), Some("shadowed"));

        let c = c.with_image(InlineImage {
            bytes: vec![1, 2, 3],
            width_in: 2.0,
            height_in: 2.0,
            format: image::ImageFormat::Png,
        });
        assert_eq!(text(&c, IMAGE_PLACEHOLDER).as_deref(), Some("<image>"));
    }

    #[test]
    fn clones_share_data() {
        let a = ctx();
        let b = a.clone();
        assert!(Arc::ptr_eq(&a.data, &b.data));
    }

    #[test]
    fn display_containers_as_json() {
        assert_eq!(display_value(&json!(null)), "");
        assert_eq!(display_value(&json!([1, 2])), "[1,2]");
        assert_eq!(display_value(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
