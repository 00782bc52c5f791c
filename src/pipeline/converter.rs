//! Office-to-PDF conversion through a Gotenberg service.
//!
//! The converter is the only stage with network I/O. It is a trait so the
//! coordinator can be driven by an in-process fake in tests, and so hosts
//! can swap in a different conversion backend.
//!
//! One call is one `POST {base}/forms/libreoffice/convert` with the rendered
//! document as the multipart field `file`. A 2xx response carries the raw PDF
//! bytes; anything else is a [`ConversionError`].

use crate::config::AssemblyConfig;
use crate::error::ConversionError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::{Duration, Instant};
use tracing::debug;

/// MIME type sent with the rendered `.docx`.
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Path of the LibreOffice route below the Gotenberg base URL.
pub const CONVERT_ROUTE: &str = "/forms/libreoffice/convert";

/// Error bodies are truncated to this many characters in error messages.
const MAX_ERROR_BODY: usize = 512;

/// Converts an office document into PDF bytes.
///
/// `file_name` is the transient name the converter sees; Gotenberg uses its
/// extension to pick the import filter.
#[async_trait]
pub trait PdfConverter: Send + Sync {
    async fn convert(&self, file_name: &str, document: Vec<u8>) -> Result<Vec<u8>, ConversionError>;
}

/// HTTP client for a Gotenberg instance.
#[derive(Debug, Clone)]
pub struct GotenbergClient {
    http: reqwest::Client,
    endpoint: String,
    timeout_secs: u64,
}

impl GotenbergClient {
    /// Build a client for `base_url` (e.g. `http://localhost:3000`).
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ConversionError> {
        let endpoint = format!("{}{}", base_url.trim_end_matches('/'), CONVERT_ROUTE);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ConversionError::Transport {
                url: endpoint.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            http,
            endpoint,
            timeout_secs,
        })
    }

    pub fn from_config(config: &AssemblyConfig) -> Result<Self, ConversionError> {
        Self::new(&config.converter_url, config.converter_timeout_secs)
    }

    /// Full URL of the conversion route.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn transport_error(&self, err: reqwest::Error) -> ConversionError {
        if err.is_timeout() {
            ConversionError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            ConversionError::Transport {
                url: self.endpoint.clone(),
                reason: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl PdfConverter for GotenbergClient {
    async fn convert(&self, file_name: &str, document: Vec<u8>) -> Result<Vec<u8>, ConversionError> {
        let start = Instant::now();
        let size = document.len();

        let part = Part::bytes(document)
            .file_name(file_name.to_string())
            .mime_str(DOCX_MIME)
            .map_err(|e| self.transport_error(e))?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConversionError::Status {
                status: status.as_u16(),
                body: truncate(body.trim(), MAX_ERROR_BODY),
            });
        }

        let pdf = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;
        if pdf.is_empty() {
            return Err(ConversionError::EmptyResponse);
        }

        debug!(
            "Converted {} ({} bytes) → {} bytes PDF in {:?}",
            file_name,
            size,
            pdf.len(),
            start.elapsed()
        );
        Ok(pdf.to_vec())
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    const FAKE_PDF: &[u8] = b"%PDF-1.7\n%fake\n%%EOF";

    #[tokio::test]
    async fn posts_multipart_and_returns_pdf() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(CONVERT_ROUTE)
                    .header_exists("content-type")
                    .body_contains("name=\"file\"")
                    .body_contains("filename=\"section_0_intro.docx\"");
                then.status(200)
                    .header("content-type", "application/pdf")
                    .body(FAKE_PDF);
            })
            .await;

        let client = GotenbergClient::new(&server.base_url(), 5).unwrap();
        let pdf = client
            .convert("section_0_intro.docx", b"PK fake docx".to_vec())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(pdf, FAKE_PDF);
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(CONVERT_ROUTE);
                then.status(503).body("LibreOffice is busy");
            })
            .await;

        let client = GotenbergClient::new(&server.base_url(), 5).unwrap();
        let err = client.convert("a.docx", vec![1, 2, 3]).await.unwrap_err();
        match err {
            ConversionError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "LibreOffice is busy");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_body_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(CONVERT_ROUTE);
                then.status(200);
            })
            .await;

        let client = GotenbergClient::new(&server.base_url(), 5).unwrap();
        let err = client.convert("a.docx", vec![1]).await.unwrap_err();
        assert!(matches!(err, ConversionError::EmptyResponse));
    }

    #[tokio::test]
    async fn unreachable_service_is_a_transport_error() {
        // Port 9 (discard) is essentially never served on test machines.
        let client = GotenbergClient::new("http://127.0.0.1:9", 2).unwrap();
        let err = client.convert("a.docx", vec![1]).await.unwrap_err();
        assert!(
            matches!(err, ConversionError::Transport { .. } | ConversionError::Timeout { .. }),
            "got {err:?}"
        );
    }

    #[test]
    fn endpoint_joins_base_and_route() {
        let c = GotenbergClient::new("http://gotenberg:3000/", 10).unwrap();
        assert_eq!(c.endpoint(), "http://gotenberg:3000/forms/libreoffice/convert");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé…");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
