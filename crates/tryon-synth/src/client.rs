//! HTTP client for the makeup synthesis service.
//!
//! Posts multipart forms to `/transfer/region-specific` and
//! `/transfer/global` using [`reqwest`]. The response status and body are
//! handed back raw; interpreting them is the orchestrator's job.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tryon_core::orchestrator::{SynthesisResponse, SynthesisTransport, TransportError};
use tryon_core::request::{FormField, FormValue};

/// HTTP client for a single synthesis service instance.
#[derive(Clone)]
pub struct SynthesisClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Option<Duration>,
}

impl SynthesisClient {
    /// * `base_url` - e.g. `http://127.0.0.1:8000`. A trailing slash is ignored.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Reuse an existing [`reqwest::Client`] (shared connection pool).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            timeout: None,
        }
    }

    /// Bound each request. Without this a request waits as long as the
    /// server takes.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl SynthesisTransport for SynthesisClient {
    async fn post_form(
        &self,
        path: &str,
        fields: Vec<FormField>,
    ) -> Result<SynthesisResponse, TransportError> {
        let form = to_form(fields).map_err(|e| TransportError::Request(e.to_string()))?;

        let mut request = self.client.post(self.url(path)).multipart(form);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        tracing::debug!(url = %self.url(path), "posting synthesis form");
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport_error)?;

        tracing::debug!(status, len = body.len(), "synthesis response received");
        Ok(SynthesisResponse {
            status,
            body: body.to_vec(),
        })
    }
}

/// Convert transport-neutral fields into a reqwest multipart form.
pub fn to_form(fields: Vec<FormField>) -> Result<Form, reqwest::Error> {
    let mut form = Form::new();
    for field in fields {
        form = match field.value {
            FormValue::Text(text) => form.text(field.name, text),
            FormValue::File {
                bytes,
                file_name,
                media_type,
            } => {
                let part = Part::bytes(bytes.to_vec())
                    .file_name(file_name)
                    .mime_str(&media_type)?;
                form.part(field.name, part)
            }
        };
    }
    Ok(form)
}

pub(crate) fn transport_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{hang, serve_form, unused_port};
    use std::sync::Arc;
    use tryon_core::request::REGION_TRANSFER_PATH;

    fn file(name: &'static str, bytes: &[u8], file_name: &str, media_type: &str) -> FormField {
        FormField {
            name,
            value: FormValue::File {
                bytes: Arc::from(bytes),
                file_name: file_name.into(),
                media_type: media_type.into(),
            },
        }
    }

    fn text(name: &'static str, value: &str) -> FormField {
        FormField {
            name,
            value: FormValue::Text(value.into()),
        }
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = SynthesisClient::new("http://localhost:8000/");
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(
            client.url(REGION_TRANSFER_PATH),
            "http://localhost:8000/transfer/region-specific"
        );
    }

    #[test]
    fn test_bad_media_type_rejected() {
        let result = to_form(vec![file("source", b"x", "source.bin", "not a mime")]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_post_form_sends_multipart_and_returns_raw_reply() {
        let server = serve_form(200, b"result-bytes").await;
        let client = SynthesisClient::new(server.base.clone());

        let reply = client
            .post_form(
                REGION_TRANSFER_PATH,
                vec![
                    file("source", b"photo", "source.png", "image/png"),
                    file("ref_lip", b"ruby", "Ruby_Red.jpg", "image/jpeg"),
                    text("lip_sat", "1.0"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, b"result-bytes");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        let received = &requests[0];
        assert_eq!(received.method, "POST");
        assert_eq!(received.path, REGION_TRANSFER_PATH);
        assert_eq!(received.part_names(), ["source", "ref_lip", "lip_sat"]);

        let source = received.part("source").unwrap();
        assert_eq!(source.file_name.as_deref(), Some("source.png"));
        assert_eq!(source.content_type.as_deref(), Some("image/png"));
        assert_eq!(source.bytes, b"photo");

        let lip = received.part("ref_lip").unwrap();
        assert_eq!(lip.file_name.as_deref(), Some("Ruby_Red.jpg"));
        assert_eq!(lip.content_type.as_deref(), Some("image/jpeg"));
        assert_eq!(lip.bytes, b"ruby");

        let lip_sat = received.part("lip_sat").unwrap();
        assert_eq!(lip_sat.file_name, None);
        assert_eq!(lip_sat.bytes, b"1.0");
    }

    #[tokio::test]
    async fn test_error_status_is_not_a_transport_error() {
        let server = serve_form(422, br#"{"detail":"face not aligned"}"#).await;
        let client = SynthesisClient::new(format!("{}/", server.base));
        let reply = client
            .post_form("/transfer/global", vec![file("source", b"p", "source.png", "image/png")])
            .await
            .unwrap();
        assert_eq!(reply.status, 422);
        assert!(!reply.is_success());
        assert_eq!(reply.body, br#"{"detail":"face not aligned"}"#);
        assert_eq!(server.requests()[0].path, "/transfer/global");
    }

    #[tokio::test]
    async fn test_unreachable_is_request_error() {
        let client = SynthesisClient::new(format!("http://127.0.0.1:{}", unused_port().await));
        let err = client.post_form("/transfer/global", vec![]).await.unwrap_err();
        assert!(matches!(err, TransportError::Request(_)));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout() {
        let base = hang().await;
        let client = SynthesisClient::new(base).with_timeout(Some(Duration::from_millis(100)));
        let err = client.post_form("/transfer/global", vec![]).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
    }
}
