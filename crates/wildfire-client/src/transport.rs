//! Outbound request construction
//!
//! `PendingRequest` describes a logical call without its credential: the
//! pipeline attaches the current API key at send time, because the same
//! request may be resent under a different key after a key-level rejection.
//! The `Transport` trait is the seam between the pipeline and the network;
//! tests substitute scripted fakes.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use detonation::{AnalysisError, Result};
use reqwest::Method;

/// Form field name the remote API expects the credential under.
const API_KEY_FIELD: &str = "apikey";

/// Request body shape.
#[derive(Debug, Clone)]
pub enum Payload {
    /// URL-encoded form fields.
    Form(Vec<(&'static str, String)>),
    /// Multipart upload with one file part.
    Upload { file_name: String, content: Bytes },
}

/// A logical outbound call, credential not yet attached.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub method: Method,
    pub path: &'static str,
    pub payload: Payload,
}

impl PendingRequest {
    pub fn form(path: &'static str, fields: Vec<(&'static str, String)>) -> Self {
        Self {
            method: Method::POST,
            path,
            payload: Payload::Form(fields),
        }
    }

    pub fn upload(path: &'static str, file_name: String, content: Bytes) -> Self {
        Self {
            method: Method::POST,
            path,
            payload: Payload::Upload { file_name, content },
        }
    }

    /// The remote convention: credentials ride in the body, so read-only GET
    /// calls carry none.
    pub fn wants_key(&self) -> bool {
        self.method != Method::GET
    }
}

/// Status and body of a completed call.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
}

/// Seam between the pipeline and the network.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: &'a PendingRequest,
        api_key: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<RawResponse>> + Send + 'a>>;
}

/// Production transport: a plain `reqwest::Client` against a base URL.
/// Network-level faults surface as transient errors; status classification
/// is the pipeline's job.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Transport for HttpTransport {
    fn execute<'a>(
        &'a self,
        request: &'a PendingRequest,
        api_key: Option<&'a str>,
    ) -> Pin<Box<dyn Future<Output = Result<RawResponse>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.url(request.path);
            let builder = match &request.payload {
                Payload::Form(fields) => {
                    let mut pairs: Vec<(&str, &str)> =
                        fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
                    if let Some(key) = api_key {
                        pairs.push((API_KEY_FIELD, key));
                    }
                    self.client
                        .request(request.method.clone(), &url)
                        .form(&pairs)
                }
                Payload::Upload { file_name, content } => {
                    let mut form = reqwest::multipart::Form::new().part(
                        "file",
                        reqwest::multipart::Part::bytes(content.to_vec())
                            .file_name(file_name.clone()),
                    );
                    if let Some(key) = api_key {
                        form = form.text(API_KEY_FIELD, key.to_string());
                    }
                    self.client
                        .request(request.method.clone(), &url)
                        .multipart(form)
                }
            };

            let response = builder
                .send()
                .await
                .map_err(|e| AnalysisError::transient(format!("request to {url} failed: {e}")))?;
            let status = response.status().as_u16();
            let body = response.bytes().await.map_err(|e| {
                AnalysisError::transient(format!("reading reply from {url} failed: {e}"))
            })?;
            Ok(RawResponse { status, body })
        })
    }
}
