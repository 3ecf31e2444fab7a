//! Transport to the relations API.
//!
//! `RelationsTransport` is the seam the gateway and the migration job depend
//! on. `RelationsClient` implements it over the API's HTTP/JSON binding, where
//! a resource lookup is answered with newline-delimited JSON frames.

use crate::config::RelationsConfig;
use crate::types::{
    CheckRequest, CheckResponse, CreateTuplesRequest, LookupResourcesRequest,
    LookupResourcesResponse,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

const CHECK_PATH: &str = "api/authz/v1beta1/check";
const LOOKUP_RESOURCES_PATH: &str = "api/authz/v1beta1/resources";
const CREATE_TUPLES_PATH: &str = "api/authz/v1beta1/tuples";

#[derive(thiserror::Error, Debug)]
pub enum RelationsError {
    #[error("relations request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("relations API returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("invalid relations payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("relations stream failed with code {code}: {message}")]
    Stream { code: i32, message: String },
}

/// Pages of a lookup, pulled one at a time. The sequence is finite and cannot
/// be restarted; once `next_page` returns `Ok(None)` or an error, it is done.
#[async_trait]
pub trait LookupStream: Send {
    async fn next_page(&mut self) -> Result<Option<LookupResourcesResponse>, RelationsError>;
}

#[async_trait]
pub trait RelationsTransport: Send + Sync {
    async fn check(&self, request: CheckRequest) -> Result<CheckResponse, RelationsError>;

    async fn lookup_resources(
        &self,
        request: LookupResourcesRequest,
    ) -> Result<Box<dyn LookupStream>, RelationsError>;

    /// Bulk creation. Existing tuples are upserted.
    async fn create_tuples(&self, request: CreateTuplesRequest) -> Result<(), RelationsError>;
}

pub struct RelationsClient {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl RelationsClient {
    pub fn new(config: &RelationsConfig) -> Result<Self, RelationsError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(RelationsClient {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.post(format!("{}/{}", self.base_url, path));
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Turns any non-2xx response into an error carrying the body.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, RelationsError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(RelationsError::Status { status, body })
}

#[async_trait]
impl RelationsTransport for RelationsClient {
    async fn check(&self, request: CheckRequest) -> Result<CheckResponse, RelationsError> {
        let response = self.post(CHECK_PATH).json(&request).send().await?;
        let response = ensure_success(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn lookup_resources(
        &self,
        request: LookupResourcesRequest,
    ) -> Result<Box<dyn LookupStream>, RelationsError> {
        let response = self.post(LOOKUP_RESOURCES_PATH).json(&request).send().await?;
        let response = ensure_success(response).await?;
        Ok(Box::new(NdjsonLookupStream::new(response)))
    }

    async fn create_tuples(&self, request: CreateTuplesRequest) -> Result<(), RelationsError> {
        let response = self.post(CREATE_TUPLES_PATH).json(&request).send().await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct StreamFrameError {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct StreamFrame {
    result: Option<LookupResourcesResponse>,
    error: Option<StreamFrameError>,
}

/// Reads `{"result": ...}` / `{"error": ...}` frames off a streamed body.
struct NdjsonLookupStream {
    response: reqwest::Response,
    buffer: Vec<u8>,
    body_done: bool,
}

impl NdjsonLookupStream {
    fn new(response: reqwest::Response) -> Self {
        NdjsonLookupStream {
            response,
            buffer: Vec::new(),
            body_done: false,
        }
    }

    /// Takes the next complete line out of the buffer. Once the body is done,
    /// whatever remains counts as the final line.
    fn take_line(&mut self) -> Option<Vec<u8>> {
        if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            return Some(line);
        }

        if self.body_done && !self.buffer.is_empty() {
            return Some(std::mem::take(&mut self.buffer));
        }

        None
    }
}

fn parse_frame(line: &[u8]) -> Result<LookupResourcesResponse, RelationsError> {
    let frame: StreamFrame = serde_json::from_slice(line)?;

    if let Some(error) = frame.error {
        return Err(RelationsError::Stream {
            code: error.code,
            message: error.message,
        });
    }

    frame.result.ok_or_else(|| RelationsError::Stream {
        code: 0,
        message: "stream frame carried neither a result nor an error".into(),
    })
}

#[async_trait]
impl LookupStream for NdjsonLookupStream {
    async fn next_page(&mut self) -> Result<Option<LookupResourcesResponse>, RelationsError> {
        loop {
            if let Some(line) = self.take_line() {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return parse_frame(&line).map(Some);
            }

            if self.body_done {
                return Ok(None);
            }

            match self.response.chunk().await? {
                Some(chunk) => self.buffer.extend_from_slice(&chunk),
                None => self.body_done = true,
            }
        }
    }
}
