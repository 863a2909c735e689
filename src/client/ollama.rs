//! Ollama HTTP transport.
//!
//! Two kinds of calls: the model listing (`GET /api/tags`) and streamed
//! generation (`POST /api/generate`, `POST /api/chat`).

use std::time::Duration;

use futures::Stream;
use reqwest::{Client, Response};
use serde::Serialize;
use tracing::{debug, info};

use super::stream::decode_records;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::protocol::{ChatRequest, Endpoint, GenerateRequest, StreamRecord};

const LIST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for a single Ollama server.
pub struct OllamaClient {
    host: String,
    client: Client,
}

impl OllamaClient {
    /// Create a client for the configured host.
    ///
    /// Only the connect phase is bounded; a generation may stream for as long
    /// as the model keeps producing tokens.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let host = config.host.trim_end_matches('/').to_string();
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|source| Error::Unreachable {
                url: host.clone(),
                source,
            })?;

        Ok(Self { host, client })
    }

    /// Base URL requests are sent to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// List the names of the models the server has available.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.host);

        let response = self
            .client
            .get(&url)
            .timeout(LIST_TIMEOUT)
            .send()
            .await
            .map_err(|source| Error::Unreachable {
                url: self.host.clone(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status { url, status, body });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|_| Error::MalformedPayload { url: url.clone() })?;

        // Ollama answers with `models`; some compatible servers use `tags`.
        let entries = data
            .get("models")
            .or_else(|| data.get("tags"))
            .and_then(|m| m.as_array())
            .ok_or(Error::MalformedPayload { url })?;

        let names: Vec<String> = entries
            .iter()
            .filter_map(|entry| entry.get("name").and_then(|n| n.as_str()))
            .map(str::to_string)
            .collect();
        debug!("Server lists {} models", names.len());
        Ok(names)
    }

    /// Resolve the model to use.
    ///
    /// An explicit name wins, then the environment override, then the first
    /// model the server lists. Explicit and environment names are not checked
    /// against the listing; the server rejects unknown models itself.
    pub async fn pick_model(&self, explicit: Option<&str>, env_model: Option<&str>) -> Result<String> {
        if let Some(model) = explicit.filter(|m| !m.is_empty()) {
            return Ok(model.to_string());
        }
        if let Some(model) = env_model.filter(|m| !m.is_empty()) {
            debug!("Using model from environment: {}", model);
            return Ok(model.to_string());
        }

        let model = self
            .list_models()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::NoModels)?;
        info!("No model given, falling back to {}", model);
        Ok(model)
    }

    /// Submit a single-turn generation and stream the records back.
    pub async fn generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<impl Stream<Item = Result<StreamRecord>>> {
        let response = self.post_stream(Endpoint::Generate, request).await?;
        Ok(decode_records(response.bytes_stream()))
    }

    /// Submit the whole conversation and stream the records back.
    pub async fn chat(
        &self,
        request: &ChatRequest<'_>,
    ) -> Result<impl Stream<Item = Result<StreamRecord>>> {
        let response = self.post_stream(Endpoint::Chat, request).await?;
        Ok(decode_records(response.bytes_stream()))
    }

    /// POST a streaming request and check the status. The body is left unread.
    async fn post_stream<T: Serialize>(&self, endpoint: Endpoint, body: &T) -> Result<Response> {
        let url = format!("{}{}", self.host, endpoint.path());
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|source| Error::Unreachable {
                url: self.host.clone(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status { url, status, body });
        }

        Ok(response)
    }
}
