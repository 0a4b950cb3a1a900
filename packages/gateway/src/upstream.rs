//! Streaming chat-completions client
//!
//! Failures are reported in-band: the stream itself carries an
//! `[API Error`, `[Network Error` or `[Config Error` marker and ends.
//! The composition engine recognises those markers; nothing here ever
//! refuses a request outright. An upstream that goes quiet for longer than
//! the configured timeout is reported as a network error.

use crate::config::GatewayConfig;
use crate::prompt::{build_prompt, rewrite_prompt};
use crate::sse::SseDecoder;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use scribe_compose::{
    text_stream, GenerateRequest, GenerationService, RewriteRequest, ServiceError, TextStream,
};
use serde::Serialize;
use tokio::sync::mpsc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

pub fn config_error() -> String {
    "\n[Config Error: DEEPSEEK_API_KEY not configured]".to_string()
}

pub fn api_error(status: u16, body: &str) -> String {
    format!("\n[API Error: {status} - {body}]")
}

pub fn network_error(error: &impl std::fmt::Display) -> String {
    format!("\n[Network Error: {error}]")
}

pub struct UpstreamGenerator {
    client: Client,
    config: GatewayConfig,
}

impl UpstreamGenerator {
    pub fn new(config: GatewayConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().connect_timeout(config.timeout()).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Send one prompt and stream the reply deltas
    pub fn stream_prompt(&self, prompt: String) -> TextStream {
        let Some(key) = self.config.api_key().map(str::to_string) else {
            tracing::warn!("Upstream key is not configured");
            return text_stream([config_error()]);
        };

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: self.config.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            stream: true,
        };

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(pump(
            self.client.clone(),
            self.config.upstream_url.clone(),
            key,
            request,
            self.config.timeout(),
            tx,
        ));

        Box::pin(ReceiverStream::new(rx).map(Ok))
    }
}

/// Forward upstream deltas into `tx` until `[DONE]`, an error, or the
/// receiver goes away
async fn pump(
    client: Client,
    url: String,
    key: String,
    request: ChatRequest,
    read_timeout: Duration,
    tx: mpsc::Sender<String>,
) {
    let stalled = || format!("no data from upstream for {}s", read_timeout.as_secs());

    let sent = timeout(
        read_timeout,
        client.post(&url).bearer_auth(&key).json(&request).send(),
    )
    .await;
    let response = match sent {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::warn!(url = %url, error = %e, "Upstream unreachable");
            let _ = tx.send(network_error(&e)).await;
            return;
        }
        Err(_) => {
            tracing::warn!(url = %url, "Upstream did not answer in time");
            let _ = tx.send(network_error(&stalled())).await;
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = timeout(read_timeout, response.text())
            .await
            .ok()
            .and_then(Result::ok)
            .unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "Upstream rejected request");
        let _ = tx.send(api_error(status.as_u16(), &body)).await;
        return;
    }

    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();
    let mut deltas = 0usize;

    loop {
        let item = match timeout(read_timeout, body.next()).await {
            Ok(Some(item)) => item,
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(deltas, "Upstream stream stalled");
                let _ = tx.send(network_error(&stalled())).await;
                return;
            }
        };
        match item {
            Ok(bytes) => {
                for delta in decoder.push(&bytes) {
                    if tx.send(delta).await.is_err() {
                        tracing::debug!(deltas, "Receiver dropped, abandoning upstream stream");
                        return;
                    }
                    deltas += 1;
                }
                if decoder.is_done() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, deltas, "Upstream stream broke");
                let _ = tx.send(network_error(&e)).await;
                return;
            }
        }
    }

    if let Some(delta) = decoder.finish() {
        let _ = tx.send(delta).await;
        deltas += 1;
    }
    tracing::debug!(deltas, "Upstream stream finished");
}

#[async_trait]
impl GenerationService for UpstreamGenerator {
    async fn generate(&self, request: GenerateRequest) -> Result<TextStream, ServiceError> {
        tracing::info!(template = %request.template_type, "Requesting generation");
        Ok(self.stream_prompt(build_prompt(&request)))
    }

    async fn rewrite(&self, request: RewriteRequest) -> Result<TextStream, ServiceError> {
        tracing::info!(command = %request.command, chars = request.text.chars().count(), "Requesting rewrite");
        Ok(self.stream_prompt(rewrite_prompt(&request)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_yields_config_sentinel() {
        let generator = UpstreamGenerator::new(GatewayConfig::default()).unwrap();
        let chunks: Vec<_> = generator
            .generate(GenerateRequest::default())
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(chunks, vec![Ok(config_error())]);
    }

    #[test]
    fn test_sentinel_formats() {
        assert_eq!(api_error(401, "bad key"), "\n[API Error: 401 - bad key]");
        assert_eq!(network_error(&"refused"), "\n[Network Error: refused]");
        assert!(config_error().contains("[Config Error"));
    }
}
