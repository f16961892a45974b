//! Ollama `/api/generate` client
//!
//! Blocking requests read one `{response}` object. Streaming requests read
//! newline-delimited JSON objects, each holding an optional `response`
//! fragment, until one carries `done: true`.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use super::{FragmentStream, GenerateError, GenerationOptions, Generator};
use crate::context::prompt::Prompt;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    options: &'a GenerationOptions,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    error: Option<String>,
}

/// One line of a streamed response
#[derive(Deserialize)]
struct StreamLine {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct OllamaGenerator {
    http: Client,
    base_url: String,
    model: String,
    options: GenerationOptions,
}

impl OllamaGenerator {
    pub fn new(base_url: &str, model: &str, options: GenerationOptions) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            options,
        }
    }

    /// Send the request; a non-success status is a backend error
    async fn send(&self, prompt: &Prompt, stream: bool) -> Result<Response, GenerateError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt: prompt.render(),
            options: &self.options,
            stream,
        };

        debug!(model = %self.model, stream = stream, "Sending generation request");
        let resp = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .timeout(self.options.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify(e, self.options.timeout))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!(status = %status, body = %text, "Ollama generate error");
            return Err(GenerateError::Backend(format!("{}: {}", status, text)));
        }

        Ok(resp)
    }
}

fn classify(e: reqwest::Error, timeout: Duration) -> GenerateError {
    if e.is_timeout() {
        GenerateError::Timeout(timeout)
    } else {
        GenerateError::Http(e.to_string())
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<String, GenerateError> {
        let resp = self.send(prompt, false).await?;
        let text = resp
            .text()
            .await
            .map_err(|e| classify(e, self.options.timeout))?;

        let body: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| GenerateError::Backend(format!("malformed response: {}", e)))?;
        if let Some(message) = body.error {
            return Err(GenerateError::Backend(message));
        }

        Ok(body.response.trim().to_string())
    }

    async fn generate_stream(&self, prompt: &Prompt) -> Result<FragmentStream, GenerateError> {
        let resp = self.send(prompt, true).await?;
        let timeout = self.options.timeout;
        let body = resp
            .bytes_stream()
            .map(move |chunk| chunk.map(|b| b.to_vec()).map_err(|e| classify(e, timeout)))
            .boxed();

        let state = LineReader {
            body,
            buf: Vec::new(),
            finished: false,
        };
        Ok(stream::try_unfold(state, next_fragment).boxed())
    }
}

/// Splits a byte stream into lines, holding at most one partial line
struct LineReader {
    body: BoxStream<'static, Result<Vec<u8>, GenerateError>>,
    buf: Vec<u8>,
    finished: bool,
}

async fn next_fragment(
    mut reader: LineReader,
) -> Result<Option<(String, LineReader)>, GenerateError> {
    loop {
        if reader.finished {
            return Ok(None);
        }

        let line = match reader.buf.iter().position(|b| *b == b'\n') {
            Some(pos) => reader.buf.drain(..=pos).collect::<Vec<u8>>(),
            None => match reader.body.next().await {
                Some(chunk) => {
                    reader.buf.extend_from_slice(&chunk?);
                    continue;
                }
                None => {
                    reader.finished = true;
                    std::mem::take(&mut reader.buf)
                }
            },
        };

        let line = line.trim_ascii();
        if line.is_empty() {
            continue;
        }

        // from_slice rejects invalid UTF-8 instead of replacing it
        let parsed: StreamLine = serde_json::from_slice(line)
            .map_err(|e| GenerateError::Backend(format!("malformed stream line: {}", e)))?;
        if let Some(message) = parsed.error {
            return Err(GenerateError::Backend(message));
        }
        if parsed.done {
            reader.finished = true;
        }

        match parsed.response {
            Some(fragment) if !fragment.is_empty() => return Ok(Some((fragment, reader))),
            _ => continue,
        }
    }
}
