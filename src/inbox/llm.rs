use anyhow::{bail, Context as _, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// A text generation model that streams its output piece by piece
#[allow(async_fn_in_trait)]
pub trait Llm {
    /// Calls `on_piece` for each streamed piece and returns the whole output
    async fn generate(&self, prompt: &str, on_piece: &mut dyn FnMut(&str)) -> Result<String>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

pub struct OllamaClient {
    client: Client,
    host: String,
    model: String,
}

impl OllamaClient {
    pub fn new(host: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            host: host.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Host from `OLLAMA_HOST`, falling back to the local default
    pub fn from_env(model: &str) -> Self {
        let host =
            std::env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string());
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("http://{host}")
        };
        Self::new(&host, model)
    }
}

impl Llm for OllamaClient {
    async fn generate(&self, prompt: &str, on_piece: &mut dyn FnMut(&str)) -> Result<String> {
        let url = format!("{}/api/generate", self.host);
        log::debug!("POST {url}");
        let mut response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: true,
            })
            .send()
            .await
            .with_context(|| format!("Failed to reach Ollama at {}", self.host))?;
        if !response.status().is_success() {
            let status = response.status();
            let content = response.text().await.unwrap_or_default();
            bail!("Ollama returned status {status}: {content}");
        }

        let mut output = String::new();
        let mut buffer: Vec<u8> = Vec::new();
        let mut done = false;
        while let Some(chunk) = response.chunk().await? {
            buffer.extend_from_slice(&chunk);
            while let Some(newline) = buffer.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                done |= handle_line(&line, &mut output, on_piece)?;
            }
        }
        if !buffer.is_empty() {
            done |= handle_line(&buffer, &mut output, on_piece)?;
        }
        if !done {
            log::warn!("Ollama stream ended without a done message");
        }
        Ok(output)
    }
}

/// Returns whether the chunk marks the end of the stream
fn handle_line(line: &[u8], output: &mut String, on_piece: &mut dyn FnMut(&str)) -> Result<bool> {
    let line = std::str::from_utf8(line)
        .context("Ollama returned invalid UTF-8")?
        .trim();
    if line.is_empty() {
        return Ok(false);
    }
    let chunk: GenerateChunk = serde_json::from_str(line)
        .with_context(|| format!("Failed to parse Ollama response {line:?}"))?;
    if let Some(error) = chunk.error {
        bail!("Ollama failed with error: {error}");
    }
    if !chunk.response.is_empty() {
        on_piece(&chunk.response);
        output.push_str(&chunk.response);
    }
    Ok(chunk.done)
}
