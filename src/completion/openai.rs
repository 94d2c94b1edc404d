use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::{build_prompt, TextCompleter, TextStream};
use crate::config::CompletionConfig;
use crate::error::{RelayError, Result};

/// Chat-completions client for the text endpoints
pub struct OpenAiCompleter {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// One line of a server-sent event stream
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Delta(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> Result<SseLine> {
    let Some(data) = line.trim_end_matches('\r').strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }

    let chunk: StreamChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|s| !s.is_empty())
        .map(SseLine::Delta)
        .unwrap_or(SseLine::Skip))
}

impl OpenAiCompleter {
    pub fn new(config: &CompletionConfig, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn post(&self, text: &str, prompt: &str, model: &str, stream: bool) -> Result<reqwest::Response> {
        let body = json!({
            "model": model,
            "messages": [
                { "role": "user", "content": build_prompt(prompt, text) }
            ],
            "stream": stream,
        });

        info!("Requesting completion from {} (stream: {})", model, stream);
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Completion(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(RelayError::Completion(format!(
                "completion request failed with {}: {}",
                status, detail
            )));
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl TextCompleter for OpenAiCompleter {
    async fn complete(&self, text: &str, prompt: &str, model: &str) -> Result<String> {
        let response = self.post(text, prompt, model, false).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RelayError::Completion(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RelayError::Completion("completion returned no content".to_string()))
    }

    async fn complete_stream(&self, text: &str, prompt: &str, model: &str) -> Result<TextStream> {
        let response = self.post(text, prompt, model, true).await?;
        let bytes = Box::pin(response.bytes_stream());

        // State: byte stream, partial-line buffer, whether [DONE] was seen
        let stream = futures::stream::unfold(
            (bytes, Vec::<u8>::new(), false),
            |(mut bytes, mut buffer, mut done)| async move {
                loop {
                    if done {
                        return None;
                    }

                    if let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = buffer.drain(..=pos).collect();
                        let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
                        match parse_sse_line(&line) {
                            Ok(SseLine::Delta(delta)) => {
                                return Some((Ok(delta), (bytes, buffer, done)))
                            }
                            Ok(SseLine::Done) => {
                                debug!("Completion stream finished");
                                done = true;
                            }
                            Ok(SseLine::Skip) => {}
                            Err(e) => {
                                done = true;
                                return Some((Err(e), (bytes, buffer, done)));
                            }
                        }
                        continue;
                    }

                    match bytes.next().await {
                        Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                        Some(Err(e)) => {
                            done = true;
                            return Some((
                                Err(RelayError::Completion(e.to_string())),
                                (bytes, buffer, done),
                            ));
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delta_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), SseLine::Delta("Hello".to_string()));
    }

    #[test]
    fn test_parse_done_and_noise() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseLine::Done);
        assert_eq!(parse_sse_line("").unwrap(), SseLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseLine::Skip);
        let role_only = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(role_only).unwrap(), SseLine::Skip);
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(parse_sse_line("data: {oops").is_err());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let mut config = crate::config::Config::default().completion;
        config.base_url = "http://localhost:9999/v1/".to_string();
        let completer = OpenAiCompleter::new(&config, "key".to_string());
        assert_eq!(completer.base_url, "http://localhost:9999/v1");
    }
}
