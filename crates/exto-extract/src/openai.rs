//! HTTP client for an OpenAI-compatible provider.
//!
//! Image and text requests go to `/chat/completions`. Requests carrying an
//! inline file (PDF) go to `/responses`, which accepts `input_file` parts.
//! Calls are not retried: a failed round-trip aborts the caller's scan.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::ExtractionConfig;
use crate::error::{ExtractError, ExtractResult};
use crate::model::{CompletionModel, CompletionRequest, ContentPart};

// -----------------------------------------------------------------------
// Chat completions wire format
// -----------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: ChatContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ChatContent<'a> {
    Text(&'a str),
    Parts(Vec<ChatPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChatPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
    detail: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

// -----------------------------------------------------------------------
// Responses wire format
// -----------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<ResponsesInput<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ResponsesInput<'a> {
    role: &'static str,
    content: Vec<ResponsesPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponsesPart<'a> {
    InputText { text: &'a str },
    InputImage { image_url: &'a str },
    InputFile { filename: &'a str, file_data: &'a str },
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<ResponsesOutput>,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutput {
    #[serde(default)]
    content: Vec<ResponsesOutputPart>,
}

#[derive(Debug, Deserialize)]
struct ResponsesOutputPart {
    #[serde(default)]
    text: Option<String>,
}

impl ResponsesResponse {
    fn text(self) -> Option<String> {
        self.output_text.filter(|t| !t.is_empty()).or_else(|| {
            self.output
                .into_iter()
                .next()
                .and_then(|o| o.content.into_iter().next())
                .and_then(|p| p.text)
        })
    }
}

// -----------------------------------------------------------------------
// Client
// -----------------------------------------------------------------------

/// [`CompletionModel`] backed by an OpenAI-compatible HTTP API.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(config: &ExtractionConfig) -> ExtractResult<Self> {
        if !config.is_configured() {
            return Err(ExtractError::Config("missing API key".into()));
        }

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| ExtractError::Config(format!("invalid API key header: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ExtractError::Config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> ExtractResult<String> {
        let url = format!("{}/{path}", self.base_url);
        let resp = self.http.post(&url).json(body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ExtractError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    async fn chat(&self, request: &CompletionRequest) -> ExtractResult<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: ChatContent::Text(system),
            });
        }

        let mut parts = Vec::with_capacity(request.user.len());
        for part in &request.user {
            parts.push(match part {
                ContentPart::Text(text) => ChatPart::Text { text },
                ContentPart::ImageUrl(url) => ChatPart::ImageUrl {
                    image_url: ImageUrl { url, detail: "auto" },
                },
                ContentPart::File { .. } => {
                    return Err(ExtractError::Request(
                        "file parts require the responses endpoint".into(),
                    ));
                }
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: ChatContent::Parts(parts),
        });

        let body = ChatRequest {
            model: &request.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };
        let raw = self.post("chat/completions", &body).await?;
        let reply: ChatResponse = serde_json::from_str(&raw)
            .map_err(|e| ExtractError::MalformedReply(format!("chat response: {e}")))?;

        reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or(ExtractError::EmptyReply)
    }

    async fn respond(&self, request: &CompletionRequest) -> ExtractResult<String> {
        let mut input = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            input.push(ResponsesInput {
                role: "system",
                content: vec![ResponsesPart::InputText { text: system }],
            });
        }
        input.push(ResponsesInput {
            role: "user",
            content: request
                .user
                .iter()
                .map(|part| match part {
                    ContentPart::Text(text) => ResponsesPart::InputText { text },
                    ContentPart::ImageUrl(url) => ResponsesPart::InputImage { image_url: url },
                    ContentPart::File { filename, data_url } => ResponsesPart::InputFile {
                        filename,
                        file_data: data_url,
                    },
                })
                .collect(),
        });

        let body = ResponsesRequest {
            model: &request.model,
            input,
            max_output_tokens: request.max_tokens,
            temperature: request.temperature,
        };
        let raw = self.post("responses", &body).await?;
        let reply: ResponsesResponse = serde_json::from_str(&raw)
            .map_err(|e| ExtractError::MalformedReply(format!("responses payload: {e}")))?;

        reply
            .text()
            .filter(|t| !t.is_empty())
            .ok_or(ExtractError::EmptyReply)
    }
}

impl CompletionModel for OpenAiClient {
    #[instrument(name = "model_complete", skip_all, fields(model = %request.model))]
    async fn complete(&self, request: CompletionRequest) -> ExtractResult<String> {
        let reply = if request.has_file() {
            self.respond(&request).await?
        } else {
            self.chat(&request).await?
        };
        debug!(chars = reply.len(), "Model reply received");
        Ok(reply)
    }
}
