//! Upstream model access: the `ChatModel` seam and its Gemini implementation.

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use positron_types::models::{Message, Role};
use positron_types::sse::EventLineBuffer;

use crate::persona::{SYSTEM_PROMPT, THINKING_BUDGET};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Reply text fragments in arrival order.
pub type TextStream = BoxStream<'static, Result<String, UpstreamError>>;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed stream chunk: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("response blocked: {0}")]
    Blocked(String),
}

/// A hosted chat model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Open a session seeded with `history`, send `prompt` as the next user
    /// turn and stream the reply. Resolves once the upstream accepted the
    /// request; later failures arrive as stream items.
    async fn stream_reply(&self, history: &[Message], prompt: &str)
    -> Result<TextStream, UpstreamError>;
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

// -- Wire types --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: SystemInstruction<'a>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: Role,
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

impl GeminiClient {
    pub fn new(http: Client, config: GeminiConfig) -> Self {
        Self { http, config }
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

/// Prior turns followed by the new user prompt. Message ids stay local.
fn request_body<'a>(history: &'a [Message], prompt: &'a str) -> GenerateContentRequest<'a> {
    let mut contents: Vec<Content<'a>> = history
        .iter()
        .map(|m| Content {
            role: m.role,
            parts: m.parts.iter().map(|p| TextPart { text: &p.text }).collect(),
        })
        .collect();
    contents.push(Content {
        role: Role::User,
        parts: vec![TextPart { text: prompt }],
    });

    GenerateContentRequest {
        contents,
        system_instruction: SystemInstruction {
            parts: [TextPart { text: SYSTEM_PROMPT }],
        },
        generation_config: GenerationConfig {
            thinking_config: ThinkingConfig {
                thinking_budget: THINKING_BUDGET,
            },
        },
    }
}

/// Visible text of one streamed response chunk, or None for chunks that
/// carry only metadata.
fn chunk_text(data: &str) -> Result<Option<String>, UpstreamError> {
    let resp: GenerateContentResponse = serde_json::from_str(data)?;

    if let Some(err) = resp.error {
        return Err(UpstreamError::Api {
            status: err.code.unwrap_or(500),
            message: err.message,
        });
    }
    if let Some(reason) = resp.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(UpstreamError::Blocked(reason));
    }

    let text: String = resp
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| {
            c.parts
                .into_iter()
                .filter(|p| !p.thought)
                .filter_map(|p| p.text)
                .collect()
        })
        .unwrap_or_default();

    Ok((!text.is_empty()).then_some(text))
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn stream_reply(
        &self,
        history: &[Message],
        prompt: &str,
    ) -> Result<TextStream, UpstreamError> {
        info!(model = %self.config.model, turns = history.len() + 1, "Gemini stream request");

        let resp = self
            .http
            .post(self.stream_url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request_body(history, prompt))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            error!("Gemini error {}: {}", status, body.chars().take(500).collect::<String>());
            return Err(UpstreamError::Api {
                status,
                message: body.chars().take(200).collect(),
            });
        }

        let mut bytes = resp.bytes_stream();
        let stream = async_stream::stream! {
            let mut lines = EventLineBuffer::new();
            let mut done = false;
            while !done {
                let pending = match bytes.next().await {
                    Some(Ok(chunk)) => lines.push(&chunk),
                    Some(Err(e)) => {
                        yield Err(UpstreamError::from(e));
                        break;
                    }
                    None => {
                        done = true;
                        lines.finish().into_iter().collect()
                    }
                };
                for data in pending {
                    match chunk_text(&data) {
                        Ok(Some(text)) => {
                            yield Ok(text);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            done = true;
                            break;
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
