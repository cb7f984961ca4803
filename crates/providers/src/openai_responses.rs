//! OpenAI Responses API provider.
//!
//! Implements both remote collaborators against an OpenAI-style API:
//! - `CompletionBackend` via `POST {base_url}/responses`
//! - `FileStore` via `POST {base_url}/files` (multipart)
//!
//! One HTTP call per operation, no retries. Every failure comes back as a
//! `ProviderError`; bodies of failed calls are truncated before they leave
//! this module.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use surveychat_core::envelope::ResponseEnvelope;
use surveychat_core::error::{ProviderError, body_snippet};
use surveychat_core::message::Role;
use surveychat_core::prompt::{FileHandle, Part, PromptInput};
use surveychat_core::provider::{CompletionBackend, FileStore, UploadDocument};
use tracing::{debug, warn};

/// A provider speaking the OpenAI Responses + Files APIs.
pub struct OpenAiResponsesProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiResponsesProvider {
    /// Create a provider. `timeout` bounds each HTTP call end to end.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Self::new("openai", "https://api.openai.com/v1", api_key, timeout)
    }

    /// Build from application configuration.
    pub fn from_config(config: &surveychat_config::AppConfig) -> Result<Self, ProviderError> {
        Self::new(
            "openai",
            &config.api_base_url,
            config.api_key.clone().unwrap_or_default(),
            config.request_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert a prompt to Responses API `input` items.
    fn to_api_input(prompt: &PromptInput) -> Vec<ApiInputMessage> {
        prompt
            .blocks
            .iter()
            .map(|block| ApiInputMessage {
                role: block.role.as_str(),
                content: block
                    .parts
                    .iter()
                    .map(|part| match part {
                        Part::Text(text) if block.role == Role::Assistant => {
                            ApiContentPart::OutputText { text: text.clone() }
                        }
                        Part::Text(text) => ApiContentPart::InputText { text: text.clone() },
                        Part::FileRef(handle) => ApiContentPart::InputFile {
                            file_id: handle.as_str().to_string(),
                        },
                    })
                    .collect(),
            })
            .collect()
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Transport(format!("request timed out: {e}"))
    } else {
        ProviderError::Transport(e.to_string())
    }
}

#[async_trait]
impl CompletionBackend for OpenAiResponsesProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        model: &str,
        prompt: &PromptInput,
    ) -> std::result::Result<ResponseEnvelope, ProviderError> {
        let url = format!("{}/responses", self.base_url);
        let body = ApiRequest {
            model,
            input: Self::to_api_input(prompt),
        };

        debug!(provider = %self.name, model = %model, blocks = prompt.len(), "Sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let raw = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            let body_snippet = body_snippet(&raw);
            warn!(status = status.as_u16(), body = %body_snippet, "Completion endpoint returned error");
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                body_snippet,
            });
        }

        Ok(ResponseEnvelope::parse(&raw))
    }
}

#[async_trait]
impl FileStore for OpenAiResponsesProvider {
    async fn upload(
        &self,
        document: UploadDocument,
        purpose: &str,
    ) -> std::result::Result<FileHandle, ProviderError> {
        let url = format!("{}/files", self.base_url);
        let UploadDocument {
            filename,
            mime_type,
            bytes,
        } = document;

        let file_part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename)
            .mime_str(&mime_type)
            .map_err(|_| ProviderError::Upload {
                status: 400,
                body_snippet: body_snippet(&format!("invalid mime type: {mime_type}")),
            })?;

        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("purpose", purpose.to_string());

        debug!(provider = %self.name, purpose = %purpose, "Uploading file");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let raw = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            let body_snippet = body_snippet(&raw);
            warn!(status = status.as_u16(), body = %body_snippet, "File store returned error");
            return Err(ProviderError::Upload {
                status: status.as_u16(),
                body_snippet,
            });
        }

        let uploaded: ApiFileObject = serde_json::from_str(&raw).map_err(|e| {
            ProviderError::InvalidResponse(format!("file upload response has no id: {e}"))
        })?;

        if uploaded.id.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "file upload response has an empty id".into(),
            ));
        }

        Ok(FileHandle::new(uploaded.id))
    }
}

// --- Responses API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    input: Vec<ApiInputMessage>,
}

#[derive(Debug, Serialize)]
struct ApiInputMessage {
    role: &'static str,
    content: Vec<ApiContentPart>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentPart {
    InputText { text: String },
    OutputText { text: String },
    InputFile { file_id: String },
}

#[derive(Debug, Deserialize)]
struct ApiFileObject {
    id: String,
}
