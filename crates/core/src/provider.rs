//! Remote collaborator traits — the completion API and the file store.
//!
//! The relay calls `invoke()` and `upload()` without knowing which backend
//! sits behind them. Implementations live in `surveychat-providers`; tests
//! use in-memory mocks.

use async_trait::async_trait;

use crate::envelope::ResponseEnvelope;
use crate::error::ProviderError;
use crate::prompt::{FileHandle, PromptInput};

/// A document submitted by the caller, buffered for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadDocument {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadDocument {
    pub const DEFAULT_FILENAME: &'static str = "upload.pdf";
    pub const DEFAULT_MIME_TYPE: &'static str = "application/pdf";

    pub fn new(filename: Option<String>, mime_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| Self::DEFAULT_FILENAME.into()),
            mime_type: mime_type
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| Self::DEFAULT_MIME_TYPE.into()),
            bytes,
        }
    }
}

/// Sends a prompt to a completion endpoint.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// A human-readable name for logging.
    fn name(&self) -> &str;

    /// Run one completion. Called exactly once per turn.
    ///
    /// Non-success statuses are `ProviderError::Upstream`; anything that
    /// prevents a response from arriving is `ProviderError::Transport`.
    async fn invoke(
        &self,
        model: &str,
        prompt: &PromptInput,
    ) -> std::result::Result<ResponseEnvelope, ProviderError>;
}

/// Stores uploaded documents and hands back an opaque handle.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Upload a document tagged with `purpose`.
    ///
    /// Non-success statuses are `ProviderError::Upload`.
    async fn upload(
        &self,
        document: UploadDocument,
        purpose: &str,
    ) -> std::result::Result<FileHandle, ProviderError>;
}
