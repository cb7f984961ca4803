//! The per-request relay flow.
//!
//! upload (optional) → assemble → invoke → extract → append
//!
//! A `Relay` holds no per-request state; one instance is shared by every
//! request the gateway serves. Each remote call is bounded by the configured
//! timeout so a stalled upstream cannot hold a request open.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::assembler::{AssemblyInput, ConversationAssembler};
use crate::envelope::extract_reply;
use crate::error::{ProviderError, Result};
use crate::message::{Conversation, reply_or_fallback};
use crate::prompt::FileHandle;
use crate::provider::{CompletionBackend, FileStore, UploadDocument};

/// Result of one relayed turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    /// Reply text, with the fallback literal substituted when empty.
    pub reply: String,
    /// The caller's conversation plus the assistant turn.
    pub conversation: Conversation,
}

pub struct Relay {
    backend: Arc<dyn CompletionBackend>,
    store: Arc<dyn FileStore>,
    call_timeout: Duration,
    upload_purpose: String,
}

impl Relay {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        store: Arc<dyn FileStore>,
        call_timeout: Duration,
        upload_purpose: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            store,
            call_timeout,
            upload_purpose: upload_purpose.into(),
        }
    }

    /// Push a document to the file store.
    pub async fn upload(&self, document: UploadDocument) -> Result<FileHandle> {
        info!(
            filename = %document.filename,
            mime = %document.mime_type,
            bytes = document.bytes.len(),
            "Uploading document"
        );

        let handle = self
            .bounded(self.store.upload(document, &self.upload_purpose))
            .await
            .inspect_err(|e| warn!(error = %e, "Document upload failed"))?;

        debug!(file_id = %handle, "Document stored");
        Ok(handle)
    }

    /// Run one conversational turn against the completion backend.
    #[tracing::instrument(
        name = "turn",
        skip_all,
        fields(model = %model, turns = input.conversation.len())
    )]
    pub async fn run_turn(
        &self,
        assembler: &ConversationAssembler,
        model: &str,
        input: AssemblyInput<'_>,
    ) -> Result<TurnOutcome> {
        let prompt = assembler.assemble(&input)?;

        info!(
            backend = %self.backend.name(),
            blocks = prompt.len(),
            grounded = input.file.is_some(),
            "Relaying turn"
        );

        let envelope = self
            .bounded(self.backend.invoke(model, &prompt))
            .await
            .inspect_err(|e| warn!(error = %e, "Completion call failed"))?;

        let text = extract_reply(&envelope);
        if text.is_empty() {
            warn!(model = %model, "No reply text in completion response");
        }

        Ok(TurnOutcome {
            reply: reply_or_fallback(&text).to_string(),
            conversation: input.conversation.append_reply(&text),
        })
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = std::result::Result<T, ProviderError>>,
    ) -> std::result::Result<T, ProviderError> {
        tokio::time::timeout(self.call_timeout, call)
            .await
            .map_err(|_| {
                ProviderError::Transport(format!("no response within {:?}", self.call_timeout))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::AssemblerConfig;
    use crate::envelope::ResponseEnvelope;
    use crate::error::Error;
    use crate::message::{ConversationTurn, FALLBACK_REPLY, Role};
    use crate::prompt::{Part, PromptInput};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns a scripted result and records every prompt it sees.
    struct ScriptedBackend {
        result: std::result::Result<ResponseEnvelope, ProviderError>,
        prompts: Mutex<Vec<PromptInput>>,
    }

    impl ScriptedBackend {
        fn new(result: std::result::Result<ResponseEnvelope, ProviderError>) -> Arc<Self> {
            Arc::new(Self {
                result,
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn invoke(
            &self,
            _model: &str,
            prompt: &PromptInput,
        ) -> std::result::Result<ResponseEnvelope, ProviderError> {
            self.prompts.lock().unwrap().push(prompt.clone());
            self.result.clone()
        }
    }

    /// Never answers.
    struct StalledBackend;

    #[async_trait]
    impl CompletionBackend for StalledBackend {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn invoke(
            &self,
            _model: &str,
            _prompt: &PromptInput,
        ) -> std::result::Result<ResponseEnvelope, ProviderError> {
            std::future::pending().await
        }
    }

    struct FixedStore {
        result: std::result::Result<FileHandle, ProviderError>,
    }

    #[async_trait]
    impl FileStore for FixedStore {
        async fn upload(
            &self,
            _document: UploadDocument,
            purpose: &str,
        ) -> std::result::Result<FileHandle, ProviderError> {
            assert_eq!(purpose, "user_data");
            self.result.clone()
        }
    }

    fn store_ok() -> Arc<FixedStore> {
        Arc::new(FixedStore {
            result: Ok(FileHandle::new("file-123")),
        })
    }

    fn relay(backend: Arc<dyn CompletionBackend>, store: Arc<dyn FileStore>) -> Relay {
        Relay::new(backend, store, Duration::from_secs(5), "user_data")
    }

    fn assembler() -> ConversationAssembler {
        ConversationAssembler::new(AssemblerConfig {
            system_prompt: "Be helpful.".into(),
            max_reply_words: 80,
        })
    }

    fn question() -> Conversation {
        vec![ConversationTurn::user("Is this meal balanced?")]
            .into_iter()
            .collect()
    }

    #[tokio::test]
    async fn turn_appends_extracted_reply() {
        let backend = ScriptedBackend::new(Ok(ResponseEnvelope::flat("Mostly, add greens.")));
        let relay = relay(backend.clone(), store_ok());
        let conv = question();

        let outcome = relay
            .run_turn(&assembler(), "gpt-4o-mini", AssemblyInput::new(&conv))
            .await
            .unwrap();

        assert_eq!(outcome.reply, "Mostly, add greens.");
        assert_eq!(outcome.conversation.len(), 2);
        assert_eq!(outcome.conversation.turns()[1].role(), Role::Assistant);
        assert_eq!(conv.len(), 1);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn extraction_miss_uses_fallback() {
        let backend = ScriptedBackend::new(Ok(ResponseEnvelope::default()));
        let relay = relay(backend, store_ok());
        let conv = question();

        let outcome = relay
            .run_turn(&assembler(), "gpt-4o-mini", AssemblyInput::new(&conv))
            .await
            .unwrap();

        assert_eq!(outcome.reply, FALLBACK_REPLY);
        assert_eq!(outcome.conversation.turns()[1].content(), FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn grounded_turn_sends_file_reference() {
        let backend = ScriptedBackend::new(Ok(ResponseEnvelope::flat("Page 2 says so.")));
        let relay = relay(backend.clone(), store_ok());
        let conv = question();
        let handle = FileHandle::new("file-123");

        relay
            .run_turn(
                &assembler(),
                "gpt-4o-mini",
                AssemblyInput::new(&conv).with_file(Some(&handle)),
            )
            .await
            .unwrap();

        let prompts = backend.prompts.lock().unwrap();
        assert_eq!(prompts[0].file_refs(), vec![&handle]);
        assert!(matches!(prompts[0].blocks[1].parts[1], Part::FileRef(_)));
    }

    #[tokio::test]
    async fn assembly_failure_skips_remote_call() {
        let backend = ScriptedBackend::new(Ok(ResponseEnvelope::flat("unused")));
        let relay = relay(backend.clone(), store_ok());
        let conv = Conversation::new();
        let handle = FileHandle::new("file-123");

        let err = relay
            .run_turn(
                &assembler(),
                "gpt-4o-mini",
                AssemblyInput::new(&conv).with_file(Some(&handle)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Assembly(_)));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn upstream_error_propagates() {
        let backend = ScriptedBackend::new(Err(ProviderError::Upstream {
            status: 429,
            body_snippet: "slow down".into(),
        }));
        let relay = relay(backend, store_ok());
        let conv = question();

        let err = relay
            .run_turn(&assembler(), "gpt-4o-mini", AssemblyInput::new(&conv))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Provider(ProviderError::Upstream { status: 429, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_backend_times_out_as_transport_error() {
        let relay = relay(Arc::new(StalledBackend), store_ok());
        let conv = question();

        let err = relay
            .run_turn(&assembler(), "gpt-4o-mini", AssemblyInput::new(&conv))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Provider(ProviderError::Transport(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn sub_second_timeout_is_reported_precisely() {
        let relay = Relay::new(
            Arc::new(StalledBackend),
            store_ok(),
            Duration::from_millis(250),
            "user_data",
        );
        let conv = question();

        let err = relay
            .run_turn(&assembler(), "gpt-4o-mini", AssemblyInput::new(&conv))
            .await
            .unwrap_err();

        match err {
            Error::Provider(ProviderError::Transport(reason)) => {
                assert_eq!(reason, "no response within 250ms");
            }
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn upload_returns_handle() {
        let relay = relay(ScriptedBackend::new(Ok(ResponseEnvelope::default())), store_ok());
        let handle = relay
            .upload(UploadDocument::new(None, None, b"%PDF-1.4".to_vec()))
            .await
            .unwrap();
        assert_eq!(handle.as_str(), "file-123");
    }

    #[tokio::test]
    async fn upload_error_propagates() {
        let store = Arc::new(FixedStore {
            result: Err(ProviderError::Upload {
                status: 413,
                body_snippet: "too large".into(),
            }),
        });
        let relay = relay(ScriptedBackend::new(Ok(ResponseEnvelope::default())), store);

        let err = relay
            .upload(UploadDocument::new(None, None, vec![0; 16]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Provider(ProviderError::Upload { status: 413, .. })
        ));
    }
}
