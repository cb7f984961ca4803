//! Remote API clients for SurveyChat.
//!
//! All providers implement the `surveychat_core` collaborator traits
//! (`CompletionBackend`, `FileStore`).

pub mod openai_responses;

pub use openai_responses::OpenAiResponsesProvider;
