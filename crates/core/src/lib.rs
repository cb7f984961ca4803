//! # SurveyChat Core
//!
//! Domain types and the request-orchestration logic for relaying a survey
//! participant's chat to a hosted language model. This crate has **no HTTP
//! dependencies**: the completion API and the file store are traits, and
//! their reqwest implementations live in `surveychat-providers`.
//!
//! ## Flow
//!
//! upload (optional) → [`ConversationAssembler`] → [`CompletionBackend`] →
//! [`extract_reply`] → [`Conversation::append_reply`]

pub mod assembler;
pub mod envelope;
pub mod error;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod relay;

// Re-export key types at crate root for ergonomics
pub use assembler::{AssemblerConfig, AssemblyInput, ConversationAssembler};
pub use envelope::{ResponseEnvelope, extract_reply};
pub use error::{AssemblyError, Error, ProviderError, Result};
pub use message::{Conversation, ConversationTurn, FALLBACK_REPLY, Role};
pub use prompt::{Block, FileHandle, Part, PromptInput};
pub use provider::{CompletionBackend, FileStore, UploadDocument};
pub use relay::{Relay, TurnOutcome};
