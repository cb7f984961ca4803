//! Error types for the SurveyChat domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant; the gateway maps them
//! to HTTP statuses at the boundary.

use thiserror::Error;

/// Maximum number of characters of an upstream body carried in errors.
pub const BODY_SNIPPET_CHARS: usize = 500;

/// The top-level error type for all SurveyChat operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Caller input ---
    #[error("{0}")]
    Validation(String),

    // --- Prompt assembly ---
    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    // --- Remote store / completion API ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    #[error("a file reference was supplied but the conversation has no user turn")]
    NoUserTurn,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The file store answered with a non-success status.
    #[error("File upload failed (status: {status})")]
    Upload { status: u16, body_snippet: String },

    /// The completion endpoint answered with a non-success status.
    #[error("Completion request failed (status: {status})")]
    Upstream { status: u16, body_snippet: String },

    /// The request never reached the remote, or no answer came back in time.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote answered 2xx but the payload is unusable.
    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),
}

/// Truncate an upstream body to at most [`BODY_SNIPPET_CHARS`] characters.
///
/// Counts `char`s, not bytes, so multi-byte text is never split.
pub fn body_snippet(body: &str) -> String {
    match body.char_indices().nth(BODY_SNIPPET_CHARS) {
        Some((cut, _)) => body[..cut].to_string(),
        None => body.to_string(),
    }
}
