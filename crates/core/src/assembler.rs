//! Prompt assembly — turns a caller's history into [`PromptInput`].
//!
//! Layout of the assembled prompt:
//!
//! 1. **System** — configured instructions plus the reply length limit, and
//!    the participant's earlier survey answers when supplied
//! 2. **History** — one block per turn, same role, same order
//! 3. **Opening** — a synthesized user block, only when an opening prompt is
//!    requested and the history has no user turn yet
//!
//! A file reference, when present, is attached to the last user block.
//!
//! Assembly is deterministic: identical inputs always produce identical
//! prompts.

use crate::error::AssemblyError;
use crate::message::{Conversation, Role};
use crate::prompt::{Block, FileHandle, Part, PromptInput};

// ── Types ─────────────────────────────────────────────────────────────────

/// Instructions for one endpoint.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Instruction text placed in the system block.
    pub system_prompt: String,
    /// Upper bound on reply length communicated to the model.
    pub max_reply_words: u32,
}

/// All inputs required by the assembler for a single completion call.
#[derive(Debug, Clone, Copy)]
pub struct AssemblyInput<'a> {
    /// Caller-supplied history.
    pub conversation: &'a Conversation,
    /// Document to ground the reply in.
    pub file: Option<&'a FileHandle>,
    /// Earlier survey answers, as a JSON object.
    pub survey_context: Option<&'a serde_json::Value>,
    /// User text to synthesize when nobody has asked anything yet.
    pub opening_prompt: Option<&'a str>,
}

impl<'a> AssemblyInput<'a> {
    pub fn new(conversation: &'a Conversation) -> Self {
        Self {
            conversation,
            file: None,
            survey_context: None,
            opening_prompt: None,
        }
    }

    pub fn with_file(mut self, file: Option<&'a FileHandle>) -> Self {
        self.file = file;
        self
    }

    pub fn with_survey_context(mut self, context: Option<&'a serde_json::Value>) -> Self {
        self.survey_context = context;
        self
    }

    pub fn with_opening_prompt(mut self, prompt: Option<&'a str>) -> Self {
        self.opening_prompt = prompt;
        self
    }
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// The conversation assembler. Stateless — create one and reuse it.
#[derive(Debug, Clone)]
pub struct ConversationAssembler {
    config: AssemblerConfig,
}

impl ConversationAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self { config }
    }

    /// Assemble the prompt.
    ///
    /// Fails with [`AssemblyError::NoUserTurn`] when a file is supplied but
    /// no user block exists to carry it.
    pub fn assemble(&self, input: &AssemblyInput<'_>) -> Result<PromptInput, AssemblyError> {
        let mut blocks = Vec::with_capacity(input.conversation.len() + 2);
        blocks.push(self.system_block(input.survey_context));

        blocks.extend(
            input
                .conversation
                .turns()
                .iter()
                .map(|turn| Block::text(turn.role(), turn.content())),
        );

        if let Some(opening) = input.opening_prompt {
            if !input.conversation.has_user_turn() {
                blocks.push(Block::text(Role::User, opening));
            }
        }

        if let Some(handle) = input.file {
            let target = blocks
                .iter_mut()
                .skip(1)
                .rev()
                .find(|b| b.role == Role::User)
                .ok_or(AssemblyError::NoUserTurn)?;
            target.parts.push(Part::FileRef(handle.clone()));
        }

        Ok(PromptInput { blocks })
    }

    fn system_block(&self, survey_context: Option<&serde_json::Value>) -> Block {
        let mut block = Block::text(
            Role::System,
            format!(
                "{} Keep replies to at most {} words.",
                self.config.system_prompt.trim_end(),
                self.config.max_reply_words
            ),
        );

        if let Some(serde_json::Value::Object(answers)) = survey_context {
            if !answers.is_empty() {
                let rendered = serde_json::Value::Object(answers.clone()).to_string();
                block.parts.push(Part::Text(format!("Earlier answers: {rendered}")));
            }
        }

        block
    }
}
