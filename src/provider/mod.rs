pub mod huggingface;
pub mod openai;
pub mod stub;

#[cfg(test)]
pub mod testutil;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a conversation. Order is meaningful: system messages
/// carry instructions, later messages carry the exchange itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Provider interface.
///
/// A provider resolves a full conversation to one response string, hiding
/// transport differences, model fallback and transient-error retries. It
/// either returns a string (possibly empty: an empty completion is a valid
/// result) or an error; there is no silent third outcome.
pub trait Provider {
    fn name(&self) -> &'static str;

    fn send_chat(
        &self,
        messages: Vec<ChatMessage>,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<String>> + Send>,
    >;
}
