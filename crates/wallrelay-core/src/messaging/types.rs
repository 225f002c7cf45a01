use crate::domain::{ChatId, UserId};

/// Outgoing "chat action" shown while a reply is being prepared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
    UploadDocument,
}

/// A file attachment built in memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub caption: Option<String>,
}

impl OutgoingDocument {
    pub fn text(file_name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: body.into().into_bytes(),
            caption: None,
        }
    }
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_html: bool,
    pub supports_documents: bool,
    pub max_message_len: usize,
}

/// An incoming text message, already stripped of Telegram-specific shapes.
#[derive(Clone, Debug)]
pub struct IncomingText {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    pub first_name: String,
    pub text: String,
}
