//! Telegram update handlers.
//!
//! Conversion from teloxide types happens here; all decisions are made by the core
//! `ChatService`.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use wallrelay_core::{
    domain::{ChatId, UserId},
    messaging::types::IncomingText,
};

use crate::router::AppState;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(incoming) = incoming_text(&msg) else {
        tracing::debug!(chat_id = msg.chat.id.0, "ignoring non-text message");
        return Ok(());
    };
    state.service.handle_text(&incoming).await;
    Ok(())
}

fn incoming_text(msg: &Message) -> Option<IncomingText> {
    let text = msg.text()?;
    let from = msg.from()?;
    Some(IncomingText {
        chat_id: ChatId(msg.chat.id.0),
        user_id: UserId(from.id.0 as i64),
        username: from.username.clone(),
        first_name: from.first_name.clone(),
        text: text.to_string(),
    })
}
