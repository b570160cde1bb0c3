// Telegram webhook update payloads.
//
// Only the fields the relay reads are modelled; everything else in the update
// is ignored by serde. An update without non-empty text (stickers, joins,
// photos without caption) produces no Message and is just acknowledged.

use serde::Deserialize;

use crate::moderation::Message;

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TgMessage>,
    #[serde(default)]
    pub edited_message: Option<TgMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

impl User {
    /// Username if set, otherwise the numeric id.
    pub fn display_name(&self) -> String {
        match self.username.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.id.to_string(),
        }
    }
}

impl Update {
    /// The message to moderate, if any. A new message wins over an edit.
    pub fn into_message(self) -> Option<Message> {
        let msg = self.message.or(self.edited_message)?;
        let text = msg.text.filter(|t| !t.is_empty())?;
        let author = msg
            .from
            .as_ref()
            .map(User::display_name)
            .unwrap_or_else(|| "unknown".to_string());

        Some(Message {
            id: msg.message_id,
            chat_id: msg.chat.id,
            author,
            text,
        })
    }
}
