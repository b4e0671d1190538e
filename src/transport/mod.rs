//! Chat transport seam.
//!
//! Routers and handlers only see these DTOs and the [`ChatTransport`] trait, so the
//! dispatch pipeline can be driven without a live Telegram connection.

mod telegram;

pub use telegram::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::types::InlineKeyboardMarkup;

use crate::error::BotResult;

#[derive(Debug, Clone, PartialEq)]
pub struct Sender {
    pub id: u64,
    pub username: Option<String>,
    pub first_name: String,
}

#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub chat_id: i64,
    pub message_id: i32,
    pub is_private: bool,
    pub from: Option<Sender>,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub date: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn content(&self) -> Option<&str> {
        self.text.as_deref().or(self.caption.as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct CallbackOrigin {
    pub chat_id: i64,
    pub message_id: i32,
    pub is_private: bool,
}

#[derive(Debug, Clone)]
pub struct IncomingCallback {
    pub id: String,
    pub from: Option<Sender>,
    pub data: Option<String>,
    pub origin: Option<CallbackOrigin>,
}

#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub markup: Option<InlineKeyboardMarkup>,
    pub silent: bool,
}

impl SendOptions {
    pub fn markup(markup: InlineKeyboardMarkup) -> Self {
        Self {
            markup: Some(markup),
            silent: false,
        }
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync + 'static {
    /// Returns the id of the sent message.
    async fn send_text(&self, chat_id: i64, text: &str, options: SendOptions) -> BotResult<i32>;
    async fn send_photo(
        &self,
        chat_id: i64,
        photo: Vec<u8>,
        caption: Option<&str>,
        options: SendOptions,
    ) -> BotResult<i32>;
    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        markup: Option<InlineKeyboardMarkup>,
    ) -> BotResult<()>;
    async fn delete_message(&self, chat_id: i64, message_id: i32) -> BotResult<()>;
    async fn forward_message(&self, to_chat_id: i64, from_chat_id: i64, message_id: i32) -> BotResult<()>;
    async fn pin_message(&self, chat_id: i64, message_id: i32) -> BotResult<()>;
    async fn answer_callback(&self, callback_id: &str) -> BotResult<()>;
}
