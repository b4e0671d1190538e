use std::sync::Arc;

use teloxide::types::InlineKeyboardMarkup;

use crate::{
    error::BotResult,
    router::RouteTable,
    service::{user::User, ServiceRegistry},
    transport::{ChatTransport, IncomingMessage, SendOptions},
};

/// Delivery modifiers parsed from trailing `-flag` tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mode {
    pub silent: bool,
    pub mention: bool,
    pub admin: bool,
    pub pin: bool,
    pub live: bool,
    pub static_mode: bool,
    pub forward: bool,
    pub secret: bool,
}

impl Mode {
    pub const KEYS: [&'static str; 8] = ["silent", "mention", "admin", "pin", "live", "static", "forward", "secret"];

    pub fn set(&mut self, key: &str) {
        match key {
            "silent" => self.silent = true,
            "mention" => self.mention = true,
            "admin" => self.admin = true,
            "pin" => self.pin = true,
            "live" => self.live = true,
            "static" => self.static_mode = true,
            "forward" => self.forward = true,
            "secret" => self.secret = true,
            _ => {}
        }
    }
}

/// State of a single handler invocation. Dropped as soon as the handler returns.
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub user: User,
    pub chat_id: i64,
    pub message_id: i32,
    pub is_private: bool,
    pub message: Option<IncomingMessage>,
    pub command: String,
    pub mode: Mode,
    pub is_button_response: bool,
    pub is_editing: bool,
    pub is_impersonating: bool,
    pub language: String,
}

/// Everything a handler may touch, passed explicitly into exactly one entry point.
#[derive(Clone)]
pub struct CommandScope {
    pub ctx: MessageContext,
    pub services: ServiceRegistry,
    pub transport: Arc<dyn ChatTransport>,
    pub routes: Arc<RouteTable>,
}

impl CommandScope {
    pub fn language(&self) -> &str {
        &self.ctx.language
    }

    pub async fn reply(&self, text: &str) -> BotResult<i32> {
        self.reply_with(text, None).await
    }

    /// Edits the pressed message for button responses in editing mode, sends a new one otherwise.
    pub async fn reply_with(&self, text: &str, markup: Option<InlineKeyboardMarkup>) -> BotResult<i32> {
        if self.ctx.is_editing {
            self.transport
                .edit_text(self.ctx.chat_id, self.ctx.message_id, text, markup)
                .await?;
            return Ok(self.ctx.message_id);
        }

        let options = SendOptions {
            markup,
            silent: self.ctx.mode.silent,
        };
        let message_id = self.transport.send_text(self.ctx.chat_id, text, options).await?;

        if self.ctx.mode.pin {
            self.transport.pin_message(self.ctx.chat_id, message_id).await?;
        }

        Ok(message_id)
    }

    pub async fn reply_photo(&self, photo: Vec<u8>, caption: Option<&str>) -> BotResult<i32> {
        let options = SendOptions {
            markup: None,
            silent: self.ctx.mode.silent,
        };
        self.transport.send_photo(self.ctx.chat_id, photo, caption, options).await
    }
}
