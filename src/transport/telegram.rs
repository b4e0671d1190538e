use async_trait::async_trait;
use teloxide::{
    adaptors::Throttle,
    ApiError, RequestError,
    prelude::*,
    types::{CallbackQuery, InlineKeyboardMarkup, InputFile, MessageId, User},
};

use super::{CallbackOrigin, ChatTransport, IncomingCallback, IncomingMessage, SendOptions, Sender};
use crate::error::BotResult;

impl From<&User> for Sender {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.0,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
        }
    }
}

impl From<&Message> for IncomingMessage {
    fn from(msg: &Message) -> Self {
        Self {
            chat_id: msg.chat.id.0,
            message_id: msg.id.0,
            is_private: msg.chat.is_private(),
            from: msg.from.as_ref().map(Sender::from),
            text: msg.text().map(str::to_string),
            caption: msg.caption().map(str::to_string),
            date: msg.date,
        }
    }
}

impl From<&CallbackQuery> for IncomingCallback {
    fn from(q: &CallbackQuery) -> Self {
        Self {
            id: q.id.clone(),
            from: Some(Sender::from(&q.from)),
            data: q.data.clone(),
            origin: q.message.as_ref().map(|message| CallbackOrigin {
                chat_id: message.chat().id.0,
                message_id: message.id().0,
                is_private: message.chat().is_private(),
            }),
        }
    }
}

/// Telegram-backed transport.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Throttle<Bot>,
}

impl TelegramTransport {
    pub fn new(bot: Throttle<Bot>) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(&self, chat_id: i64, text: &str, options: SendOptions) -> BotResult<i32> {
        let mut request = self
            .bot
            .send_message(ChatId(chat_id), text)
            .disable_notification(options.silent);

        if let Some(markup) = options.markup {
            request = request.reply_markup(markup);
        }

        Ok(request.await?.id.0)
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: Vec<u8>,
        caption: Option<&str>,
        options: SendOptions,
    ) -> BotResult<i32> {
        let mut request = self
            .bot
            .send_photo(ChatId(chat_id), InputFile::memory(photo))
            .disable_notification(options.silent);

        if let Some(caption) = caption {
            request = request.caption(caption);
        }
        if let Some(markup) = options.markup {
            request = request.reply_markup(markup);
        }

        Ok(request.await?.id.0)
    }

    async fn edit_text(
        &self,
        chat_id: i64,
        message_id: i32,
        text: &str,
        markup: Option<InlineKeyboardMarkup>,
    ) -> BotResult<()> {
        let mut request = self.bot.edit_message_text(ChatId(chat_id), MessageId(message_id), text);

        if let Some(markup) = markup {
            request = request.reply_markup(markup);
        }

        match request.await {
            Ok(_) => Ok(()),
            Err(RequestError::Api(ApiError::MessageNotModified)) => {
                debug!("Message {} in chat {} is unchanged", message_id, chat_id);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> BotResult<()> {
        self.bot.delete_message(ChatId(chat_id), MessageId(message_id)).await?;
        Ok(())
    }

    async fn forward_message(&self, to_chat_id: i64, from_chat_id: i64, message_id: i32) -> BotResult<()> {
        self.bot
            .forward_message(ChatId(to_chat_id), ChatId(from_chat_id), MessageId(message_id))
            .await?;
        Ok(())
    }

    async fn pin_message(&self, chat_id: i64, message_id: i32) -> BotResult<()> {
        self.bot.pin_chat_message(ChatId(chat_id), MessageId(message_id)).await?;
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> BotResult<()> {
        self.bot.answer_callback_query(callback_id).cache_time(1).await?;
        Ok(())
    }
}
