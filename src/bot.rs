use std::{sync::Arc, time::Duration};

use teloxide::{
    adaptors::{throttle::Limits, Throttle},
    dispatching::{MessageFilterExt, UpdateFilterExt},
    prelude::*,
    types::User,
};

use crate::{
    config::AppConfig,
    error::{BotError, BotResult, HandlerResult},
    handler::gate_new_member,
    runtime::Scheduler,
    service::event::BotEvent,
    state::AppState,
    transport::{IncomingCallback, IncomingMessage, SendOptions, Sender, TelegramTransport},
    utils::http,
};

pub struct BotService {
    pub bot: Throttle<Bot>,
    pub config: AppConfig,
}

impl BotService {
    pub fn new(config: AppConfig) -> BotResult<Self> {
        // teloxide pins its own reqwest version.
        let client = teloxide::net::default_reqwest_settings()
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .user_agent(http::DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| BotError::Other(e.into()))?;
        let bot = Bot::with_client(config.telegram.token.clone(), client).throttle(Limits::default());

        Ok(Self { bot, config })
    }

    pub async fn start(self) -> HandlerResult<()> {
        info!("Testing connection to Telegram API...");
        match self.bot.get_me().await {
            Ok(me) => info!("Successfully connected to Telegram API as @{}", me.username()),
            Err(e) => {
                error!("Failed to connect to Telegram API: {:?}", e);
                return Err(anyhow::anyhow!("Failed to connect to Telegram API: {}", e).into());
            }
        }

        let transport = Arc::new(TelegramTransport::new(self.bot.clone()));
        info!("Initializing AppState...");
        let state = AppState::new(self.config, transport).await?;
        info!("AppState initialized");

        let language = state.config.router.default_language.clone();
        crate::command::setup_user_commands(&self.bot, &state.routes, &language).await?;

        spawn_announcer(state.clone());

        let scheduler = Scheduler::for_state(&state);
        scheduler.start();

        let handler = dptree::entry()
            .branch(
                Update::filter_message()
                    .branch(Message::filter_new_chat_members().endpoint(on_new_members))
                    .branch(dptree::endpoint(on_message)),
            )
            .branch(Update::filter_callback_query().endpoint(on_callback));

        Dispatcher::builder(self.bot, handler)
            .dependencies(dptree::deps![state.clone()])
            .error_handler(LoggingErrorHandler::with_custom_text(
                "An error has occurred in the dispatcher",
            ))
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        scheduler.stop();
        if let Err(e) = state.services.bot_state.persist().await {
            error!("Failed to persist bot state on shutdown: {}", e);
        }

        Ok(())
    }
}

async fn on_message(msg: Message, state: AppState) -> HandlerResult<()> {
    state.message_router.route(IncomingMessage::from(&msg)).await;
    Ok(())
}

async fn on_callback(q: CallbackQuery, state: AppState) -> HandlerResult<()> {
    state.callback_router.route(IncomingCallback::from(&q)).await;
    Ok(())
}

async fn on_new_members(msg: Message, members: Vec<User>, state: AppState) -> HandlerResult<()> {
    let language = state.config.router.default_language.clone();

    for member in members.iter().filter(|member| !member.is_bot) {
        let sender = Sender::from(member);
        let gated = gate_new_member(&state.services, state.transport.as_ref(), msg.chat.id.0, &sender, &language).await;
        if let Err(e) = gated {
            error!("Failed to gate new member {}: {}", member.id, e);
        }
    }

    Ok(())
}

/// Posts space open/close changes to the main chat.
fn spawn_announcer(state: AppState) {
    let Some(chat_id) = state.config.router.main_chat_id else {
        info!("No main chat configured, space announcements are disabled");
        return;
    };
    let mut events = state.services.events.subscribe();

    tokio::spawn(async move {
        let language = state.config.router.default_language.clone();

        loop {
            let key = match events.recv().await {
                Ok(BotEvent::SpaceOpened) => "events.space_opened",
                Ok(BotEvent::SpaceClosed) => "events.space_closed",
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Announcer lagged by {} events", skipped);
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };

            let text = t!(key, locale = &language);
            let options = SendOptions {
                markup: None,
                silent: true,
            };
            if let Err(e) = state.transport.send_text(chat_id, &text, options).await {
                warn!("Failed to announce space change: {}", e);
            }
        }
    });
}
