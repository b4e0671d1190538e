use std::sync::Arc;

use chrono::Utc;

use super::{
    extract_alias, is_banned, is_chat_allowed, is_user_allowed, send_restricted, split_impersonation,
    strip_modifiers, Restriction, RouteTable,
};
use crate::{
    config::RouterConfig,
    context::{CommandScope, MessageContext},
    error::HandlerResult,
    service::{
        user::{Role, User},
        ServiceRegistry,
    },
    transport::{ChatTransport, IncomingMessage, SendOptions},
};

const GUESS_HISTORY_DEPTH: usize = 5;

/// Turns one inbound chat message into at most one handler invocation.
#[derive(Clone)]
pub struct MessageRouter {
    routes: Arc<RouteTable>,
    services: ServiceRegistry,
    transport: Arc<dyn ChatTransport>,
    config: Arc<RouterConfig>,
}

impl MessageRouter {
    pub fn new(
        routes: Arc<RouteTable>,
        services: ServiceRegistry,
        transport: Arc<dyn ChatTransport>,
        config: Arc<RouterConfig>,
    ) -> Self {
        Self {
            routes,
            services,
            transport,
            config,
        }
    }

    /// Never fails: every error past the chat-level passthroughs is logged and swallowed.
    pub async fn route(&self, message: IncomingMessage) {
        let age_ms = (Utc::now() - message.date).num_milliseconds().abs();
        if age_ms > self.config.ignore_update_timeout_secs * 1000 {
            return;
        }

        if self.config.auto_remove_chats.contains(&message.chat_id) {
            if let Err(e) = self.transport.delete_message(message.chat_id, message.message_id).await {
                warn!("Failed to auto-remove message in chat {}: {}", message.chat_id, e);
            }
            return;
        }

        let chat_id = message.chat_id;
        if let Err(e) = self.dispatch(message).await {
            error!("Failed to route message in chat {}: {}", chat_id, e);
        }
    }

    async fn dispatch(&self, message: IncomingMessage) -> HandlerResult<()> {
        let content = message.content().unwrap_or_default().to_string();

        if let Some(bridge) = self.config.bridges.iter().find(|bridge| bridge.from == message.chat_id) {
            let is_command = content.starts_with('/');
            if !(is_command && bridge.process_commands) {
                self.transport
                    .forward_message(bridge.to, message.chat_id, message.message_id)
                    .await?;
                return Ok(());
            }
        }

        let mut text = self.deep_link(&content).unwrap_or(content);

        let Some(mut alias) = text
            .starts_with('/')
            .then(|| extract_alias(&text, self.routes.bot_name()))
            .flatten()
        else {
            if !text.is_empty() {
                let from = message.from.as_ref().map(|sender| sender.first_name.as_str()).unwrap_or("unknown");
                self.services.bot_state.push_history(message.chat_id, from, &text).await;
            }
            return Ok(());
        };

        let Some(sender) = message.from.clone() else {
            return Ok(());
        };
        let mut user = self.services.users.resolve(&sender).await?;
        let mut is_impersonating = false;

        if user.is_admin() {
            if let Some((truncated, target)) = split_impersonation(&text) {
                match self.services.users.find(&target).await? {
                    Some(impersonated) => {
                        info!("Admin {} acts as {} for /{}", user.id, impersonated.id, alias);
                        user = impersonated;
                        is_impersonating = true;
                        text = truncated;
                        alias = extract_alias(&text, self.routes.bot_name()).unwrap_or(alias);
                    }
                    None => {
                        let language = self.language_of(&user);
                        let reply = t!("router.impersonation_not_found", locale = &language, target = target);
                        self.transport
                            .send_text(message.chat_id, &reply, SendOptions::default())
                            .await?;
                        return Ok(());
                    }
                }
            }
        }

        let language = self.language_of(&user);

        let Some(route) = self.routes.resolve(&alias) else {
            debug!("Unknown command /{} in chat {}", alias, message.chat_id);
            return self.guess(&user, message.chat_id, &alias, &text).await;
        };

        if is_banned(Some(&user)) {
            return Ok(());
        }

        let is_genuine_admin = user.is_admin() && !is_impersonating;
        if !is_genuine_admin {
            let restriction = if !is_user_allowed(Some(&user), &route) {
                Some(Restriction::Roles)
            } else if !is_chat_allowed(message.chat_id, &route) {
                Some(Restriction::Chat)
            } else {
                None
            };
            if let Some(restriction) = restriction {
                debug!("User {} is not allowed to use /{} in chat {}", user.id, alias, message.chat_id);
                send_restricted(
                    self.transport.as_ref(),
                    &self.config,
                    message.chat_id,
                    &route,
                    restriction,
                    &language,
                )
                .await?;
                return Ok(());
            }
        }

        let (mut mode, stripped) = strip_modifiers(&text);
        mode.secret = self.config.always_secret_chats.contains(&message.chat_id)
            || (user.is_member() && (message.is_private || mode.secret));

        let Some(args) = route.bind(&stripped) else {
            debug!("Parameters for /{} did not match: {}", alias, stripped);
            return Ok(());
        };

        let scope = CommandScope {
            ctx: MessageContext {
                user,
                chat_id: message.chat_id,
                message_id: message.message_id,
                is_private: message.is_private,
                message: Some(message),
                command: alias,
                mode,
                is_button_response: false,
                is_editing: false,
                is_impersonating,
                language,
            },
            services: self.services.clone(),
            transport: Arc::clone(&self.transport),
            routes: Arc::clone(&self.routes),
        };

        (route.handler)(scope, args).await
    }

    /// `/start some__command` links open the bot with `/some command`.
    fn deep_link(&self, text: &str) -> Option<String> {
        let (command, payload) = text.split_once(' ')?;
        let payload = payload.trim();

        if payload.is_empty() || extract_alias(command, self.routes.bot_name()).as_deref() != Some("start") {
            return None;
        }

        Some(format!("/{}", payload.replace("__", " ")))
    }

    fn language_of(&self, user: &User) -> String {
        user.language
            .clone()
            .unwrap_or_else(|| self.config.default_language.clone())
    }

    async fn guess(&self, user: &User, chat_id: i64, alias: &str, text: &str) -> HandlerResult<()> {
        if self.config.guess_ignore_list.iter().any(|ignored| ignored == alias) {
            return Ok(());
        }

        let Some(assistant) = self.services.platform.assistant.as_ref() else {
            return Ok(());
        };

        let is_public = self.config.public_chats.contains(&chat_id);
        let qualifies = !user.is_banned()
            && (user.is_admin()
                || (is_public && [Role::Member, Role::Trusted].iter().any(|role| user.has_role(*role))));
        if !qualifies {
            return Ok(());
        }

        let history = self.services.bot_state.history(chat_id).await;
        let mut prompt = String::new();
        for entry in history.iter().rev().take(GUESS_HISTORY_DEPTH).rev() {
            prompt.push_str(&format!("{}: {}\n", entry.from, entry.text));
        }
        prompt.push_str(&format!("{}: {}", user.display_name(), text));

        let answer = assistant.ask(&prompt).await?;
        self.transport.send_text(chat_id, &answer, SendOptions::default()).await?;

        Ok(())
    }
}
