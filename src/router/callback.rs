use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{is_banned, is_user_allowed, send_restricted, Handler, Restriction, RouteTable};
use crate::{
    config::RouterConfig,
    context::{CommandScope, MessageContext, Mode},
    error::HandlerResult,
    service::{user::User, ServiceRegistry},
    transport::{CallbackOrigin, ChatTransport, IncomingCallback},
};

/// JSON carried in inline button data. Keys are kept short for Telegram's 64 byte limit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallbackPayload {
    #[serde(rename = "vId", default, skip_serializing_if = "Option::is_none")]
    pub verification_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    #[serde(rename = "fs", default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl CallbackPayload {
    pub const FLAG_SILENT: u8 = 1;
    pub const FLAG_EDITING: u8 = 1 << 1;

    pub fn command(cmd: &str) -> Self {
        Self {
            cmd: Some(cmd.to_string()),
            ..Default::default()
        }
    }

    pub fn verification(user_id: u64) -> Self {
        Self {
            verification_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn with_flags(mut self, flags: u8) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    fn has_flag(&self, flag: u8) -> bool {
        self.flags.is_some_and(|flags| flags & flag != 0)
    }

    /// Positional handler arguments. An array is spread, any other value becomes one argument.
    pub fn args(&self) -> Vec<String> {
        fn to_arg(value: &Value) -> String {
            match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            }
        }

        match &self.params {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(values)) => values.iter().map(to_arg).collect(),
            Some(value) => vec![to_arg(value)],
        }
    }
}

#[derive(Clone)]
pub struct CallbackRouter {
    routes: Arc<RouteTable>,
    services: ServiceRegistry,
    transport: Arc<dyn ChatTransport>,
    config: Arc<RouterConfig>,
    verification: Handler,
}

impl CallbackRouter {
    pub fn new(
        routes: Arc<RouteTable>,
        services: ServiceRegistry,
        transport: Arc<dyn ChatTransport>,
        config: Arc<RouterConfig>,
        verification: Handler,
    ) -> Self {
        Self {
            routes,
            services,
            transport,
            config,
            verification,
        }
    }

    pub async fn route(&self, callback: IncomingCallback) {
        if let Err(e) = self.transport.answer_callback(&callback.id).await {
            warn!("Failed to answer callback {}: {}", callback.id, e);
        }

        let Some(sender_id) = callback.from.as_ref().map(|sender| sender.id) else {
            return;
        };

        if !self.services.cooldown.try_acquire(sender_id) {
            debug!("Dropping repeated button press from {}", sender_id);
            return;
        }

        if let Err(e) = self.dispatch(callback).await {
            error!("Failed to route callback from {}: {}", sender_id, e);
        }
    }

    async fn dispatch(&self, callback: IncomingCallback) -> HandlerResult<()> {
        let (Some(sender), Some(data), Some(origin)) = (callback.from, callback.data, callback.origin) else {
            return Ok(());
        };

        let payload = match serde_json::from_str::<CallbackPayload>(&data) {
            Ok(payload) => payload,
            Err(e) => {
                debug!("Ignoring undecodable callback data {:?}: {}", data, e);
                return Ok(());
            }
        };

        let user = self.services.users.resolve(&sender).await?;

        if let Some(verification_id) = payload.verification_id {
            if verification_id != user.id {
                debug!("User {} pressed the verification button of {}", user.id, verification_id);
                return Ok(());
            }
            let scope = self.scope(user, &origin, "verify".to_string(), &payload);
            return (self.verification)(scope, Vec::new()).await;
        }

        let Some(command) = payload.cmd.as_ref().map(|cmd| cmd.to_lowercase()) else {
            return Ok(());
        };
        let Some(route) = self.routes.resolve(&command) else {
            debug!("Callback for unknown command {}", command);
            return Ok(());
        };

        if is_banned(Some(&user)) {
            return Ok(());
        }

        if !user.is_admin() && !is_user_allowed(Some(&user), &route) {
            let language = self.language_of(&user);
            send_restricted(
                self.transport.as_ref(),
                &self.config,
                origin.chat_id,
                &route,
                Restriction::Roles,
                &language,
            )
            .await?;
            return Ok(());
        }

        let args = payload.args();
        let scope = self.scope(user, &origin, command, &payload);

        (route.handler)(scope, args).await
    }

    fn scope(&self, user: User, origin: &CallbackOrigin, command: String, payload: &CallbackPayload) -> CommandScope {
        let mode = Mode {
            silent: payload.has_flag(CallbackPayload::FLAG_SILENT),
            secret: self.config.always_secret_chats.contains(&origin.chat_id) || (user.is_member() && origin.is_private),
            ..Default::default()
        };

        CommandScope {
            ctx: MessageContext {
                language: self.language_of(&user),
                user,
                chat_id: origin.chat_id,
                message_id: origin.message_id,
                is_private: origin.is_private,
                message: None,
                command,
                mode,
                is_button_response: true,
                is_editing: payload.has_flag(CallbackPayload::FLAG_EDITING),
                is_impersonating: false,
            },
            services: self.services.clone(),
            transport: Arc::clone(&self.transport),
            routes: Arc::clone(&self.routes),
        }
    }

    fn language_of(&self, user: &User) -> String {
        user.language
            .clone()
            .unwrap_or_else(|| self.config.default_language.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        service::{state::UserStatus, user::Role},
        utils::test::{add_user, callback, setup_test_app, Sent},
    };
    use crate::router::{handler, RouteSpec};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_payload_args_spread_arrays() {
        let payload = CallbackPayload::command("inforce").with_params(json!(["@neo", 2]));
        assert_eq!(payload.args(), vec!["@neo".to_string(), "2".to_string()]);

        let payload = CallbackPayload::command("status").with_params(json!("short"));
        assert_eq!(payload.args(), vec!["short".to_string()]);

        assert!(CallbackPayload::command("in").args().is_empty());
    }

    #[test]
    fn test_payload_encoding_uses_short_keys() {
        let encoded = CallbackPayload::command("in")
            .with_flags(CallbackPayload::FLAG_SILENT | CallbackPayload::FLAG_EDITING)
            .encode();
        assert_eq!(encoded, r#"{"cmd":"in","fs":3}"#);
        assert_eq!(CallbackPayload::verification(5).encode(), r#"{"vId":5}"#);
    }

    #[tokio::test]
    async fn test_button_press_invokes_handler_in_editing_mode() {
        let app = setup_test_app().await;
        let user = add_user(&app, 1, "neo", &[Role::Member]).await;
        app.state.services.state.open_space(&user, false).await.unwrap();

        let data = CallbackPayload::command("in")
            .with_flags(CallbackPayload::FLAG_EDITING)
            .encode();
        app.state.callback_router.route(callback(-100, 1, &data)).await;

        let state = app.state.services.state.get_user_state(1).await.unwrap().unwrap();
        assert_eq!(state.status, UserStatus::Inside);
        let sent = app.transport.sent();
        assert!(matches!(sent[0], Sent::Answer { .. }));
        assert!(sent.iter().any(|sent| matches!(sent, Sent::Edit { .. })));
    }

    #[tokio::test]
    async fn test_repeated_press_is_dropped() {
        let app = setup_test_app().await;
        let user = add_user(&app, 1, "neo", &[Role::Member]).await;
        app.state.services.state.open_space(&user, false).await.unwrap();

        let data = CallbackPayload::command("in").encode();
        app.state.callback_router.route(callback(-100, 1, &data)).await;
        app.state.callback_router.route(callback(-100, 1, &data)).await;

        let answers = app.transport.sent().iter().filter(|s| matches!(s, Sent::Answer { .. })).count();
        let texts = app.transport.texts();
        assert_eq!(answers, 2);
        assert_eq!(texts.len(), 1);
    }

    #[tokio::test]
    async fn test_verification_by_someone_else_is_ignored() {
        let app = setup_test_app().await;
        add_user(&app, 1, "newbie", &[Role::Restricted]).await;
        add_user(&app, 2, "helper", &[Role::Member]).await;

        let data = CallbackPayload::verification(1).encode();
        app.state.callback_router.route(callback(-100, 2, &data)).await;
        let unchanged = app.state.services.users.get(1).await.unwrap().unwrap();
        assert_eq!(unchanged.roles, vec![Role::Restricted]);

        app.state.callback_router.route(callback(-100, 1, &data)).await;
        let verified = app.state.services.users.get(1).await.unwrap().unwrap();
        assert_eq!(verified.roles, vec![Role::Default]);
    }

    #[tokio::test]
    async fn test_button_press_checks_roles() {
        let app = setup_test_app().await;
        add_user(&app, 1, "guest", &[Role::Default]).await;

        let data = CallbackPayload::command("close").encode();
        app.state.callback_router.route(callback(-100, 1, &data)).await;

        assert!(app.state.services.state.get_space_state().await.unwrap().is_none());
        assert_eq!(app.transport.texts().len(), 1);
    }

    #[tokio::test]
    async fn test_button_press_ignores_chat_limits() {
        let app = setup_test_app().await;
        add_user(&app, 1, "neo", &[Role::Member]).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let mut table = RouteTable::new("hackerbot");
        table
            .add_route(
                RouteSpec::new(
                    &["lab"],
                    handler(move |_scope, _args| {
                        let counter = Arc::clone(&counter);
                        async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }
                    }),
                )
                .roles(&[Role::Member])
                .chats(&[-100]),
            )
            .unwrap();
        let router = CallbackRouter::new(
            Arc::new(table),
            app.state.services.clone(),
            app.transport.clone(),
            Arc::new(app.state.config.router.clone()),
            handler(|_scope, _args| async { Ok(()) }),
        );

        router.route(callback(-200, 1, &CallbackPayload::command("lab").encode())).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(app.transport.texts().is_empty());
    }
}
