use super::keyboard::get_verify_keyboard;
use crate::{
    context::CommandScope,
    error::{BotResult, HandlerResult},
    service::{
        user::{Role, User},
        ServiceRegistry,
    },
    transport::{ChatTransport, SendOptions, Sender},
};

fn is_trusted_already(user: &User) -> bool {
    [Role::Member, Role::Trusted, Role::Admin]
        .iter()
        .any(|role| user.has_role(*role))
}

/// Restricts a newcomer until they press their own verification button.
pub async fn gate_new_member(
    services: &ServiceRegistry,
    transport: &dyn ChatTransport,
    chat_id: i64,
    sender: &Sender,
    default_language: &str,
) -> BotResult<()> {
    let user = services.users.resolve(sender).await?;
    if user.is_banned() {
        debug!("Banned user {} joined chat {}, ignoring", user.id, chat_id);
        return Ok(());
    }
    if is_trusted_already(&user) {
        debug!("User {} rejoined chat {}, skipping verification", user.id, chat_id);
        return Ok(());
    }

    services.users.update_roles(user.id, vec![Role::Restricted]).await?;
    info!("User {} joined chat {} and awaits verification", user.id, chat_id);

    let language = user.language.clone().unwrap_or_else(|| default_language.to_string());
    let name = user.display_name();
    let text = t!("welcome.verify", locale = &language, name = name);

    transport
        .send_text(chat_id, &text, SendOptions::markup(get_verify_keyboard(user.id, &language)))
        .await?;
    Ok(())
}

pub async fn verify(scope: CommandScope, _args: Vec<String>) -> HandlerResult<()> {
    let language = scope.language().to_string();
    let user = &scope.ctx.user;

    if !user.has_role(Role::Restricted) {
        return Ok(());
    }

    let mut roles: Vec<Role> = user.roles.iter().copied().filter(|role| *role != Role::Restricted).collect();
    if roles.is_empty() {
        roles.push(Role::Default);
    }
    scope.services.users.update_roles(user.id, roles).await?;
    info!("User {} passed verification", user.id);

    if let Err(e) = scope.transport.delete_message(scope.ctx.chat_id, scope.ctx.message_id).await {
        debug!("Could not remove verification message {}: {}", scope.ctx.message_id, e);
    }

    let name = user.display_name();
    scope
        .transport
        .send_text(
            scope.ctx.chat_id,
            &t!("welcome.greeting", locale = &language, name = name),
            SendOptions::default(),
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        router::CallbackPayload,
        utils::test::{add_user, callback, message, setup_test_app, Sent},
    };

    fn sender(id: u64, username: &str) -> Sender {
        Sender {
            id,
            username: Some(username.to_string()),
            first_name: username.to_string(),
        }
    }

    #[tokio::test]
    async fn test_newcomer_is_restricted_and_verified() {
        let app = setup_test_app().await;
        let services = &app.state.services;

        gate_new_member(services, app.transport.as_ref(), -100, &sender(7, "newbie"), "en")
            .await
            .unwrap();
        let user = services.users.get(7).await.unwrap().unwrap();
        assert_eq!(user.roles, vec![Role::Restricted]);
        assert!(matches!(
            app.transport.sent()[0],
            Sent::Text { chat_id: -100, has_markup: true, .. }
        ));

        let data = CallbackPayload::verification(7).encode();
        app.state.callback_router.route(callback(-100, 7, &data)).await;

        let user = services.users.get(7).await.unwrap().unwrap();
        assert_eq!(user.roles, vec![Role::Default]);
        assert!(app.transport.sent().iter().any(|sent| matches!(sent, Sent::Delete { .. })));
    }

    #[tokio::test]
    async fn test_member_rejoining_is_not_gated() {
        let app = setup_test_app().await;
        add_user(&app, 1, "neo", &[Role::Member]).await;

        gate_new_member(&app.state.services, app.transport.as_ref(), -100, &sender(1, "neo"), "en")
            .await
            .unwrap();

        let user = app.state.services.users.get(1).await.unwrap().unwrap();
        assert_eq!(user.roles, vec![Role::Member]);
        assert!(app.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_banned_user_cannot_rejoin_out_of_ban() {
        let app = setup_test_app().await;
        add_user(&app, 7, "troll", &[Role::Banned]).await;

        gate_new_member(&app.state.services, app.transport.as_ref(), -100, &sender(7, "troll"), "en")
            .await
            .unwrap();
        let data = CallbackPayload::verification(7).encode();
        app.state.callback_router.route(callback(-100, 7, &data)).await;
        app.state.message_router.route(message(-100, 7, "/help")).await;

        let user = app.state.services.users.get(7).await.unwrap().unwrap();
        assert!(user.is_banned());
        assert_eq!(user.roles, vec![Role::Banned]);
        assert!(app.transport.texts().is_empty());
    }

    #[tokio::test]
    async fn test_verification_keeps_other_roles() {
        let app = setup_test_app().await;
        add_user(&app, 7, "newbie", &[Role::Restricted, Role::Banned]).await;

        let data = CallbackPayload::verification(7).encode();
        app.state.callback_router.route(callback(-100, 7, &data)).await;

        let user = app.state.services.users.get(7).await.unwrap().unwrap();
        assert_eq!(user.roles, vec![Role::Banned]);
    }
}
