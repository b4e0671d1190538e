use crate::{context::CommandScope, error::HandlerResult, service::user::Role};

pub async fn set_roles(scope: CommandScope, args: Vec<String>) -> HandlerResult<()> {
    let language = scope.language().to_string();
    let (Some(handle), Some(roles)) = (args.first(), args.get(1)) else {
        return Ok(());
    };

    let roles = Role::parse_list(roles);
    if roles.is_empty() {
        scope.reply(&t!("handlers.setroles.invalid", locale = &language)).await?;
        return Ok(());
    }

    let Some(target) = scope.services.users.find(handle).await? else {
        scope
            .reply(&t!("handlers.user_not_found", locale = &language, target = handle))
            .await?;
        return Ok(());
    };

    scope.services.users.update_roles(target.id, roles.clone()).await?;
    info!("User {} set roles of {} to {}", scope.ctx.user.id, target.id, Role::join(&roles));

    let name = target.display_name();
    let roles = Role::join(&roles);
    scope
        .reply(&t!("handlers.setroles.updated", locale = &language, name = name, roles = roles))
        .await?;
    Ok(())
}

pub async fn stop_live(scope: CommandScope, _args: Vec<String>) -> HandlerResult<()> {
    let language = scope.language().to_string();

    let stopped = scope.services.live.unsubscribe_chat(scope.ctx.chat_id).await?;

    scope
        .reply(&t!("handlers.stoplive", locale = &language, count = stopped))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        service::user::Role,
        utils::test::{add_user, message, setup_test_app},
    };

    #[tokio::test]
    async fn test_admin_sets_roles() {
        let app = setup_test_app().await;
        add_user(&app, 1, "root", &[Role::Admin]).await;
        add_user(&app, 2, "neo", &[Role::Default]).await;

        app.state.message_router.route(message(-100, 1, "/setroles @neo member,trusted")).await;

        let user = app.state.services.users.get(2).await.unwrap().unwrap();
        assert_eq!(user.roles, vec![Role::Member, Role::Trusted]);
    }

    #[tokio::test]
    async fn test_unknown_roles_are_rejected() {
        let app = setup_test_app().await;
        add_user(&app, 1, "root", &[Role::Admin]).await;
        add_user(&app, 2, "neo", &[Role::Member]).await;

        app.state.message_router.route(message(-100, 1, "/setroles @neo wizard")).await;

        let user = app.state.services.users.get(2).await.unwrap().unwrap();
        assert_eq!(user.roles, vec![Role::Member]);
        assert_eq!(app.transport.texts().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_live_clears_chat_handlers() {
        let app = setup_test_app().await;
        add_user(&app, 1, "root", &[Role::Admin]).await;

        app.state.message_router.route(message(-100, 1, "/status -live")).await;
        assert_eq!(app.state.services.live.len(), 1);

        app.state.message_router.route(message(-100, 1, "/stoplive")).await;
        assert_eq!(app.state.services.live.len(), 0);
    }
}
