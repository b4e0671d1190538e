use crate::{
    context::CommandScope,
    error::HandlerResult,
    router::{is_chat_allowed, is_user_allowed},
};

pub async fn start(scope: CommandScope, _args: Vec<String>) -> HandlerResult<()> {
    let language = scope.language().to_string();
    let name = scope.ctx.user.display_name();

    scope
        .reply(&t!("handlers.start", locale = &language, name = name))
        .await?;
    Ok(())
}

/// Lists the commands the caller may use in this chat.
pub async fn help(scope: CommandScope, _args: Vec<String>) -> HandlerResult<()> {
    let language = scope.language().to_string();
    let mut lines = vec![t!("handlers.help.header", locale = &language).to_string()];

    for route in scope.routes.routes() {
        let Some(description) = route.description.as_deref() else {
            continue;
        };
        if !is_user_allowed(Some(&scope.ctx.user), &route) || !is_chat_allowed(scope.ctx.chat_id, &route) {
            continue;
        }

        let aliases = route
            .aliases
            .iter()
            .map(|alias| format!("/{}", alias))
            .collect::<Vec<_>>()
            .join(" ");
        lines.push(format!("{} - {}", aliases, t!(description, locale = &language)));
    }

    scope.reply(&lines.join("\n")).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{
        service::user::Role,
        utils::test::{add_user, message, setup_test_app},
    };

    #[tokio::test]
    async fn test_help_lists_only_allowed_commands() {
        let app = setup_test_app().await;
        add_user(&app, 1, "guest", &[Role::Default]).await;
        add_user(&app, 2, "neo", &[Role::Member]).await;

        app.state.message_router.route(message(-100, 1, "/help")).await;
        app.state.message_router.route(message(-100, 2, "/help")).await;

        let texts = app.transport.texts();
        assert!(texts[0].contains("/status"));
        assert!(!texts[0].contains("/unlock"));
        assert!(texts[1].contains("/unlock"));
    }
}
