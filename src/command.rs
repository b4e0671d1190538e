use teloxide::{
    adaptors::Throttle,
    prelude::Requester,
    types::BotCommand,
    Bot,
};

use crate::{error::HandlerResult, router::RouteTable};

/// Commands shown in the Telegram menu: every described route without role requirements.
pub fn public_commands(routes: &RouteTable, language: &str) -> Vec<BotCommand> {
    routes
        .routes()
        .into_iter()
        .filter(|route| route.roles.is_empty())
        .filter_map(|route| {
            let description = route.description.as_deref()?;
            let name = route.aliases.first()?;
            Some(BotCommand::new(name.clone(), t!(description, locale = language)))
        })
        .collect()
}

pub async fn setup_user_commands(bot: &Throttle<Bot>, routes: &RouteTable, language: &str) -> HandlerResult<()> {
    let commands = public_commands(routes, language);
    info!("Publishing {} bot commands", commands.len());

    bot.delete_my_commands().await?;
    bot.set_my_commands(commands).await?;
    Ok(())
}
