use std::{
    collections::HashMap,
    sync::{Arc, LazyLock},
};

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use super::keyboard::{get_in_keyboard, get_status_keyboard};
use crate::{
    context::CommandScope,
    error::{BotResult, HandlerResult},
    service::{
        live::{LiveFuture, LiveHandlerSpec, LiveKind, LiveRunner},
        state::{ChangeType, UserState, UserStatus},
        user::{AutoInsideMode, User, UserPatch},
        ServiceRegistry,
    },
    transport::ChatTransport,
    utils::{format_duration, parse_duration},
};

static MAC_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9a-f]{2}:){5}[0-9a-f]{2}$").expect("mac pattern is valid"));

const DEFAULT_VISITS_DAYS: i64 = 30;

/// How a status message is rendered. Persisted as live handler params.
#[derive(Debug, Clone, Default, PartialEq)]
struct StatusOptions {
    language: String,
    short: bool,
    secret: bool,
    mention: bool,
    with_keyboard: bool,
}

impl StatusOptions {
    fn to_params(&self) -> Vec<String> {
        let mut params = vec![self.language.clone()];
        for (flag, name) in [
            (self.short, "short"),
            (self.secret, "secret"),
            (self.mention, "mention"),
            (self.with_keyboard, "keyboard"),
        ] {
            if flag {
                params.push(name.to_string());
            }
        }
        params
    }

    fn from_params(params: &[String]) -> Self {
        let has = |name: &str| params.iter().skip(1).any(|param| param == name);
        Self {
            language: params.first().cloned().unwrap_or_else(|| "en".to_string()),
            short: has("short"),
            secret: has("secret"),
            mention: has("mention"),
            with_keyboard: has("keyboard"),
        }
    }
}

fn user_label(user: &User, mention: bool) -> String {
    let name = match (&user.username, &user.first_name) {
        (Some(username), _) if mention => format!("@{}", username),
        (Some(username), _) => username.clone(),
        (None, Some(first_name)) => first_name.clone(),
        (None, None) => user.id.to_string(),
    };

    match &user.emoji {
        Some(emoji) => format!("{} {}", emoji, name),
        None => name,
    }
}

fn presence_line(state: &UserState, mention: bool) -> String {
    let mut line = format!("  {}", user_label(&state.user, mention));
    if state.status == UserStatus::InsideSecret {
        line.push_str(" 👻");
    }
    if state.change_type == ChangeType::Auto {
        line.push_str(" 📡");
    }
    if let Some(note) = &state.note {
        line.push_str(&format!(" ({})", note));
    }
    line
}

async fn render_status(services: &ServiceRegistry, options: &StatusOptions) -> BotResult<String> {
    let language = options.language.as_str();
    let space = services.state.get_space_state().await?;
    let inside = services.state.get_people_inside(options.secret).await?;
    let going = services.state.get_people_going().await?;

    let mut lines = Vec::new();

    match &space {
        Some(space) => {
            let changer = services
                .users
                .get(space.changer_id)
                .await?
                .map(|user| user_label(&user, options.mention))
                .unwrap_or_else(|| space.changer_id.to_string());
            let time = space.date.format("%H:%M").to_string();
            let key = if space.open { "status.open" } else { "status.closed" };
            lines.push(t!(key, locale = language, changer = changer, time = time).to_string());
        }
        None => lines.push(t!("status.unknown", locale = language).to_string()),
    }

    if options.short {
        let (inside, going) = (inside.len(), going.len());
        lines.push(t!("status.short", locale = language, inside = inside, going = going).to_string());
        return Ok(lines.join("\n"));
    }

    lines.push(String::new());
    if inside.is_empty() {
        lines.push(t!("status.nobody_inside", locale = language).to_string());
    } else {
        let count = inside.len();
        lines.push(t!("status.inside", locale = language, count = count).to_string());
        lines.extend(inside.iter().map(|state| presence_line(state, options.mention)));
    }

    if !going.is_empty() {
        let count = going.len();
        lines.push(t!("status.going", locale = language, count = count).to_string());
        lines.extend(going.iter().map(|state| presence_line(state, options.mention)));
    }

    Ok(lines.join("\n"))
}

pub async fn status(scope: CommandScope, args: Vec<String>) -> HandlerResult<()> {
    let mode = scope.ctx.mode;
    let options = StatusOptions {
        language: scope.language().to_string(),
        short: args.first().is_some_and(|arg| arg == "short"),
        secret: mode.secret,
        mention: mode.mention,
        with_keyboard: !mode.static_mode,
    };

    let text = render_status(&scope.services, &options).await?;
    let markup = options.with_keyboard.then(|| get_status_keyboard(&options.language));
    let message_id = scope.reply_with(&text, markup).await?;

    if mode.live {
        let spec = LiveHandlerSpec {
            kind: LiveKind::StatusLive,
            chat_id: scope.ctx.chat_id,
            message_id: Some(message_id),
            params: options.to_params(),
        };
        let runner = live_runner(scope.services.clone(), Arc::clone(&scope.transport));
        scope.services.live.subscribe(spec, runner).await?;
    }

    Ok(())
}

/// Re-renders a live status message in place.
pub fn live_runner(services: ServiceRegistry, transport: Arc<dyn ChatTransport>) -> LiveRunner {
    Arc::new(move |spec: LiveHandlerSpec| -> LiveFuture {
        let services = services.clone();
        let transport = Arc::clone(&transport);
        Box::pin(async move {
            let Some(message_id) = spec.message_id else {
                return Ok(None);
            };
            let options = StatusOptions::from_params(&spec.params);
            let text = render_status(&services, &options).await?;
            let markup = options.with_keyboard.then(|| get_status_keyboard(&options.language));

            transport.edit_text(spec.chat_id, message_id, &text, markup).await?;
            Ok(None)
        })
    })
}

async fn let_in_and_reply(scope: &CommandScope, until: Option<DateTime<Utc>>, ghost: bool) -> HandlerResult<()> {
    let language = scope.language().to_string();
    let user = &scope.ctx.user;

    let success = scope
        .services
        .state
        .let_in(user, ChangeType::Manual, Utc::now(), until, ghost)
        .await?;

    if !success {
        scope.reply(&t!("handlers.in.closed", locale = &language)).await?;
        return Ok(());
    }

    let name = user_label(user, scope.ctx.mode.mention);
    let text = match until {
        Some(until) => {
            let time = until.format("%H:%M").to_string();
            t!("handlers.in.success_until", locale = &language, name = name, time = time)
        }
        None => t!("handlers.in.success", locale = &language, name = name),
    };
    scope.reply_with(&text, Some(get_in_keyboard(&language))).await?;

    Ok(())
}

pub async fn check_in(scope: CommandScope, args: Vec<String>) -> HandlerResult<()> {
    let until = args
        .first()
        .and_then(|duration| parse_duration(duration))
        .map(|duration| Utc::now() + duration);

    let_in_and_reply(&scope, until, false).await
}

pub async fn check_in_ghost(scope: CommandScope, _args: Vec<String>) -> HandlerResult<()> {
    let_in_and_reply(&scope, None, true).await
}

pub async fn check_out(scope: CommandScope, _args: Vec<String>) -> HandlerResult<()> {
    let language = scope.language().to_string();
    let user = &scope.ctx.user;

    scope.services.state.let_out(user, ChangeType::Manual, Utc::now()).await?;

    let name = user_label(user, scope.ctx.mode.mention);
    scope.reply(&t!("handlers.out.success", locale = &language, name = name)).await?;
    Ok(())
}

pub async fn going(scope: CommandScope, args: Vec<String>) -> HandlerResult<()> {
    let language = scope.language().to_string();
    let note = args.first().map(|note| note.trim().to_string()).filter(|note| !note.is_empty());

    scope.services.state.set_going_state(&scope.ctx.user, true, note).await?;

    let name = user_label(&scope.ctx.user, scope.ctx.mode.mention);
    scope.reply(&t!("handlers.going.success", locale = &language, name = name)).await?;
    Ok(())
}

pub async fn not_going(scope: CommandScope, _args: Vec<String>) -> HandlerResult<()> {
    let language = scope.language().to_string();

    scope.services.state.set_going_state(&scope.ctx.user, false, None).await?;

    let name = user_label(&scope.ctx.user, scope.ctx.mode.mention);
    scope.reply(&t!("handlers.going.cancelled", locale = &language, name = name)).await?;
    Ok(())
}

async fn find_target(scope: &CommandScope, handle: &str) -> HandlerResult<Option<User>> {
    let target = scope.services.users.find(handle).await?;
    if target.is_none() {
        let language = scope.language().to_string();
        scope
            .reply(&t!("handlers.user_not_found", locale = &language, target = handle))
            .await?;
    }
    Ok(target)
}

pub async fn in_force(scope: CommandScope, args: Vec<String>) -> HandlerResult<()> {
    let language = scope.language().to_string();
    let Some(handle) = args.first() else {
        return Ok(());
    };
    let Some(target) = find_target(&scope, handle).await? else {
        return Ok(());
    };

    let until = args
        .get(1)
        .and_then(|duration| parse_duration(duration))
        .map(|duration| Utc::now() + duration);

    scope
        .services
        .state
        .let_in(&target, ChangeType::Force, Utc::now(), until, false)
        .await?;

    let name = user_label(&target, scope.ctx.mode.mention);
    let by = user_label(&scope.ctx.user, false);
    scope
        .reply(&t!("handlers.in.forced", locale = &language, name = name, by = by))
        .await?;
    Ok(())
}

pub async fn out_force(scope: CommandScope, args: Vec<String>) -> HandlerResult<()> {
    let language = scope.language().to_string();
    let Some(handle) = args.first() else {
        return Ok(());
    };
    let Some(target) = find_target(&scope, handle).await? else {
        return Ok(());
    };

    scope.services.state.let_out(&target, ChangeType::Force, Utc::now()).await?;

    let name = user_label(&target, scope.ctx.mode.mention);
    let by = user_label(&scope.ctx.user, false);
    scope
        .reply(&t!("handlers.out.forced", locale = &language, name = name, by = by))
        .await?;
    Ok(())
}

pub async fn open(scope: CommandScope, _args: Vec<String>) -> HandlerResult<()> {
    let language = scope.language().to_string();

    scope.services.state.open_space(&scope.ctx.user, true).await?;

    let name = user_label(&scope.ctx.user, false);
    scope
        .reply_with(
            &t!("handlers.open.success", locale = &language, name = name),
            Some(get_status_keyboard(&language)),
        )
        .await?;
    Ok(())
}

pub async fn close(scope: CommandScope, _args: Vec<String>) -> HandlerResult<()> {
    let language = scope.language().to_string();

    scope.services.state.close_space(&scope.ctx.user).await?;
    let evicted = scope.services.state.evict_people().await?;

    let name = user_label(&scope.ctx.user, false);
    scope
        .reply(&t!("handlers.close.success", locale = &language, name = name, evicted = evicted))
        .await?;
    Ok(())
}

pub async fn evict(scope: CommandScope, _args: Vec<String>) -> HandlerResult<()> {
    let language = scope.language().to_string();

    let evicted = scope.services.state.evict_people().await?;

    scope
        .reply(&t!("handlers.evict.success", locale = &language, evicted = evicted))
        .await?;
    Ok(())
}

pub async fn my_time(scope: CommandScope, _args: Vec<String>) -> HandlerResult<()> {
    let language = scope.language().to_string();

    let total = scope.services.state.get_user_total_time(scope.ctx.user.id).await?;
    let time = format_duration(total);

    scope.reply(&t!("handlers.mytime", locale = &language, time = time)).await?;
    Ok(())
}

pub async fn visits(scope: CommandScope, args: Vec<String>) -> HandlerResult<()> {
    let language = scope.language().to_string();
    let days = args
        .first()
        .and_then(|days| days.parse::<i64>().ok())
        .filter(|days| *days > 0)
        .unwrap_or(DEFAULT_VISITS_DAYS);

    let now = Utc::now();
    let visits = scope.services.state.get_all_visits(now - Duration::days(days), now).await?;

    let mut totals: HashMap<u64, Duration> = HashMap::new();
    for visit in &visits {
        *totals.entry(visit.user_id).or_insert_with(Duration::zero) += visit.duration();
    }
    let mut totals: Vec<(u64, Duration)> = totals.into_iter().collect();
    totals.sort_by(|a, b| b.1.cmp(&a.1));

    let mut lines = vec![t!("handlers.visits.header", locale = &language, days = days).to_string()];
    for (position, (user_id, total)) in totals.iter().enumerate() {
        let name = scope
            .services
            .users
            .get(*user_id)
            .await?
            .map(|user| user_label(&user, false))
            .unwrap_or_else(|| user_id.to_string());
        lines.push(format!("{}. {} {}", position + 1, name, format_duration(*total)));
    }
    if totals.is_empty() {
        lines.push(t!("handlers.visits.empty", locale = &language).to_string());
    }

    scope.reply(&lines.join("\n")).await?;
    Ok(())
}

pub async fn autoinside(scope: CommandScope, args: Vec<String>) -> HandlerResult<()> {
    let language = scope.language().to_string();
    let user = &scope.ctx.user;

    let Some(mode) = args.first().and_then(|mode| mode.parse::<AutoInsideMode>().ok()) else {
        let mode = user.autoinside.as_str();
        scope
            .reply(&t!("handlers.autoinside.current", locale = &language, mode = mode))
            .await?;
        return Ok(());
    };

    if mode != AutoInsideMode::Disabled && user.mac.is_empty() {
        scope.reply(&t!("handlers.autoinside.no_mac", locale = &language)).await?;
        return Ok(());
    }

    let patch = UserPatch {
        autoinside: Some(mode),
        ..Default::default()
    };
    scope.services.users.update(user.id, patch).await?;

    let mode = mode.as_str();
    scope
        .reply(&t!("handlers.autoinside.updated", locale = &language, mode = mode))
        .await?;
    Ok(())
}

pub async fn set_mac(scope: CommandScope, args: Vec<String>) -> HandlerResult<()> {
    let language = scope.language().to_string();
    let Some(input) = args.first() else {
        return Ok(());
    };

    let macs: Vec<String> = input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|mac| !mac.is_empty())
        .map(|mac| mac.to_lowercase())
        .collect();

    if macs.is_empty() || !macs.iter().all(|mac| MAC_REGEX.is_match(mac)) {
        scope.reply(&t!("handlers.setmac.invalid", locale = &language)).await?;
        return Ok(());
    }

    let patch = UserPatch {
        mac: Some(macs.clone()),
        ..Default::default()
    };
    scope.services.users.update(scope.ctx.user.id, patch).await?;

    let count = macs.len();
    scope
        .reply(&t!("handlers.setmac.updated", locale = &language, count = count))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        service::{event::BotEvent, user::Role},
        utils::test::{add_user, message, setup_test_app, Sent},
    };

    #[test]
    fn test_status_options_round_trip_through_params() {
        let options = StatusOptions {
            language: "ru".to_string(),
            short: true,
            secret: false,
            mention: true,
            with_keyboard: false,
        };

        assert_eq!(StatusOptions::from_params(&options.to_params()), options);
    }

    #[tokio::test]
    async fn test_guest_cannot_check_in_while_closed() {
        let app = setup_test_app().await;
        add_user(&app, 1, "guest", &[Role::Default]).await;

        app.state.message_router.route(message(-100, 1, "/in")).await;

        assert!(app.state.services.state.get_user_state(1).await.unwrap().is_none());
        assert_eq!(app.transport.texts().len(), 1);
    }

    #[tokio::test]
    async fn test_check_in_with_duration_sets_until() {
        let app = setup_test_app().await;
        add_user(&app, 1, "neo", &[Role::Member]).await;

        app.state.message_router.route(message(-100, 1, "/in 2h")).await;

        let state = app.state.services.state.get_user_state(1).await.unwrap().unwrap();
        let until = state.until.unwrap();
        assert!(until > Utc::now() + Duration::minutes(119));
    }

    #[tokio::test]
    async fn test_going_keeps_note() {
        let app = setup_test_app().await;
        add_user(&app, 1, "neo", &[Role::Member]).await;

        app.state.message_router.route(message(-100, 1, "/going after work")).await;

        let going = app.state.services.state.get_people_going().await.unwrap();
        assert_eq!(going[0].note.as_deref(), Some("after work"));
    }

    #[tokio::test]
    async fn test_close_evicts_everyone() {
        let app = setup_test_app().await;
        let member = add_user(&app, 1, "neo", &[Role::Member]).await;
        add_user(&app, 2, "trinity", &[Role::Member]).await;
        app.state.services.state.open_space(&member, true).await.unwrap();
        app.state.message_router.route(message(-100, 2, "/in")).await;

        app.state.message_router.route(message(-100, 1, "/close")).await;

        assert!(!app.state.services.state.is_space_open().await.unwrap());
        assert!(app.state.services.state.get_people_inside(true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inforce_unknown_user() {
        let app = setup_test_app().await;
        add_user(&app, 1, "neo", &[Role::Member]).await;

        app.state.message_router.route(message(-100, 1, "/inforce @nobody")).await;
        app.state.message_router.route(message(-100, 1, "/inforce @neo 1h")).await;

        assert_eq!(app.transport.texts().len(), 2);
        let state = app.state.services.state.get_user_state(1).await.unwrap().unwrap();
        assert_eq!(state.change_type, ChangeType::Force);
        assert!(state.until.is_some());
    }

    #[tokio::test]
    async fn test_set_mac_validates_addresses() {
        let app = setup_test_app().await;
        add_user(&app, 1, "neo", &[Role::Member]).await;

        app.state.message_router.route(message(-100, 1, "/setmac nonsense")).await;
        assert!(app.state.services.users.get(1).await.unwrap().unwrap().mac.is_empty());

        app.state
            .message_router
            .route(message(-100, 1, "/setmac AA:BB:CC:DD:EE:FF, 11:22:33:44:55:66"))
            .await;
        app.state.message_router.route(message(-100, 1, "/autoinside ghost")).await;

        let user = app.state.services.users.get(1).await.unwrap().unwrap();
        assert_eq!(user.mac, vec!["aa:bb:cc:dd:ee:ff", "11:22:33:44:55:66"]);
        assert_eq!(user.autoinside, AutoInsideMode::Ghost);
    }

    #[tokio::test]
    async fn test_live_status_is_edited_on_updates() {
        let app = setup_test_app().await;
        let member = add_user(&app, 1, "neo", &[Role::Member]).await;
        app.state.services.state.open_space(&member, false).await.unwrap();

        app.state.message_router.route(message(-100, 1, "/status -live")).await;
        assert_eq!(app.state.services.live.len(), 1);

        app.state.services.events.emit(BotEvent::SpaceLiveUpdate);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(app
            .transport
            .sent()
            .iter()
            .any(|sent| matches!(sent, Sent::Edit { chat_id: -100, .. })));
    }
}
