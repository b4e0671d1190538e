use std::sync::Arc;

use crate::{
    context::CommandScope,
    error::HandlerResult,
    service::{
        live::{LiveFuture, LiveHandlerSpec, LiveKind, LiveRunner},
        ServiceRegistry,
    },
    transport::{ChatTransport, SendOptions},
};

const DEFAULT_CAMERA: &str = "main";

pub async fn ping(scope: CommandScope, args: Vec<String>) -> HandlerResult<()> {
    let language = scope.language().to_string();
    let Some(host) = args.first() else {
        return Ok(());
    };

    match scope.services.platform.embassy.ping(host).await {
        Ok(output) => {
            scope.reply(&format!("{}\n{}", host, output.trim())).await?;
        }
        Err(e) => {
            warn!("Ping of {} failed: {}", host, e);
            scope
                .reply(&t!("handlers.embassy.ping_failed", locale = &language, host = host))
                .await?;
        }
    }

    Ok(())
}

pub async fn unlock(scope: CommandScope, _args: Vec<String>) -> HandlerResult<()> {
    let language = scope.language().to_string();

    match scope.services.platform.embassy.unlock_door().await {
        Ok(()) => {
            info!("Door unlocked by {}", scope.ctx.user.id);
            scope.reply(&t!("handlers.embassy.unlocked", locale = &language)).await?;
        }
        Err(e) => {
            error!("Failed to unlock the door for {}: {}", scope.ctx.user.id, e);
            scope
                .reply(&t!("handlers.embassy.unlock_failed", locale = &language))
                .await?;
        }
    }

    Ok(())
}

pub async fn webcam(scope: CommandScope, args: Vec<String>) -> HandlerResult<()> {
    let language = scope.language().to_string();
    let camera = args.first().map(String::as_str).unwrap_or(DEFAULT_CAMERA).to_lowercase();

    let image = match scope.services.platform.embassy.webcam(&camera).await {
        Ok(image) => image,
        Err(e) => {
            warn!("Webcam {} is unavailable: {}", camera, e);
            scope
                .reply(&t!("handlers.embassy.webcam_failed", locale = &language, camera = camera))
                .await?;
            return Ok(());
        }
    };

    let message_id = scope.reply_photo(image, None).await?;

    if scope.ctx.mode.live {
        let spec = LiveHandlerSpec {
            kind: LiveKind::CamLive,
            chat_id: scope.ctx.chat_id,
            message_id: Some(message_id),
            params: vec![camera],
        };
        let runner = live_runner(scope.services.clone(), Arc::clone(&scope.transport));
        scope.services.live.subscribe(spec, runner).await?;
    }

    Ok(())
}

/// Replaces the previous snapshot with a fresh one. Photos cannot be edited in place.
pub fn live_runner(services: ServiceRegistry, transport: Arc<dyn ChatTransport>) -> LiveRunner {
    Arc::new(move |spec: LiveHandlerSpec| -> LiveFuture {
        let services = services.clone();
        let transport = Arc::clone(&transport);
        Box::pin(async move {
            let camera = spec.params.first().map(String::as_str).unwrap_or(DEFAULT_CAMERA);
            let image = services.platform.embassy.webcam(camera).await?;

            if let Some(previous) = spec.message_id {
                if let Err(e) = transport.delete_message(spec.chat_id, previous).await {
                    debug!("Previous snapshot {} in chat {} is gone: {}", previous, spec.chat_id, e);
                }
            }

            let options = SendOptions {
                markup: None,
                silent: true,
            };
            let message_id = transport.send_photo(spec.chat_id, image, None, options).await?;
            Ok(Some(message_id))
        })
    })
}

#[cfg(test)]
mod tests {
    use crate::{
        service::{event::BotEvent, user::Role},
        utils::test::{add_user, message, setup_test_app, Sent},
    };

    #[tokio::test]
    async fn test_ping_reaches_embassy() {
        let app = setup_test_app().await;
        add_user(&app, 1, "neo", &[Role::Member]).await;

        app.state.message_router.route(message(-100, 1, "/ping example.org")).await;

        assert_eq!(app.embassy.pinged(), vec!["example.org".to_string()]);
        assert!(app.transport.texts()[0].starts_with("example.org"));
    }

    #[tokio::test]
    async fn test_trusted_user_gets_webcam_photo() {
        let app = setup_test_app().await;
        add_user(&app, 1, "morpheus", &[Role::Trusted]).await;

        app.state.message_router.route(message(-100, 1, "/cam")).await;

        assert!(app
            .transport
            .sent()
            .iter()
            .any(|sent| matches!(sent, Sent::Photo { chat_id: -100, .. })));
    }

    #[tokio::test]
    async fn test_live_webcam_replaces_snapshot() {
        let app = setup_test_app().await;
        add_user(&app, 1, "neo", &[Role::Member]).await;

        app.state.message_router.route(message(-100, 1, "/webcam -live")).await;
        app.state.services.events.emit(BotEvent::CamLiveUpdate);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let sent = app.transport.sent();
        let photos = sent.iter().filter(|sent| matches!(sent, Sent::Photo { .. })).count();
        assert_eq!(photos, 2);
        assert!(sent.iter().any(|sent| matches!(sent, Sent::Delete { chat_id: -100, .. })));

        let spec = &app.state.services.live.specs()[0];
        assert_ne!(spec.message_id, Some(1));
    }
}
