//! Command dispatch.
//!
//! [`RouteTable`] holds the compiled routes, [`MessageRouter`] turns typed commands into handler
//! calls and [`CallbackRouter`] does the same for inline button presses.

mod callback;
mod message;
mod modifier;
mod permission;
mod route;

pub use callback::{CallbackPayload, CallbackRouter};
pub use message::MessageRouter;
pub use modifier::{extract_alias, split_impersonation, strip_modifiers};
pub use permission::{is_banned, is_chat_allowed, is_user_allowed};
pub use route::*;

use rand::seq::SliceRandom;

use crate::{
    config::RouterConfig,
    error::BotResult,
    service::user::Role,
    transport::{ChatTransport, SendOptions},
};

/// Which access check a command failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Restriction {
    Roles,
    Chat,
}

/// Standard access-denied reply, illustrated with a random image when any are configured.
pub(crate) async fn send_restricted(
    transport: &dyn ChatTransport,
    config: &RouterConfig,
    chat_id: i64,
    route: &Route,
    restriction: Restriction,
    language: &str,
) -> BotResult<()> {
    let text = match restriction {
        Restriction::Chat => t!("router.restricted_chat", locale = language).to_string(),
        Restriction::Roles => {
            let roles = Role::join(&route.roles);
            t!("router.restricted", locale = language, roles = roles).to_string()
        }
    };

    let image = config.restricted_images.choose(&mut rand::thread_rng()).cloned();
    if let Some(path) = image {
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                transport
                    .send_photo(chat_id, bytes, Some(&text), SendOptions::default())
                    .await?;
                return Ok(());
            }
            Err(e) => warn!("Failed to read restricted image {}: {}", path, e),
        }
    }

    transport.send_text(chat_id, &text, SendOptions::default()).await?;
    Ok(())
}
