use std::sync::Arc;

use crate::{config::AppConfig, platform::PlatformRegistry, storage::StorageManager};

pub mod botstate;
pub mod cooldown;
mod error;
pub mod event;
pub mod live;
pub mod state;
pub mod user;

pub use error::ServiceError;

use botstate::BotStateService;
use cooldown::CooldownService;
use event::EventBus;
use live::LiveRegistry;
use state::StateService;
use user::UserService;

#[derive(Clone)]
pub struct ServiceRegistry {
    pub users: UserService,
    pub state: StateService,
    pub cooldown: CooldownService,
    pub events: EventBus,
    pub live: LiveRegistry,
    pub bot_state: BotStateService,
    pub platform: Arc<PlatformRegistry>,
}

impl ServiceRegistry {
    pub async fn new(
        config: &AppConfig,
        storage: &StorageManager,
        platform: Arc<PlatformRegistry>,
    ) -> Result<Self, ServiceError> {
        info!("Initializing service registry");

        let events = EventBus::default();

        let bot_state = BotStateService::new(Arc::clone(&storage.kv), config.router.history_capacity);
        bot_state.load().await?;

        let registry = Self {
            users: UserService::new(Arc::clone(&storage.users)),
            state: StateService::new(
                Arc::clone(&storage.states),
                events.clone(),
                config.state.hydration_window_days,
            ),
            cooldown: CooldownService::new(config.callback.cooldown_ms),
            live: LiveRegistry::new(events.clone(), bot_state.clone()),
            events,
            bot_state,
            platform,
        };

        info!("Service registry initialized");

        Ok(registry)
    }
}
