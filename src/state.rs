use std::sync::Arc;

use crate::{
    config::AppConfig,
    error::BotResult,
    handler::{build_route_table, live_runner, verification_handler},
    platform::PlatformRegistry,
    router::{CallbackRouter, MessageRouter, RouteTable},
    service::ServiceRegistry,
    storage::StorageManager,
    transport::ChatTransport,
};

/// Long-lived application graph, shared with the dispatcher as a dependency.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: StorageManager,
    pub services: ServiceRegistry,
    pub routes: Arc<RouteTable>,
    pub message_router: MessageRouter,
    pub callback_router: CallbackRouter,
    pub transport: Arc<dyn ChatTransport>,
}

impl AppState {
    pub async fn new(config: AppConfig, transport: Arc<dyn ChatTransport>) -> BotResult<Self> {
        let storage = StorageManager::init(&config.storage).await?;
        let platform = Arc::new(PlatformRegistry::new(&config.platform)?);

        Self::with_storage(config, storage, platform, transport).await
    }

    pub async fn with_storage(
        config: AppConfig,
        storage: StorageManager,
        platform: Arc<PlatformRegistry>,
        transport: Arc<dyn ChatTransport>,
    ) -> BotResult<Self> {
        let config = Arc::new(config);
        let services = ServiceRegistry::new(&config, &storage, platform).await?;

        let routes = Arc::new(build_route_table(&config.router)?);
        let router_config = Arc::new(config.router.clone());

        let message_router = MessageRouter::new(
            Arc::clone(&routes),
            services.clone(),
            Arc::clone(&transport),
            Arc::clone(&router_config),
        );
        let callback_router = CallbackRouter::new(
            Arc::clone(&routes),
            services.clone(),
            Arc::clone(&transport),
            router_config,
            verification_handler(),
        );

        let state = Self {
            config,
            storage,
            services,
            routes,
            message_router,
            callback_router,
            transport,
        };
        state.restore_live_handlers().await?;

        Ok(state)
    }

    /// Re-attaches live handlers persisted by a previous run.
    async fn restore_live_handlers(&self) -> BotResult<()> {
        let specs = self.services.bot_state.live_handlers().await;
        if specs.is_empty() {
            return Ok(());
        }

        info!("Restoring {} live handlers", specs.len());
        for spec in specs {
            let runner = live_runner(spec.kind, self.services.clone(), Arc::clone(&self.transport));
            self.services.live.subscribe(spec, runner).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        service::live::{LiveHandlerSpec, LiveKind},
        utils::test::{FakeEmbassy, RecordingTransport},
    };

    #[tokio::test]
    async fn test_live_handlers_survive_restart() {
        let storage = StorageManager::memory();
        let platform = Arc::new(PlatformRegistry::with_clients(Arc::new(FakeEmbassy::default()), None));
        let transport: Arc<dyn ChatTransport> = Arc::new(RecordingTransport::default());

        let first = AppState::with_storage(
            AppConfig::new_test_config(),
            storage.clone(),
            Arc::clone(&platform),
            Arc::clone(&transport),
        )
        .await
        .unwrap();
        let spec = LiveHandlerSpec {
            kind: LiveKind::StatusLive,
            chat_id: -100,
            message_id: Some(3),
            params: vec!["en".to_string()],
        };
        let runner = live_runner(spec.kind, first.services.clone(), Arc::clone(&transport));
        first.services.live.subscribe(spec.clone(), runner).await.unwrap();

        let second = AppState::with_storage(AppConfig::new_test_config(), storage, platform, transport)
            .await
            .unwrap();

        assert_eq!(second.services.live.specs(), vec![spec]);
    }
}
