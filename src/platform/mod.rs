mod assistant;
mod embassy;
mod error;
pub mod traits;

use std::sync::Arc;

pub use assistant::AssistantClient;
pub use embassy::EmbassyClient;
pub use error::*;
use traits::{Assistant, EmbassyApi};

use crate::{config::PlatformConfig, utils::http};

#[derive(Clone)]
pub struct PlatformRegistry {
    pub embassy: Arc<dyn EmbassyApi>,
    pub assistant: Option<Arc<dyn Assistant>>,
}

impl PlatformRegistry {
    pub fn new(config: &PlatformConfig) -> Result<Self, PlatformError> {
        info!("Initializing platform registry");

        let client = http::create_api_client()?;
        let embassy = Arc::new(EmbassyClient::new(client.clone(), &config.embassy_api_url)?);

        let assistant = match &config.assistant_api_url {
            Some(url) => {
                let assistant = AssistantClient::new(
                    client,
                    url,
                    config.assistant_api_token.clone(),
                    &config.assistant_model,
                )?;
                Some(Arc::new(assistant) as Arc<dyn Assistant>)
            }
            None => {
                info!("No assistant configured, unknown commands will be ignored");
                None
            }
        };

        info!("Platform registry initialized");
        Ok(Self { embassy, assistant })
    }

    pub fn with_clients(embassy: Arc<dyn EmbassyApi>, assistant: Option<Arc<dyn Assistant>>) -> Self {
        Self { embassy, assistant }
    }
}
