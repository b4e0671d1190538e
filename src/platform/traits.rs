use async_trait::async_trait;

use super::PlatformError;

/// Door, network and camera capabilities of the space, served by the embassy API.
#[async_trait]
pub trait EmbassyApi: Send + Sync + 'static {
    async fn unlock_door(&self) -> Result<(), PlatformError>;

    /// MAC addresses currently seen on the space network.
    async fn devices_inside(&self) -> Result<Vec<String>, PlatformError>;

    /// JPEG snapshot of the named camera.
    async fn webcam(&self, name: &str) -> Result<Vec<u8>, PlatformError>;

    /// Raw ping output for `host`, executed from inside the space.
    async fn ping(&self, host: &str) -> Result<String, PlatformError>;
}

#[async_trait]
pub trait Assistant: Send + Sync + 'static {
    async fn ask(&self, prompt: &str) -> Result<String, PlatformError>;
}
