use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{traits::EmbassyApi, PlatformError};

#[derive(Debug, Deserialize)]
struct DevicesResponse {
    #[serde(default)]
    devices: Vec<String>,
}

#[derive(Clone)]
pub struct EmbassyClient {
    client: Client,
    base_url: Url,
}

impl EmbassyClient {
    pub fn new(client: Client, base_url: &str) -> Result<Self, PlatformError> {
        info!("Initializing embassy client for {}", base_url);

        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, PlatformError> {
        Ok(self.base_url.join(path)?)
    }
}

#[async_trait]
impl EmbassyApi for EmbassyClient {
    async fn unlock_door(&self) -> Result<(), PlatformError> {
        let response = self.client.post(self.endpoint("door/unlock")?).send().await?;

        if !response.status().is_success() {
            return Err(PlatformError::Unavailable(format!("Door responded with {}", response.status())));
        }
        Ok(())
    }

    async fn devices_inside(&self) -> Result<Vec<String>, PlatformError> {
        let response = self
            .client
            .get(self.endpoint("devices")?)
            .send()
            .await?
            .error_for_status()?;

        let devices = response
            .json::<DevicesResponse>()
            .await
            .map_err(|e| PlatformError::InvalidResponse(e.to_string()))?;

        Ok(devices.devices.into_iter().map(|mac| mac.to_lowercase()).collect())
    }

    async fn webcam(&self, name: &str) -> Result<Vec<u8>, PlatformError> {
        let response = self
            .client
            .get(self.endpoint(&format!("webcam/{}", name))?)
            .send()
            .await?
            .error_for_status()?;

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(PlatformError::InvalidResponse("Empty webcam image".to_string()));
        }

        Ok(bytes.to_vec())
    }

    async fn ping(&self, host: &str) -> Result<String, PlatformError> {
        let response = self
            .client
            .get(self.endpoint("ping")?)
            .query(&[("host", host)])
            .send()
            .await?
            .error_for_status()?;

        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_keep_base_path() {
        let client = EmbassyClient::new(Client::new(), "http://embassy.local:9000/api").unwrap();

        assert_eq!(
            client.endpoint("door/unlock").unwrap().as_str(),
            "http://embassy.local:9000/api/door/unlock"
        );
        assert!(EmbassyClient::new(Client::new(), "not a url").is_err());
    }
}
