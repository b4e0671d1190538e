use reqwest::{Client, ClientBuilder};
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "HackerBot/1.0";

/// Client shared by the embassy and assistant integrations.
pub fn create_api_client() -> Result<Client, reqwest::Error> {
    let builder = Client::builder()
        .timeout(Duration::from_secs(20))
        .connect_timeout(Duration::from_secs(5))
        .user_agent(DEFAULT_USER_AGENT);

    build_client(builder)
}

fn build_client(builder: ClientBuilder) -> Result<Client, reqwest::Error> {
    builder.build()
}
