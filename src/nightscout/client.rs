use std::time::Duration;

use reqwest::Client;

use crate::config::AppConfig;
use crate::model::{Entry, FetchError, ServerSettings, StatusResponse};
use crate::nightscout::traits::EntrySource;

pub struct NightscoutClient {
    client: Client,
    entries_url: String,
    api_root: String,
}

impl NightscoutClient {
    pub fn new(config: &AppConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("nightscout-cgm/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            entries_url: config.entries_url.clone(),
            api_root: config.api_root.clone(),
        })
    }

    fn status_url(&self) -> String {
        format!("{}/status.json", self.api_root)
    }
}

#[async_trait::async_trait]
impl EntrySource for NightscoutClient {
    async fn fetch_entries(
        &self,
        count: u32,
        older_than_ms: Option<i64>,
    ) -> Result<Vec<Entry>, FetchError> {
        let mut params = vec![("count", count.to_string())];
        if let Some(cutoff) = older_than_ms {
            params.push(("find[date][$lte]", cutoff.to_string()));
        }

        let response = self
            .client
            .get(&self.entries_url)
            .query(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::BadStatus(response.status()));
        }

        Ok(response.json::<Vec<Entry>>().await?)
    }

    async fn fetch_settings(&self) -> Result<ServerSettings, FetchError> {
        let response = self.client.get(self.status_url()).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::BadStatus(response.status()));
        }

        let status = response.json::<StatusResponse>().await?;
        Ok(status.settings)
    }
}
