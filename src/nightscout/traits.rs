use crate::model::{Entry, FetchError, ServerSettings};

#[async_trait::async_trait]
pub trait EntrySource: Send + Sync {
    /// Fetches up to `count` entries, newest first, optionally restricted to
    /// entries at or before `older_than_ms` (unix milliseconds).
    async fn fetch_entries(
        &self,
        count: u32,
        older_than_ms: Option<i64>,
    ) -> Result<Vec<Entry>, FetchError>;

    /// Fetches server settings (display units, thresholds).
    async fn fetch_settings(&self) -> Result<ServerSettings, FetchError>;
}
