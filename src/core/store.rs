use crate::domain::model::FixRecord;
use crate::domain::ports::{FixStore, Storage};
use crate::utils::error::Result;
use async_trait::async_trait;

pub const FIXES_FILE: &str = "fixes.json";

pub struct JsonFixStore<S: Storage> {
    storage: S,
}

impl<S: Storage> JsonFixStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl<S: Storage> FixStore for JsonFixStore<S> {
    async fn load_all(&self) -> Result<Vec<FixRecord>> {
        match self.storage.read_file(FIXES_FILE).await? {
            Some(data) if !data.is_empty() => Ok(serde_json::from_slice(&data)?),
            _ => Ok(Vec::new()),
        }
    }

    async fn save_all(&self, fixes: &[FixRecord]) -> Result<()> {
        let data = serde_json::to_vec_pretty(fixes)?;
        tracing::debug!("Saving {} fix record(s) ({} bytes)", fixes.len(), data.len());
        self.storage.write_file(FIXES_FILE, &data).await
    }
}
