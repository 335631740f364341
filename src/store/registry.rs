use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StorageError;
use crate::store::{ImageKind, KeyValueStore, StoredImageRecord};

pub const IMAGE_REGISTRY_KEY: &str = "registry/virality_app_images.json";

pub const UPLOADED_PROMPT: &str = "user_uploaded";

type RecordMap = BTreeMap<String, StoredImageRecord>;

/// One JSON blob of `id -> record`; saves are serialized by `write_lock`.
#[derive(Debug)]
pub struct ImageRegistry<S> {
    storage: S,
    write_lock: Mutex<()>,
}

impl<S: KeyValueStore> ImageRegistry<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    async fn load(&self) -> Result<RecordMap, StorageError> {
        match self.storage.get(IMAGE_REGISTRY_KEY).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(RecordMap::new()),
        }
    }

    /// Stores `url` and returns the new record id. Ids are unix milliseconds,
    /// bumped past any id already taken.
    pub async fn save_image(
        &self,
        url: &str,
        prompt: &str,
        kind: ImageKind,
    ) -> Result<String, StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load().await?;

        let now = Utc::now();
        let id = next_free_id(&records, now);
        records.insert(
            id.clone(),
            StoredImageRecord {
                url: url.to_string(),
                prompt: prompt.to_string(),
                kind,
                timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
                id: id.clone(),
            },
        );

        let payload = serde_json::to_vec(&records)?;
        self.storage.put(IMAGE_REGISTRY_KEY, &payload).await?;
        debug!(id = %id, kind = ?kind, "saved image record");
        Ok(id)
    }

    pub async fn save_uploaded_image(&self, url: &str) -> Result<String, StorageError> {
        self.save_image(url, UPLOADED_PROMPT, ImageKind::Uploaded).await
    }

    pub async fn list_images(&self) -> Result<Vec<StoredImageRecord>, StorageError> {
        let mut records: Vec<StoredImageRecord> = self.load().await?.into_values().collect();
        records.sort_by_key(|record| record.id.parse::<i64>().unwrap_or(i64::MAX));
        Ok(records)
    }

    pub async fn get_image(&self, id: &str) -> Result<Option<StoredImageRecord>, StorageError> {
        Ok(self.load().await?.remove(id))
    }
}

fn next_free_id(records: &RecordMap, now: DateTime<Utc>) -> String {
    let mut millis = now.timestamp_millis();
    while records.contains_key(&millis.to_string()) {
        millis += 1;
    }
    millis.to_string()
}
