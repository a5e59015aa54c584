use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use super::backend::ObjectUrls;

struct Entry {
    mime_type: String,
    data: Arc<[u8]>,
}

/// In-memory registry of `blob:` references
///
/// Resolving a reference hands out the shared bytes, never a copy.
#[derive(Default)]
pub struct LocalObjectUrls {
    entries: Mutex<HashMap<String, Entry>>,
}

impl LocalObjectUrls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live reference, returning its mime type and bytes
    pub fn resolve(&self, url: &str) -> Option<(String, Arc<[u8]>)> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(url)
            .map(|entry| (entry.mime_type.clone(), Arc::clone(&entry.data)))
    }

    /// Number of references not yet revoked
    pub fn live_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ObjectUrls for LocalObjectUrls {
    fn create_object_url(&self, mime_type: &str, data: Arc<[u8]>) -> String {
        let url = format!("blob:webcam-recorder/{}", uuid::Uuid::new_v4());
        debug!("Created object URL {} ({} bytes)", url, data.len());

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            url.clone(),
            Entry {
                mime_type: mime_type.to_string(),
                data,
            },
        );
        url
    }

    fn revoke_object_url(&self, url: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(url).is_some() {
            debug!("Revoked object URL {}", url);
        }
    }
}
