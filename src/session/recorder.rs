use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::state::ArtifactInfo;
use crate::error::{MediaError, Result};
use crate::media::RecorderEvent;

/// The finalized recording: one immutable video object
#[derive(Debug, Clone)]
pub struct RecordedArtifact {
    pub id: uuid::Uuid,
    pub mime_type: String,
    /// Concatenated fragments, shared with playback without copying
    pub data: Arc<[u8]>,
    pub fragment_count: usize,
    pub duration_secs: u64,
    pub created_at: DateTime<Utc>,
}

impl RecordedArtifact {
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            id: self.id,
            mime_type: self.mime_type.clone(),
            size_bytes: self.size_bytes(),
            fragment_count: self.fragment_count,
            duration_secs: self.duration_secs,
            created_at: self.created_at,
        }
    }
}

/// Buffers recorder fragments in order and joins them on finalize
pub struct ChunkCollector {
    mime_type: String,
    fragments: Vec<Vec<u8>>,
}

impl ChunkCollector {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            fragments: Vec::new(),
        }
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    /// Append one data fragment
    pub fn push(&mut self, fragment: Vec<u8>) {
        if fragment.is_empty() {
            return;
        }
        self.fragments.push(fragment);
    }

    /// Concatenate every fragment into one artifact and clear the buffer
    pub fn finalize(&mut self, duration_secs: u64) -> RecordedArtifact {
        let fragment_count = self.fragments.len();
        let data: Vec<u8> = self.fragments.drain(..).flatten().collect();

        RecordedArtifact {
            id: uuid::Uuid::new_v4(),
            mime_type: self.mime_type.clone(),
            data: Arc::from(data),
            fragment_count,
            duration_secs,
            created_at: Utc::now(),
        }
    }

    /// Drop everything buffered so far
    pub fn discard(&mut self) {
        self.fragments.clear();
    }

    /// Consume recorder events until the recorder closes its channel
    ///
    /// A recorder error discards the buffered fragments and is returned.
    /// On success the fragments stay buffered for `finalize`.
    pub async fn collect(&mut self, mut events: mpsc::Receiver<RecorderEvent>) -> Result<()> {
        debug!("Collecting recorder fragments");

        while let Some(event) = events.recv().await {
            match event {
                RecorderEvent::Data(fragment) => self.push(fragment),
                RecorderEvent::Error(e) => {
                    self.discard();
                    return Err(e);
                }
            }
        }

        if self.fragments.is_empty() {
            return Err(MediaError::Recorder(
                "recorder stopped without producing data".to_string(),
            ));
        }

        info!("Recorder flushed {} fragments", self.fragments.len());
        Ok(())
    }
}
