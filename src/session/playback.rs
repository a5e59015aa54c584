use std::sync::Arc;
use tracing::info;

use super::recorder::RecordedArtifact;
use crate::media::{ObjectUrls, PlaybackSink};

/// Binds the finished recording to the playback sink
///
/// Holds at most one temporary reference; the previous one is revoked
/// before the sink is pointed at a new one.
pub struct PlaybackPresenter {
    urls: Arc<dyn ObjectUrls>,
    sink: Arc<dyn PlaybackSink>,
    current_url: Option<String>,
}

impl PlaybackPresenter {
    pub fn new(urls: Arc<dyn ObjectUrls>, sink: Arc<dyn PlaybackSink>) -> Self {
        Self {
            urls,
            sink,
            current_url: None,
        }
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    /// Show `artifact`, superseding whatever was shown before
    pub fn present(&mut self, artifact: &RecordedArtifact) -> &str {
        self.teardown();

        let url = self
            .urls
            .create_object_url(&artifact.mime_type, Arc::clone(&artifact.data));
        self.sink.bind_source(Some(url.as_str()));
        info!("Playback bound to {}", url);

        self.current_url.insert(url)
    }

    /// Unbind the sink and revoke the live reference
    pub fn teardown(&mut self) {
        if let Some(url) = self.current_url.take() {
            self.sink.bind_source(None);
            self.urls.revoke_object_url(&url);
        }
    }
}

impl Drop for PlaybackPresenter {
    fn drop(&mut self) {
        self.teardown();
    }
}
