use tracing::{debug, info};

use crate::media::{DeviceDescriptor, DeviceKind, StreamConstraints};

/// Input device lists and the current camera/microphone selection
#[derive(Debug, Clone, Default)]
pub struct DeviceManager {
    video: Vec<DeviceDescriptor>,
    audio: Vec<DeviceDescriptor>,
    selected_video: Option<String>,
    selected_audio: Option<String>,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selector text shown when nothing is selected
    pub fn placeholder(kind: DeviceKind) -> &'static str {
        match kind {
            DeviceKind::Video => "Select Camera",
            DeviceKind::Audio => "Select Microphone",
        }
    }

    /// Replace the lists with a fresh enumeration
    ///
    /// Non-input devices are dropped. A kind with no selection, or whose
    /// selected device disappeared, falls back to its first device.
    /// Returns true if the effective selection changed.
    pub fn update(&mut self, devices: Vec<DeviceDescriptor>) -> bool {
        let (video, audio): (Vec<_>, Vec<_>) = devices
            .into_iter()
            .filter(|d| d.kind.is_some())
            .partition(|d| d.kind == Some(DeviceKind::Video));

        info!("Enumerated {} cameras, {} microphones", video.len(), audio.len());

        self.video = video;
        self.audio = audio;

        let video_changed = Self::reconcile(&mut self.selected_video, &self.video);
        let audio_changed = Self::reconcile(&mut self.selected_audio, &self.audio);
        video_changed || audio_changed
    }

    /// Enumeration failed: show empty selectors
    pub fn clear_lists(&mut self) {
        self.video.clear();
        self.audio.clear();
    }

    fn reconcile(selected: &mut Option<String>, devices: &[DeviceDescriptor]) -> bool {
        let still_present = selected
            .as_deref()
            .is_some_and(|id| devices.iter().any(|d| d.id == id));
        if still_present {
            return false;
        }

        let fallback = devices.first().map(|d| d.id.clone());
        if *selected == fallback {
            return false;
        }

        debug!("Device selection {:?} -> {:?}", selected, fallback);
        *selected = fallback;
        true
    }

    pub fn devices(&self, kind: DeviceKind) -> &[DeviceDescriptor] {
        match kind {
            DeviceKind::Video => &self.video,
            DeviceKind::Audio => &self.audio,
        }
    }

    pub fn selected(&self, kind: DeviceKind) -> Option<&str> {
        match kind {
            DeviceKind::Video => self.selected_video.as_deref(),
            DeviceKind::Audio => self.selected_audio.as_deref(),
        }
    }

    /// Whether `id` is a device of this kind in the current lists
    pub fn contains(&self, kind: DeviceKind, id: &str) -> bool {
        self.devices(kind).iter().any(|d| d.id == id)
    }

    pub fn select(&mut self, kind: DeviceKind, id: &str) {
        self.set_selected(kind, Some(id));
    }

    /// Record the device actually in use; `None` clears the selection so
    /// the next `update` falls back to the first device
    pub fn set_selected(&mut self, kind: DeviceKind, id: Option<&str>) {
        let slot = match kind {
            DeviceKind::Video => &mut self.selected_video,
            DeviceKind::Audio => &mut self.selected_audio,
        };
        *slot = id.map(str::to_string);
    }

    /// Constraints for acquiring the currently selected pair
    pub fn constraints(&self) -> StreamConstraints {
        StreamConstraints {
            video_device_id: self.selected_video.clone(),
            audio_device_id: self.selected_audio.clone(),
        }
    }

    /// Text for the selector: the selected device's label or the placeholder
    pub fn selector_label(&self, kind: DeviceKind) -> String {
        let devices = self.devices(kind);
        self.selected(kind)
            .and_then(|id| devices.iter().position(|d| d.id == id))
            .map(|index| Self::display_label(kind, index, &devices[index]))
            .unwrap_or_else(|| Self::placeholder(kind).to_string())
    }

    /// Label for a list entry. Platforms hide labels until permission is
    /// granted, so blank ones are numbered instead.
    pub fn display_label(kind: DeviceKind, index: usize, device: &DeviceDescriptor) -> String {
        if device.label.trim().is_empty() {
            let noun = match kind {
                DeviceKind::Video => "Camera",
                DeviceKind::Audio => "Microphone",
            };
            format!("{} {}", noun, index + 1)
        } else {
            device.label.clone()
        }
    }
}
