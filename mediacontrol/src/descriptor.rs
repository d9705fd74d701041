//! Immutable description of a playable media item.
//!
//! A [`MediaDescriptor`] is what both coordinators consume: the local one
//! hands it to the player engine, the remote one turns it into a cast queue
//! item. Descriptors are built once through [`MediaDescriptorBuilder`] and
//! never mutated afterwards; coordinators keep their own clone.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::ControlError;

/// Sentinel used by player SDKs for "duration unknown until prepare".
pub const UNKNOWN_DURATION: f64 = -1.0;

/// Streaming format of a media source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Hls,
    Dash,
    Progressive,
}

impl MediaFormat {
    /// Guesses the format from the path of a content URL.
    ///
    /// `.m3u8` is HLS, `.mpd` is DASH, anything else is treated as a
    /// progressive download.
    pub fn from_url(url: &Url) -> Self {
        let path = url.path().to_ascii_lowercase();
        if path.ends_with(".m3u8") {
            MediaFormat::Hls
        } else if path.ends_with(".mpd") {
            MediaFormat::Dash
        } else {
            MediaFormat::Progressive
        }
    }

    /// MIME type announced to cast receivers.
    pub fn mime_type(&self) -> &'static str {
        match self {
            MediaFormat::Hls => "application/x-mpegURL",
            MediaFormat::Dash => "application/dash+xml",
            MediaFormat::Progressive => "video/mp4",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFormat::Hls => "HLS",
            MediaFormat::Dash => "DASH",
            MediaFormat::Progressive => "PROGRESSIVE",
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// DRM parameters attached to a descriptor.
///
/// The core never interprets these; they are forwarded untouched to the
/// engine, which owns license acquisition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "lowercase")]
pub enum DrmData {
    Widevine {
        license_url: String,
    },
    FairPlay {
        license_url: String,
        certificate_url: String,
    },
    PlayReady {
        license_url: String,
    },
    /// Any other scheme, carried as an opaque payload.
    Opaque { name: String, payload: Vec<u8> },
}

/// Artwork reference for the side metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artwork {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Optional descriptive metadata (title, subtitle, artwork).
///
/// Only used to decorate remote queue items. Every field may be absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub images: Vec<Artwork>,
}

impl MediaMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.subtitle.is_none() && self.images.is_empty()
    }
}

/// One playable item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    id: String,
    content_url: Url,
    format: MediaFormat,
    start_position_seconds: f64,
    duration_seconds: Option<f64>,
    drm_data: Option<DrmData>,
    metadata: Option<MediaMetadata>,
}

impl MediaDescriptor {
    /// Starts a builder for a descriptor with the given id and content URL.
    pub fn builder(id: impl Into<String>, content_url: impl Into<String>) -> MediaDescriptorBuilder {
        MediaDescriptorBuilder::new(id, content_url)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content_url(&self) -> &Url {
        &self.content_url
    }

    pub fn format(&self) -> MediaFormat {
        self.format
    }

    pub fn start_position_seconds(&self) -> f64 {
        self.start_position_seconds
    }

    /// Known duration, or `None` when the engine has to determine it.
    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration_seconds
    }

    pub fn drm_data(&self) -> Option<&DrmData> {
        self.drm_data.as_ref()
    }

    pub fn metadata(&self) -> Option<&MediaMetadata> {
        self.metadata.as_ref()
    }

    /// Title from the metadata, falling back to the id.
    pub fn display_title(&self) -> &str {
        self.metadata
            .as_ref()
            .and_then(|m| m.title.as_deref())
            .unwrap_or(&self.id)
    }
}

/// Builder for [`MediaDescriptor`].
///
/// Validation happens in [`build`](Self::build):
/// - `id` must not be empty,
/// - `content_url` must be an absolute URI,
/// - the start position must be finite and not negative.
#[derive(Clone, Debug)]
pub struct MediaDescriptorBuilder {
    id: String,
    content_url: String,
    format: Option<MediaFormat>,
    start_position_seconds: f64,
    duration_seconds: f64,
    drm_data: Option<DrmData>,
    metadata: Option<MediaMetadata>,
}

impl MediaDescriptorBuilder {
    pub fn new(id: impl Into<String>, content_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content_url: content_url.into(),
            format: None,
            start_position_seconds: 0.0,
            duration_seconds: UNKNOWN_DURATION,
            drm_data: None,
            metadata: None,
        }
    }

    /// Sets the format explicitly instead of guessing it from the URL.
    pub fn format(mut self, format: MediaFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn start_position(mut self, seconds: f64) -> Self {
        self.start_position_seconds = seconds;
        self
    }

    /// Sets the duration. Any negative value means "unknown".
    pub fn duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    pub fn drm(mut self, drm: DrmData) -> Self {
        self.drm_data = Some(drm);
        self
    }

    pub fn metadata(mut self, metadata: MediaMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.metadata.get_or_insert_with(Default::default).title = Some(title.into());
        self
    }

    pub fn subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.metadata.get_or_insert_with(Default::default).subtitle = Some(subtitle.into());
        self
    }

    pub fn image(mut self, url: impl Into<String>, width: u32, height: u32) -> Self {
        self.metadata
            .get_or_insert_with(Default::default)
            .images
            .push(Artwork {
                url: url.into(),
                width: Some(width),
                height: Some(height),
            });
        self
    }

    pub fn build(self) -> Result<MediaDescriptor, ControlError> {
        let id = self.id.trim().to_string();
        if id.is_empty() {
            return Err(ControlError::InvalidDescriptor(
                "descriptor id must not be empty".to_string(),
            ));
        }

        // Url::parse refuse les chemins relatifs (RelativeUrlWithoutBase)
        let content_url = Url::parse(self.content_url.trim()).map_err(|e| {
            ControlError::InvalidDescriptor(format!(
                "content URL '{}' is not an absolute URI: {}",
                self.content_url, e
            ))
        })?;

        if !self.start_position_seconds.is_finite() || self.start_position_seconds < 0.0 {
            return Err(ControlError::InvalidDescriptor(format!(
                "start position {} must be a finite value >= 0",
                self.start_position_seconds
            )));
        }

        let duration_seconds = if self.duration_seconds.is_finite() && self.duration_seconds >= 0.0 {
            Some(self.duration_seconds)
        } else {
            None
        };

        let format = self
            .format
            .unwrap_or_else(|| MediaFormat::from_url(&content_url));

        Ok(MediaDescriptor {
            id,
            content_url,
            format,
            start_position_seconds: self.start_position_seconds,
            duration_seconds,
            drm_data: self.drm_data,
            metadata: self.metadata.filter(|m| !m.is_empty()),
        })
    }
}
