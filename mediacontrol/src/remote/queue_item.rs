use serde::{Deserialize, Serialize};

use crate::descriptor::{MediaDescriptor, MediaMetadata};

/// Stream type announced to the receiver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamType {
    #[default]
    Buffered,
    Live,
    None,
}

/// Receiver-side description of a media item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInformation {
    /// Content URL, used as the receiver's content id.
    pub content_id: String,
    pub content_type: String,
    pub stream_type: StreamType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MediaMetadata>,
}

/// One entry of a remote queue request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    /// Id of the descriptor this item was built from.
    pub descriptor_id: String,
    pub media: MediaInformation,
    pub autoplay: bool,
    /// Seconds before the end of the previous item at which preloading starts.
    pub preload_time: f64,
    pub start_time: f64,
}

impl QueueItem {
    /// Builds an autoplay, buffered item without preload, the defaults used
    /// for every queue request. Missing metadata just leaves the item
    /// undecorated.
    pub fn from_descriptor(descriptor: &MediaDescriptor) -> Self {
        QueueItem {
            descriptor_id: descriptor.id().to_string(),
            media: MediaInformation {
                content_id: descriptor.content_url().to_string(),
                content_type: descriptor.format().mime_type().to_string(),
                stream_type: StreamType::Buffered,
                duration: descriptor.duration_seconds(),
                metadata: descriptor.metadata().cloned(),
            },
            autoplay: true,
            preload_time: 0.0,
            start_time: descriptor.start_position_seconds(),
        }
    }
}
