//! Message attachment entity.
//!
//! Maps to the `message_attachments` table. Attachments are written together
//! with their message, so persistence lives in
//! [`MessageRepository`](super::message::MessageRepository).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum file size in bytes (25MB).
pub const MAX_ATTACHMENT_SIZE: i64 = 26_214_400;

/// Maximum number of attachments on one message.
pub const MAX_ATTACHMENTS_PER_MESSAGE: u64 = 10;

/// Represents an uploaded file referenced by a message.
///
/// Maps to the `message_attachments` table:
/// - id: UUID PRIMARY KEY
/// - message_id: UUID NOT NULL REFERENCES messages(id) ON DELETE CASCADE
/// - url: TEXT NOT NULL
/// - mime_type: VARCHAR(100) NULL
/// - bytes: BIGINT NULL
/// - width / height: INTEGER NULL (pixels, for images/videos)
/// - duration_ms: INTEGER NULL (audio/video)
/// - sha256: VARCHAR(64) NULL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageAttachment {
    pub id: Uuid,
    pub message_id: Uuid,
    pub url: String,
    pub mime_type: Option<String>,
    pub bytes: Option<i64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration_ms: Option<i32>,
    pub sha256: Option<String>,
}

impl MessageAttachment {
    pub fn is_image(&self) -> bool {
        self.mime_type
            .as_deref()
            .map(|m| m.starts_with("image/"))
            .unwrap_or(false)
    }

    pub fn has_dimensions(&self) -> bool {
        self.width.is_some() && self.height.is_some()
    }

    /// Size is known and within [`MAX_ATTACHMENT_SIZE`].
    pub fn within_size_limit(&self) -> bool {
        match self.bytes {
            Some(bytes) => (0..=MAX_ATTACHMENT_SIZE).contains(&bytes),
            None => true,
        }
    }
}
