use thiserror::Error;

/// Library error type for particle-greeting operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A gallery or panel image could not be read or decoded, even after the
    /// alternate-path retry.
    #[error("failed to load image {source_name}: {reason}")]
    ImageLoad { source_name: String, reason: String },

    /// An embedded `data:` image source was malformed.
    #[error("invalid data uri: {0}")]
    InvalidDataUri(String),

    /// A gallery rebuild was requested while another one is still in flight.
    #[error("gallery rebuild {generation} rejected: another rebuild is in flight")]
    ConcurrentRebuildRejected { generation: u64 },

    /// A gallery rebuild was requested with no images.
    #[error("gallery rebuild requested with no images")]
    EmptyGallery,

    /// The background gallery builder stopped accepting work.
    #[error("gallery builder is not running")]
    BuilderUnavailable,
}

impl Error {
    pub(crate) fn image_load(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::ImageLoad {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }
}
