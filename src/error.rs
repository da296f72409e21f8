use thiserror::Error;

/// Errors returned by the transport layer when talking to the REST service.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The requested resource does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The service answered with a non-success status
    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// The response body could not be decoded or failed validation
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Which piece of file metadata a write targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileField {
    Tag,
    Comment,
}

impl std::fmt::Display for FileField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileField::Tag => f.write_str("tag"),
            FileField::Comment => f.write_str("comment"),
        }
    }
}

/// Errors surfaced by image sources, the slice cache and the view orchestration.
///
/// None of these are fatal: a failure degrades the panel it belongs to and
/// leaves the selection state untouched so the user can retry.
#[derive(Debug, Clone, Error)]
pub enum ViewError {
    /// Slice data was queried before any fetch for the image completed
    #[error("Image data not loaded yet: {0}")]
    NotLoaded(String),

    /// Fetching image data or metadata failed
    #[error("Fetch failed: {0}")]
    FetchFailure(#[from] FetchError),

    /// Updating a file's tag or comment was rejected; the cached value is unchanged
    #[error("Failed to update {field}: {source}")]
    WriteFailure {
        field: FileField,
        #[source]
        source: FetchError,
    },

    /// Requested slice index does not exist in the image
    #[error("Slice {index} out of range: image has {count} slice(s)")]
    SliceOutOfRange { index: usize, count: usize },

    /// File metadata was requested for an image that is not backed by a file
    #[error("Image has no backing file")]
    NoBackingFile,
}

/// Errors from producing output of an offscreen rendering surface.
#[derive(Debug, Clone, Error)]
pub enum SurfaceError {
    /// Nothing has been drawn yet
    #[error("Surface has not been drawn")]
    NotDrawn,

    /// Image encoding failed
    #[error("Encoding failed: {0}")]
    Encode(String),

    /// Writing the encoded image failed
    #[error("I/O error: {0}")]
    Io(String),
}
