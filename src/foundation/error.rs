pub type PcResult<T> = Result<T, PcError>;

/// Top-level error taxonomy for writer, classifier and tooling APIs.
///
/// The reader never produces these: malformed data surfaces as `None` from the
/// individual accessors.
#[derive(thiserror::Error, Debug)]
pub enum PcError {
    /// Invalid builder usage that would corrupt the produced blob.
    #[error("layout error: {0}")]
    Layout(String),

    /// A write would run past the end of the caller's buffer.
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall {
        needed: u64,
        available: u64,
    },

    /// An offset or size computation would wrap past `u64::MAX`.
    #[error("arithmetic overflow: {0}")]
    Overflow(String),

    /// A cache blob that failed validation where a hard error was requested.
    #[error("invalid cache: {0}")]
    InvalidCache(String),

    /// Pool capacities were not in ascending order.
    #[error("pool capacities must be sorted in ascending order")]
    UnsortedPools,

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PcError {
    pub fn layout(msg: impl Into<String>) -> Self {
        Self::Layout(msg.into())
    }

    pub fn overflow(msg: impl Into<String>) -> Self {
        Self::Overflow(msg.into())
    }

    pub fn invalid_cache(msg: impl Into<String>) -> Self {
        Self::InvalidCache(msg.into())
    }

    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }
}
