use thiserror::Error;

#[derive(Error, Debug)]
pub enum WireError {
    /// Truncated payload, unknown type tag, trailing bytes, or nesting past
    /// the depth cap.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("frame of {len} bytes exceeds cap of {max}")]
    OversizedFrame { len: usize, max: usize },

    /// A value could not be represented on the wire (e.g. a string or
    /// collection longer than a u32 length field can carry).
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WireError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedFrame(message.into())
    }
}
