pub type DecodeResult<T> = core::result::Result<T, DecodeError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("truncated frame: needed {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },
}
