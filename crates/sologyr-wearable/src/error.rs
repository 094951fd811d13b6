use thiserror::Error;

/// Dictionary codec errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("Packet has {0} tuples, at most 255 fit")]
    TooManyTuples(usize),

    #[error("Value for key {key} is {length} bytes, too large to encode")]
    ValueTooLarge { key: u32, length: usize },

    #[error("Packet is truncated")]
    Truncated,

    #[error("Unknown value type {0}")]
    UnknownType(u8),

    #[error("Invalid length {length} for value type {type_tag}")]
    InvalidLength { type_tag: u8, length: usize },

    #[error("String value is not NUL-terminated UTF-8")]
    InvalidString,

    #[error("{0} trailing bytes after last tuple")]
    TrailingBytes(usize),
}

/// Failure reported by a transport implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Protocol engine errors
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),
}
