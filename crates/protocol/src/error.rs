//! Protocol error types.

use thiserror::Error;

/// Errors that can occur during protocol parsing.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid packet opcode: {0:#04x}")]
    InvalidOpcode(u8),

    #[error("Unexpected end of data")]
    UnexpectedEof,

    #[error("VarInt is longer than 5 bytes")]
    VarIntTooLong,

    #[error("String is not valid UTF-8")]
    InvalidUtf8,

    #[error("Entity id 0 is reserved")]
    InvalidEntityId,
}
