//! Container format identifiers.

/// Magic of the animation container (`.ema`).
pub const EMA_MAGIC: [u8; 4] = *b"#EMA";

/// Magic of the bind-pose/model container (`.emo`).
pub const EMO_MAGIC: [u8; 4] = *b"#EMO";

/// Little-endian marker stored right after the magic.
pub const ENDIAN_MARKER: u16 = 0xFFFE;

/// Size of the fixed container header.
pub const HEADER_SIZE: u16 = 0x20;

/// Supported container layout version.
pub const CONTAINER_VERSION: u16 = 1;
