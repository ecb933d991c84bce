use thiserror::Error;

/// Errors surfaced by the engine and its two stores.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("file i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad magic number {found:#010x}")]
    BadMagic { found: u32 },

    #[error("unsupported file format version {found}")]
    BadVersion { found: u16 },

    #[error("duplicate live key {0}")]
    DuplicateKey(u32),

    #[error("key {0} not found")]
    NotFound(u32),

    #[error("payload of {needed} bytes does not fit buffer of {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    #[error("index keys out of order at position {position}")]
    Corruption { position: u32 },

    #[error("index position {position} out of bounds (count {count})")]
    OutOfBounds { position: u32, count: u32 },

    #[error("file name '{0}' exceeds 12 characters")]
    NameTooLong(String),

    #[error("payload of {0} bytes exceeds the u16 record length")]
    PayloadTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, DbError>;
