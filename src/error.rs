use thiserror::Error;
use std::io;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("key of {0} bytes exceeds the 64-byte limit")]
    KeyTooLong(usize),
    #[error("corrupt index: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type IndexResult<T> = Result<T, IndexError>;
