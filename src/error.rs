//! Crate-wide error taxonomy.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("format error: {0}")]
    Format(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("decompression error: {0}")]
    Decode(String),

    #[error("out of bounds: {0}")]
    Bounds(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("duplicate path: {namespace}{path}")]
    DuplicatePath { namespace: char, path: String },

    #[error("content provider declared size {declared} but produced {actual} bytes")]
    IncoherentImplementation { declared: u64, actual: u64 },

    #[error("could not open zim part at {0}")]
    MissingPart(PathBuf),

    #[error("invalid UTF-8 in on-disk string: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl Error {
    pub fn format<S: Into<String>>(msg: S) -> Error {
        Error::Format(msg.into())
    }

    pub fn bounds<S: Into<String>>(msg: S) -> Error {
        Error::Bounds(msg.into())
    }

    pub fn invalid_state<S: Into<String>>(msg: S) -> Error {
        Error::InvalidState(msg.into())
    }

    pub fn decode<S: Into<String>>(msg: S) -> Error {
        Error::Decode(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Error {
        Error::NotFound(msg.into())
    }
}

impl From<bitreader::BitReaderError> for Error {
    fn from(e: bitreader::BitReaderError) -> Error {
        Error::Format(format!("malformed cluster info byte: {e}"))
    }
}
