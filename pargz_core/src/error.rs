use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every way a compress/decompress run can fail.
///
/// A cancelled run is reported as [`crate::Outcome::Cancelled`], not as an
/// error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Opening or creating one of the session files failed.
    #[error("cannot open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The trailer or the chunk layout it describes is malformed.
    #[error("malformed archive: {0}")]
    Format(String),

    #[error("chunk at original offset {original_start} decompressed to {actual} bytes but the footer records {expected}")]
    LengthMismatch {
        original_start: u64,
        expected: u64,
        actual: u64,
    },

    #[error(transparent)]
    Codec(#[from] anyhow::Error),

    #[error("worker thread panicked")]
    WorkerPanicked,
}

/// Coarse classification of an [`Error`], for callers that map failures to
/// user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Argument,
    NotFound,
    PermissionDenied,
    Io,
    Format,
    Codec,
    Internal,
}

impl Error {
    pub fn format<T: std::fmt::Display>(msg: T) -> Self {
        Error::Format(msg.to_string())
    }

    pub fn invalid_argument<T: std::fmt::Display>(msg: T) -> Self {
        Error::InvalidArgument(msg.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::Argument,
            Error::Open { source, .. } | Error::Io(source) => match source.kind() {
                io::ErrorKind::NotFound => ErrorKind::NotFound,
                io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
                _ => ErrorKind::Io,
            },
            Error::Format(_) | Error::LengthMismatch { .. } => ErrorKind::Format,
            Error::Codec(_) => ErrorKind::Codec,
            Error::WorkerPanicked => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_io_error_kind() {
        let err = Error::Open {
            path: PathBuf::from("missing.bin"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = Error::from(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let err = Error::from(io::Error::new(io::ErrorKind::UnexpectedEof, "short"));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn codec_failures_are_distinguishable() {
        let err = Error::from(anyhow::anyhow!("corrupt deflate stream"));
        assert_eq!(err.kind(), ErrorKind::Codec);
        assert_eq!(err.to_string(), "corrupt deflate stream");
    }
}
