use std::io;

/// The reasons an archive can fail to decode or encode.
///
/// Every variant is unrecoverable for the stream it was raised on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    /// An all-zero block, which normally marks the end of the archive.
    #[error("all-zero header block")]
    ZeroHeader,
    #[error("header checksum field is not an octal number")]
    BadChecksumField,
    #[error("header checksum mismatch")]
    ChecksumMismatch,
    #[error("ustar magic with an unknown version")]
    NotUstarV00,
    #[error("unknown header type flag")]
    UnknownTypeFlag,
    #[error("unsupported GNU header type")]
    UnsupportedGnuHeaderType,
    #[error("unsupported pax header type")]
    UnsupportedPaxType,
    #[error("unsupported Solaris extended header")]
    UnsupportedSolarisHdrType,
    #[error("entry name is empty")]
    EmptyName,
    #[error("entry name is too long")]
    NameTooLong,
    #[error("entry name contains a nul byte")]
    NulInName,
    #[error("malformed GNU long name or long link record")]
    MalformedGnuLongXxxx,
    #[error("malformed GNU sparse map")]
    MalformedGnuSparse,
    #[error("malformed pax extended header record")]
    MalformedPaxRecord,
    #[error("numeric field value is too large")]
    NumValueTooLarge,
    #[error("malformed numeric field")]
    BadNumField,
    #[error("numeric field is not properly terminated")]
    BadNumFieldTerm,
    #[error("device number is too large")]
    DevValueTooLarge,
    #[error("mode field has bits outside the unix mode")]
    BadModeField,
    #[error("mode type bits disagree with the header type flag")]
    ModeWithType,
    #[error("unexpected end of archive")]
    UnexpectedEndOfStream,
    #[error("push entry received fewer bytes than announced")]
    BufferUnderflow,
    #[error("operation requires a seekable stream")]
    NotAFile,
    #[error("write beyond the end of the push entry")]
    DiskFull,
    #[error("seek to a negative offset")]
    NegativeSeek,
    #[error("seek beyond the end of the entry")]
    Seek,
    #[error("operation not allowed in the current state")]
    InvalidState,
}

/// Errors returned by the archive reader and writer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The archive is malformed or the request cannot be encoded.
    #[error(transparent)]
    Tar(#[from] ErrorKind),
    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the archive error kind, or `None` for plain I/O failures.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Tar(kind) => Some(*kind),
            Error::Io(_) => None,
        }
    }

    // A copy for the writer's fatal-error latch; `io::Error` is not `Clone`.
    pub(crate) fn replicate(&self) -> Error {
        match self {
            Error::Tar(kind) => Error::Tar(*kind),
            Error::Io(e) => Error::Io(io::Error::new(e.kind(), e.to_string())),
        }
    }
}

/// Unwraps errors that went through an `io::Error` on their way out of a
/// `Read`, `Write` or `Seek` implementation.
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        match err.downcast::<Error>() {
            Ok(err) => err,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                Error::Tar(ErrorKind::UnexpectedEndOfStream)
            }
            Err(err) => Error::Io(err),
        }
    }
}

impl From<ErrorKind> for io::Error {
    fn from(kind: ErrorKind) -> io::Error {
        Error::Tar(kind).into()
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        match err {
            Error::Io(e) => e,
            Error::Tar(kind) => {
                let io_kind = match kind {
                    ErrorKind::UnexpectedEndOfStream => io::ErrorKind::UnexpectedEof,
                    ErrorKind::NotAFile => io::ErrorKind::Unsupported,
                    ErrorKind::DiskFull => io::ErrorKind::WriteZero,
                    ErrorKind::NegativeSeek | ErrorKind::Seek => io::ErrorKind::InvalidInput,
                    _ => io::ErrorKind::InvalidData,
                };
                io::Error::new(io_kind, Error::Tar(kind))
            }
        }
    }
}
