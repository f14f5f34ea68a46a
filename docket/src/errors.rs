use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;
use std::sync::Arc;

use parking_lot::RwLock;

/// Error kinds for Docket operations.
///
/// Every failure surfaced by the store carries one of these kinds so callers can
/// branch on the category without parsing messages.
///
/// # Examples
///
/// ```rust,ignore
/// use docket::errors::{DocketError, ErrorKind, DocketResult};
///
/// fn example() -> DocketResult<()> {
///     Err(DocketError::new("Document not found", ErrorKind::NotFound))
/// }
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Lookup Errors
    /// A document with the requested id does not exist
    NotFound,
    /// The database does not exist or has been deleted
    DatabaseNotFound,
    /// The collection does not exist or has been deleted
    CollectionNotFound,
    /// A database or collection with the same name is already live
    AlreadyExists,

    // Validation Errors
    /// A database or collection name cannot be used as a folder name
    InvalidName,
    /// A filter value is not a scalar or the filter is malformed
    InvalidFilter,
    /// The operation is not valid in the current state
    InvalidOperation,

    // Persistence Errors
    /// A persisted batch or metadata record could not be decoded
    DecodeFailure,
    /// A record could not be encoded for persistence
    EncodeFailure,
    /// Writing a record to storage failed
    WriteFailure,
    /// Generic IO error
    IOError,
    /// Permission denied for file operation
    PermissionDenied,
    /// The disk is full
    DiskFull,

    // Pipeline Errors
    /// A dispatcher or worker panicked while handling an event
    WorkerPanic,
    /// The intake queue or a collection channel has been closed
    ChannelClosed,

    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "Not found"),
            ErrorKind::DatabaseNotFound => write!(f, "Database not found"),
            ErrorKind::CollectionNotFound => write!(f, "Collection not found"),
            ErrorKind::AlreadyExists => write!(f, "Already exists"),
            ErrorKind::InvalidName => write!(f, "Invalid name"),
            ErrorKind::InvalidFilter => write!(f, "Invalid filter"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::DecodeFailure => write!(f, "Decode failure"),
            ErrorKind::EncodeFailure => write!(f, "Encode failure"),
            ErrorKind::WriteFailure => write!(f, "Write failure"),
            ErrorKind::IOError => write!(f, "IO error"),
            ErrorKind::PermissionDenied => write!(f, "Permission denied"),
            ErrorKind::DiskFull => write!(f, "Disk full"),
            ErrorKind::WorkerPanic => write!(f, "Worker panic"),
            ErrorKind::ChannelClosed => write!(f, "Channel closed"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom Docket error type.
///
/// `DocketError` holds the error message, its kind and an optional cause. A
/// backtrace is captured at construction for debugging.
///
/// ```rust,ignore
/// use docket::errors::{DocketError, ErrorKind};
///
/// let cause = DocketError::new("disk full", ErrorKind::DiskFull);
/// let err = DocketError::new_with_cause("Flush failed", ErrorKind::WriteFailure, cause);
/// ```
#[derive(Clone)]
pub struct DocketError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<DocketError>>,
    // resolved lazily on the first debug print, shared between clones
    backtrace: Arc<RwLock<Backtrace>>,
}

impl DocketError {
    /// Creates a new `DocketError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        DocketError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: Arc::new(RwLock::new(Backtrace::new_unresolved())),
        }
    }

    /// Creates a new `DocketError` chained to the error that caused it.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: DocketError) -> Self {
        DocketError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: Arc::new(RwLock::new(Backtrace::new_unresolved())),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&DocketError> {
        self.cause.as_deref()
    }
}

impl Display for DocketError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for DocketError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {}\nCaused by: {:?}", self.error_kind, self.message, cause),
            None => {
                let mut backtrace = self.backtrace.write();
                backtrace.resolve();
                write!(f, "{}: {}\n{:?}", self.error_kind, self.message, *backtrace)
            }
        }
    }
}

impl Error for DocketError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for Docket operations.
pub type DocketResult<T> = Result<T, DocketError>;

impl From<std::io::Error> for DocketError {
    fn from(err: std::io::Error) -> Self {
        let error_kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            std::io::ErrorKind::StorageFull => ErrorKind::DiskFull,
            _ => ErrorKind::IOError,
        };
        DocketError::new(&format!("IO error: {}", err), error_kind)
    }
}

impl From<bincode::error::EncodeError> for DocketError {
    fn from(err: bincode::error::EncodeError) -> Self {
        DocketError::new(&format!("Failed to encode record: {}", err), ErrorKind::EncodeFailure)
    }
}

impl From<bincode::error::DecodeError> for DocketError {
    fn from(err: bincode::error::DecodeError) -> Self {
        DocketError::new(&format!("Failed to decode record: {}", err), ErrorKind::DecodeFailure)
    }
}

impl<T> From<crossbeam::channel::SendError<T>> for DocketError {
    fn from(_: crossbeam::channel::SendError<T>) -> Self {
        DocketError::new("Channel is closed, event was not enqueued", ErrorKind::ChannelClosed)
    }
}

impl From<crossbeam::channel::RecvError> for DocketError {
    fn from(_: crossbeam::channel::RecvError) -> Self {
        DocketError::new("Channel closed before a reply was received", ErrorKind::ChannelClosed)
    }
}

impl From<std::time::SystemTimeError> for DocketError {
    fn from(err: std::time::SystemTimeError) -> Self {
        DocketError::new(&format!("System clock error: {}", err), ErrorKind::InternalError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docket_error_new_creates_error() {
        let error = DocketError::new("An error occurred", ErrorKind::IOError);
        assert_eq!(error.message(), "An error occurred");
        assert_eq!(error.kind(), &ErrorKind::IOError);
        assert!(error.cause().is_none());
    }

    #[test]
    fn docket_error_new_with_cause_creates_error() {
        let cause = DocketError::new("disk is full", ErrorKind::DiskFull);
        let error = DocketError::new_with_cause("Flush failed", ErrorKind::WriteFailure, cause);
        assert_eq!(error.kind(), &ErrorKind::WriteFailure);
        assert_eq!(error.cause().map(|c| c.kind().clone()), Some(ErrorKind::DiskFull));
        assert!(error.source().is_some());
    }

    #[test]
    fn docket_error_display_is_message() {
        let error = DocketError::new("Document not found", ErrorKind::NotFound);
        assert_eq!(format!("{}", error), "Document not found");
    }

    #[test]
    fn docket_error_debug_contains_cause() {
        let cause = DocketError::new("bad magic", ErrorKind::DecodeFailure);
        let error = DocketError::new_with_cause("Load failed", ErrorKind::DecodeFailure, cause);
        let formatted = format!("{:?}", error);
        assert!(formatted.contains("Load failed"));
        assert!(formatted.contains("Caused by:"));
    }

    #[test]
    fn io_errors_map_to_kinds() {
        let err: DocketError = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();
        assert_eq!(err.kind(), &ErrorKind::PermissionDenied);

        let err: DocketError = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert_eq!(err.kind(), &ErrorKind::NotFound);

        let err: DocketError = std::io::Error::other("boom").into();
        assert_eq!(err.kind(), &ErrorKind::IOError);
    }

    #[test]
    fn channel_errors_map_to_channel_closed() {
        let (tx, rx) = crossbeam::channel::bounded::<u8>(1);
        drop(rx);
        let err: DocketError = tx.send(1).unwrap_err().into();
        assert_eq!(err.kind(), &ErrorKind::ChannelClosed);
    }
}
