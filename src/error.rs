use thiserror::Error;

/// Errors that can occur in the transport core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WtpError {
    #[error("buffer bounds exceeded")]
    OutOfRange,
    #[error("arena or queue full")]
    NoMemory,
    #[error("resource already armed or open")]
    Already,
    #[error("invalid argument or peer protocol violation")]
    Invalid,
    #[error("pop from empty queue")]
    Empty,
    #[error("unknown packet type")]
    UnsupportedOp,
    #[error("acknowledgement does not land on a fragment boundary")]
    NotAcked,
    #[error("checksum mismatch")]
    BadChecksum,
}

/// Completion status delivered to send/receive/event callbacks.
pub type WtpStatus = Result<(), WtpError>;
