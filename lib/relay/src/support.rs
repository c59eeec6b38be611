use std::io;

/// Classification of fatal transport failures.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorType {
    Io,
    Malformed,
    FrameSize,
    UnknownMessage,
    UnknownCommand,
    Address,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NetworkError {
    /// The operation cannot make progress right now; retry on the next
    /// readiness event.
    Wait,
    /// The remote endpoint closed the stream.
    Closed,
    /// Unrecoverable failure; the connection must be dropped.
    Fatal(ErrorType),
}

pub type NetworkResult<T> = Result<T, NetworkError>;

impl From<io::Error> for NetworkError {
    #[inline]
    fn from(err: io::Error) -> NetworkError {
        match err.kind() {
            io::ErrorKind::WouldBlock => NetworkError::Wait,
            io::ErrorKind::UnexpectedEof => NetworkError::Fatal(ErrorType::Malformed),
            _ => NetworkError::Fatal(ErrorType::Io),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_io_errors() {
        let wait: NetworkError = io::Error::from(io::ErrorKind::WouldBlock).into();
        assert_eq!(wait, NetworkError::Wait);

        let truncated: NetworkError = io::Error::from(io::ErrorKind::UnexpectedEof).into();
        assert_eq!(truncated, NetworkError::Fatal(ErrorType::Malformed));

        let refused: NetworkError = io::Error::from(io::ErrorKind::ConnectionRefused).into();
        assert_eq!(refused, NetworkError::Fatal(ErrorType::Io));
    }
}
