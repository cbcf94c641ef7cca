use std::io;

use thiserror::Error;

/// Failures surfaced by the channel.
///
/// Short writes and empty receive queues are not errors; they are
/// reported through boolean and sentinel return values. An error during a
/// read terminates only the current burst, never the channel.
#[derive(Debug, Error)]
pub enum TransportError {
    /// A construction-time contract violation, reported synchronously
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// An outbound message shape the channel cannot send
    #[error("unsupported message: {0}")]
    UnsupportedMessage(String),
    /// An operation this platform binding does not provide
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
    /// The connected peer's port is closed
    #[error("port unreachable")]
    PortUnreachable(#[source] io::Error),
    /// Any other native I/O failure, message preserved
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Translates a raw OS error observed during a read.
///
/// A connection-refused report on a connected datagram socket means the
/// peer's port is closed, which deserves its own signal; every other code
/// passes through unmodified.
pub fn translate_read_error(err: io::Error, connected: bool) -> TransportError {
    if connected && err.kind() == io::ErrorKind::ConnectionRefused {
        return TransportError::PortUnreachable(err);
    }
    TransportError::Io(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refused() -> io::Error {
        io::Error::from(io::ErrorKind::ConnectionRefused)
    }

    #[test]
    fn connection_refused_on_connected_read_is_port_unreachable() {
        let err = translate_read_error(refused(), true);
        assert!(matches!(err, TransportError::PortUnreachable(_)));
    }

    #[test]
    fn connection_refused_on_unconnected_read_passes_through() {
        let err = translate_read_error(refused(), false);
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[test]
    fn other_codes_pass_through_with_message() {
        let raw = io::Error::new(io::ErrorKind::PermissionDenied, "sendmsg: operation not permitted");
        let err = translate_read_error(raw, true);
        match err {
            TransportError::Io(inner) => {
                assert_eq!(inner.to_string(), "sendmsg: operation not permitted");
            }
            other => panic!("expected Io, got {other:?}"),
        }
    }
}
