/// Errors that can occur in the transport layer.
///
/// A send or receive failure is fatal to the connection it came from and to
/// nothing else.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer closed the connection, or it was closed locally.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding, accepting or upgrading a connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_failure_display_includes_cause() {
        let err = TransportError::SendFailed(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "pipe",
        ));
        assert_eq!(err.to_string(), "send failed: pipe");
    }

    #[test]
    fn test_accept_failure_keeps_source() {
        use std::error::Error;

        let err = TransportError::AcceptFailed(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "nope",
        ));
        assert!(err.source().is_some());
    }
}
