//! Client Error Types
//!
//! Every condition in this crate is non-fatal to a running poller except a
//! bind failure at startup. The variants map onto the conditions the client
//! logs: unmatched responses, duplicate pending keys, undecodable packets and
//! transport faults.

use thiserror::Error;

use crate::address::ConnectionDescriptor;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised by the polling client
#[derive(Debug, Error)]
pub enum ClientError {
    /// A read result arrived for a transaction nobody is waiting on
    #[error("no pending request for invoke ID {invoke_id} on {connection}")]
    UnmatchedResponse {
        connection: ConnectionDescriptor,
        invoke_id: u8,
    },

    /// A dispatch collided with an unanswered request under the same key
    #[error("request with invoke ID {invoke_id} on {connection} is still pending")]
    DuplicateKey {
        connection: ConnectionDescriptor,
        invoke_id: u8,
    },

    /// The engine's packet rendering could not be interpreted
    #[error("decode failure: {0}")]
    DecodeFailure(String),

    /// Sending or receiving through the network collaborator failed
    #[error("transport failure: {0}")]
    Transport(String),

    /// I/O error from the socket layer
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unresolvable configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The protocol engine refused an operation
    #[error("protocol engine error: {0}")]
    Engine(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(error: serde_json::Error) -> Self {
        ClientError::DecodeFailure(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let connection: ConnectionDescriptor = "10.0.0.2:47808".parse().unwrap();

        let err = ClientError::UnmatchedResponse {
            connection,
            invoke_id: 99,
        };
        assert_eq!(
            err.to_string(),
            "no pending request for invoke ID 99 on 10.0.0.2:47808"
        );

        let err = ClientError::DuplicateKey {
            connection,
            invoke_id: 5,
        };
        assert!(err.to_string().contains("still pending"));
    }

    #[test]
    fn test_json_error_becomes_decode_failure() {
        let err: ClientError = serde_json::from_str::<u32>("{").unwrap_err().into();
        assert!(matches!(err, ClientError::DecodeFailure(_)));
    }
}
