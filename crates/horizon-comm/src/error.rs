use horizon_core::StructureError;
use thiserror::Error;

/// Errors raised while encoding, decoding or emitting messages.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Malformed message: {0}")]
    Malformed(#[from] StructureError),

    #[error("Peer disconnected")]
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_wraps_structure_error() {
        let err: TransportError = StructureError::mismatch("controller data", 3, 2).into();
        assert!(matches!(err, TransportError::Malformed(_)));
        assert!(err.to_string().contains("controller data"));
    }

    #[test]
    fn payload_too_large_message() {
        let err = TransportError::PayloadTooLarge { size: 20, max: 10 };
        assert_eq!(err.to_string(), "Payload too large: 20 bytes (max 10)");
    }
}
