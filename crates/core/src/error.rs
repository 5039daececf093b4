use thiserror::Error;

/// Error kind for the storage layer, the one subsystem that crosses a crate
/// boundary using this shared type rather than its own crate-local enum
/// (`TransportError`, `OnionError`, `CircuitError`, and so on each stay
/// local to their crate and convert into `capsule_daemon::DaemonError` at
/// the daemon boundary instead).
#[derive(Error, Debug)]
pub enum CapsuleError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, CapsuleError>;

impl From<std::io::Error> for CapsuleError {
    fn from(e: std::io::Error) -> Self {
        CapsuleError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for CapsuleError {
    fn from(e: serde_json::Error) -> Self {
        CapsuleError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: CapsuleError = io_err.into();
        assert!(matches!(err, CapsuleError::Io(_)));
    }

    #[test]
    fn serialization_error_converts() {
        let json_err = serde_json::from_str::<i32>("not json").unwrap_err();
        let err: CapsuleError = json_err.into();
        assert!(matches!(err, CapsuleError::Serialization(_)));
    }

    #[test]
    fn result_alias_works() {
        let ok: Result<i32> = Ok(1);
        assert!(ok.is_ok());
        let err: Result<i32> = Err(CapsuleError::Io("boom".into()));
        assert!(err.is_err());
    }
}
