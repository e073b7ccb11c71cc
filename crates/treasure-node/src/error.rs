//! Error types for the node

use thiserror::Error;
use treasure_core::TreasureError;

/// Node error type
#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Core(#[from] TreasureError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for node operations
pub type Result<T> = std::result::Result<T, NodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_are_transparent() {
        let err = NodeError::from(TreasureError::NotFound("marker 'gold1'".to_string()));
        assert_eq!(err.to_string(), "Not found: marker 'gold1'");
    }

    #[test]
    fn test_toml_errors_convert() {
        let parse = toml::from_str::<toml::Value>("settings = [").unwrap_err();
        assert!(matches!(NodeError::from(parse), NodeError::ConfigParse(_)));
    }
}
