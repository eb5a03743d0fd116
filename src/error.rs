use thiserror::Error;

/// Main error type for bergamot model provisioning
#[derive(Error, Debug)]
pub enum BergamotError {
    #[error("Network error: {0}\n\nTroubleshooting:\n- Check internet connection\n- Verify the provider URL in ~/.config/bergamot/config.toml\n- Try increasing network.request_timeout_secs in config")]
    Network(String),

    #[error("Parse error: {0}\n\nTroubleshooting:\n- The remote catalog format may have changed\n- Inspect the saved listing in the provider's config directory\n- Run with RUST_LOG=debug for more details")]
    Parse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Archive error: {0}\n\nTroubleshooting:\n- The downloaded archive may be truncated or corrupt\n- Delete it from the provider's archives directory and download again")]
    Archive(String),

    #[error("Filesystem error: {0}")]
    FileSystem(String),

    #[error("Config error: {0}\n\nTroubleshooting:\n- Check config file: ~/.config/bergamot/config.toml\n- Remove it to fall back to built-in defaults")]
    Config(String),

    #[error("Engine error: {0}\n\nTroubleshooting:\n- Is the bergamot binary installed and in PATH?\n- Set engine.binary in config to its full path")]
    Engine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BergamotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_errors_convert() {
        let err: BergamotError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, BergamotError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_parse_error_mentions_format_change() {
        let err = BergamotError::Parse("missing root URL".to_string());
        let msg = err.to_string();
        assert!(msg.starts_with("Parse error: missing root URL"));
        assert!(msg.contains("format may have changed"));
    }
}
