use thiserror::Error;

use crate::world::BodyKey;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Misuse of a `World` handle, or a world that could not be configured.
/// Rejected moves are not errors; see `MoveOutcome`.
#[derive(Error, Debug)]
pub enum WorldError {
    #[error("Body {0:?} is not registered in this world")]
    UnknownBody(BodyKey),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
