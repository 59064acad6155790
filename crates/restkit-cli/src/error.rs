use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] restkit_core::ConfigError),

    #[error(transparent)]
    Transport(#[from] restkit_core::TransportError),

    #[error(transparent)]
    Validation(#[from] restkit_core::ValidationError),

    #[error("command error: {0}")]
    Command(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Command(_) => 2,
            Self::Transport(_) => 3,
            Self::Serialization(_) => 4,
            Self::Validation(_) => 5,
            Self::Io(_) => 10,
        }
    }
}
