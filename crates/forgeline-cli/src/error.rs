use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] forgeline_core::CoreError),

    #[error(transparent)]
    Calendar(#[from] forgeline_allocation::CalendarError),

    #[error("command error: {0}")]
    Command(String),

    #[error("missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Core(_) => 3,
            Self::Calendar(_) => 2,
            Self::Command(_) => 2,
            Self::MissingEnv(_) => 2,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}
