use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("Input error: {0}")]
    Input(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Solver error: {0}")]
    Solver(String),
    #[error("Post Processor error: {0}")]
    PostProcessor(String),
}

impl From<argmin::core::Error> for ShellError {
    fn from(err: argmin::core::Error) -> Self {
        ShellError::Solver(err.to_string())
    }
}
