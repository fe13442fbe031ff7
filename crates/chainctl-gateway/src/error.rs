use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// The tool exited abnormally or could not be started at all.
    #[error("chainctl failed: {message}")]
    ExternalTool { message: String, stderr: String },

    /// Tool output did not have the structure we expect.
    #[error("Unparseable tool output: {0}")]
    Parse(String),

    /// A bounded invocation exceeded its time budget.
    #[error("{command} timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
