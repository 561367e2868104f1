pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("test plan has no scenarios")]
    EmptyPlan,

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A step-level failure: a hook returned an error or an engine adapter
/// could not complete a request. Aborts only the VU it happened in; the
/// `code` ends up in the run's `errors.*` counters.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct StepError {
    pub code: String,
    pub message: String,
}

impl StepError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
