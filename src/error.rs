use thiserror::Error;

/// Request-level failures of the chat pipeline.
///
/// Upstream hiccups during retrieval never appear here; they degrade to an
/// empty context and the generator declines politely.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("access denied: no validated department")]
    AccessDenied,

    #[error("invalid question: {0}")]
    InvalidQuestion(String),

    #[error("generation failed: {0}")]
    Generation(String),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
