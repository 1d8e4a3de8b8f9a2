use mailcraft_blocks::BlockError;
use thiserror::Error;

pub type PreviewResult<T> = Result<T, PreviewError>;

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("MJML parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Document root must be <mjml>, found <{found}>")]
    NotMjml { found: String },

    #[error("Invalid document: {0}")]
    Document(#[from] BlockError),

    #[error("Render service error: {0}")]
    Service(String),

    #[error("Failed to write HTML: {0}")]
    Format(#[from] std::fmt::Error),
}
