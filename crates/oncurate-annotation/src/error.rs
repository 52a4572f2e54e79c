use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnnotationError>;

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Annotator error [{status}]: {message}")]
    Api { status: u16, message: String },

    #[error("queryId is missing from an annotation result")]
    MissingQueryId,

    #[error("Annotator unavailable: {0}")]
    Unavailable(String),
}
