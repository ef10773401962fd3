use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// An embedding or generation service could not be reached or answered with a
    /// non-success status.
    #[error("{service} unavailable{}: {details}", status_suffix(.status))]
    UpstreamUnavailable {
        service: String,
        status: Option<u16>,
        details: String,
    },

    /// The embedding batch came back with a different number of vectors than texts sent.
    #[error("embedding count mismatch: expected {expected} vectors, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl PipelineError {
    pub fn unavailable(
        service: impl Into<String>,
        status: Option<u16>,
        details: impl Into<String>,
    ) -> Self {
        Self::UpstreamUnavailable {
            service: service.into(),
            status,
            details: details.into(),
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|code| format!(" (status {code})"))
        .unwrap_or_default()
}
