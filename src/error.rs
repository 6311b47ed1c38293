use reqwest::StatusCode;

/// Result type for plant-doctor operations
pub type Result<T> = std::result::Result<T, DoctorError>;

/// Everything that can go wrong between picking an image and rendering a diagnosis.
///
/// The `Display` text of each variant is what the user sees in the error toast,
/// so the two endpoint failures keep their short fixed messages.
#[derive(Debug, thiserror::Error)]
pub enum DoctorError {
    #[error("Prediction failed")]
    PredictionFailed { status: StatusCode },

    #[error("Failed to fetch cure info")]
    CureLookupFailed { status: StatusCode },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),

    #[error("Submission cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DoctorError {
    /// HTTP status behind an endpoint failure, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            DoctorError::PredictionFailed { status } | DoctorError::CureLookupFailed { status } => {
                Some(*status)
            }
            DoctorError::Transport(err) => err.status(),
            _ => None,
        }
    }
}
