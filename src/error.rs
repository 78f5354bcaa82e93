use thiserror::Error;

#[derive(Error, Debug)]
pub enum BirdTagError {
    #[error("authentication required, please sign in")]
    AuthRequired,
    #[error("{0}")]
    Validation(String),
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("File is too big. Max file size is {0}")]
    FileTooBig(String),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("File read error: {0}")]
    FileReadError(std::io::Error),
    #[error("sign-in challenge {0} is not supported")]
    UnsupportedChallenge(String),
    #[error("{status}: {body}")]
    Api { status: u16, body: String },
    #[error("could not reach the server: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Failed to read/write state file: {0}")]
    StateIOError(std::io::Error),
    #[error("Failed to serialize/deserialize stored state: {0}")]
    StateSerializationError(serde_json::Error),
}

impl BirdTagError {
    /// Turn a non-2xx response into an error carrying the body verbatim.
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        BirdTagError::Api { status, body }
    }
}

pub type Result<T, E = BirdTagError> = std::result::Result<T, E>;
