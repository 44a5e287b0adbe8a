use thiserror::Error;

pub type Result<T> = std::result::Result<T, WebDriverError>;

#[derive(Debug, Error)]
pub enum WebDriverError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("WebDriver error (status {status}, {error}): {message}")]
    Protocol {
        status: u16,
        error: String,
        message: String,
    },

    #[error("Unexpected response shape: {0}")]
    Decode(String),
}

impl WebDriverError {
    /// `no such element` and `stale element reference` both mean the node is
    /// not there right now; callers treat them as a miss, not a failure.
    pub fn is_missing_element(&self) -> bool {
        matches!(
            self,
            WebDriverError::Protocol { error, .. }
                if error == "no such element" || error == "stale element reference"
        )
    }
}

impl From<reqwest::Error> for WebDriverError {
    fn from(err: reqwest::Error) -> Self {
        WebDriverError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for WebDriverError {
    fn from(err: serde_json::Error) -> Self {
        WebDriverError::Decode(err.to_string())
    }
}
