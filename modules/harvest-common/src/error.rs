use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Required page element not found: {0}")]
    NavigationNotFound(String),

    #[error("Rendering session error: {0}")]
    Session(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl HarvestError {
    /// Fatal errors abort the harvest; everything else degrades.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarvestError::NavigationNotFound(_) | HarvestError::Session(_)
        )
    }
}
