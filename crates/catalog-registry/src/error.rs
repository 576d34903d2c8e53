use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Transport-level failure; the same request may succeed later.
    #[error("registry unavailable: {0}")]
    Unavailable(String),
    /// The registry refused the request as written.
    #[error("registry rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

impl RegistryError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn rejected(status: u16, msg: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: msg.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
