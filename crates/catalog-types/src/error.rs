use thiserror::Error;

/// A service declaration that cannot be registered as written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedService {
    #[error("service name must not be empty")]
    EmptyName,
    #[error("service '{service}' has an empty tag")]
    EmptyTag { service: String },
    #[error("service '{service}' has a check with an empty name")]
    UnnamedCheck { service: String },
    #[error("service '{service}' declares check '{check}' more than once")]
    DuplicateCheck { service: String, check: String },
}

/// A string that is not a rendered [`crate::ServiceKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid service key '{0}': expected 32 lowercase hex characters")]
pub struct InvalidServiceKey(pub String);
