use std::time::Duration;

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RegistryConfigError {
    #[error("invalid registry address '{address}': {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Connection settings for a Consul agent.
#[derive(Debug, Clone)]
pub struct ConsulConfig {
    /// `host:port` of the local agent.
    pub address: String,
    /// `http` or `https`.
    pub scheme: String,
    /// ACL token sent with every request.
    pub token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Prefix of every registration id this adapter creates.
    pub id_prefix: String,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8500".into(),
            scheme: "http".into(),
            token: None,
            timeout: Duration::from_secs(5),
            id_prefix: "_catalog".into(),
        }
    }
}

impl ConsulConfig {
    /// Defaults overridden by the standard `CONSUL_HTTP_*` variables.
    pub fn from_env() -> Result<Self, RegistryConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RegistryConfigError> {
        let mut config = Self::default();
        if let Some(address) = lookup("CONSUL_HTTP_ADDR") {
            // The variable may carry a scheme, as the consul CLI accepts.
            match address.split_once("://") {
                Some((scheme, rest)) => {
                    config.scheme = scheme.to_string();
                    config.address = rest.to_string();
                }
                None => config.address = address,
            }
        }
        if let Some(token) = lookup("CONSUL_HTTP_TOKEN").filter(|t| !t.is_empty()) {
            config.token = Some(token);
        }
        if let Some(ssl) = lookup("CONSUL_HTTP_SSL") {
            match ssl.to_ascii_lowercase().as_str() {
                "1" | "true" => config.scheme = "https".into(),
                "0" | "false" => {}
                _ => {
                    return Err(RegistryConfigError::InvalidEnv {
                        var: "CONSUL_HTTP_SSL",
                        value: ssl,
                    });
                }
            }
        }
        Ok(config)
    }

    pub fn base_url(&self) -> Result<Url, RegistryConfigError> {
        let raw = format!("{}://{}", self.scheme, self.address);
        Url::parse(&raw).map_err(|source| RegistryConfigError::InvalidAddress {
            address: raw,
            source,
        })
    }
}
