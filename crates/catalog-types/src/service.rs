use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::MalformedService;
use crate::key::ServiceKey;

/// A service a domain wants advertised in the registry.
///
/// `name` and `port_label` are identity; everything else is payload that can
/// change without changing the [`ServiceKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub checks: Vec<ServiceCheck>,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port_label: None,
            address: None,
            port: None,
            tags: Vec::new(),
            checks: Vec::new(),
        }
    }

    pub fn key(&self) -> ServiceKey {
        ServiceKey::of(self)
    }

    /// Digest of the full declaration; two services with equal fingerprints
    /// need no registry update.
    pub fn fingerprint(&self) -> Fingerprint {
        // Plain structs with string keys always serialize.
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        Fingerprint(hex::encode(Sha256::digest(&canonical)))
    }

    pub fn validate(&self) -> Result<(), MalformedService> {
        if self.name.trim().is_empty() {
            return Err(MalformedService::EmptyName);
        }
        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(MalformedService::EmptyTag {
                service: self.name.clone(),
            });
        }
        let mut seen = HashSet::new();
        for check in &self.checks {
            if check.name.trim().is_empty() {
                return Err(MalformedService::UnnamedCheck {
                    service: self.name.clone(),
                });
            }
            if !seen.insert(check.name.as_str()) {
                return Err(MalformedService::DuplicateCheck {
                    service: self.name.clone(),
                    check: check.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Health check descriptor forwarded to the registry with its service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCheck {
    pub name: String,
    #[serde(flatten)]
    pub kind: CheckKind,
    #[serde(with = "duration_ms", rename = "interval_ms")]
    pub interval: Duration,
    #[serde(with = "duration_ms", rename = "timeout_ms")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckKind {
    Http {
        url: String,
    },
    Tcp {
        address: String,
    },
    Script {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Ttl {
        #[serde(with = "duration_ms", rename = "ttl_ms")]
        ttl: Duration,
    },
}

/// Hex SHA-256 digest of a service's canonical JSON form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap a fingerprint read back from registry metadata.
    pub fn from_raw(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
