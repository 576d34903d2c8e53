use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::InvalidServiceKey;
use crate::service::Service;

const KEY_BYTES: usize = 16;

/// Stable identity of one service declaration.
///
/// Derived from the identity fields of a [`Service`] (its name and port
/// label), never from its payload, so re-declaring a service with new tags or
/// checks replaces the registration instead of adding a second one. Each field
/// is length-prefixed before hashing: `foo` and `foobar` hash independently,
/// and no concatenation of fields can alias another.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceKey(String);

impl ServiceKey {
    pub fn of(service: &Service) -> Self {
        let mut hasher = Sha256::new();
        write_field(&mut hasher, Some(service.name.as_bytes()));
        write_field(&mut hasher, service.port_label.as_deref().map(str::as_bytes));
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..KEY_BYTES]))
    }

    pub fn parse(value: &str) -> Result<Self, InvalidServiceKey> {
        let well_formed = value.len() == KEY_BYTES * 2
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if well_formed {
            Ok(Self(value.to_string()))
        } else {
            Err(InvalidServiceKey(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn write_field(hasher: &mut Sha256, field: Option<&[u8]>) {
    match field {
        None => hasher.update([0u8]),
        Some(bytes) => {
            hasher.update([1u8]);
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ServiceKey {
    type Error = InvalidServiceKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ServiceKey> for String {
    fn from(key: ServiceKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ignores_payload_fields() {
        let plain = Service::new("web");
        let mut tagged = Service::new("web");
        tagged.tags = vec!["v2".into()];
        tagged.port = Some(8080);
        assert_eq!(ServiceKey::of(&plain), ServiceKey::of(&tagged));
    }

    #[test]
    fn prefixed_names_do_not_collide() {
        let foo = ServiceKey::of(&Service::new("foo"));
        let foobar = ServiceKey::of(&Service::new("foobar"));
        assert_ne!(foo, foobar);
        assert!(!foobar.as_str().starts_with(foo.as_str()));
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let mut a = Service::new("foo");
        a.port_label = Some("bar".into());
        let mut b = Service::new("foob");
        b.port_label = Some("ar".into());
        let c = Service::new("foobar");
        assert_ne!(ServiceKey::of(&a), ServiceKey::of(&b));
        assert_ne!(ServiceKey::of(&b), ServiceKey::of(&c));
    }

    #[test]
    fn parse_accepts_rendered_keys_only() {
        let key = ServiceKey::of(&Service::new("api"));
        assert_eq!(ServiceKey::parse(key.as_str()).unwrap(), key);
        assert!(ServiceKey::parse("api").is_err());
        assert!(ServiceKey::parse("0123456789ABCDEF0123456789ABCDEF").is_err());
    }
}
