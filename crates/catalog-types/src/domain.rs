use std::fmt;

use serde::{Deserialize, Serialize};

/// Owner of a group of services: one allocation's task, or a fixed system
/// component such as the client agent itself.
///
/// Domains compare by exact string equality. `exec-0` and `exec-0-9` are as
/// unrelated as `exec-0` and `web`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceDomain(String);

impl ServiceDomain {
    pub const CLIENT: &'static str = "client";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Domain owned by the node agent.
    pub fn client() -> Self {
        Self::new(Self::CLIENT)
    }

    /// Domain owned by one task of one allocation.
    ///
    /// Alloc ids are fixed-length UUIDs, so the alloc and task parts split by
    /// position even though both may contain `-`. Alloc ids of any other shape
    /// must not contain `-`: `("a-b", "c")` and `("a", "b-c")` render alike.
    pub fn executor(alloc_id: &str, task: &str) -> Self {
        Self(format!("executor-{alloc_id}-{task}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ServiceDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServiceDomain {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ServiceDomain {
    fn from(value: String) -> Self {
        Self(value)
    }
}
